//! # Kernel Configuration
//!
//! Compile-time capacities and the physical/virtual layout of the process
//! core.
//!
//! ## Virtual Layout
//!
//! | Range                       | Contents                                |
//! |-----------------------------|-----------------------------------------|
//! | `0x0800_0000..0x0840_0000`  | Program region of the running process   |
//! | `0x0804_8000`               | Start of the copied executable image    |
//! | `0x083F_FFF8`               | Initial user stack pointer              |
//! | `0xF000_0000`               | Terminal 0 display page (vidmap)        |
//! | `0xEFFF_E000`               | Terminal 1 display page (vidmap)        |
//! | `0xEFFF_C000`               | Terminal 2 display page (vidmap)        |
//!
//! ## Physical Layout
//!
//! Process `pid` owns the 4 MiB region at `process_pool_base + pid * 4 MiB`
//! (8 MiB + 4·pid MiB with the default pool) and the 8 KiB kernel stack
//! ending at `kernel_stack_region_top - pid * 8 KiB`.

use x86_64::{PhysAddr, VirtAddr};

use crate::process::Pid;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

pub const MAX_PROCESSES: usize = 6;
pub const MAX_TERMINALS: usize = 3;
pub const MAX_FILES: usize = 8;
/// First descriptor `open` may hand out; 0 and 1 belong to the console.
pub const FIRST_USER_FD: usize = 2;

pub const PROGRAM_VIRT_BASE: u64 = 128 * MIB;
pub const PROGRAM_REGION_SIZE: u64 = 4 * MIB;
pub const PROGRAM_IMAGE_OFFSET: u64 = 0x48000;
pub const PROGRAM_IMAGE_BASE: u64 = PROGRAM_VIRT_BASE + PROGRAM_IMAGE_OFFSET;
pub const USER_STACK_TOP: u64 = PROGRAM_VIRT_BASE + PROGRAM_REGION_SIZE - 8;

pub const KERNEL_STACK_SIZE: u64 = 8 * KIB;

pub const DISPLAY_VIRT_BASES: [u64; MAX_TERMINALS] = [0xF000_0000, 0xEFFF_E000, 0xEFFF_C000];
pub const DISPLAY_PAGE_SIZE: u64 = 4 * KIB;

pub const TIMER_HZ: u32 = 100;
pub const PIT_BASE_HZ: u32 = 1_193_182;
pub const RTC_BASE_HZ: u32 = 1024;
pub const RTC_MIN_HZ: u32 = 2;
pub const RTC_DEFAULT_HZ: u32 = 2;

pub const MAX_ARG_LEN: usize = 32;
pub const COMMAND_MAX: usize = 128;
pub const LINE_BUFFER_SIZE: usize = 128;
pub const FILE_NAME_LEN: usize = 32;

pub const EXECUTABLE_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ENTRY_POINT_OFFSET: u32 = 24;

pub const ROOT_SHELL: &[u8] = b"shell";
/// Exit status reported to the parent when a task dies on a CPU exception.
pub const EXCEPTION_STATUS: i32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NullProcessPool,
    MisalignedProcessPool(PhysAddr),
    MisalignedKernelStacks(VirtAddr),
    KernelStacksTooLow(VirtAddr),
    MisalignedDisplayFrame(usize, PhysAddr),
}

/// Runtime layout filled in by the boot code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub process_pool_base: PhysAddr,
    pub kernel_stack_region_top: VirtAddr,
    pub display_frames: [PhysAddr; MAX_TERMINALS],
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            process_pool_base: PhysAddr::new(8 * MIB),
            kernel_stack_region_top: VirtAddr::new(8 * MIB),
            display_frames: [
                PhysAddr::new(0xB9000),
                PhysAddr::new(0xBA000),
                PhysAddr::new(0xBB000),
            ],
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = self.process_pool_base.as_u64();
        if pool == 0 {
            return Err(ConfigError::NullProcessPool);
        }
        if pool % PROGRAM_REGION_SIZE != 0 {
            return Err(ConfigError::MisalignedProcessPool(self.process_pool_base));
        }

        let top = self.kernel_stack_region_top.as_u64();
        if top % 16 != 0 {
            return Err(ConfigError::MisalignedKernelStacks(self.kernel_stack_region_top));
        }
        if top < KERNEL_STACK_SIZE * MAX_PROCESSES as u64 {
            return Err(ConfigError::KernelStacksTooLow(self.kernel_stack_region_top));
        }

        for (terminal, frame) in self.display_frames.iter().enumerate() {
            if frame.as_u64() == 0 || frame.as_u64() % DISPLAY_PAGE_SIZE != 0 {
                return Err(ConfigError::MisalignedDisplayFrame(terminal, *frame));
            }
        }
        Ok(())
    }

    /// Physical start of the 4 MiB program region owned by `pid`.
    pub fn process_frame(&self, pid: Pid) -> PhysAddr {
        self.process_pool_base + PROGRAM_REGION_SIZE * pid as u64
    }

    /// Initial kernel stack pointer for `pid`.
    pub fn kernel_stack_top(&self, pid: Pid) -> VirtAddr {
        self.kernel_stack_region_top - KERNEL_STACK_SIZE * pid as u64
    }
}
