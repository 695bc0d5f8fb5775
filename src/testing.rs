//! Host-side doubles for the platform port and the device collaborators.

use std::cell::{Cell, RefCell, UnsafeCell};
use std::collections::VecDeque;

use x86_64::structures::paging::{Page, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::{
    ConfigError, KernelConfig, EXECUTABLE_MAGIC, MAX_TERMINALS, PROGRAM_IMAGE_BASE,
    PROGRAM_REGION_SIZE,
};
use crate::devices::fs::{
    BLOCK_SIZE, DENTRY_SIZE, FILE_TYPE_CLOCK, FILE_TYPE_DIRECTORY, FILE_TYPE_REGULAR,
};
use crate::devices::{Console, DeviceIo, FsImage, VirtualRtc};
use crate::hal::{InterruptControl, Launch, Mmu, TaskSwitch, TickSource};
use crate::kernel::{Kernel, SchedulerState};
use crate::memory::{DisplayMapping, MappingError, ProgramMapping};
use crate::process::{Pid, SavedContext, TerminalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    EnableInterrupts,
    DisableInterrupts,
    AckTimer,
    KernelStack(VirtAddr),
    InstallProgram(PhysAddr),
    InstallDisplay(VirtAddr),
    RemoveDisplay(VirtAddr),
    PrepareFirstRun { pid: Pid, stack_top: VirtAddr },
    EnterUser(Launch),
    Switch { save: usize, load: usize },
    Resume { status: i32 },
}

/// Stack pointer written into every context the mock saves.
pub const SAVED_MARKER: u64 = 0x00C0_FFEE;

/// Records every call into the platform port.
pub struct MockMachine {
    interrupts: Cell<bool>,
    events: RefCell<Vec<Event>>,
    ticks: Cell<u64>,
    relax_budget: Cell<Option<u64>>,
    installed: Cell<Option<PhysAddr>>,
    kernel_stack: Cell<Option<VirtAddr>>,
    fail_install: Cell<bool>,
    exit_status: Cell<i32>,
    last_resume: Cell<Option<(SavedContext, i32)>>,
    region: UnsafeCell<Vec<u8>>,
}

impl MockMachine {
    pub fn new() -> Self {
        Self {
            interrupts: Cell::new(false),
            events: RefCell::new(Vec::new()),
            ticks: Cell::new(0),
            relax_budget: Cell::new(None),
            installed: Cell::new(None),
            kernel_stack: Cell::new(None),
            fail_install: Cell::new(false),
            exit_status: Cell::new(0),
            last_resume: Cell::new(None),
            region: UnsafeCell::new(vec![0; PROGRAM_REGION_SIZE as usize]),
        }
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn set_interrupts(&self, enabled: bool) {
        self.interrupts.set(enabled);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn installed_program(&self) -> Option<PhysAddr> {
        self.installed.get()
    }

    pub fn kernel_stack(&self) -> Option<VirtAddr> {
        self.kernel_stack.get()
    }

    /// Panic on the `count + 1`th `relax`, ending a loop that only a timer
    /// switch would leave on hardware.
    pub fn limit_relaxes(&self, count: u64) {
        self.relax_budget.set(Some(count));
    }

    pub fn fail_next_program_install(&self) {
        self.fail_install.set(true);
    }

    /// Status `enter_user` reports, as if the task had halted with it.
    pub fn set_exit_status(&self, status: i32) {
        self.exit_status.set(status);
    }

    pub fn last_resume(&self) -> Option<(SavedContext, i32)> {
        self.last_resume.get()
    }

    pub fn region_snapshot(&self, start: usize, len: usize) -> Vec<u8> {
        // Tests are single threaded and hold no region slice here.
        unsafe { (&(*self.region.get()))[start..start + len].to_vec() }
    }
}

impl Default for MockMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptControl for MockMachine {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts.get()
    }

    fn disable_interrupts(&self) {
        self.record(Event::DisableInterrupts);
        self.interrupts.set(false);
    }

    fn enable_interrupts(&self) {
        self.record(Event::EnableInterrupts);
        self.interrupts.set(true);
    }
}

impl TickSource for MockMachine {
    fn rtc_ticks(&self) -> u64 {
        self.ticks.get()
    }

    fn relax(&self) {
        match self.relax_budget.get() {
            Some(0) => panic!("relax budget exhausted"),
            Some(left) => self.relax_budget.set(Some(left - 1)),
            None => {}
        }
        self.ticks.set(self.ticks.get() + 1);
    }
}

impl Mmu for MockMachine {
    fn install_program(&self, mapping: &ProgramMapping) -> Result<(), MappingError> {
        if self.fail_install.replace(false) {
            return Err(MappingError::Platform("injected failure"));
        }
        self.record(Event::InstallProgram(mapping.physical_base));
        self.installed.set(Some(mapping.physical_base));
        Ok(())
    }

    fn install_display(&self, mapping: &DisplayMapping) -> Result<(), MappingError> {
        self.record(Event::InstallDisplay(mapping.page.start_address()));
        Ok(())
    }

    fn remove_display(&self, page: Page<Size4KiB>) -> Result<(), MappingError> {
        self.record(Event::RemoveDisplay(page.start_address()));
        Ok(())
    }

    unsafe fn program_region(&self) -> &mut [u8] {
        (*self.region.get()).as_mut_slice()
    }
}

impl TaskSwitch for MockMachine {
    fn acknowledge_timer(&self) {
        self.record(Event::AckTimer);
    }

    fn set_kernel_stack(&self, top: VirtAddr) {
        self.record(Event::KernelStack(top));
        self.kernel_stack.set(Some(top));
    }

    unsafe fn prepare_first_run(&self, stack_top: VirtAddr, launch: &Launch) -> SavedContext {
        self.record(Event::PrepareFirstRun {
            pid: launch.pid,
            stack_top,
        });
        SavedContext {
            stack_pointer: stack_top.as_u64() - 56,
            frame_pointer: 0,
        }
    }

    unsafe fn enter_user(&self, save: *mut SavedContext, launch: &Launch) -> i32 {
        self.record(Event::EnterUser(*launch));
        (*save).stack_pointer = SAVED_MARKER;
        self.interrupts.set(true);
        self.exit_status.get()
    }

    unsafe fn switch(&self, save: *mut SavedContext, load: *const SavedContext) {
        self.record(Event::Switch {
            save: save as usize,
            load: load as usize,
        });
        (*save).stack_pointer = SAVED_MARKER;
    }

    unsafe fn resume(&self, context: SavedContext, status: i32) -> ! {
        self.record(Event::Resume { status });
        self.last_resume.set(Some((context, status)));
        panic!("resume {:#x} with status {}", context.stack_pointer, status);
    }
}

/// Console fed from queued lines.
pub struct MockConsole {
    input: RefCell<[VecDeque<Vec<u8>>; MAX_TERMINALS]>,
    output: RefCell<[Vec<u8>; MAX_TERMINALS]>,
}

impl MockConsole {
    pub fn new() -> Self {
        Self {
            input: RefCell::new(Default::default()),
            output: RefCell::new(Default::default()),
        }
    }

    pub fn queue_line(&self, terminal: TerminalId, line: &[u8]) {
        self.input.borrow_mut()[terminal].push_back(line.to_vec());
    }

    pub fn output(&self, terminal: TerminalId) -> Vec<u8> {
        self.output.borrow()[terminal].clone()
    }
}

impl Default for MockConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for MockConsole {
    /// Returns 0 instead of blocking when nothing is queued.
    fn read_line(&self, terminal: TerminalId, buf: &mut [u8]) -> usize {
        let Some(line) = self.input.borrow_mut()[terminal].pop_front() else {
            return 0;
        };
        let count = line.len().min(buf.len());
        buf[..count].copy_from_slice(&line[..count]);
        count
    }

    fn write(&self, terminal: TerminalId, bytes: &[u8]) -> usize {
        self.output.borrow_mut()[terminal].extend_from_slice(bytes);
        bytes.len()
    }
}

struct Entry {
    name: Vec<u8>,
    file_type: u32,
    contents: Option<Vec<u8>>,
}

/// Builds file-system images in the boot ramdisk layout.
pub struct ImageBuilder {
    entries: Vec<Entry>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn entry(mut self, name: &str, file_type: u32, contents: Option<&[u8]>) -> Self {
        self.entries.push(Entry {
            name: name.as_bytes().to_vec(),
            file_type,
            contents: contents.map(<[u8]>::to_vec),
        });
        self
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(name, FILE_TYPE_DIRECTORY, None)
    }

    pub fn clock(self, name: &str) -> Self {
        self.entry(name, FILE_TYPE_CLOCK, None)
    }

    pub fn file(self, name: &str, contents: &[u8]) -> Self {
        self.entry(name, FILE_TYPE_REGULAR, Some(contents))
    }

    /// An executable whose entry point is `offset` bytes into the image.
    pub fn program(self, name: &str, offset: u32) -> Self {
        let bytes = program_bytes(PROGRAM_IMAGE_BASE as u32 + offset, 256);
        self.file(name, &bytes)
    }

    pub fn build(&self) -> Vec<u8> {
        let files: Vec<&Vec<u8>> = self
            .entries
            .iter()
            .filter_map(|entry| entry.contents.as_ref())
            .collect();
        let inode_count = files.len();
        let data_blocks: Vec<usize> = files
            .iter()
            .map(|contents| contents.len().div_ceil(BLOCK_SIZE))
            .collect();
        let data_block_count: usize = data_blocks.iter().sum();

        let mut image = vec![0u8; (1 + inode_count + data_block_count) * BLOCK_SIZE];
        put_u32(&mut image, 0, self.entries.len() as u32);
        put_u32(&mut image, 4, inode_count as u32);
        put_u32(&mut image, 8, data_block_count as u32);

        let mut inode = 0usize;
        let mut next_block = 0usize;
        for (index, entry) in self.entries.iter().enumerate() {
            let base = 64 + index * DENTRY_SIZE;
            image[base..base + entry.name.len()].copy_from_slice(&entry.name);
            put_u32(&mut image, base + 32, entry.file_type);

            let Some(contents) = &entry.contents else {
                continue;
            };
            put_u32(&mut image, base + 36, inode as u32);
            let inode_base = (1 + inode) * BLOCK_SIZE;
            put_u32(&mut image, inode_base, contents.len() as u32);
            for (slot, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
                put_u32(&mut image, inode_base + 4 + slot * 4, next_block as u32);
                let start = (1 + inode_count + next_block) * BLOCK_SIZE;
                image[start..start + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            inode += 1;
        }
        image
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// A 32-bit style executable of `len` bytes entering at `entry`.
pub fn program_bytes(entry: u32, len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..len).map(|index| (index % 200) as u8 + 0x20).collect();
    bytes[..EXECUTABLE_MAGIC.len()].copy_from_slice(&EXECUTABLE_MAGIC);
    bytes[4] = 1;
    bytes[24..28].copy_from_slice(&entry.to_le_bytes());
    bytes
}

/// A booted-up set of collaborators for driving `SchedulerState` directly.
pub struct Fixture {
    pub machine: MockMachine,
    pub console: MockConsole,
    pub rtc: VirtualRtc,
    image: Vec<u8>,
}

impl Fixture {
    pub const SHELL_ENTRY: u64 = PROGRAM_IMAGE_BASE + 0x18;

    pub fn new() -> Self {
        Self {
            machine: MockMachine::new(),
            console: MockConsole::new(),
            rtc: VirtualRtc::new(),
            image: sample_image(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::new(KernelConfig::default())
    }

    pub fn fs(&self) -> FsImage<'_> {
        FsImage::parse(&self.image).expect("sample image parses")
    }

    pub fn with_io<R>(&self, f: impl FnOnce(&DeviceIo<'_>) -> R) -> R {
        let fs = self.fs();
        let io = DeviceIo {
            fs: &fs,
            console: &self.console,
            rtc: &self.rtc,
            clock: &self.machine,
        };
        f(&io)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_image() -> Vec<u8> {
    ImageBuilder::new()
        .directory(".")
        .clock("rtc")
        .file("frame0.txt", b"/\\/\\/\\ fish \\/\\/\\/\n")
        .program("shell", 0x18)
        .program("cat", 0x20)
        .program("counter", 0x30)
        .program("fish", 0x40)
        .build()
}

pub type TestKernel = Kernel<MockMachine, FsImage<'static>, MockConsole>;

pub fn test_kernel_with(config: KernelConfig) -> Result<TestKernel, ConfigError> {
    let image: &'static [u8] = Box::leak(sample_image().into_boxed_slice());
    let fs = FsImage::parse(image).expect("sample image parses");
    Kernel::new(config, MockMachine::new(), fs, MockConsole::new())
}

/// A kernel whose terminal 0 shell (pid 0) is current.
pub fn booted_kernel() -> TestKernel {
    let kernel = test_kernel_with(KernelConfig::default()).expect("default config is valid");
    kernel.boot().expect("shell starts");
    kernel
}
