use core::ptr::{addr_of, addr_of_mut};

use spin::Lazy;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;
const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

static mut DOUBLE_FAULT_STACK: [u8; DOUBLE_FAULT_STACK_SIZE] = [0; DOUBLE_FAULT_STACK_SIZE];

/// Written at runtime: RSP0 follows whichever process is scheduled.
static mut TSS: TaskStateSegment = TaskStateSegment::new();

pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub user_code: SegmentSelector,
    pub user_data: SegmentSelector,
    tss: SegmentSelector,
}

static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| {
    let mut gdt = GlobalDescriptorTable::new();

    let kernel_code = gdt.append(Descriptor::kernel_code_segment());
    let kernel_data = gdt.append(Descriptor::kernel_data_segment());
    let user_data = gdt.append(Descriptor::user_data_segment());
    let user_code = gdt.append(Descriptor::user_code_segment());
    // The TSS is a static that lives for the whole kernel run.
    let tss = gdt.append(unsafe { Descriptor::tss_segment_unchecked(addr_of!(TSS)) });

    (
        gdt,
        Selectors {
            kernel_code,
            kernel_data,
            user_code,
            user_data,
            tss,
        },
    )
});

pub fn selectors() -> &'static Selectors {
    &GDT.1
}

pub fn init() {
    unsafe {
        let stack_start = addr_of!(DOUBLE_FAULT_STACK) as u64;
        (*addr_of_mut!(TSS)).interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
            VirtAddr::new(stack_start + DOUBLE_FAULT_STACK_SIZE as u64);
    }

    let (ref gdt, ref selectors) = *GDT;
    gdt.load();

    unsafe {
        use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};

        CS::set_reg(selectors.kernel_code);
        DS::set_reg(selectors.kernel_data);
        ES::set_reg(selectors.kernel_data);
        SS::set_reg(selectors.kernel_data);

        x86_64::instructions::tables::load_tss(selectors.tss);
    }
}

/// Stack the CPU switches to on the next ring 3 interrupt or `int 0x80`.
pub fn set_kernel_stack(top: VirtAddr) {
    // Single CPU; callers hold interrupts masked.
    unsafe {
        (*addr_of_mut!(TSS)).privilege_stack_table[0] = top;
    }
}
