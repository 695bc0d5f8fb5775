//! # Interrupt Descriptor Table
//!
//! | Vector | Source              | Handler                            |
//! |--------|---------------------|------------------------------------|
//! | 0-31   | CPU exceptions      | kill the user task, else panic     |
//! | 32     | PIT (IRQ0)          | redraw screen, scheduler tick      |
//! | 33     | Keyboard (IRQ1)     | decode and feed displayed terminal |
//! | 40     | RTC (IRQ8)          | count virtual clock ticks          |
//! | 0x80   | `int 0x80` (DPL 3)  | system call dispatcher             |
//!
//! System call registers: `rax` number, `rdi`/`rsi`/`rdx` arguments,
//! result in `rax`. The gate is a trap gate so a blocking call can be
//! preempted.

use core::arch::global_asm;

use spin::{Lazy, Mutex};
use triterm::devices::drivers::ScancodeDecoder;
use triterm::println;
use triterm::syscalls::{dispatch_syscall, return_value, SyscallContext, SyscallError};
use x86_64::instructions::port::Port;
use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

use super::pic::{self, InterruptIndex, SYSCALL_VECTOR};
use super::{gdt, kernel, screen, timer};

const KEYBOARD_DATA: u16 = 0x60;

static DECODER: Mutex<ScancodeDecoder> = Mutex::new(ScancodeDecoder::new());

global_asm!(
    r#"
.global syscall_entry
syscall_entry:
    push rcx
    push rdx
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    sub rsp, 8
    mov rcx, rdx
    mov rdx, rsi
    mov rsi, rdi
    mov rdi, rax
    call syscall_dispatch
    add rsp, 8
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    iretq
"#
);

extern "C" {
    fn syscall_entry();
}

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    idt.general_protection_fault
        .set_handler_fn(general_protection_fault_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);
    unsafe {
        idt.double_fault
            .set_handler_fn(double_fault_handler)
            .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
    }

    idt[InterruptIndex::Timer.as_u8()].set_handler_fn(timer_interrupt_handler);
    idt[InterruptIndex::Keyboard.as_u8()].set_handler_fn(keyboard_interrupt_handler);
    idt[InterruptIndex::Rtc.as_u8()].set_handler_fn(rtc_interrupt_handler);

    unsafe {
        idt[SYSCALL_VECTOR]
            .set_handler_addr(VirtAddr::new(syscall_entry as usize as u64))
            .set_privilege_level(PrivilegeLevel::Ring3)
            .disable_interrupts(false);
    }

    idt
});

pub fn init_idt() {
    IDT.load();
}

#[no_mangle]
extern "C" fn syscall_dispatch(number: usize, arg0: usize, arg1: usize, arg2: usize) -> usize {
    let Some(kernel) = kernel() else {
        return return_value(Err(SyscallError::NoCurrentProcess));
    };
    let context = SyscallContext::from_registers(number, arg0, arg1, arg2);
    return_value(dispatch_syscall(kernel, context))
}

fn from_user(stack_frame: &InterruptStackFrame) -> bool {
    stack_frame.code_segment.rpl() == PrivilegeLevel::Ring3
}

/// A fault in ring 3 ends the task; the same fault in the kernel is fatal.
fn fault(name: &'static str, stack_frame: &InterruptStackFrame) {
    if from_user(stack_frame) {
        if let Some(kernel) = kernel() {
            kernel.on_user_fault(name);
        }
    }
    panic!("EXCEPTION: {}\n{:#?}", name, stack_frame);
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    fault("DIVIDE BY ZERO", &stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    fault("INVALID OPCODE", &stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    println!("general protection fault, error code {:#x}", error_code);
    fault("GENERAL PROTECTION FAULT", &stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    println!("page fault at {:?}: {:?}", Cr2::read(), error_code);
    fault("PAGE FAULT", &stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT (code {})\n{:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    screen::refresh();
    match kernel() {
        Some(kernel) => kernel.on_timer_tick(),
        None => pic::end_of_interrupt(InterruptIndex::Timer),
    }
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let scancode: u8 = unsafe { Port::new(KEYBOARD_DATA).read() };
    let action = DECODER.lock().process_scancode(scancode);
    if let Some(action) = action {
        screen::handle_key(action);
    }
    pic::end_of_interrupt(InterruptIndex::Keyboard);
}

extern "x86-interrupt" fn rtc_interrupt_handler(_stack_frame: InterruptStackFrame) {
    timer::on_rtc_interrupt();
    pic::end_of_interrupt(InterruptIndex::Rtc);
}
