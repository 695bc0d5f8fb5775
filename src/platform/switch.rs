//! Kernel context switching.
//!
//! A suspended kernel context is the callee-saved registers pushed on its
//! own stack followed by a return address:
//!
//! ```text
//!   stack_pointer ─▶ r15 r14 r13 r12 rbx rbp ret
//! ```
//!
//! `switch`, `enter_user` and `resume` all produce or consume this layout,
//! so a context saved by any of them can be continued by `switch` or
//! `resume`. A first-run context carries the ring 3 frame in r12 to r15
//! and returns into `first_run_trampoline`. Ring 3 always starts with
//! RFLAGS = 0x202 (IF plus the reserved bit).

use core::arch::global_asm;

use triterm::hal::Launch;
use triterm::process::SavedContext;
use x86_64::VirtAddr;

global_asm!(
    r#"
.global context_switch
context_switch:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi], rsp
    mov [rdi + 8], rbp
    mov rsp, [rsi]
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    ret

.global enter_user_mode
enter_user_mode:
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov [rdi], rsp
    mov [rdi + 8], rbp
    push r8
    push rdx
    push 0x202
    push rcx
    push rsi
    xor eax, eax
    xor ebx, ebx
    xor ecx, ecx
    xor edx, edx
    xor esi, esi
    xor edi, edi
    xor ebp, ebp
    xor r8d, r8d
    xor r9d, r9d
    xor r10d, r10d
    xor r11d, r11d
    iretq

.global resume_context
resume_context:
    mov rsp, rdi
    mov rax, rsi
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    sti
    ret

.global first_run_trampoline
first_run_trampoline:
    push r15
    push r13
    push 0x202
    push r14
    push r12
    xor eax, eax
    xor ebx, ebx
    xor ecx, ecx
    xor edx, edx
    xor esi, esi
    xor edi, edi
    xor ebp, ebp
    xor r8d, r8d
    xor r9d, r9d
    xor r10d, r10d
    xor r11d, r11d
    xor r12d, r12d
    xor r13d, r13d
    xor r14d, r14d
    xor r15d, r15d
    iretq
"#
);

extern "C" {
    fn context_switch(save: *mut SavedContext, load: *const SavedContext);
    fn enter_user_mode(
        save: *mut SavedContext,
        entry: u64,
        user_stack: u64,
        cs: u64,
        ss: u64,
    ) -> i64;
    fn resume_context(stack_pointer: u64, status: i64) -> !;
    fn first_run_trampoline();
}

/// # Safety
///
/// See `TaskSwitch::switch`.
pub unsafe fn switch(save: *mut SavedContext, load: *const SavedContext) {
    context_switch(save, load);
}

/// # Safety
///
/// See `TaskSwitch::enter_user`.
pub unsafe fn enter_user(save: *mut SavedContext, launch: &Launch, cs: u64, ss: u64) -> i32 {
    enter_user_mode(
        save,
        launch.entry.as_u64(),
        launch.user_stack.as_u64(),
        cs,
        ss,
    ) as i32
}

/// # Safety
///
/// See `TaskSwitch::resume`.
pub unsafe fn resume(context: SavedContext, status: i32) -> ! {
    resume_context(context.stack_pointer, i64::from(status))
}

/// Lay out a first-run context at the top of an unused kernel stack.
///
/// # Safety
///
/// `stack_top` must be mapped, writable and unused.
pub unsafe fn prepare_first_run(
    stack_top: VirtAddr,
    launch: &Launch,
    cs: u64,
    ss: u64,
) -> SavedContext {
    let frame: [u64; 7] = [
        ss,
        cs,
        launch.user_stack.as_u64(),
        launch.entry.as_u64(),
        0,
        0,
        first_run_trampoline as usize as u64,
    ];
    let base = (stack_top.as_u64() - core::mem::size_of_val(&frame) as u64) as *mut u64;
    for (index, value) in frame.iter().enumerate() {
        base.add(index).write(*value);
    }
    SavedContext {
        stack_pointer: base as u64,
        frame_pointer: 0,
    }
}
