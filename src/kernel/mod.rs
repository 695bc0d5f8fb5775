//! # Kernel Core
//!
//! Owns the scheduler state together with the collaborators every
//! operation needs: the platform port, the boot file system, the console
//! and the virtual RTC.
//!
//! ## Locking
//!
//! `SchedulerState` sits behind a [`Shared`] lock, taken with interrupts
//! masked. Control transfers (`enter_user`, `switch`, `resume`) always run
//! after the lock is released; blocking device reads run with neither the
//! lock held nor interrupts masked.
//!
//! ## Lifecycle
//!
//! ```text
//! boot ─▶ root shell on terminal 0 ─▶ timer ticks stage shells on 1 and 2
//!           │
//!           ├─ execute: child bound to the caller's terminal
//!           └─ halt:    parent resumed, or root shell restarted
//! ```

pub mod state;

pub use state::{HaltTransition, IoRequest, SchedulerState};

use crate::config::{ConfigError, KernelConfig, EXCEPTION_STATUS, ROOT_SHELL};
use crate::devices::{Console, DeviceIo, FileSystem, VirtualRtc};
use crate::hal::{InterruptGuard, Launch, Machine, Shared};
use crate::process::Pid;
use crate::syscalls::SyscallError;

pub struct Kernel<M, F, C> {
    state: Shared<SchedulerState>,
    machine: M,
    fs: F,
    console: C,
    rtc: VirtualRtc,
}

impl<M: Machine, F: FileSystem, C: Console> Kernel<M, F, C> {
    pub fn new(config: KernelConfig, machine: M, fs: F, console: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: Shared::new(SchedulerState::new(config)),
            machine,
            fs,
            console,
            rtc: VirtualRtc::new(),
        })
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn rtc(&self) -> &VirtualRtc {
        &self.rtc
    }

    /// Run `f` on the scheduler state with interrupts masked.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SchedulerState) -> R) -> R {
        self.state.with(&self.machine, f)
    }

    pub fn io(&self) -> DeviceIo<'_> {
        DeviceIo {
            fs: &self.fs,
            console: &self.console,
            rtc: &self.rtc,
            clock: &self.machine,
        }
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.with_state(|state| state.current_pid())
    }

    /// Start the root shell of terminal 0. Only returns if that shell's
    /// context is ever resumed with a status.
    pub fn boot(&self) -> Result<i32, SyscallError> {
        println!("kernel: starting root shell on terminal 0");
        let guard = InterruptGuard::new(&self.machine);
        let launch = self.with_state(|state| {
            state.begin_execute(ROOT_SHELL, 0, None, &self.machine, &self.fs)
        })?;
        self.launch(guard, &launch)
    }

    /// Run `command` as a child of the current process on the same
    /// terminal and return its exit status.
    pub fn execute(&self, command: &[u8]) -> Result<i32, SyscallError> {
        let guard = InterruptGuard::new(&self.machine);
        let launch = self.with_state(|state| {
            let parent = state.require_current()?;
            let terminal = state.processes.get(parent)?.terminal;
            state.begin_execute(command, terminal, Some(parent), &self.machine, &self.fs)
        })?;
        self.launch(guard, &launch)
    }

    /// Enter `launch` in ring 3. Interrupts stay masked from setup until
    /// the user task starts, which runs with them enabled.
    fn launch(&self, guard: InterruptGuard<'_, M>, launch: &Launch) -> Result<i32, SyscallError> {
        let save = self.with_state(|state| state.parent_context_slot(launch.pid))?;
        guard.keep_masked();
        // `save` lives in the process table and `launch` was just installed.
        let status = unsafe { self.machine.enter_user(save, launch) };
        Ok(status)
    }

    /// Halt the current process with `status`. Never returns to the caller.
    ///
    /// If nothing can be resumed the terminal is left empty and this
    /// context idles until the scheduler switches away from it.
    pub fn terminate_current(&self, status: i32) -> ! {
        let guard = InterruptGuard::new(&self.machine);
        let io = self.io();
        let (terminal, transition) = self.with_state(|state| {
            let terminal = state.scheduler.cursor();
            let transition = state.halt_transition(status, &io, &self.machine, &self.fs);
            (terminal, transition)
        });
        match transition {
            Ok(transition) => {
                guard.keep_masked();
                // The resumed context re-enables interrupts once its stack is live.
                unsafe { self.machine.resume(transition.resume, transition.status) }
            }
            Err(err) => {
                println!("halt: terminal {} has no context to resume: {:?}", terminal, err);
                self.with_state(|state| state.orphan_terminal(terminal, &self.machine));
                drop(guard);
                self.park()
            }
        }
    }

    /// Idle with interrupts enabled. Only a timer switch leaves this loop.
    fn park(&self) -> ! {
        self.machine.enable_interrupts();
        loop {
            self.machine.relax();
        }
    }

    /// Kill the current task after a CPU exception raised in user mode.
    pub fn on_user_fault(&self, exception: &str) -> ! {
        println!(
            "EXCEPTION: {} in pid {:?}, terminating",
            exception,
            self.current_pid()
        );
        self.terminate_current(EXCEPTION_STATUS)
    }

    /// Timer interrupt entry. Runs with interrupts masked.
    pub fn on_timer_tick(&self) {
        self.machine.acknowledge_timer();
        let plan = self.with_state(|state| state.plan_tick(&self.machine, &self.fs));
        if let Some(plan) = plan {
            // Both contexts live in the scheduler state.
            unsafe { self.machine.switch(plan.save, plan.load) };
        }
    }
}
