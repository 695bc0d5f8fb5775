//! # Round-Robin Scheduler
//!
//! One time slice per terminal. Every timer tick moves the cursor to the
//! next terminal with a bound process and switches to that process.
//!
//! ```text
//!   tick ──▶ ack ──▶ pick next bound terminal ──▶ rsp0 ──▶ map image ──▶ switch
//!                     (cursor+1, +2, +3 mod 3)
//! ```
//!
//! Terminals other than the boot terminal have no shell until the first
//! time the scheduler reaches them; at that point a root shell is staged
//! so that switching to it drops straight into user mode.

use crate::config::MAX_TERMINALS;
use crate::devices::FileSystem;
use crate::hal::Machine;
use crate::kernel::SchedulerState;
use crate::process::{Pid, SavedContext, TerminalId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobin {
    cursor: TerminalId,
    /// Terminals whose root shell has not been started yet.
    pending_root: [bool; MAX_TERMINALS],
}

impl RoundRobin {
    pub const fn new() -> Self {
        let mut pending_root = [true; MAX_TERMINALS];
        pending_root[0] = false;
        Self {
            cursor: 0,
            pending_root,
        }
    }

    /// Terminal whose process is currently running.
    pub fn cursor(&self) -> TerminalId {
        self.cursor
    }

    pub fn set_cursor(&mut self, terminal: TerminalId) {
        if terminal < MAX_TERMINALS {
            self.cursor = terminal;
        }
    }

    pub fn is_pending(&self, terminal: TerminalId) -> bool {
        self.pending_root.get(terminal).copied().unwrap_or(false)
    }

    /// Start a root shell on `terminal` the next time the cursor reaches it.
    pub fn mark_pending(&mut self, terminal: TerminalId) {
        if let Some(flag) = self.pending_root.get_mut(terminal) {
            *flag = true;
        }
    }

    pub fn clear_pending(&mut self, terminal: TerminalId) {
        if let Some(flag) = self.pending_root.get_mut(terminal) {
            *flag = false;
        }
    }

    /// Terminals in visiting order, starting after the cursor and ending
    /// on it.
    pub fn candidates(&self) -> impl Iterator<Item = TerminalId> {
        let start = self.cursor;
        (1..=MAX_TERMINALS).map(move |offset| (start + offset) % MAX_TERMINALS)
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

/// Contexts to save into and load from. Both point into the scheduler
/// state, which outlives every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSwitch {
    pub from: Option<Pid>,
    pub to: Pid,
    pub save: *mut SavedContext,
    pub load: *const SavedContext,
}

impl SchedulerState {
    /// Decide the next task for this tick and install its kernel stack and
    /// program mapping. `None` keeps the current task running.
    pub fn plan_tick<M, F>(&mut self, machine: &M, fs: &F) -> Option<ContextSwitch>
    where
        M: Machine + ?Sized,
        F: FileSystem + ?Sized,
    {
        let current = self.current_pid();
        let candidates: [TerminalId; MAX_TERMINALS] = {
            let mut order = [0; MAX_TERMINALS];
            for (slot, terminal) in order.iter_mut().zip(self.scheduler.candidates()) {
                *slot = terminal;
            }
            order
        };

        for terminal in candidates {
            let target = match self.terminals.get(terminal) {
                Some(pid) => pid,
                None if self.scheduler.is_pending(terminal) => {
                    self.scheduler.clear_pending(terminal);
                    match self.stage_root_shell(terminal, machine, fs) {
                        Ok(launch) => launch.pid,
                        Err(err) => {
                            println!("sched: no shell for terminal {}: {:?}", terminal, err);
                            continue;
                        }
                    }
                }
                None => continue,
            };

            if Some(target) == current {
                self.scheduler.set_cursor(terminal);
                return None;
            }
            return self.switch_to(terminal, target, current, machine);
        }
        None
    }

    fn switch_to<M: Machine + ?Sized>(
        &mut self,
        terminal: TerminalId,
        target: Pid,
        current: Option<Pid>,
        machine: &M,
    ) -> Option<ContextSwitch> {
        if let Err(err) = self.address_space.map_process_image(target, machine) {
            println!("sched: cannot map pid {}: {:?}", target, err);
            return None;
        }
        machine.set_kernel_stack(self.config.kernel_stack_top(target));
        self.scheduler.set_cursor(terminal);

        let outgoing = current.and_then(|pid| self.processes.context_mut(pid).ok());
        let save: *mut SavedContext = match outgoing {
            Some(context) => context,
            None => &mut self.idle_context,
        };
        let load: *const SavedContext = match self.processes.context_mut(target) {
            Ok(context) => context,
            Err(_) => return None,
        };
        Some(ContextSwitch {
            from: current,
            to: target,
            save,
            load,
        })
    }
}
