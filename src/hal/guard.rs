//! Scoped interrupt masking.
//!
//! Anything shared between task-level code and an interrupt handler is only
//! touched with interrupts masked on this CPU. [`InterruptGuard`] masks on
//! creation and restores the state it found when dropped, so nested or
//! interrupt-context users never re-enable interrupts early.

use core::marker::PhantomData;

use spin::Mutex;

use super::InterruptControl;

pub struct InterruptGuard<'a, C: InterruptControl + ?Sized> {
    cpu: &'a C,
    was_enabled: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, C: InterruptControl + ?Sized> InterruptGuard<'a, C> {
    pub fn new(cpu: &'a C) -> Self {
        let was_enabled = cpu.interrupts_enabled();
        if was_enabled {
            cpu.disable_interrupts();
        }
        Self {
            cpu,
            was_enabled,
            _not_send: PhantomData,
        }
    }

    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }

    /// Drop the guard without restoring; the caller hands the masked CPU to
    /// a context that re-enables interrupts itself.
    pub fn keep_masked(self) {
        core::mem::forget(self);
    }
}

impl<C: InterruptControl + ?Sized> Drop for InterruptGuard<'_, C> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.cpu.enable_interrupts();
        }
    }
}

/// A spin lock that is only ever taken with interrupts masked.
pub struct Shared<T> {
    inner: Mutex<T>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn with<C, R>(&self, cpu: &C, f: impl FnOnce(&mut T) -> R) -> R
    where
        C: InterruptControl + ?Sized,
    {
        let _guard = InterruptGuard::new(cpu);
        let mut inner = self.inner.lock();
        f(&mut inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockMachine};

    #[test]
    fn test_guard_restores_enabled() {
        let machine = MockMachine::new();
        machine.set_interrupts(true);
        {
            let guard = InterruptGuard::new(&machine);
            assert!(guard.was_enabled());
            assert!(!machine.interrupts_enabled());
        }
        assert!(machine.interrupts_enabled());
    }

    #[test]
    fn test_guard_keeps_disabled() {
        let machine = MockMachine::new();
        machine.set_interrupts(false);
        {
            let _outer = InterruptGuard::new(&machine);
            let _inner = InterruptGuard::new(&machine);
        }
        assert!(!machine.interrupts_enabled());
        assert!(!machine.events().contains(&Event::EnableInterrupts));
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn fails(machine: &MockMachine, shared: &Shared<u32>) -> Result<(), ()> {
            shared.with(machine, |value| {
                *value += 1;
                Err(())
            })?;
            Ok(())
        }

        let machine = MockMachine::new();
        machine.set_interrupts(true);
        let shared = Shared::new(0);
        assert!(fails(&machine, &shared).is_err());
        assert!(machine.interrupts_enabled());
        assert_eq!(shared.with(&machine, |value| *value), 1);
    }

    #[test]
    fn test_keep_masked() {
        let machine = MockMachine::new();
        machine.set_interrupts(true);
        InterruptGuard::new(&machine).keep_masked();
        assert!(!machine.interrupts_enabled());
    }
}
