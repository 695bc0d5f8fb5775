use crate::config::MAX_TERMINALS;

use super::{Pid, ProcessError, TerminalId};

/// Foreground pid of each terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalBindings {
    slots: [Option<Pid>; MAX_TERMINALS],
}

impl TerminalBindings {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_TERMINALS],
        }
    }

    pub fn get(&self, terminal: TerminalId) -> Option<Pid> {
        self.slots.get(terminal).copied().flatten()
    }

    pub fn is_bound(&self, terminal: TerminalId) -> bool {
        self.get(terminal).is_some()
    }

    /// Returns the pid previously bound to `terminal`.
    pub fn bind(&mut self, terminal: TerminalId, pid: Pid) -> Result<Option<Pid>, ProcessError> {
        let slot = self
            .slots
            .get_mut(terminal)
            .ok_or(ProcessError::InvalidTerminal(terminal))?;
        Ok(slot.replace(pid))
    }

    pub fn unbind(&mut self, terminal: TerminalId) -> Result<Option<Pid>, ProcessError> {
        let slot = self
            .slots
            .get_mut(terminal)
            .ok_or(ProcessError::InvalidTerminal(terminal))?;
        Ok(slot.take())
    }

    pub fn terminal_of(&self, pid: Pid) -> Option<TerminalId> {
        self.slots.iter().position(|slot| *slot == Some(pid))
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

impl Default for TerminalBindings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_replaces() {
        let mut bindings = TerminalBindings::new();
        assert_eq!(bindings.bind(1, 0), Ok(None));
        assert_eq!(bindings.bind(1, 3), Ok(Some(0)));
        assert_eq!(bindings.get(1), Some(3));
        assert_eq!(bindings.terminal_of(3), Some(1));
        assert_eq!(bindings.bound_count(), 1);
    }

    #[test]
    fn test_terminals_are_independent() {
        let mut bindings = TerminalBindings::new();
        bindings.bind(0, 0).unwrap();
        bindings.bind(2, 2).unwrap();
        bindings.unbind(0).unwrap();
        assert_eq!(bindings.get(0), None);
        assert_eq!(bindings.get(2), Some(2));
    }

    #[test]
    fn test_out_of_range() {
        let mut bindings = TerminalBindings::new();
        assert_eq!(bindings.get(3), None);
        assert_eq!(bindings.bind(3, 0), Err(ProcessError::InvalidTerminal(3)));
    }
}
