//! Edges between nodes: tree parent/child links and machine transitions.

use arbor_serial::{reflect_enum, reflect_struct, Poly};

use crate::status::Status;
use crate::task::{ConditionSlot, ConditionTask};

/// How a fired transition replaces the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// Leave and reset the current state.
    #[default]
    Normal,
    /// Suspend the current state on the resume stack.
    Stacked,
    /// Leave the current state and clear the resume stack.
    Clean,
}

reflect_enum!(CallMode { Normal, Stacked, Clean });

/// A directed edge from one node to another.
///
/// Behaviour trees read connections as parent-to-child links in declared
/// order; state machines read them as transitions whose optional guard must
/// pass before the edge fires. The status field mirrors the most recent
/// traversal for editor display and is never persisted.
#[derive(Debug)]
pub struct Connection {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub enabled: bool,
    pub call_mode: CallMode,
    pub(crate) guard: Poly<dyn ConditionTask>,
    pub(crate) guard_slot: ConditionSlot,
    pub(crate) status: Status,
}

reflect_struct!(Connection);

impl Default for Connection {
    fn default() -> Self {
        Self {
            source: 0,
            target: 0,
            enabled: true,
            call_mode: CallMode::Normal,
            guard: Poly::empty(),
            guard_slot: ConditionSlot::default(),
            status: Status::Resting,
        }
    }
}

impl Connection {
    pub(crate) fn between(source: usize, target: usize) -> Self {
        Self {
            source,
            target,
            ..Self::default()
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Status of the last traversal across this edge.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Install a transition guard, replacing any existing one.
    pub fn set_guard(&mut self, guard: Box<dyn ConditionTask>) {
        self.guard = Poly::new(guard);
        self.guard_slot.clear_latch();
    }

    /// Remove the guard, making the transition unguarded.
    pub fn clear_guard(&mut self) {
        self.guard = Poly::empty();
        self.guard_slot.clear_latch();
    }

    pub fn guard(&self) -> Option<&dyn ConditionTask> {
        self.guard.get()
    }

    pub fn is_guarded(&self) -> bool {
        !self.guard.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::task::{Agent, ExecContext};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Always;

    reflect_struct!(Always);

    impl ConditionTask for Always {
        fn on_check(&mut self, _cx: &mut ExecContext<'_>) -> bool {
            true
        }
    }

    #[test]
    fn test_defaults() {
        let conn = Connection::between(1, 2);
        assert!(conn.enabled);
        assert_eq!(conn.call_mode, CallMode::Normal);
        assert!(!conn.is_guarded());
        assert_eq!(conn.status(), Status::Resting);
    }

    #[test]
    fn test_guard_install_and_clear() {
        let mut board = Blackboard::new();
        let mut conn = Connection::between(0, 1);
        conn.set_guard(Box::new(Always));
        assert!(conn.is_guarded());

        let mut cx = ExecContext::new(Agent::default(), &mut board, 0.1, 1);
        let guard = conn.guard.get_mut().unwrap();
        assert!(conn.guard_slot.check(guard, &mut cx));

        conn.clear_guard();
        assert!(!conn.is_guarded());
    }
}
