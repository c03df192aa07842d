//! Ordered task containers shared by states and tree leaves.
//!
//! An [`ActionList`] owns action tasks behind [`ActionSlot`]s and runs them
//! either as a sequence or all at once; a [`ConditionList`] aggregates
//! condition tasks under an all-or-any rule. Both are themselves tasks, so
//! lists nest inside other lists.

use arbor_serial::{reflect_enum, reflect_struct, Poly};

use crate::status::Status;
use crate::task::{
    ActionSlot, ActionTask, ConditionSlot, ConditionTask, ExecContext, Outcome,
};

// ─────────────────────────────────────────────────────────────────────────────
// Modes
// ─────────────────────────────────────────────────────────────────────────────

/// How an [`ActionList`] schedules its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One member at a time, in order, stopping at the first failure.
    #[default]
    Sequence,
    /// All members every tick, first failure interrupting the rest.
    Parallel,
}

reflect_enum!(ExecutionMode { Sequence, Parallel });

/// How a [`ConditionList`] combines member results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionMode {
    #[default]
    AllTrueRequired,
    AnyTrueSuffice,
}

reflect_enum!(ConditionMode {
    AllTrueRequired,
    AnyTrueSuffice
});

// ─────────────────────────────────────────────────────────────────────────────
// Action List
// ─────────────────────────────────────────────────────────────────────────────

/// One action task plus its slot.
#[derive(Debug, Default)]
pub struct ActionEntry {
    pub slot: ActionSlot,
    pub task: Poly<dyn ActionTask>,
}

reflect_struct!(ActionEntry);

impl ActionEntry {
    pub fn new(task: Box<dyn ActionTask>) -> Self {
        Self {
            slot: ActionSlot::default(),
            task: Poly::new(task),
        }
    }
}

/// Ordered collection of action tasks.
#[derive(Debug, Default)]
pub struct ActionList {
    pub mode: ExecutionMode,
    pub actions: Vec<ActionEntry>,
    cursor: usize,
}

reflect_struct!(ActionList);

impl ActionList {
    pub fn sequence() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            ..Self::default()
        }
    }

    /// Append a task, returning its position.
    pub fn push(&mut self, task: Box<dyn ActionTask>) -> usize {
        self.actions.push(ActionEntry::new(task));
        self.actions.len() - 1
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drive the members one tick and return the aggregate status.
    ///
    /// A member that cancels rewinds the whole list, which then reports
    /// `Resting`; callers treat that as still in progress.
    pub fn tick_list(&mut self, cx: &mut ExecContext<'_>) -> Status {
        match self.mode {
            ExecutionMode::Sequence => self.tick_sequence(cx),
            ExecutionMode::Parallel => self.tick_parallel(cx),
        }
    }

    fn tick_sequence(&mut self, cx: &mut ExecContext<'_>) -> Status {
        while self.cursor < self.actions.len() {
            let index = self.cursor;
            let entry = &mut self.actions[index];
            if !entry.slot.enabled {
                self.cursor += 1;
                continue;
            }
            let Some(task) = entry.task.get_mut() else {
                tracing::warn!(index, "empty action slot skipped");
                self.cursor += 1;
                continue;
            };
            let status = entry.slot.tick(task, cx);
            match status {
                Status::Running => return Status::Running,
                Status::Success | Status::Optional => self.cursor += 1,
                Status::Failure | Status::Error => return status,
                Status::Resting => {
                    self.rewind_list(cx);
                    return Status::Resting;
                }
            }
        }
        Status::Success
    }

    fn tick_parallel(&mut self, cx: &mut ExecContext<'_>) -> Status {
        let mut all_done = true;
        for index in 0..self.actions.len() {
            let entry = &mut self.actions[index];
            if !entry.slot.enabled {
                continue;
            }
            let Some(task) = entry.task.get_mut() else {
                continue;
            };
            let status = entry.slot.tick(task, cx);
            match status {
                Status::Failure | Status::Error => {
                    self.interrupt_running(cx);
                    return status;
                }
                Status::Running => all_done = false,
                Status::Resting => {
                    self.rewind_list(cx);
                    return Status::Resting;
                }
                Status::Success | Status::Optional => {}
            }
        }
        if all_done {
            Status::Success
        } else {
            Status::Running
        }
    }

    /// Rewind every member to `Resting`, interrupting those mid-run.
    pub fn rewind_list(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if let Some(task) = entry.task.get_mut() {
                entry.slot.rewind(task, cx);
            }
        }
        self.cursor = 0;
    }

    fn interrupt_running(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if entry.slot.status() == Status::Running {
                if let Some(task) = entry.task.get_mut() {
                    entry.slot.rewind(task, cx);
                }
            }
        }
    }

    pub fn pause_list(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if let Some(task) = entry.task.get_mut() {
                entry.slot.pause(task, cx);
            }
        }
    }

    pub fn resume_list(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if let Some(task) = entry.task.get_mut() {
                entry.slot.resume(task, cx);
            }
        }
    }

    pub fn notify_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if let Some(task) = entry.task.get_mut() {
                task.on_graph_started(cx);
            }
        }
    }

    pub fn notify_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.actions {
            if let Some(task) = entry.task.get_mut() {
                task.on_graph_stopped(cx);
            }
        }
    }
}

impl ActionTask for ActionList {
    fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
        self.drive(cx);
    }

    fn on_update(&mut self, cx: &mut ExecContext<'_>) {
        self.drive(cx);
    }

    fn on_stop(&mut self, cx: &mut ExecContext<'_>, interrupted: bool) {
        if interrupted {
            self.rewind_list(cx);
        }
    }

    fn on_pause(&mut self, cx: &mut ExecContext<'_>) {
        self.pause_list(cx);
    }

    fn on_resume(&mut self, cx: &mut ExecContext<'_>) {
        self.resume_list(cx);
    }

    fn on_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        self.notify_graph_started(cx);
    }

    fn on_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        self.notify_graph_stopped(cx);
    }
}

impl ActionList {
    fn drive(&mut self, cx: &mut ExecContext<'_>) {
        match self.tick_list(cx) {
            Status::Success => cx.end_action(Outcome::Success),
            Status::Failure => cx.end_action(Outcome::Failure),
            Status::Error => cx.propagate_error(),
            Status::Running | Status::Resting | Status::Optional => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Condition List
// ─────────────────────────────────────────────────────────────────────────────

/// One condition task plus its slot.
#[derive(Debug, Default)]
pub struct ConditionEntry {
    pub slot: ConditionSlot,
    pub task: Poly<dyn ConditionTask>,
}

reflect_struct!(ConditionEntry);

impl ConditionEntry {
    pub fn new(task: Box<dyn ConditionTask>) -> Self {
        Self {
            slot: ConditionSlot::default(),
            task: Poly::new(task),
        }
    }
}

/// Collection of condition tasks combined under a [`ConditionMode`].
#[derive(Debug, Default)]
pub struct ConditionList {
    pub mode: ConditionMode,
    pub conditions: Vec<ConditionEntry>,
}

reflect_struct!(ConditionList);

impl ConditionList {
    pub fn all_required() -> Self {
        Self::default()
    }

    pub fn any_suffice() -> Self {
        Self {
            mode: ConditionMode::AnyTrueSuffice,
            ..Self::default()
        }
    }

    /// Append a condition, returning its position.
    pub fn push(&mut self, task: Box<dyn ConditionTask>) -> usize {
        self.conditions.push(ConditionEntry::new(task));
        self.conditions.len() - 1
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate all members under the configured mode.
    ///
    /// Short-circuits on the first decisive member. Disabled members count
    /// as satisfied under `AllTrueRequired` and are skipped entirely under
    /// `AnyTrueSuffice`; an empty list is satisfied only in all-mode.
    pub fn check_all(&mut self, cx: &mut ExecContext<'_>) -> bool {
        match self.mode {
            ConditionMode::AllTrueRequired => {
                for entry in &mut self.conditions {
                    if !entry.slot.enabled {
                        continue;
                    }
                    let Some(task) = entry.task.get_mut() else {
                        continue;
                    };
                    if !entry.slot.check(task, cx) {
                        return false;
                    }
                }
                true
            }
            ConditionMode::AnyTrueSuffice => {
                for entry in &mut self.conditions {
                    if !entry.slot.enabled {
                        continue;
                    }
                    let Some(task) = entry.task.get_mut() else {
                        continue;
                    };
                    if entry.slot.check(task, cx) {
                        return true;
                    }
                }
                false
            }
        }
    }

    pub fn notify_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.conditions {
            if let Some(task) = entry.task.get_mut() {
                task.on_graph_started(cx);
            }
        }
    }

    pub fn notify_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        for entry in &mut self.conditions {
            if let Some(task) = entry.task.get_mut() {
                task.on_graph_stopped(cx);
            }
        }
    }

    /// Drop any sticky latches, letting every member re-evaluate.
    pub fn clear_latches(&mut self) {
        for entry in &mut self.conditions {
            entry.slot.clear_latch();
        }
    }
}

impl ConditionTask for ConditionList {
    fn on_check(&mut self, cx: &mut ExecContext<'_>) -> bool {
        self.check_all(cx)
    }

    fn on_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        self.notify_graph_started(cx);
    }

    fn on_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        self.notify_graph_stopped(cx);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::task::Agent;
    use arbor_serial::Reflect;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct TimedAction {
        ticks: u32,
        fail: bool,
        activations: u32,
        interruptions: u32,
    }

    arbor_serial::reflect_struct!(TimedAction);

    impl TimedAction {
        fn maybe_finish(&mut self, cx: &mut ExecContext<'_>) {
            if self.activations >= self.ticks {
                let outcome = if self.fail {
                    Outcome::Failure
                } else {
                    Outcome::Success
                };
                cx.end_action(outcome);
            }
        }
    }

    impl ActionTask for TimedAction {
        fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
            self.activations = 1;
            self.maybe_finish(cx);
        }

        fn on_update(&mut self, cx: &mut ExecContext<'_>) {
            self.activations += 1;
            self.maybe_finish(cx);
        }

        fn on_stop(&mut self, _cx: &mut ExecContext<'_>, interrupted: bool) {
            if interrupted {
                self.interruptions += 1;
            }
        }
    }

    #[derive(Default)]
    struct CancelOnUpdate {
        activations: u32,
    }

    arbor_serial::reflect_struct!(CancelOnUpdate);

    impl ActionTask for CancelOnUpdate {
        fn on_execute(&mut self, _cx: &mut ExecContext<'_>) {
            self.activations += 1;
        }

        fn on_update(&mut self, cx: &mut ExecContext<'_>) {
            cx.end_action(Outcome::Cancelled);
        }
    }

    #[derive(Default)]
    struct FixedCheck {
        answer: bool,
    }

    arbor_serial::reflect_struct!(FixedCheck);

    impl ConditionTask for FixedCheck {
        fn on_check(&mut self, _cx: &mut ExecContext<'_>) -> bool {
            self.answer
        }
    }

    fn timed(ticks: u32, fail: bool) -> Box<TimedAction> {
        Box::new(TimedAction {
            ticks,
            fail,
            ..TimedAction::default()
        })
    }

    fn member<'a>(list: &'a ActionList, index: usize) -> &'a TimedAction {
        list.actions[index]
            .task
            .get()
            .and_then(|t| t.as_any().downcast_ref())
            .unwrap()
    }

    fn cx_at<'a>(board: &'a mut Blackboard, tick: u64) -> ExecContext<'a> {
        ExecContext::new(Agent::default(), board, 0.1, tick)
    }

    #[test]
    fn test_sequence_runs_members_in_order() {
        let mut board = Blackboard::new();
        let mut list = ActionList::sequence();
        list.push(timed(2, false));
        list.push(timed(1, false));
        list.push(timed(1, true));

        // First member suspends the list while it runs.
        let mut cx = cx_at(&mut board, 1);
        assert_eq!(list.tick_list(&mut cx), Status::Running);
        assert_eq!(member(&list, 1).activations, 0);

        // Second tick: the rest fall through in one pass and the last fails.
        let mut cx = cx_at(&mut board, 2);
        assert_eq!(list.tick_list(&mut cx), Status::Failure);
        assert_eq!(member(&list, 0).activations, 2);
        assert_eq!(member(&list, 1).activations, 1);
        assert_eq!(member(&list, 2).activations, 1);
    }

    #[test]
    fn test_sequence_skips_disabled_members() {
        let mut board = Blackboard::new();
        let mut list = ActionList::sequence();
        list.push(timed(1, true));
        list.actions[0].slot.enabled = false;
        list.push(timed(1, false));

        let mut cx = cx_at(&mut board, 1);
        assert_eq!(list.tick_list(&mut cx), Status::Success);
        assert_eq!(member(&list, 0).activations, 0);
    }

    #[test]
    fn test_parallel_failure_interrupts_siblings() {
        let mut board = Blackboard::new();
        let mut list = ActionList::parallel();
        list.push(timed(3, false));
        list.push(timed(1, true));

        let mut cx = cx_at(&mut board, 1);
        assert_eq!(list.tick_list(&mut cx), Status::Failure);
        assert_eq!(member(&list, 0).interruptions, 1);
        assert_eq!(list.actions[0].slot.status(), Status::Resting);
    }

    #[test]
    fn test_parallel_succeeds_when_all_finish() {
        let mut board = Blackboard::new();
        let mut list = ActionList::parallel();
        list.push(timed(2, false));
        list.push(timed(1, false));

        let mut cx = cx_at(&mut board, 1);
        assert_eq!(list.tick_list(&mut cx), Status::Running);
        let mut cx = cx_at(&mut board, 2);
        assert_eq!(list.tick_list(&mut cx), Status::Success);
    }

    #[test]
    fn test_cancel_rewinds_whole_list() {
        let mut board = Blackboard::new();
        let mut list = ActionList::sequence();
        list.push(Box::new(CancelOnUpdate::default()));
        list.push(timed(1, false));

        let mut cx = cx_at(&mut board, 1);
        assert_eq!(list.tick_list(&mut cx), Status::Running);
        let mut cx = cx_at(&mut board, 2);
        assert_eq!(list.tick_list(&mut cx), Status::Resting);

        // The list starts over from the first member.
        let mut cx = cx_at(&mut board, 3);
        assert_eq!(list.tick_list(&mut cx), Status::Running);
        let first: &CancelOnUpdate = list.actions[0]
            .task
            .get()
            .and_then(|t| t.as_any().downcast_ref())
            .unwrap();
        assert_eq!(first.activations, 2);
    }

    #[test]
    fn test_condition_all_required() {
        let mut board = Blackboard::new();
        let mut list = ConditionList::all_required();
        list.push(Box::new(FixedCheck { answer: true }));
        list.push(Box::new(FixedCheck { answer: false }));

        let mut cx = cx_at(&mut board, 1);
        assert!(!list.check_all(&mut cx));

        // Disabling the dissenter satisfies the rule.
        list.conditions[1].slot.enabled = false;
        let mut cx = cx_at(&mut board, 2);
        assert!(list.check_all(&mut cx));
    }

    #[test]
    fn test_condition_any_suffice() {
        let mut board = Blackboard::new();
        let mut list = ConditionList::any_suffice();
        list.push(Box::new(FixedCheck { answer: false }));
        list.push(Box::new(FixedCheck { answer: true }));

        let mut cx = cx_at(&mut board, 1);
        assert!(list.check_all(&mut cx));

        // Disabled members are skipped, leaving no one to agree.
        list.conditions[1].slot.enabled = false;
        let mut cx = cx_at(&mut board, 2);
        assert!(!list.check_all(&mut cx));
    }

    #[test]
    fn test_empty_condition_lists() {
        let mut board = Blackboard::new();
        let mut all = ConditionList::all_required();
        let mut any = ConditionList::any_suffice();

        let mut cx = cx_at(&mut board, 1);
        assert!(all.check_all(&mut cx));
        assert!(!any.check_all(&mut cx));
    }
}
