//! State machine driver and the built-in state nodes.
//!
//! Exactly one state is current at a time. Each update runs auto-updated
//! watcher nodes first, then the current state, then evaluates the current
//! state's outgoing transitions under its policy. A fired transition ends
//! the update; guards are checked in declared connection order and the
//! first satisfied edge wins.

use arbor_serial::{reflect_enum, reflect_struct};

use crate::connection::CallMode;
use crate::error::GraphError;
use crate::graph::Graph;
use crate::lists::ActionList;
use crate::node::NodeBehavior;
use crate::status::Status;
use crate::task::ExecContext;

/// Resume stack depth beyond which stacked transitions start to look like a
/// loop in the graph.
const STACK_WARN_DEPTH: usize = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Transition Policy
// ─────────────────────────────────────────────────────────────────────────────

/// When a state's outgoing transitions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Every update, even while the state is still running.
    #[default]
    CheckContinuously,
    /// Only once the state has settled.
    CheckAfterStateFinished,
    /// Never automatically; the host calls
    /// [`Graph::check_transitions_now`].
    CheckManually,
}

reflect_enum!(TransitionPolicy {
    CheckContinuously,
    CheckAfterStateFinished,
    CheckManually
});

// ─────────────────────────────────────────────────────────────────────────────
// Machine State
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime bookkeeping for the state machine driver. Never serialized.
#[derive(Debug, Clone, Default)]
pub(crate) struct MachineState {
    pub current: Option<usize>,
    pub resume_stack: Vec<usize>,
}

impl MachineState {
    /// Keep indices valid after a node is removed from the arena.
    pub fn remap_after_removal(&mut self, removed: usize) {
        self.current = match self.current {
            Some(c) if c == removed => None,
            Some(c) if c > removed => Some(c - 1),
            other => other,
        };
        self.resume_stack.retain(|&s| s != removed);
        for state in &mut self.resume_stack {
            if *state > removed {
                *state -= 1;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// One state machine update. `Some(success)` asks the graph to stop.
pub(crate) fn tick(graph: &mut Graph, cx: &mut ExecContext<'_>) -> Option<bool> {
    // Watchers run before the current state and may steal it.
    for watcher in graph.auto_update_nodes() {
        graph.execute_node(watcher, cx);
        if let Some((conn, target, mode)) = pick_transition(graph, watcher, false, cx) {
            graph.set_connection_status(conn, Status::Success);
            if enter_state(graph, target, mode, cx) {
                return None;
            }
        }
    }

    let Some(current) = graph.machine.current else {
        // Nothing left to run once concurrent work drains.
        return if concurrent_holding(graph) {
            None
        } else {
            Some(true)
        };
    };

    let status = graph.execute_node(current, cx);
    let policy = graph
        .node(current)
        .and_then(|n| n.behavior())
        .map(|b| b.transition_policy())
        .unwrap_or_default();
    let check = match policy {
        TransitionPolicy::CheckContinuously => true,
        TransitionPolicy::CheckAfterStateFinished => status.is_terminal(),
        TransitionPolicy::CheckManually => false,
    };
    if check {
        if let Some((conn, target, mode)) = pick_transition(graph, current, status.is_terminal(), cx)
        {
            graph.set_connection_status(conn, Status::Success);
            enter_state(graph, target, mode, cx);
            return None;
        }
    }

    // A settled sink state hands control back: resume a suspended state if
    // one is stacked, otherwise finish once concurrent work drains.
    if status.is_terminal() && graph.children_of(current).is_empty() {
        if let Some(previous) = graph.machine.resume_stack.pop() {
            tracing::debug!(state = previous, "resuming suspended state");
            resume_state(graph, previous, cx);
        } else if !concurrent_holding(graph) {
            return Some(true);
        }
    }
    None
}

/// Evaluate the current state's transitions outside the regular update.
pub(crate) fn manual_check(graph: &mut Graph, cx: &mut ExecContext<'_>) -> bool {
    let Some(current) = graph.machine.current else {
        return false;
    };
    let settled = graph.node_status(current).is_terminal();
    if let Some((conn, target, mode)) = pick_transition(graph, current, settled, cx) {
        graph.set_connection_status(conn, Status::Success);
        enter_state(graph, target, mode, cx)
    } else {
        false
    }
}

/// Enter the designated prime state when the machine starts.
pub(crate) fn enter_prime(graph: &mut Graph, cx: &mut ExecContext<'_>) -> Result<(), GraphError> {
    let Some(prime) = graph.prime() else {
        return Err(GraphError::NoPrime);
    };
    if !enter_state(graph, prime, CallMode::Normal, cx) {
        return Err(GraphError::NotAState(prime));
    }
    Ok(())
}

/// Make `target` the current state and give it its first tick.
///
/// Normal mode resets the state being left; Stacked suspends it on the
/// resume stack instead; Clean resets it and empties the stack.
fn enter_state(
    graph: &mut Graph,
    target: usize,
    mode: CallMode,
    cx: &mut ExecContext<'_>,
) -> bool {
    if target >= graph.node_count() {
        tracing::warn!(target, "transition refused: state out of range");
        return false;
    }
    if graph.node(target).map(|n| n.behavior().is_none()).unwrap_or(true) {
        tracing::warn!(target, "transition refused: node has no behavior");
        return false;
    }
    match mode {
        CallMode::Normal => {}
        CallMode::Stacked => {
            if let Some(current) = graph.machine.current {
                graph.machine.resume_stack.push(current);
                let depth = graph.machine.resume_stack.len();
                if depth > STACK_WARN_DEPTH {
                    tracing::warn!(depth, "resume stack unusually deep");
                }
            }
        }
        CallMode::Clean => graph.machine.resume_stack.clear(),
    }
    if let Some(current) = graph.machine.current {
        if mode != CallMode::Stacked {
            graph.reset_node(current, cx);
        }
    }
    tracing::debug!(target, "entering state");
    graph.machine.current = Some(target);
    graph.reset_node(target, cx);
    graph.execute_node(target, cx);
    true
}

/// Hand control back to a suspended state, without resetting it.
fn resume_state(graph: &mut Graph, index: usize, cx: &mut ExecContext<'_>) {
    if index >= graph.node_count() {
        tracing::warn!(index, "resume skipped: state out of range");
        graph.machine.current = None;
        return;
    }
    graph.machine.current = Some(index);
    graph.execute_node(index, cx);
}

/// First enabled out-connection of `from` whose guard passes.
///
/// Unguarded connections fire only when `unguarded_fires` is set, which
/// callers derive from the source state having settled.
fn pick_transition(
    graph: &mut Graph,
    from: usize,
    unguarded_fires: bool,
    cx: &mut ExecContext<'_>,
) -> Option<(usize, usize, CallMode)> {
    let outs: Vec<usize> = match graph.node(from) {
        Some(node) => node.out_connections().to_vec(),
        None => return None,
    };
    for ci in outs {
        let conn = &mut graph.connections[ci];
        if !conn.enabled {
            continue;
        }
        let fired = match conn.guard.get_mut() {
            Some(guard) => conn.guard_slot.check(guard, cx),
            None => unguarded_fires,
        };
        if fired {
            let conn = &graph.connections[ci];
            return Some((ci, conn.target, conn.call_mode));
        }
    }
    None
}

fn concurrent_holding(graph: &Graph) -> bool {
    graph
        .auto_update_nodes()
        .into_iter()
        .any(|index| graph.node_status(index) == Status::Running)
}

// ─────────────────────────────────────────────────────────────────────────────
// State Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// A machine state driving an [`ActionList`].
///
/// The state reports `Running` while its list works and the list's terminal
/// status once it settles; an empty list settles immediately.
#[derive(Debug, Default)]
pub struct StateNode {
    pub actions: ActionList,
    pub policy: TransitionPolicy,
}

reflect_struct!(StateNode);

impl NodeBehavior for StateNode {
    fn title(&self) -> &str {
        "State"
    }

    fn on_execute(
        &mut self,
        _graph: &mut Graph,
        _index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        match self.actions.tick_list(cx) {
            Status::Resting => Status::Running,
            other => other,
        }
    }

    fn on_reset(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.rewind_list(cx);
    }

    fn transition_policy(&self) -> TransitionPolicy {
        self.policy
    }

    fn on_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.notify_graph_started(cx);
    }

    fn on_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.notify_graph_stopped(cx);
    }

    fn on_graph_paused(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.pause_list(cx);
    }

    fn on_graph_resumed(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.resume_list(cx);
    }
}

/// Watcher whose guarded transitions can steal the current state from
/// anywhere in the machine.
#[derive(Debug, Default)]
pub struct AnyState;

reflect_struct!(AnyState);

impl NodeBehavior for AnyState {
    fn title(&self) -> &str {
        "Any State"
    }

    fn max_in_connections(&self) -> Option<usize> {
        Some(0)
    }

    fn auto_update(&self) -> bool {
        true
    }

    fn on_execute(
        &mut self,
        _graph: &mut Graph,
        _index: usize,
        _cx: &mut ExecContext<'_>,
    ) -> Status {
        // The watcher has no work of its own and never holds the machine
        // open.
        Status::Optional
    }
}

/// Detached state that runs its actions for the machine's whole lifetime.
///
/// Blocks the machine's natural finish while its list is still running.
#[derive(Debug, Default)]
pub struct ConcurrentState {
    pub actions: ActionList,
}

reflect_struct!(ConcurrentState);

impl NodeBehavior for ConcurrentState {
    fn title(&self) -> &str {
        "Concurrent"
    }

    fn max_in_connections(&self) -> Option<usize> {
        Some(0)
    }

    fn max_out_connections(&self) -> Option<usize> {
        Some(0)
    }

    fn auto_update(&self) -> bool {
        true
    }

    fn on_execute(
        &mut self,
        _graph: &mut Graph,
        _index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        match self.actions.tick_list(cx) {
            Status::Resting => Status::Running,
            other => other,
        }
    }

    fn on_reset(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.rewind_list(cx);
    }

    fn on_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.notify_graph_started(cx);
    }

    fn on_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.notify_graph_stopped(cx);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::task::{ActionTask, Agent, ConditionTask, Outcome};
    use arbor_serial::Reflect;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct StepTask {
        ticks: u32,
        run: u32,
        starts: u32,
        activations: u32,
        interruptions: u32,
    }

    reflect_struct!(StepTask);

    impl StepTask {
        fn finish_maybe(&mut self, cx: &mut ExecContext<'_>) {
            if self.run >= self.ticks {
                cx.end_action(Outcome::Success);
            }
        }
    }

    impl ActionTask for StepTask {
        fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
            self.starts += 1;
            self.activations += 1;
            self.run = 1;
            self.finish_maybe(cx);
        }

        fn on_update(&mut self, cx: &mut ExecContext<'_>) {
            self.activations += 1;
            self.run += 1;
            self.finish_maybe(cx);
        }

        fn on_stop(&mut self, _cx: &mut ExecContext<'_>, interrupted: bool) {
            if interrupted {
                self.interruptions += 1;
            }
        }
    }

    #[derive(Default)]
    struct KeyCheck {
        key: String,
    }

    reflect_struct!(KeyCheck);

    impl ConditionTask for KeyCheck {
        fn on_check(&mut self, cx: &mut ExecContext<'_>) -> bool {
            cx.blackboard.get_bool(&self.key).unwrap_or(false)
        }
    }

    fn state_with(ticks: u32, policy: TransitionPolicy) -> Box<StateNode> {
        let mut state = StateNode {
            policy,
            ..StateNode::default()
        };
        state.actions.push(Box::new(StepTask {
            ticks,
            ..StepTask::default()
        }));
        Box::new(state)
    }

    fn guard(graph: &mut Graph, conn: usize, key: &str, mode: CallMode) {
        let conn = graph.connection_mut(conn).unwrap();
        conn.call_mode = mode;
        conn.set_guard(Box::new(KeyCheck { key: key.into() }));
    }

    fn task_at<'a>(graph: &'a Graph, state: usize) -> &'a StepTask {
        graph
            .node(state)
            .unwrap()
            .behavior_as::<StateNode>()
            .unwrap()
            .actions
            .actions[0]
            .task
            .get()
            .and_then(|t| t.as_any().downcast_ref())
            .unwrap()
    }

    #[test]
    fn test_prime_state_entered_on_start() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(99, TransitionPolicy::default()));
        graph.add_node(state_with(99, TransitionPolicy::default()));

        graph.start(Agent::default(), &mut board).unwrap();
        assert_eq!(graph.current_state(), Some(s1));
        assert_eq!(graph.node_status(s1), Status::Running);
        assert_eq!(task_at(&graph, s1).starts, 1);
    }

    #[test]
    fn test_unguarded_fires_once_state_settles() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(1, TransitionPolicy::default()));
        let s2 = graph.add_node(state_with(99, TransitionPolicy::default()));
        graph.connect(s1, s2).unwrap();

        graph.start(Agent::default(), &mut board).unwrap();
        // The prime state finished during start, but transitions are only
        // evaluated by updates.
        assert_eq!(graph.current_state(), Some(s1));

        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s2));
    }

    #[test]
    fn test_guard_blocks_until_blackboard_agrees() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let s2 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let edge = graph.connect(s1, s2).unwrap();
        guard(&mut graph, edge, "go", CallMode::Normal);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s1));

        board.set("go", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s2));
        // Leaving normally interrupts the old state's work.
        assert_eq!(task_at(&graph, s1).interruptions, 1);
        assert_eq!(graph.node_status(s1), Status::Resting);
    }

    #[test]
    fn test_stacked_transition_resumes_where_left() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(9, TransitionPolicy::default()));
        let s2 = graph.add_node(state_with(1, TransitionPolicy::default()));
        let edge = graph.connect(s1, s2).unwrap();
        guard(&mut graph, edge, "interrupt", CallMode::Stacked);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        assert_eq!(task_at(&graph, s1).activations, 2);

        board.set("interrupt", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s2));
        assert_eq!(graph.resume_depth(), 1);
        // Suspended, not interrupted.
        assert_eq!(task_at(&graph, s1).interruptions, 0);

        // The side state settles with nowhere to go: the suspended state
        // resumes where it left off instead of restarting.
        board.set("interrupt", false);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s1));
        assert_eq!(graph.resume_depth(), 0);
        assert_eq!(task_at(&graph, s1).starts, 1);
        assert_eq!(task_at(&graph, s1).activations, 4);
    }

    #[test]
    fn test_clean_mode_clears_resume_stack() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let s2 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let s3 = graph.add_node(state_with(1, TransitionPolicy::default()));
        let e12 = graph.connect(s1, s2).unwrap();
        let e23 = graph.connect(s2, s3).unwrap();
        guard(&mut graph, e12, "dive", CallMode::Stacked);
        guard(&mut graph, e23, "bail", CallMode::Clean);

        graph.start(Agent::default(), &mut board).unwrap();
        board.set("dive", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s2));
        assert_eq!(graph.resume_depth(), 1);

        board.set("dive", false);
        board.set("bail", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s3));
        assert_eq!(graph.resume_depth(), 0);

        // With the stack gone there is nothing to resume: the machine ends.
        graph.update(0.1, &mut board);
        assert!(!graph.is_running());
        assert_eq!(graph.take_finished(), Some(Status::Success));
    }

    #[test]
    fn test_check_after_finished_policy_waits() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(3, TransitionPolicy::CheckAfterStateFinished));
        let s2 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let edge = graph.connect(s1, s2).unwrap();
        guard(&mut graph, edge, "go", CallMode::Normal);
        board.set("go", true);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        // The guard agrees, but the state has not settled yet.
        assert_eq!(graph.current_state(), Some(s1));

        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s2));
    }

    #[test]
    fn test_manual_policy_needs_explicit_check() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(99, TransitionPolicy::CheckManually));
        let s2 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let edge = graph.connect(s1, s2).unwrap();
        guard(&mut graph, edge, "go", CallMode::Normal);
        board.set("go", true);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s1));

        assert!(graph.check_transitions_now(&mut board));
        assert_eq!(graph.current_state(), Some(s2));
    }

    #[test]
    fn test_any_state_steals_current() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let s1 = graph.add_node(state_with(99, TransitionPolicy::default()));
        let panic_state = graph.add_node(state_with(99, TransitionPolicy::default()));
        let watcher = graph.add_node(Box::new(AnyState));
        let edge = graph.connect(watcher, panic_state).unwrap();
        guard(&mut graph, edge, "panic", CallMode::Normal);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(s1));

        board.set("panic", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(panic_state));
        assert_eq!(task_at(&graph, s1).interruptions, 1);
    }

    #[test]
    fn test_concurrent_state_holds_machine_open() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        graph.add_node(state_with(1, TransitionPolicy::default()));
        let mut side = ConcurrentState::default();
        side.actions.push(Box::new(StepTask {
            ticks: 3,
            ..StepTask::default()
        }));
        graph.add_node(Box::new(side));

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        graph.update(0.1, &mut board);
        assert!(graph.is_running());

        graph.update(0.1, &mut board);
        assert!(!graph.is_running());
        assert_eq!(graph.take_finished(), Some(Status::Success));
    }

    #[test]
    fn test_self_transition_restarts_state() {
        let mut board = Blackboard::new();
        let mut graph = Graph::state_machine();
        let solo = graph.add_node(state_with(99, TransitionPolicy::default()));
        let edge = graph.connect(solo, solo).unwrap();
        guard(&mut graph, edge, "again", CallMode::Normal);

        graph.start(Agent::default(), &mut board).unwrap();
        graph.update(0.1, &mut board);
        assert_eq!(task_at(&graph, solo).starts, 1);

        board.set("again", true);
        graph.update(0.1, &mut board);
        assert_eq!(graph.current_state(), Some(solo));
        assert_eq!(task_at(&graph, solo).starts, 2);
        assert_eq!(task_at(&graph, solo).interruptions, 1);
    }
}
