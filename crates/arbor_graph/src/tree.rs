//! Behaviour tree driver and the built-in composite and leaf nodes.
//!
//! A tree executes its prime node once per update (subject to the configured
//! interval), resetting the whole subtree first whenever the root is not
//! mid-run. Composites read their children from enabled out-connections in
//! declared order and mirror each child's status onto the connecting edge.

use arbor_serial::reflect_struct;

use crate::graph::Graph;
use crate::lists::{ActionList, ConditionList};
use crate::node::NodeBehavior;
use crate::status::Status;
use crate::task::ExecContext;

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// One behaviour-tree update. `Some(success)` asks the graph to stop.
pub(crate) fn tick(graph: &mut Graph, cx: &mut ExecContext<'_>) -> Option<bool> {
    let Some(root) = graph.prime() else {
        tracing::warn!("behaviour tree has no prime node");
        return Some(false);
    };
    let interval = graph.settings.update_interval;
    if interval > 0.0 {
        graph.accumulator += cx.dt;
        if graph.accumulator < interval {
            return None;
        }
        graph.accumulator -= interval;
    }
    // Re-enter the root only when it is not mid-run.
    if graph.node_status(root) != Status::Running {
        graph.reset_subtree(root, cx);
    }
    let status = graph.execute_node(root, cx);
    if status.is_terminal() && !graph.settings.repeat {
        return Some(status == Status::Success);
    }
    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Composites
// ─────────────────────────────────────────────────────────────────────────────

/// Runs children in order; fails on the first failure, succeeds when all do.
///
/// A running child suspends the walk at its position; finished children are
/// not revisited until the sequencer resets. Several children may settle
/// within a single tick. With no children the sequencer succeeds.
#[derive(Debug, Default)]
pub struct Sequencer {
    cursor: usize,
}

reflect_struct!(Sequencer);

impl NodeBehavior for Sequencer {
    fn on_execute(
        &mut self,
        graph: &mut Graph,
        index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        let children = graph.children_of(index);
        while self.cursor < children.len() {
            let (conn, child) = children[self.cursor];
            let status = graph.execute_node(child, cx);
            graph.set_connection_status(conn, status);
            match status {
                Status::Running | Status::Resting => return Status::Running,
                Status::Success | Status::Optional => self.cursor += 1,
                Status::Failure | Status::Error => return status,
            }
        }
        Status::Success
    }

    fn on_reset(&mut self, _cx: &mut ExecContext<'_>) {
        self.cursor = 0;
    }
}

/// Runs children in order until one succeeds; fails when none do.
#[derive(Debug, Default)]
pub struct Selector {
    cursor: usize,
}

reflect_struct!(Selector);

impl NodeBehavior for Selector {
    fn on_execute(
        &mut self,
        graph: &mut Graph,
        index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        let children = graph.children_of(index);
        while self.cursor < children.len() {
            let (conn, child) = children[self.cursor];
            let status = graph.execute_node(child, cx);
            graph.set_connection_status(conn, status);
            match status {
                Status::Running | Status::Resting => return Status::Running,
                Status::Success => return Status::Success,
                Status::Failure | Status::Error | Status::Optional => self.cursor += 1,
            }
        }
        Status::Failure
    }

    fn on_reset(&mut self, _cx: &mut ExecContext<'_>) {
        self.cursor = 0;
    }
}

/// Runs all children every tick.
///
/// The first failing child fails the parallel at once, resetting any
/// siblings still running; it succeeds when every enabled child has
/// succeeded.
#[derive(Debug, Default)]
pub struct Parallel;

reflect_struct!(Parallel);

impl NodeBehavior for Parallel {
    fn on_execute(
        &mut self,
        graph: &mut Graph,
        index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        let children = graph.children_of(index);
        let mut all_done = true;
        for &(conn, child) in &children {
            let status = graph.execute_node(child, cx);
            graph.set_connection_status(conn, status);
            match status {
                Status::Failure | Status::Error => {
                    for &(_, sibling) in &children {
                        if graph.node_status(sibling) == Status::Running {
                            graph.reset_subtree(sibling, cx);
                        }
                    }
                    return status;
                }
                Status::Running | Status::Resting => all_done = false,
                Status::Success | Status::Optional => {}
            }
        }
        if all_done {
            Status::Success
        } else {
            Status::Running
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decorators
// ─────────────────────────────────────────────────────────────────────────────

/// Swaps the single child's `Success` and `Failure`.
#[derive(Debug, Default)]
pub struct Inverter;

reflect_struct!(Inverter);

impl NodeBehavior for Inverter {
    fn max_out_connections(&self) -> Option<usize> {
        Some(1)
    }

    fn on_execute(
        &mut self,
        graph: &mut Graph,
        index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        let Some(&(conn, child)) = graph.children_of(index).first() else {
            return Status::Optional;
        };
        let status = graph.execute_node(child, cx);
        graph.set_connection_status(conn, status);
        match status {
            Status::Success => Status::Failure,
            Status::Failure => Status::Success,
            other => other,
        }
    }
}

/// Re-runs the single child, resetting it after each settled pass.
///
/// `times` bounds the iterations, `0` repeats forever; the final child
/// status bubbles up when the bound is reached.
#[derive(Debug, Default)]
pub struct Repeater {
    pub times: u32,
    done: u32,
}

reflect_struct!(Repeater);

impl NodeBehavior for Repeater {
    fn max_out_connections(&self) -> Option<usize> {
        Some(1)
    }

    fn on_execute(
        &mut self,
        graph: &mut Graph,
        index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        let Some(&(conn, child)) = graph.children_of(index).first() else {
            return Status::Optional;
        };
        let status = graph.execute_node(child, cx);
        graph.set_connection_status(conn, status);
        if !status.is_terminal() {
            return Status::Running;
        }
        self.done += 1;
        if self.times > 0 && self.done >= self.times {
            return status;
        }
        graph.reset_subtree(child, cx);
        Status::Running
    }

    fn on_reset(&mut self, _cx: &mut ExecContext<'_>) {
        self.done = 0;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Leaves
// ─────────────────────────────────────────────────────────────────────────────

/// Leaf that drives an [`ActionList`].
#[derive(Debug, Default)]
pub struct ActionNode {
    pub actions: ActionList,
}

reflect_struct!(ActionNode);

impl NodeBehavior for ActionNode {
    fn max_out_connections(&self) -> Option<usize> {
        Some(0)
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

    fn on_graph_paused(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.pause_list(cx);
    }

    fn on_graph_resumed(&mut self, cx: &mut ExecContext<'_>) {
        self.actions.resume_list(cx);
    }
}

/// Leaf that evaluates a [`ConditionList`] into instant success or failure.
#[derive(Debug, Default)]
pub struct ConditionNode {
    pub conditions: ConditionList,
}

reflect_struct!(ConditionNode);

impl NodeBehavior for ConditionNode {
    fn max_out_connections(&self) -> Option<usize> {
        Some(0)
    }

    fn on_execute(
        &mut self,
        _graph: &mut Graph,
        _index: usize,
        cx: &mut ExecContext<'_>,
    ) -> Status {
        if self.conditions.check_all(cx) {
            Status::Success
        } else {
            Status::Failure
        }
    }

    fn on_graph_started(&mut self, cx: &mut ExecContext<'_>) {
        self.conditions.notify_graph_started(cx);
    }

    fn on_graph_stopped(&mut self, cx: &mut ExecContext<'_>) {
        self.conditions.notify_graph_stopped(cx);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
