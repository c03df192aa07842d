//! Graph nodes and the behavior contract they host.

use arbor_serial::{reflect_struct, Poly, Reflect};

use crate::graph::Graph;
use crate::machine::TransitionPolicy;
use crate::status::Status;
use crate::task::ExecContext;

// ─────────────────────────────────────────────────────────────────────────────
// Position
// ─────────────────────────────────────────────────────────────────────────────

/// Editor placement, persisted for authoring surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

reflect_struct!(Position);

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Contract
// ─────────────────────────────────────────────────────────────────────────────

/// What a node does when the graph executes it.
///
/// Behaviors receive the owning graph by mutable reference; while a hook
/// runs, the node's own payload slot is empty, so re-entering the same node
/// reports an error instead of recursing.
pub trait NodeBehavior: Reflect {
    /// Display name used in logs and editor surfaces.
    fn title(&self) -> &str {
        self.type_name()
    }

    /// Cap on incoming connections, `None` for unlimited.
    fn max_in_connections(&self) -> Option<usize> {
        None
    }

    /// Cap on outgoing connections, `None` for unlimited.
    fn max_out_connections(&self) -> Option<usize> {
        None
    }

    /// Fires once on the `Resting` to `Running` edge, before `on_execute`.
    fn on_enter(&mut self, _graph: &mut Graph, _index: usize, _cx: &mut ExecContext<'_>) {}

    /// Advance the node one tick and report its status.
    fn on_execute(&mut self, graph: &mut Graph, index: usize, cx: &mut ExecContext<'_>)
        -> Status;

    /// Fires when the node is rewound to `Resting`.
    fn on_reset(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_started(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_stopped(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_paused(&mut self, _cx: &mut ExecContext<'_>) {}

    fn on_graph_resumed(&mut self, _cx: &mut ExecContext<'_>) {}

    /// When a state machine evaluates this node's outgoing transitions.
    fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy::CheckContinuously
    }

    /// Auto-updated nodes run every machine tick, before the current state.
    fn auto_update(&self) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// One slot in the graph arena.
///
/// The integer id always equals the node's current arena index and is
/// reassigned when earlier nodes are removed; the uid string survives
/// save/load and renumbering.
#[derive(Debug, Default)]
pub struct Node {
    pub(crate) id: usize,
    pub(crate) uid: String,
    pub position: Position,
    pub(crate) status: Status,
    pub(crate) behavior: Poly<dyn NodeBehavior>,
    pub(crate) ins: Vec<usize>,
    pub(crate) outs: Vec<usize>,
    pub(crate) started_at: f64,
}

reflect_struct!(Node);

impl Node {
    pub(crate) fn hosting(behavior: Box<dyn NodeBehavior>) -> Self {
        Self {
            behavior: Poly::new(behavior),
            ..Self::default()
        }
    }

    /// Current arena index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Durable identity, empty until the node joins a graph.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn behavior(&self) -> Option<&dyn NodeBehavior> {
        self.behavior.get()
    }

    pub fn behavior_mut(&mut self) -> Option<&mut dyn NodeBehavior> {
        self.behavior.get_mut()
    }

    /// Typed view of the behavior payload.
    pub fn behavior_as<B: NodeBehavior>(&self) -> Option<&B> {
        self.behavior.get().and_then(|b| b.as_any().downcast_ref())
    }

    pub fn behavior_as_mut<B: NodeBehavior>(&mut self) -> Option<&mut B> {
        self.behavior
            .get_mut()
            .and_then(|b| b.as_any_mut().downcast_mut())
    }

    pub fn title(&self) -> &str {
        match self.behavior.get() {
            Some(behavior) => behavior.title(),
            None => "(empty)",
        }
    }

    /// Indices of connections arriving at this node.
    pub fn in_connections(&self) -> &[usize] {
        &self.ins
    }

    /// Indices of connections leaving this node, in declared order.
    pub fn out_connections(&self) -> &[usize] {
        &self.outs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Stub;

    reflect_struct!(Stub);

    impl NodeBehavior for Stub {
        fn on_execute(
            &mut self,
            _graph: &mut Graph,
            _index: usize,
            _cx: &mut ExecContext<'_>,
        ) -> Status {
            Status::Success
        }
    }

    #[test]
    fn test_title_falls_back_when_empty() {
        let node = Node::default();
        assert_eq!(node.title(), "(empty)");

        let node = Node::hosting(Box::new(Stub));
        assert_eq!(node.title(), "Stub");
    }

    #[test]
    fn test_typed_behavior_access() {
        let mut node = Node::hosting(Box::new(Stub));
        assert!(node.behavior_as::<Stub>().is_some());
        assert!(node.behavior_as_mut::<Stub>().is_some());
    }
}
