//! Owns one graph instance together with the state it runs against.
//!
//! A [`GraphRunner`] bundles a [`Graph`] with its [`Blackboard`], remembers
//! the JSON it was instantiated from, and reports the final status through
//! an optional finish hook. Hosts that drive many agents at once manage a
//! set of runners through [`crate::manager::GraphManager`].

use std::fmt;

use arbor_serial::{Notes, ReferenceTable, SaveOutput, Serializer};

use crate::blackboard::Blackboard;
use crate::error::GraphError;
use crate::graph::{Graph, GraphKind};
use crate::status::Status;
use crate::task::Agent;

type FinishHook = Box<dyn FnMut(Status) + Send>;

pub struct GraphRunner {
    graph: Graph,
    blackboard: Blackboard,
    source_json: Option<String>,
    source_refs: ReferenceTable,
    on_finished: Option<FinishHook>,
}

impl GraphRunner {
    /// Wrap a graph built in code, with a fresh blackboard.
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            blackboard: Blackboard::new(),
            source_json: None,
            source_refs: ReferenceTable::new(),
            on_finished: None,
        }
    }

    /// Instantiate an independent copy of a template graph.
    ///
    /// The template itself is never run; each call produces a runner with
    /// its own node payloads and its own blackboard.
    pub fn from_template(
        template: &mut Graph,
        serializer: &Serializer,
    ) -> Result<(Self, Notes), GraphError> {
        let (graph, notes) = template.duplicate(serializer)?;
        Ok((Self::new(graph), notes))
    }

    /// Deserialize a graph and keep the source around for later reloads.
    pub fn load(
        serializer: &Serializer,
        kind: GraphKind,
        json: &str,
        refs: &ReferenceTable,
    ) -> Result<(Self, Notes), GraphError> {
        let (graph, notes) = Graph::load(serializer, kind, json, refs)?;
        let mut runner = Self::new(graph);
        runner.source_json = Some(json.to_string());
        runner.source_refs = refs.clone();
        Ok((runner, notes))
    }

    /// Replace the hook invoked once per run when the graph finishes.
    pub fn set_on_finished(&mut self, hook: impl FnMut(Status) + Send + 'static) {
        self.on_finished = Some(Box::new(hook));
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    /// JSON this runner was loaded from, if it came from [`GraphRunner::load`].
    pub fn source_json(&self) -> Option<&str> {
        self.source_json.as_deref()
    }

    pub fn source_refs(&self) -> &ReferenceTable {
        &self.source_refs
    }

    pub fn is_running(&self) -> bool {
        self.graph.is_running()
    }

    pub fn start(&mut self, agent: Agent) -> Result<(), GraphError> {
        self.graph.start(agent, &mut self.blackboard)
    }

    pub fn update(&mut self, dt: f64) {
        self.graph.update(dt, &mut self.blackboard);
        self.fire_finished();
    }

    pub fn pause(&mut self) {
        self.graph.pause(&mut self.blackboard);
    }

    pub fn resume(&mut self) {
        self.graph.resume(&mut self.blackboard);
    }

    pub fn stop(&mut self, success: bool) {
        self.graph.stop(success, &mut self.blackboard);
        self.fire_finished();
    }

    /// Evaluate manual-policy transitions; see
    /// [`Graph::check_transitions_now`].
    pub fn check_transitions_now(&mut self) -> bool {
        self.graph.check_transitions_now(&mut self.blackboard)
    }

    /// Serialize the current graph.
    pub fn export(&mut self, serializer: &Serializer) -> Result<SaveOutput, GraphError> {
        self.graph.save(serializer)
    }

    /// Re-apply the stored source JSON over the current graph.
    ///
    /// Only valid for runners created through [`GraphRunner::load`] and only
    /// while stopped.
    pub fn reload(&mut self, serializer: &Serializer) -> Result<Notes, GraphError> {
        let Some(json) = self.source_json.clone() else {
            return Ok(Notes::none());
        };
        self.graph
            .load_overwrite(serializer, &json, &self.source_refs)
    }

    fn fire_finished(&mut self) {
        if let Some(status) = self.graph.take_finished() {
            if let Some(hook) = self.on_finished.as_mut() {
                hook(status);
            }
        }
    }
}

impl fmt::Debug for GraphRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRunner")
            .field("graph", &self.graph)
            .field("blackboard", &self.blackboard)
            .field("has_source", &self.source_json.is_some())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
