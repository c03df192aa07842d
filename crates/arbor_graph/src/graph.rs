//! The node graph: arena storage, validated edits and the run loop.

use std::fmt;

use arbor_serial::{reflect_enum, reflect_struct, Notes, ReferenceTable, SaveOutput, Serializer};
use uuid::Uuid;

use crate::blackboard::Blackboard;
use crate::connection::Connection;
use crate::error::GraphError;
use crate::machine::{self, MachineState};
use crate::node::{Node, NodeBehavior};
use crate::status::Status;
use crate::task::{Agent, ExecContext};
use crate::tree;

// ─────────────────────────────────────────────────────────────────────────────
// Kind and Settings
// ─────────────────────────────────────────────────────────────────────────────

/// Which driver interprets the node graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphKind {
    #[default]
    BehaviourTree,
    StateMachine,
}

reflect_enum!(GraphKind {
    BehaviourTree,
    StateMachine
});

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphKind::BehaviourTree => write!(f, "behaviour tree"),
            GraphKind::StateMachine => write!(f, "state machine"),
        }
    }
}

/// Persisted per-graph switches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphSettings {
    /// Behaviour trees only: re-enter the root after it settles.
    pub repeat: bool,
    /// Seconds between root executions, `0` for every update.
    pub update_interval: f64,
}

reflect_struct!(GraphSettings);

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            repeat: true,
            update_interval: 0.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

/// A behaviour tree or state machine over an arena of nodes.
///
/// Structural edits validate their arguments and refuse invalid requests
/// without partial mutation. Runtime state (statuses, the machine's current
/// state, timing counters) never serializes; a loaded graph always wakes up
/// rewound.
#[derive(Debug, Default)]
pub struct Graph {
    pub(crate) kind: GraphKind,
    pub settings: GraphSettings,
    pub(crate) nodes: Vec<Node>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) prime: Option<usize>,
    agent: Agent,
    running: bool,
    paused: bool,
    elapsed: f64,
    tick: u64,
    pub(crate) accumulator: f64,
    finished: Option<Status>,
    pub(crate) machine: MachineState,
}

reflect_struct!(Graph);

#[derive(Clone, Copy)]
enum GraphEvent {
    Started,
    Stopped,
    Paused,
    Resumed,
}

impl Graph {
    pub fn new(kind: GraphKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn behaviour_tree() -> Self {
        Self::new(GraphKind::BehaviourTree)
    }

    pub fn state_machine() -> Self {
        Self::new(GraphKind::StateMachine)
    }

    pub fn kind(&self) -> GraphKind {
        self.kind
    }

    // ── Structure ────────────────────────────────────────────────────────────

    /// Add a node hosting the given behavior, returning its index.
    ///
    /// The first node added becomes the prime node.
    pub fn add_node(&mut self, behavior: Box<dyn NodeBehavior>) -> usize {
        let index = self.nodes.len();
        let mut node = Node::hosting(behavior);
        node.id = index;
        node.uid = Uuid::new_v4().to_string();
        self.nodes.push(node);
        if self.prime.is_none() {
            self.prime = Some(index);
        }
        index
    }

    /// Remove a node along with every connection touching it.
    ///
    /// Later nodes shift down one index; ids, connection endpoints and the
    /// prime designation are remapped to match.
    pub fn remove_node(&mut self, index: usize) -> Result<(), GraphError> {
        if index >= self.nodes.len() {
            tracing::warn!(index, "remove_node refused: out of range");
            return Err(GraphError::NodeOutOfRange(index));
        }
        self.connections
            .retain(|c| c.source != index && c.target != index);
        for conn in &mut self.connections {
            if conn.source > index {
                conn.source -= 1;
            }
            if conn.target > index {
                conn.target -= 1;
            }
        }
        self.nodes.remove(index);
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.id = id;
        }
        self.prime = match self.prime {
            Some(p) if p == index => None,
            Some(p) if p > index => Some(p - 1),
            other => other,
        };
        self.machine.remap_after_removal(index);
        self.rebuild_links();
        Ok(())
    }

    /// Connect `source` to `target`, returning the connection index.
    ///
    /// Refused when either endpoint is out of range, the pair is already
    /// connected, a behavior's connection cap would be exceeded, or the edge
    /// is a self-loop outside a state machine.
    pub fn connect(&mut self, source: usize, target: usize) -> Result<usize, GraphError> {
        if source >= self.nodes.len() {
            tracing::warn!(source, "connect refused: source out of range");
            return Err(GraphError::NodeOutOfRange(source));
        }
        if target >= self.nodes.len() {
            tracing::warn!(target, "connect refused: target out of range");
            return Err(GraphError::NodeOutOfRange(target));
        }
        if source == target && self.kind != GraphKind::StateMachine {
            tracing::warn!(source, "connect refused: self-connection on a tree");
            return Err(GraphError::SelfConnection(source));
        }
        if self
            .connections
            .iter()
            .any(|c| c.source == source && c.target == target)
        {
            tracing::warn!(source, target, "connect refused: already connected");
            return Err(GraphError::AlreadyConnected { from: source, target });
        }
        if let Some(limit) = self.nodes[source]
            .behavior
            .get()
            .and_then(|b| b.max_out_connections())
        {
            if self.nodes[source].outs.len() >= limit {
                tracing::warn!(node = source, limit, "connect refused: outgoing cap");
                return Err(GraphError::ConnectionLimit {
                    node: source,
                    limit,
                    direction: "outgoing",
                });
            }
        }
        if let Some(limit) = self.nodes[target]
            .behavior
            .get()
            .and_then(|b| b.max_in_connections())
        {
            if self.nodes[target].ins.len() >= limit {
                tracing::warn!(node = target, limit, "connect refused: incoming cap");
                return Err(GraphError::ConnectionLimit {
                    node: target,
                    limit,
                    direction: "incoming",
                });
            }
        }
        let index = self.connections.len();
        self.connections.push(Connection::between(source, target));
        self.nodes[source].outs.push(index);
        self.nodes[target].ins.push(index);
        Ok(index)
    }

    /// Remove a connection; later connections shift down one index.
    pub fn disconnect(&mut self, index: usize) -> Result<(), GraphError> {
        if index >= self.connections.len() {
            tracing::warn!(index, "disconnect refused: out of range");
            return Err(GraphError::ConnectionOutOfRange(index));
        }
        self.connections.remove(index);
        self.rebuild_links();
        Ok(())
    }

    /// Designate the node execution starts from.
    pub fn set_prime(&mut self, index: usize) -> Result<(), GraphError> {
        if index >= self.nodes.len() {
            tracing::warn!(index, "set_prime refused: out of range");
            return Err(GraphError::NodeOutOfRange(index));
        }
        self.prime = Some(index);
        Ok(())
    }

    pub fn prime(&self) -> Option<usize> {
        self.prime
    }

    /// Recompute every node's connection lists from the connection arena.
    pub(crate) fn rebuild_links(&mut self) {
        for node in &mut self.nodes {
            node.ins.clear();
            node.outs.clear();
        }
        for (index, conn) in self.connections.iter().enumerate() {
            self.nodes[conn.source].outs.push(index);
            self.nodes[conn.target].ins.push(index);
        }
    }

    /// Assign uids to nodes that never received one.
    pub fn refresh_uids(&mut self) {
        for node in &mut self.nodes {
            if node.uid.is_empty() {
                node.uid = Uuid::new_v4().to_string();
            }
        }
    }

    // ── Access ───────────────────────────────────────────────────────────────

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn connection(&self, index: usize) -> Option<&Connection> {
        self.connections.get(index)
    }

    pub fn connection_mut(&mut self, index: usize) -> Option<&mut Connection> {
        self.connections.get_mut(index)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn find_by_uid(&self, uid: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.uid == uid)
    }

    pub fn node_status(&self, index: usize) -> Status {
        self.nodes
            .get(index)
            .map(|n| n.status)
            .unwrap_or(Status::Resting)
    }

    /// Seconds the node has been running, `0` when it is not.
    pub fn node_elapsed(&self, index: usize) -> f64 {
        match self.nodes.get(index) {
            Some(n) if n.status == Status::Running => self.elapsed - n.started_at,
            _ => 0.0,
        }
    }

    /// Enabled outgoing edges as `(connection, target)` pairs, in declared
    /// order.
    pub fn children_of(&self, index: usize) -> Vec<(usize, usize)> {
        let Some(node) = self.nodes.get(index) else {
            return Vec::new();
        };
        node.outs
            .iter()
            .filter(|&&ci| self.connections[ci].enabled)
            .map(|&ci| (ci, self.connections[ci].target))
            .collect()
    }

    pub(crate) fn set_connection_status(&mut self, index: usize, status: Status) {
        if let Some(conn) = self.connections.get_mut(index) {
            conn.status = status;
        }
    }

    pub(crate) fn auto_update_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.behavior.get().is_some_and(|b| b.auto_update()))
            .map(|(index, _)| index)
            .collect()
    }

    // ── Runtime ──────────────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Seconds since the graph started.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Updates since the graph started.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// The state machine's active state, if any.
    pub fn current_state(&self) -> Option<usize> {
        self.machine.current
    }

    /// Depth of the state machine's resume stack.
    pub fn resume_depth(&self) -> usize {
        self.machine.resume_stack.len()
    }

    /// Start running on behalf of `agent`.
    pub fn start(&mut self, agent: Agent, blackboard: &mut Blackboard) -> Result<(), GraphError> {
        if self.running {
            return Err(GraphError::AlreadyRunning);
        }
        if self.prime.is_none() {
            return Err(GraphError::NoPrime);
        }
        self.agent = agent;
        self.running = true;
        self.paused = false;
        self.elapsed = 0.0;
        self.tick = 0;
        self.accumulator = 0.0;
        self.finished = None;
        self.machine = MachineState::default();
        tracing::info!(agent = %self.agent, kind = %self.kind, "graph started");
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, 0.0, 0);
        self.notify_each(&mut cx, GraphEvent::Started);
        if self.kind == GraphKind::StateMachine {
            if let Err(err) = machine::enter_prime(self, &mut cx) {
                self.running = false;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Stop running, rewinding every node.
    ///
    /// `success` is the verdict handed to the finish latch; in-flight tasks
    /// are interrupted either way.
    pub fn stop(&mut self, success: bool, blackboard: &mut Blackboard) {
        if !self.running {
            return;
        }
        self.running = false;
        self.paused = false;
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, 0.0, self.tick);
        for index in 0..self.nodes.len() {
            self.reset_node(index, &mut cx);
        }
        self.notify_each(&mut cx, GraphEvent::Stopped);
        drop(cx);
        self.machine = MachineState::default();
        self.finished = Some(if success { Status::Success } else { Status::Failure });
        tracing::info!(agent = %self.agent, success, "graph stopped");
    }

    pub fn pause(&mut self, blackboard: &mut Blackboard) {
        if !self.running || self.paused {
            return;
        }
        self.paused = true;
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, 0.0, self.tick);
        self.notify_each(&mut cx, GraphEvent::Paused);
    }

    pub fn resume(&mut self, blackboard: &mut Blackboard) {
        if !self.running || !self.paused {
            return;
        }
        self.paused = false;
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, 0.0, self.tick);
        self.notify_each(&mut cx, GraphEvent::Resumed);
    }

    /// Advance the graph by `dt` seconds.
    pub fn update(&mut self, dt: f64, blackboard: &mut Blackboard) {
        if !self.running || self.paused {
            return;
        }
        self.elapsed += dt;
        self.tick += 1;
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, dt, self.tick);
        let verdict = match self.kind {
            GraphKind::BehaviourTree => tree::tick(self, &mut cx),
            GraphKind::StateMachine => machine::tick(self, &mut cx),
        };
        drop(cx);
        if let Some(success) = verdict {
            self.stop(success, blackboard);
        }
    }

    /// Evaluate the current state's transitions right now.
    ///
    /// This is how `CheckManually` states transition at all; for the other
    /// policies it forces an extra evaluation between updates. Returns true
    /// when a transition fired.
    pub fn check_transitions_now(&mut self, blackboard: &mut Blackboard) -> bool {
        if self.kind != GraphKind::StateMachine || !self.running || self.paused {
            return false;
        }
        let mut cx = ExecContext::new(self.agent.clone(), blackboard, 0.0, self.tick);
        machine::manual_check(self, &mut cx)
    }

    /// The latched finish verdict, consumed on read.
    pub fn take_finished(&mut self) -> Option<Status> {
        self.finished.take()
    }

    // ── Execution ────────────────────────────────────────────────────────────

    /// Run one node for this tick and return its status.
    ///
    /// Terminal nodes are a no-op until reset. `on_enter` fires only on the
    /// `Resting` to `Running` edge; while the behavior runs, its payload slot
    /// is empty, so cyclic re-entry surfaces as an error instead of
    /// recursing forever.
    pub fn execute_node(&mut self, index: usize, cx: &mut ExecContext<'_>) -> Status {
        let Some(node) = self.nodes.get(index) else {
            tracing::warn!(index, "execute refused: node out of range");
            return Status::Error;
        };
        let before = node.status;
        if before.is_terminal() {
            return before;
        }
        let Some(mut payload) = self.nodes[index].behavior.take() else {
            tracing::warn!(index, "node has no behavior payload");
            self.nodes[index].status = Status::Error;
            return Status::Error;
        };
        if before == Status::Resting {
            self.nodes[index].status = Status::Running;
            self.nodes[index].started_at = self.elapsed;
            payload.on_enter(self, index, cx);
        }
        let status = payload.on_execute(self, index, cx);
        self.nodes[index].behavior.put(payload);
        self.nodes[index].status = status;
        status
    }

    /// Rewind one node to `Resting`, without touching its children.
    ///
    /// A node already at `Resting` is left alone, so repeated resets fire
    /// `on_reset` once.
    pub fn reset_node(&mut self, index: usize, cx: &mut ExecContext<'_>) {
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        if node.status == Status::Resting {
            return;
        }
        if let Some(mut payload) = self.nodes[index].behavior.take() {
            payload.on_reset(cx);
            self.nodes[index].behavior.put(payload);
        }
        self.nodes[index].status = Status::Resting;
        let outs = self.nodes[index].outs.clone();
        for ci in outs {
            self.connections[ci].status = Status::Resting;
            self.connections[ci].guard_slot.clear_latch();
        }
    }

    /// Rewind a node and everything reachable through its out-connections.
    ///
    /// Subtrees already at `Resting` are skipped wholesale; shared nodes in
    /// diamond shapes reset exactly once per pass.
    pub fn reset_subtree(&mut self, index: usize, cx: &mut ExecContext<'_>) {
        let mut visited = vec![false; self.nodes.len()];
        self.reset_walk(index, cx, &mut visited);
    }

    fn reset_walk(&mut self, index: usize, cx: &mut ExecContext<'_>, visited: &mut [bool]) {
        let Some(node) = self.nodes.get(index) else {
            return;
        };
        if visited[index] || node.status == Status::Resting {
            return;
        }
        visited[index] = true;
        self.reset_node(index, cx);
        let targets: Vec<usize> = self.nodes[index]
            .outs
            .iter()
            .map(|&ci| self.connections[ci].target)
            .collect();
        for target in targets {
            self.reset_walk(target, cx, visited);
        }
    }

    fn notify_each(&mut self, cx: &mut ExecContext<'_>, event: GraphEvent) {
        for index in 0..self.nodes.len() {
            if let Some(mut payload) = self.nodes[index].behavior.take() {
                match event {
                    GraphEvent::Started => payload.on_graph_started(cx),
                    GraphEvent::Stopped => payload.on_graph_stopped(cx),
                    GraphEvent::Paused => payload.on_graph_paused(cx),
                    GraphEvent::Resumed => payload.on_graph_resumed(cx),
                }
                self.nodes[index].behavior.put(payload);
            }
        }
        for conn in &mut self.connections {
            if let Some(guard) = conn.guard.get_mut() {
                match event {
                    GraphEvent::Started => guard.on_graph_started(cx),
                    GraphEvent::Stopped => guard.on_graph_stopped(cx),
                    GraphEvent::Paused | GraphEvent::Resumed => {}
                }
            }
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    /// Serialize the graph, assigning uids to any node still missing one.
    pub fn save(&mut self, serializer: &Serializer) -> Result<SaveOutput, GraphError> {
        self.refresh_uids();
        let mut refs = ReferenceTable::default();
        let (json, notes) = serializer.to_json_with_refs(self, &mut refs)?;
        Ok(SaveOutput { json, refs, notes })
    }

    /// Deserialize a graph of the expected kind.
    pub fn load(
        serializer: &Serializer,
        kind: GraphKind,
        json: &str,
        refs: &ReferenceTable,
    ) -> Result<(Graph, Notes), GraphError> {
        let (mut graph, notes) = serializer.from_json::<Graph>(json, refs)?;
        if graph.kind != kind {
            return Err(GraphError::KindMismatch {
                expected: kind,
                found: graph.kind,
            });
        }
        graph.after_load();
        Ok((graph, notes))
    }

    /// Re-deserialize into this instance, preserving its allocation.
    pub fn load_overwrite(
        &mut self,
        serializer: &Serializer,
        json: &str,
        refs: &ReferenceTable,
    ) -> Result<Notes, GraphError> {
        if self.running {
            return Err(GraphError::StillRunning);
        }
        let notes = serializer.overwrite_from_json(self, json, refs)?;
        self.after_load();
        Ok(notes)
    }

    /// Clone this graph through a save/load round trip.
    ///
    /// The copy shares no mutable state with the original.
    pub fn duplicate(&mut self, serializer: &Serializer) -> Result<(Graph, Notes), GraphError> {
        let saved = self.save(serializer)?;
        Graph::load(serializer, self.kind, &saved.json, &saved.refs)
    }

    /// Repair derived state after a deserialize pass.
    fn after_load(&mut self) {
        let node_count = self.nodes.len();
        let before = self.connections.len();
        self.connections
            .retain(|c| c.source < node_count && c.target < node_count);
        let dropped = before - self.connections.len();
        if dropped > 0 {
            tracing::warn!(dropped, "dropped connections pointing outside the arena");
        }
        for (id, node) in self.nodes.iter_mut().enumerate() {
            node.id = id;
            node.status = Status::Resting;
        }
        for conn in &mut self.connections {
            conn.status = Status::Resting;
        }
        self.rebuild_links();
        if let Some(prime) = self.prime {
            if prime >= node_count {
                tracing::warn!(prime, "prime node out of range; cleared");
                self.prime = None;
            }
        }
        self.running = false;
        self.paused = false;
        self.elapsed = 0.0;
        self.tick = 0;
        self.accumulator = 0.0;
        self.finished = None;
        self.machine = MachineState::default();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
