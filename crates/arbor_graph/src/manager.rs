//! Host-side registry of live runners sharing one serializer.
//!
//! A [`GraphManager`] is what a game loop talks to: it hands out runner
//! ids, fans `update_all` across every runner each frame, and moves graph
//! deserialization off the hot path with [`GraphManager::spawn_load`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arbor_serial::{Notes, ReferenceTable, Serializer};
use indexmap::IndexMap;

use crate::error::GraphError;
use crate::graph::{Graph, GraphKind};
use crate::runner::GraphRunner;

#[derive(Debug)]
pub struct GraphManager {
    serializer: Arc<Serializer>,
    runners: IndexMap<u64, GraphRunner>,
    next_id: u64,
}

impl GraphManager {
    pub fn new(serializer: Arc<Serializer>) -> Self {
        Self {
            serializer,
            runners: IndexMap::new(),
            next_id: 1,
        }
    }

    pub fn serializer(&self) -> &Arc<Serializer> {
        &self.serializer
    }

    /// Adopt a runner; the returned id stays valid until [`remove`].
    ///
    /// [`remove`]: GraphManager::remove
    pub fn add(&mut self, runner: GraphRunner) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.runners.insert(id, runner);
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<GraphRunner> {
        self.runners.shift_remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&GraphRunner> {
        self.runners.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut GraphRunner> {
        self.runners.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Runner ids in insertion order.
    pub fn ids(&self) -> Vec<u64> {
        self.runners.keys().copied().collect()
    }

    /// Advance every runner by `dt` seconds.
    pub fn update_all(&mut self, dt: f64) {
        for runner in self.runners.values_mut() {
            runner.update(dt);
        }
    }

    pub fn pause_all(&mut self) {
        for runner in self.runners.values_mut() {
            runner.pause();
        }
    }

    pub fn resume_all(&mut self) {
        for runner in self.runners.values_mut() {
            runner.resume();
        }
    }

    pub fn stop_all(&mut self, success: bool) {
        for runner in self.runners.values_mut() {
            runner.stop(success);
        }
    }

    /// Deserialize a graph on a background thread.
    ///
    /// The shared serializer gates passes with an internal mutex, so a load
    /// here can overlap the main thread's saves without data races. Join the
    /// handle and wrap the graph in a [`GraphRunner`] to adopt it.
    pub fn spawn_load(
        &self,
        kind: GraphKind,
        json: String,
        refs: ReferenceTable,
    ) -> JoinHandle<Result<(Graph, Notes), GraphError>> {
        let serializer = Arc::clone(&self.serializer);
        thread::spawn(move || Graph::load(&serializer, kind, &json, &refs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::standard_registry;
    use crate::status::Status;
    use crate::task::{ActionTask, Agent, ExecContext, Outcome};
    use crate::tree::ActionNode;
    use arbor_serial::{reflect_struct, Serializer};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Countdown {
        ticks: u32,
        left: u32,
    }

    reflect_struct!(Countdown);

    impl ActionTask for Countdown {
        fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
            self.left = self.ticks;
            self.on_update(cx);
        }

        fn on_update(&mut self, cx: &mut ExecContext<'_>) {
            self.left = self.left.saturating_sub(1);
            if self.left == 0 {
                cx.end_action(Outcome::Success);
            }
        }
    }

    fn runner_with(ticks: u32) -> GraphRunner {
        let mut graph = Graph::behaviour_tree();
        graph.settings.repeat = false;
        let mut root = ActionNode::default();
        root.actions.push(Box::new(Countdown {
            ticks,
            ..Countdown::default()
        }));
        graph.add_node(Box::new(root));
        GraphRunner::new(graph)
    }

    fn manager() -> GraphManager {
        GraphManager::new(Arc::new(Serializer::new(standard_registry())))
    }

    #[test]
    fn test_update_all_drives_every_runner() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();

        for ticks in [1, 2] {
            let sink = Arc::clone(&finished);
            let mut runner = runner_with(ticks);
            runner.set_on_finished(move |status| sink.lock().push(status));
            runner.start(Agent::named("crew")).unwrap();
            manager.add(runner);
        }
        assert_eq!(manager.len(), 2);

        manager.update_all(0.1);
        assert_eq!(finished.lock().len(), 1);
        manager.update_all(0.1);
        assert_eq!(*finished.lock(), vec![Status::Success, Status::Success]);
    }

    #[test]
    fn test_remove_returns_the_runner() {
        let mut manager = manager();
        let id = manager.add(runner_with(1));
        assert_eq!(manager.ids(), vec![id]);

        let runner = manager.remove(id).unwrap();
        assert!(!runner.is_running());
        assert!(manager.is_empty());
        assert!(manager.remove(id).is_none());
    }

    #[test]
    fn test_stop_all_fails_out_running_graphs() {
        let finished = Arc::new(Mutex::new(Vec::new()));
        let mut manager = manager();
        let sink = Arc::clone(&finished);
        let mut runner = runner_with(10);
        runner.set_on_finished(move |status| sink.lock().push(status));
        runner.start(Agent::default()).unwrap();
        manager.add(runner);

        manager.update_all(0.1);
        manager.stop_all(false);
        assert_eq!(*finished.lock(), vec![Status::Failure]);
    }

    #[test]
    fn test_background_load_round_trips() {
        let manager = manager();

        // An action node with an empty list settles immediately.
        let mut template = Graph::behaviour_tree();
        template.settings.repeat = false;
        template.add_node(Box::new(ActionNode::default()));
        let saved = template.save(manager.serializer()).unwrap();

        let handle = manager.spawn_load(GraphKind::BehaviourTree, saved.json, saved.refs);
        let (graph, notes) = handle.join().unwrap().unwrap();
        assert!(notes.is_clean());
        assert_eq!(graph.node_count(), 1);

        let mut runner = GraphRunner::new(graph);
        runner.start(Agent::default()).unwrap();
        runner.update(0.1);
        assert!(!runner.is_running());
    }
}
