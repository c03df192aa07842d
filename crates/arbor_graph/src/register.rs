//! Schema and factory registration for everything the crate ships.
//!
//! Hosts call [`register_builtins`] on their own registry (or start from
//! [`standard_registry`]) and then add their game-specific tasks and node
//! behaviors next to the built-ins. Only registered types survive a
//! save/load round trip as live values; unregistered payloads come back as
//! the placeholders in [`crate::missing`].

use std::sync::Arc;

use arbor_serial::{TypeRegistry, TypeSchema};

use crate::connection::Connection;
use crate::graph::{Graph, GraphSettings};
use crate::lists::{ActionEntry, ActionList, ConditionEntry, ConditionList};
use crate::machine::{AnyState, ConcurrentState, StateNode};
use crate::missing::{MissingAction, MissingCondition, MissingNode};
use crate::node::{Node, NodeBehavior, Position};
use crate::task::{ActionTask, ConditionTask};
use crate::tree::{ActionNode, ConditionNode, Inverter, Parallel, Repeater, Selector, Sequencer};

/// A fresh registry with all built-ins installed.
pub fn standard_registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    register_builtins(&registry);
    Arc::new(registry)
}

/// Install the crate's schemas, node factories and placeholder factories.
pub fn register_builtins(registry: &TypeRegistry) {
    register_families(registry);
    register_node_behaviors(registry);
    register_structure(registry);
    register_lists(registry);
}

/// Placeholder factories, so unknown payload types are preserved instead
/// of dropped.
fn register_families(registry: &TypeRegistry) {
    registry.declare_family::<dyn NodeBehavior>(|tag, raw| Box::new(MissingNode::new(tag, raw)));
    registry.declare_family::<dyn ActionTask>(|tag, raw| Box::new(MissingAction::new(tag, raw)));
    registry
        .declare_family::<dyn ConditionTask>(|tag, raw| Box::new(MissingCondition::new(tag, raw)));
}

fn register_node_behaviors(registry: &TypeRegistry) {
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(Sequencer::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(Selector::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(Parallel::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(Inverter::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(Repeater::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(ActionNode::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(ConditionNode::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(StateNode::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(AnyState::default()));
    registry.register_poly::<dyn NodeBehavior>(|| Box::new(ConcurrentState::default()));

    // Composite nodes carry only runtime cursors; their payload is the tag.
    registry.register::<Sequencer>(TypeSchema::builder::<Sequencer>("Sequencer").finish());
    registry.register::<Selector>(TypeSchema::builder::<Selector>("Selector").finish());
    registry.register::<Parallel>(TypeSchema::builder::<Parallel>("Parallel").finish());
    registry.register::<Inverter>(TypeSchema::builder::<Inverter>("Inverter").finish());
    registry.register::<Repeater>(
        TypeSchema::builder::<Repeater>("Repeater")
            .with_field("times", |r: &Repeater| &r.times, |r: &mut Repeater| {
                &mut r.times
            })
            .finish(),
    );
    registry.register::<ActionNode>(
        TypeSchema::builder::<ActionNode>("ActionNode")
            .with_field(
                "actions",
                |n: &ActionNode| &n.actions,
                |n: &mut ActionNode| &mut n.actions,
            )
            .finish(),
    );
    registry.register::<ConditionNode>(
        TypeSchema::builder::<ConditionNode>("ConditionNode")
            .with_field(
                "conditions",
                |n: &ConditionNode| &n.conditions,
                |n: &mut ConditionNode| &mut n.conditions,
            )
            .finish(),
    );
    registry.register::<StateNode>(
        TypeSchema::builder::<StateNode>("StateNode")
            .with_field(
                "actions",
                |s: &StateNode| &s.actions,
                |s: &mut StateNode| &mut s.actions,
            )
            .with_field("policy", |s: &StateNode| &s.policy, |s: &mut StateNode| {
                &mut s.policy
            })
            .finish(),
    );
    registry.register::<AnyState>(TypeSchema::builder::<AnyState>("AnyState").finish());
    registry.register::<ConcurrentState>(
        TypeSchema::builder::<ConcurrentState>("ConcurrentState")
            .with_field(
                "actions",
                |s: &ConcurrentState| &s.actions,
                |s: &mut ConcurrentState| &mut s.actions,
            )
            .finish(),
    );
}

/// The graph container itself and its structural pieces.
fn register_structure(registry: &TypeRegistry) {
    registry.register::<Graph>(
        TypeSchema::builder::<Graph>("Graph")
            .with_field("kind", |g: &Graph| &g.kind, |g: &mut Graph| &mut g.kind)
            .with_field("settings", |g: &Graph| &g.settings, |g: &mut Graph| {
                &mut g.settings
            })
            .with_field("nodes", |g: &Graph| &g.nodes, |g: &mut Graph| &mut g.nodes)
            .with_field(
                "connections",
                |g: &Graph| &g.connections,
                |g: &mut Graph| &mut g.connections,
            )
            .with_field("prime", |g: &Graph| &g.prime, |g: &mut Graph| &mut g.prime)
            .finish(),
    );
    registry.register::<GraphSettings>(
        TypeSchema::builder::<GraphSettings>("GraphSettings")
            .with_field(
                "repeat",
                |s: &GraphSettings| &s.repeat,
                |s: &mut GraphSettings| &mut s.repeat,
            )
            .with_field(
                "update_interval",
                |s: &GraphSettings| &s.update_interval,
                |s: &mut GraphSettings| &mut s.update_interval,
            )
            .finish(),
    );
    registry.register::<Node>(
        TypeSchema::builder::<Node>("Node")
            .with_field("uid", |n: &Node| &n.uid, |n: &mut Node| &mut n.uid)
            .with_field("position", |n: &Node| &n.position, |n: &mut Node| {
                &mut n.position
            })
            .with_field("behavior", |n: &Node| &n.behavior, |n: &mut Node| {
                &mut n.behavior
            })
            .finish(),
    );
    registry.register::<Position>(
        TypeSchema::builder::<Position>("Position")
            .with_field("x", |p: &Position| &p.x, |p: &mut Position| &mut p.x)
            .with_field("y", |p: &Position| &p.y, |p: &mut Position| &mut p.y)
            .finish(),
    );
    registry.register::<Connection>(
        TypeSchema::builder::<Connection>("Connection")
            .with_field("source", |c: &Connection| &c.source, |c: &mut Connection| {
                &mut c.source
            })
            .with_field("target", |c: &Connection| &c.target, |c: &mut Connection| {
                &mut c.target
            })
            .with_field(
                "enabled",
                |c: &Connection| &c.enabled,
                |c: &mut Connection| &mut c.enabled,
            )
            .with_field(
                "call_mode",
                |c: &Connection| &c.call_mode,
                |c: &mut Connection| &mut c.call_mode,
            )
            .with_field("guard", |c: &Connection| &c.guard, |c: &mut Connection| {
                &mut c.guard
            })
            .finish(),
    );
}

/// Task list containers; lists also register as tasks so they can nest.
fn register_lists(registry: &TypeRegistry) {
    registry.register_poly::<dyn ActionTask>(|| Box::new(ActionList::default()));
    registry.register_poly::<dyn ConditionTask>(|| Box::new(ConditionList::default()));

    registry.register::<ActionList>(
        TypeSchema::builder::<ActionList>("ActionList")
            .with_field("mode", |l: &ActionList| &l.mode, |l: &mut ActionList| {
                &mut l.mode
            })
            .with_field(
                "actions",
                |l: &ActionList| &l.actions,
                |l: &mut ActionList| &mut l.actions,
            )
            .finish(),
    );
    registry.register::<ActionEntry>(
        TypeSchema::builder::<ActionEntry>("ActionEntry")
            .with_field(
                "enabled",
                |e: &ActionEntry| &e.slot.enabled,
                |e: &mut ActionEntry| &mut e.slot.enabled,
            )
            .with_field("task", |e: &ActionEntry| &e.task, |e: &mut ActionEntry| {
                &mut e.task
            })
            .finish(),
    );
    registry.register::<ConditionList>(
        TypeSchema::builder::<ConditionList>("ConditionList")
            .with_field("mode", |l: &ConditionList| &l.mode, |l: &mut ConditionList| {
                &mut l.mode
            })
            .with_field(
                "conditions",
                |l: &ConditionList| &l.conditions,
                |l: &mut ConditionList| &mut l.conditions,
            )
            .finish(),
    );
    registry.register::<ConditionEntry>(
        TypeSchema::builder::<ConditionEntry>("ConditionEntry")
            .with_field(
                "enabled",
                |e: &ConditionEntry| &e.slot.enabled,
                |e: &mut ConditionEntry| &mut e.slot.enabled,
            )
            .with_field(
                "invert",
                |e: &ConditionEntry| &e.slot.invert,
                |e: &mut ConditionEntry| &mut e.slot.invert,
            )
            .with_field(
                "task",
                |e: &ConditionEntry| &e.task,
                |e: &mut ConditionEntry| &mut e.task,
            )
            .finish(),
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
