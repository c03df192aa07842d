//! Arbor Graph - Behaviour tree and state machine execution over one node-graph core
//!
//! A [`Graph`] is an arena of nodes joined by ordered connections; the same
//! structure runs as a behaviour tree (root-driven, statuses bubble up) or
//! as a state machine (one current state, guarded transitions). Node
//! payloads and task lists are trait objects behind `Poly` slots, so whole
//! graphs serialize through `arbor_serial` with unknown types preserved as
//! placeholders.
//!
//! Execution is explicit and frame-driven: the host calls `update` with a
//! delta time, tasks talk back through an [`ExecContext`], and agents read
//! and write a shared [`Blackboard`].

mod blackboard;
mod connection;
mod error;
mod graph;
mod lists;
mod machine;
mod manager;
mod missing;
mod node;
mod register;
mod runner;
mod status;
mod task;
mod tree;

pub use blackboard::*;
pub use connection::*;
pub use error::*;
pub use graph::*;
pub use lists::*;
pub use machine::*;
pub use manager::*;
pub use missing::*;
pub use node::*;
pub use register::*;
pub use runner::*;
pub use status::*;
pub use task::*;
pub use tree::*;
