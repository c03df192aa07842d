//! Errors for refused graph mutations and lifecycle misuse.

use arbor_serial::SerialError;

use crate::graph::GraphKind;

/// Errors returned by structural edits and graph lifecycle calls.
///
/// A refused operation leaves the graph exactly as it was; none of these
/// variants signal partial mutation.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Serialization failed: {0}")]
    Serial(#[from] SerialError),

    #[error("Node index {0} is out of range")]
    NodeOutOfRange(usize),

    #[error("Connection index {0} is out of range")]
    ConnectionOutOfRange(usize),

    // The field cannot be called `source`: thiserror reserves that name for
    // the error-source chain, and `usize` is not an `Error`.
    #[error("Nodes {from} and {target} are already connected")]
    AlreadyConnected { from: usize, target: usize },

    #[error("Node {0} can only connect to itself inside a state machine")]
    SelfConnection(usize),

    #[error("Node {node} allows at most {limit} {direction} connections")]
    ConnectionLimit {
        node: usize,
        limit: usize,
        direction: &'static str,
    },

    #[error("Graph has no prime node")]
    NoPrime,

    #[error("Graph is already running")]
    AlreadyRunning,

    #[error("Graph is running; stop it before modifying it")]
    StillRunning,

    #[error("Expected a {expected} graph, found a {found} graph")]
    KindMismatch { expected: GraphKind, found: GraphKind },

    #[error("Node {0} cannot be entered as a state")]
    NotAState(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GraphError::NodeOutOfRange(7);
        assert_eq!(err.to_string(), "Node index 7 is out of range");

        let err = GraphError::ConnectionLimit {
            node: 2,
            limit: 1,
            direction: "outgoing",
        };
        assert_eq!(
            err.to_string(),
            "Node 2 allows at most 1 outgoing connections"
        );

        let err = GraphError::KindMismatch {
            expected: GraphKind::StateMachine,
            found: GraphKind::BehaviourTree,
        };
        assert_eq!(
            err.to_string(),
            "Expected a state machine graph, found a behaviour tree graph"
        );
    }
}
