//! Execution status shared by nodes, connections and task slots.

use std::fmt;

/// Where a node, connection or task currently stands in its run.
///
/// `Resting` is the rewound idle state; `Running` means in flight this tick;
/// the three terminal states latch until the owner is reset. `Optional` marks
/// a participant that was skipped (disabled or inert) and should count
/// neither for nor against its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Resting,
    Running,
    Success,
    Failure,
    Error,
    Optional,
}

impl Status {
    /// True for `Success`, `Failure` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failure | Status::Error)
    }

    /// True only for `Running`.
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running)
    }

    /// True for the two failing terminal states.
    pub fn is_failure(self) -> bool {
        matches!(self, Status::Failure | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Resting => write!(f, "resting"),
            Status::Running => write!(f, "running"),
            Status::Success => write!(f, "success"),
            Status::Failure => write!(f, "failure"),
            Status::Error => write!(f, "error"),
            Status::Optional => write!(f, "optional"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(Status::Success.is_terminal());
        assert!(Status::Failure.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Resting.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::Optional.is_terminal());
    }

    #[test]
    fn test_failure_covers_error() {
        assert!(Status::Failure.is_failure());
        assert!(Status::Error.is_failure());
        assert!(!Status::Success.is_failure());
    }
}
