//! Non-fatal findings accumulated across a serialize or deserialize pass.
//!
//! Shape mismatches, unknown members and recovered data are findings, not
//! failures: the pass keeps going and reports everything it noticed at the
//! end. Hard failures use [`crate::SerialError`] instead.

use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Findings
// ─────────────────────────────────────────────────────────────────────────────

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Data was skipped or substituted; the result is usable.
    Warning,
    /// Data was lost or replaced by a placeholder.
    Recovered,
}

/// One finding, located by the document path it occurred at.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Recovered => "recovered",
        };
        if self.path.is_empty() {
            write!(f, "{}: {}", tag, self.message)
        } else {
            write!(f, "{} at {}: {}", tag, self.path, self.message)
        }
    }
}

/// Ordered collection of findings from one pass.
///
/// Combines monoidally: `a += b` appends `b`'s findings after `a`'s, so
/// nested operations aggregate without early exit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notes {
    items: Vec<Note>,
}

impl Notes {
    /// An empty, clean result.
    pub fn none() -> Self {
        Self::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.items.push(Note {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        });
    }

    /// Record a recovered data loss.
    pub fn recovered(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.items.push(Note {
            severity: Severity::Recovered,
            path: path.into(),
            message: message.into(),
        });
    }

    /// Append all of `other`'s findings.
    pub fn merge(&mut self, other: Notes) {
        self.items.extend(other.items);
    }

    /// True when nothing was recorded.
    pub fn is_clean(&self) -> bool {
        self.items.is_empty()
    }

    /// True when at least one finding is [`Severity::Recovered`].
    pub fn has_recovered(&self) -> bool {
        self.items
            .iter()
            .any(|n| n.severity == Severity::Recovered)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Note] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.items.iter()
    }
}

impl std::ops::AddAssign for Notes {
    fn add_assign(&mut self, rhs: Self) {
        self.merge(rhs);
    }
}

impl fmt::Display for Notes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.items.is_empty() {
            return write!(f, "clean");
        }
        for (i, note) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{note}")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
