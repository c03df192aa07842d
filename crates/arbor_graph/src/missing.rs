//! Placeholders standing in for payload types that are not registered.
//!
//! A graph saved with a custom node or task can be loaded on a build that
//! no longer ships that type. Instead of dropping the payload, the loader
//! parks the original discriminator and raw document in one of these
//! placeholders; saving again re-emits both verbatim, so nothing is lost
//! in a load/save round trip. At runtime the placeholders are inert: a
//! missing node errors, a missing action errors, a missing condition is
//! never satisfied.

use std::any::Any;

use arbor_serial::{Document, Kind, Reflect};

use crate::graph::Graph;
use crate::node::NodeBehavior;
use crate::status::Status;
use crate::task::{ActionTask, ConditionTask, ExecContext};

macro_rules! recovery_reflect {
    ($ty:ident, $tag:literal) => {
        impl Reflect for $ty {
            fn type_name(&self) -> &'static str {
                $tag
            }
            fn kind(&self) -> Kind {
                Kind::Struct
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
            fn into_any(self: Box<Self>) -> Box<dyn Any> {
                self
            }
            fn as_reflect(&self) -> &dyn Reflect {
                self
            }
            fn as_reflect_mut(&mut self) -> &mut dyn Reflect {
                self
            }
            fn recovery(&self) -> Option<(&str, &Document)> {
                Some((&self.tag, &self.raw))
            }
        }
    };
}

/// Stand-in for an unregistered node behavior.
#[derive(Debug)]
pub struct MissingNode {
    tag: String,
    raw: Document,
}

impl MissingNode {
    pub fn new(tag: &str, raw: Document) -> Self {
        Self {
            tag: tag.to_string(),
            raw,
        }
    }

    /// Discriminator the payload was saved under.
    pub fn original_tag(&self) -> &str {
        &self.tag
    }
}

recovery_reflect!(MissingNode, "MissingNode");

impl NodeBehavior for MissingNode {
    fn title(&self) -> &str {
        &self.tag
    }

    fn on_execute(
        &mut self,
        _graph: &mut Graph,
        _index: usize,
        _cx: &mut ExecContext<'_>,
    ) -> Status {
        Status::Error
    }
}

/// Stand-in for an unregistered action task.
#[derive(Debug)]
pub struct MissingAction {
    tag: String,
    raw: Document,
}

impl MissingAction {
    pub fn new(tag: &str, raw: Document) -> Self {
        Self {
            tag: tag.to_string(),
            raw,
        }
    }

    pub fn original_tag(&self) -> &str {
        &self.tag
    }
}

recovery_reflect!(MissingAction, "MissingAction");

impl ActionTask for MissingAction {
    fn label(&self) -> &str {
        &self.tag
    }

    fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
        cx.error(format!("missing action type '{}'", self.tag));
    }
}

/// Stand-in for an unregistered condition task.
#[derive(Debug)]
pub struct MissingCondition {
    tag: String,
    raw: Document,
}

impl MissingCondition {
    pub fn new(tag: &str, raw: Document) -> Self {
        Self {
            tag: tag.to_string(),
            raw,
        }
    }

    pub fn original_tag(&self) -> &str {
        &self.tag
    }
}

recovery_reflect!(MissingCondition, "MissingCondition");

impl ConditionTask for MissingCondition {
    fn label(&self) -> &str {
        &self.tag
    }

    fn on_check(&mut self, _cx: &mut ExecContext<'_>) -> bool {
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;
    use crate::task::{ActionSlot, Agent, ConditionSlot};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_placeholders_carry_recovery() {
        let raw = Document::from(serde_json::json!({ "speed": 4.0 }));
        let node = MissingNode::new("PursueTarget", raw);
        let (tag, doc) = node.recovery().unwrap();
        assert_eq!(tag, "PursueTarget");
        assert!(doc.as_object().is_some());
        assert_eq!(node.title(), "PursueTarget");
    }

    #[test]
    fn test_missing_action_errors_out() {
        let mut board = Blackboard::new();
        let mut cx = ExecContext::new(Agent::default(), &mut board, 0.1, 1);
        let mut slot = ActionSlot::default();
        let mut action = MissingAction::new("PlayJingle", Document::default());

        assert_eq!(slot.tick(&mut action, &mut cx), Status::Error);
    }

    #[test]
    fn test_missing_condition_never_passes() {
        let mut board = Blackboard::new();
        let mut cx = ExecContext::new(Agent::default(), &mut board, 0.1, 1);
        let mut slot = ConditionSlot::default();
        let mut cond = MissingCondition::new("SeesPlayer", Document::default());

        assert!(!slot.check(&mut cond, &mut cx));
    }
}
