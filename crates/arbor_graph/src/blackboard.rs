//! Variable store graphs read and write while they run.
//!
//! The blackboard lives outside the graph; the host owns one per agent (or
//! shares one across a squad) and passes it into every update. Entries keep
//! insertion order so dumps and saved snapshots are stable.

use arbor_serial::Document;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Named variables backing task parameters and inter-node signalling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    vars: IndexMap<String, Document>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, inserting or overwriting.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Document>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.vars.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.vars.get(key).and_then(Document::as_bool)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.vars.get(key).and_then(Document::as_f64)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(Document::as_str)
    }

    /// Remove a variable, returning its last value.
    pub fn remove(&mut self, key: &str) -> Option<Document> {
        self.vars.shift_remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Document)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_typed_accessors() {
        let mut board = Blackboard::new();
        board.set("alert", true);
        board.set("speed", 4.5);
        board.set("target", "gate");

        assert_eq!(board.get_bool("alert"), Some(true));
        assert_eq!(board.get_number("speed"), Some(4.5));
        assert_eq!(board.get_str("target"), Some("gate"));
        assert_eq!(board.get_bool("speed"), None);
        assert_eq!(board.get("ghost"), None);
    }

    #[test]
    fn test_overwrite_keeps_insertion_order() {
        let mut board = Blackboard::new();
        board.set("a", 1);
        board.set("b", 2);
        board.set("a", 3);

        let keys: Vec<&str> = board.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(board.get_number("a"), Some(3.0));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut board = Blackboard::new();
        board.set("ammo", 30);
        board.set("name", "scout");

        let json = serde_json::to_string(&board).unwrap();
        let back: Blackboard = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }
}
