//! JSON-like document value model used by the serializer.
//!
//! Every serialize pass produces a `Document` tree first and turns it into
//! JSON text at the very end; deserialization parses text into a `Document`
//! tree and walks that. Object entries keep insertion order so emitted JSON
//! is stable across passes.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::SerialError;

// ─────────────────────────────────────────────────────────────────────────────
// Reserved Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Polymorphic type discriminator key.
pub const KEY_TYPE: &str = "$type";
/// Cycle identity key, assigned on the first encounter of a shared value.
pub const KEY_ID: &str = "$id";
/// Back-reference key pointing at a previously assigned `$id`.
pub const KEY_REF: &str = "$ref";
/// Payload key used when a tagged or identified value is not itself an object.
pub const KEY_CONTENT: &str = "$content";

/// Check whether a key is reserved for serializer metadata.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('$')
}

// ─────────────────────────────────────────────────────────────────────────────
// Document Value
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered string-keyed map of document values.
pub type DocumentMap = IndexMap<String, Document>;

/// A JSON-like value tree.
///
/// Numbers are stored as `f64` regardless of their textual form; integral
/// values are emitted without a fractional part.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Document {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Document>),
    Object(DocumentMap),
}

impl Document {
    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    /// Get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Document::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as array slice.
    pub fn as_array(&self) -> Option<&[Document]> {
        match self {
            Document::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get as mutable array.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Document>> {
        match self {
            Document::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get as object map.
    pub fn as_object(&self) -> Option<&DocumentMap> {
        match self {
            Document::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Get as mutable object map.
    pub fn as_object_mut(&mut self) -> Option<&mut DocumentMap> {
        match self {
            Document::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Get a keyed entry from an object.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short label for the value's shape, used in findings and errors.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Document::Null => "null",
            Document::Bool(_) => "bool",
            Document::Number(_) => "number",
            Document::String(_) => "string",
            Document::Array(_) => "array",
            Document::Object(_) => "object",
        }
    }
}

/// Build an object map whose first entry is `key`, followed by `rest`.
///
/// Used to front-insert metadata keys (`$type`, `$id`) so they lead the
/// emitted object.
pub fn lead(key: impl Into<String>, value: Document, rest: DocumentMap) -> DocumentMap {
    let mut map = DocumentMap::with_capacity(rest.len() + 1);
    map.insert(key.into(), value);
    map.extend(rest);
    map
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Text
// ─────────────────────────────────────────────────────────────────────────────

impl Document {
    /// Emit compact JSON text.
    pub fn to_json(&self) -> Result<String, SerialError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Emit pretty-printed JSON text.
    pub fn to_json_pretty(&self) -> Result<String, SerialError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON text into a document tree.
    pub fn from_json(text: &str) -> Result<Document, SerialError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Ok(Document::from(value))
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Document::Null => serializer.serialize_unit(),
            Document::Bool(b) => serializer.serialize_bool(*b),
            Document::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Document::String(s) => serializer.serialize_str(s),
            Document::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Document::Object(map) => {
                let mut obj = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    obj.serialize_entry(key, value)?;
                }
                obj.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Document::from(value))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// serde_json::Value Interop
// ─────────────────────────────────────────────────────────────────────────────

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Document::Null,
            serde_json::Value::Bool(b) => Document::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Document::Number(f),
                None => Document::Null,
            },
            serde_json::Value::String(s) => Document::String(s),
            serde_json::Value::Array(items) => {
                Document::Array(items.into_iter().map(Document::from).collect())
            }
            serde_json::Value::Object(map) => {
                let entries = map.into_iter().map(|(k, v)| (k, Document::from(v))).collect();
                Document::Object(entries)
            }
        }
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Null => serde_json::Value::Null,
            Document::Bool(b) => serde_json::Value::Bool(b),
            Document::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    serde_json::Value::Number((n as i64).into())
                } else {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Document::String(s) => serde_json::Value::String(s),
            Document::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            Document::Object(map) => {
                let entries = map
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect();
                serde_json::Value::Object(entries)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// From Implementations
// ─────────────────────────────────────────────────────────────────────────────

impl From<()> for Document {
    fn from(_: ()) -> Self {
        Document::Null
    }
}

impl From<bool> for Document {
    fn from(v: bool) -> Self {
        Document::Bool(v)
    }
}

impl From<f64> for Document {
    fn from(v: f64) -> Self {
        Document::Number(v)
    }
}

impl From<f32> for Document {
    fn from(v: f32) -> Self {
        Document::Number(v as f64)
    }
}

impl From<i32> for Document {
    fn from(v: i32) -> Self {
        Document::Number(v as f64)
    }
}

impl From<i64> for Document {
    fn from(v: i64) -> Self {
        Document::Number(v as f64)
    }
}

impl From<u32> for Document {
    fn from(v: u32) -> Self {
        Document::Number(v as f64)
    }
}

impl From<u64> for Document {
    fn from(v: u64) -> Self {
        Document::Number(v as f64)
    }
}

impl From<usize> for Document {
    fn from(v: usize) -> Self {
        Document::Number(v as f64)
    }
}

impl From<&str> for Document {
    fn from(v: &str) -> Self {
        Document::String(v.to_string())
    }
}

impl From<String> for Document {
    fn from(v: String) -> Self {
        Document::String(v)
    }
}

impl From<Vec<Document>> for Document {
    fn from(items: Vec<Document>) -> Self {
        Document::Array(items)
    }
}

impl From<DocumentMap> for Document {
    fn from(map: DocumentMap) -> Self {
        Document::Object(map)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
