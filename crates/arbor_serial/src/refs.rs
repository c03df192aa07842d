//! External-object reference table.
//!
//! Host-owned objects (assets, components) are never embedded in the JSON;
//! they serialize as an integer index into a table of opaque handles carried
//! alongside the text. Index 0 is reserved for null.

use serde::{Deserialize, Serialize};

use crate::reflect::{Kind, Reflect};

// ─────────────────────────────────────────────────────────────────────────────
// Handles
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identifier for a host-owned object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalHandle {
    /// Host-side type label, e.g. `"Texture"`.
    pub type_id: String,
    /// Host-side lookup key.
    pub key: String,
}

impl ExternalHandle {
    pub fn new(type_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            key: key.into(),
        }
    }
}

/// Ordered handle table for one serialized payload.
///
/// Interning is first-seen-wins: the same handle always maps to the same
/// index within a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTable {
    entries: Vec<Option<ExternalHandle>>,
}

impl Default for ReferenceTable {
    fn default() -> Self {
        // Slot 0 is the null entry.
        Self {
            entries: vec![None],
        }
    }
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `handle`, adding it on first sight. Never returns 0.
    pub fn intern(&mut self, handle: &ExternalHandle) -> usize {
        for (index, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.as_ref() == Some(handle) {
                return index;
            }
        }
        self.entries.push(Some(handle.clone()));
        self.entries.len() - 1
    }

    /// Handle at `index`; `None` for 0, empty slots and out-of-range lookups.
    pub fn resolve(&self, index: usize) -> Option<&ExternalHandle> {
        if index == 0 {
            return None;
        }
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Number of slots including the reserved null slot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when only the null slot exists.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Real handles and their indices, in interning order.
    pub fn handles(&self) -> impl Iterator<Item = (usize, &ExternalHandle)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|h| (i, h)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExternalRef
// ─────────────────────────────────────────────────────────────────────────────

/// View exposed by values stored as reference-table indices.
pub trait ReflectExternal {
    fn handle(&self) -> Option<&ExternalHandle>;
    fn set_handle(&mut self, handle: Option<ExternalHandle>);
}

/// Field type holding an optional host-object handle.
///
/// Declines cycle support and type tags; the emitted form is a bare integer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalRef(Option<ExternalHandle>);

impl ExternalRef {
    pub fn new(handle: ExternalHandle) -> Self {
        Self(Some(handle))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&ExternalHandle> {
        self.0.as_ref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl From<ExternalHandle> for ExternalRef {
    fn from(handle: ExternalHandle) -> Self {
        Self(Some(handle))
    }
}

impl ReflectExternal for ExternalRef {
    fn handle(&self) -> Option<&ExternalHandle> {
        self.0.as_ref()
    }
    fn set_handle(&mut self, handle: Option<ExternalHandle>) {
        self.0 = handle;
    }
}

impl Reflect for ExternalRef {
    fn type_name(&self) -> &'static str {
        "ExternalRef"
    }
    fn kind(&self) -> Kind {
        Kind::External
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
    fn as_reflect(&self) -> &dyn Reflect {
        self
    }
    fn as_reflect_mut(&mut self) -> &mut dyn Reflect {
        self
    }
    fn as_external(&self) -> Option<&dyn ReflectExternal> {
        Some(self)
    }
    fn as_external_mut(&mut self) -> Option<&mut dyn ReflectExternal> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_zero_is_reserved() {
        let table = ReferenceTable::new();
        assert_eq!(table.len(), 1);
        assert!(table.is_empty());
        assert!(table.resolve(0).is_none());
    }

    #[test]
    fn test_intern_is_first_seen_wins() {
        let mut table = ReferenceTable::new();
        let tex = ExternalHandle::new("Texture", "grass.png");
        let mesh = ExternalHandle::new("Mesh", "rock.obj");

        assert_eq!(table.intern(&tex), 1);
        assert_eq!(table.intern(&mesh), 2);
        assert_eq!(table.intern(&tex), 1);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_resolve_out_of_range_is_none() {
        let mut table = ReferenceTable::new();
        table.intern(&ExternalHandle::new("Texture", "grass.png"));
        assert!(table.resolve(99).is_none());
        assert!(table.resolve(1).is_some());
    }
}
