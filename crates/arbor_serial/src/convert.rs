//! Converter chain: per-shape strategies the engine dispatches values through.
//!
//! Converters are tried in a fixed priority order and the first one whose
//! `can_process` accepts the value wins; there is no chaining. Optional,
//! shared and polymorphic wrappers never reach the chain, the engine unwraps
//! them first.

use crate::document::{self, Document, DocumentMap};
use crate::engine::{LoadCtx, SaveCtx};
use crate::error::SerialError;
use crate::reflect::{Kind, Reflect};

// ─────────────────────────────────────────────────────────────────────────────
// Converter Contract
// ─────────────────────────────────────────────────────────────────────────────

/// One value-shape strategy.
///
/// `serialize` returns the document for the value; `deserialize` overwrites
/// the value in place. Shape mismatches in incoming data are recorded as
/// warnings on the pass, only structural failures return an error.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_process(&self, value: &dyn Reflect) -> bool;

    fn serialize(&self, cx: &mut SaveCtx<'_>, value: &dyn Reflect)
        -> Result<Document, SerialError>;

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError>;
}

/// The converter priority list.
pub struct ConverterChain {
    converters: Vec<Box<dyn Converter>>,
}

impl Default for ConverterChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConverterChain {
    /// The built-in set: direct, dictionary, collection, object, external.
    pub fn standard() -> Self {
        Self {
            converters: vec![
                Box::new(DirectConverter),
                Box::new(DictionaryConverter),
                Box::new(CollectionConverter),
                Box::new(ObjectConverter),
                Box::new(ExternalConverter),
            ],
        }
    }

    /// Install a host converter ahead of the built-in set.
    pub fn prepend(&mut self, converter: Box<dyn Converter>) {
        self.converters.insert(0, converter);
    }

    /// First converter accepting the value.
    pub fn pick(&self, value: &dyn Reflect) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.can_process(value))
            .map(|c| c.as_ref())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct
// ─────────────────────────────────────────────────────────────────────────────

/// Scalars: numbers, bools, strings and unit enums.
struct DirectConverter;

impl Converter for DirectConverter {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn can_process(&self, value: &dyn Reflect) -> bool {
        value.kind() == Kind::Primitive
    }

    fn serialize(
        &self,
        _cx: &mut SaveCtx<'_>,
        value: &dyn Reflect,
    ) -> Result<Document, SerialError> {
        value.as_primitive().ok_or(SerialError::WrongKind {
            name: value.type_name(),
            expected: "primitive",
        })
    }

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        if !value.set_primitive(doc) {
            cx.warn(format!(
                "cannot assign {} to {}",
                doc.shape_name(),
                value.type_name()
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dictionary
// ─────────────────────────────────────────────────────────────────────────────

/// Keyed collections in dual shape.
///
/// When every key is a string the map becomes a JSON object; otherwise an
/// array of `{"Key", "Value"}` pairs. Deserialization detects the shape from
/// the document.
struct DictionaryConverter;

impl Converter for DictionaryConverter {
    fn name(&self) -> &'static str {
        "dictionary"
    }

    fn can_process(&self, value: &dyn Reflect) -> bool {
        value.kind() == Kind::Map
    }

    fn serialize(&self, cx: &mut SaveCtx<'_>, value: &dyn Reflect)
        -> Result<Document, SerialError> {
        let type_name = value.type_name();
        let map = value.as_map().ok_or(SerialError::WrongKind {
            name: type_name,
            expected: "map",
        })?;
        let pairs = map.pairs();

        let mut string_keys = Vec::with_capacity(pairs.len());
        for (key, _) in &pairs {
            match key.as_primitive() {
                Some(Document::String(s)) => string_keys.push(s),
                _ => {
                    string_keys.clear();
                    break;
                }
            }
        }

        if string_keys.len() == pairs.len() {
            let mut out = DocumentMap::new();
            for (index, (_, item)) in pairs.iter().enumerate() {
                let key = &string_keys[index];
                if document::is_reserved_key(key) {
                    cx.warn(format!("map key `{key}` collides with a reserved key; skipped"));
                    continue;
                }
                let doc = cx.save_in(key.clone(), *item)?;
                out.insert(key.clone(), doc);
            }
            return Ok(Document::Object(out));
        }

        let mut out = Vec::with_capacity(pairs.len());
        for (index, (key, item)) in pairs.iter().enumerate() {
            let mut entry = DocumentMap::new();
            entry.insert("Key".to_string(), cx.save_in(format!("[{index}].Key"), *key)?);
            entry.insert(
                "Value".to_string(),
                cx.save_in(format!("[{index}].Value"), *item)?,
            );
            out.push(Document::Object(entry));
        }
        Ok(Document::Array(out))
    }

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        let type_name = value.type_name();
        let map = value.as_map_mut().ok_or(SerialError::WrongKind {
            name: type_name,
            expected: "map",
        })?;

        match doc {
            Document::Object(entries) => {
                map.clear();
                for (key, item_doc) in entries {
                    if document::is_reserved_key(key) {
                        continue;
                    }
                    let mut k = map.spawn_key();
                    if !k.set_primitive(&Document::String(key.clone())) {
                        cx.warn(format!("map key `{key}` does not fit {}", k.type_name()));
                        continue;
                    }
                    let mut v = map.spawn_value();
                    cx.load_in(key.clone(), item_doc, v.as_mut())?;
                    if !map.insert_boxed(k, v) {
                        cx.warn(format!("map entry `{key}` replaced an earlier entry"));
                    }
                }
            }
            Document::Array(items) => {
                map.clear();
                for (index, item) in items.iter().enumerate() {
                    let Some(entry) = item.as_object() else {
                        cx.warn(format!("pair {index} is not an object; skipped"));
                        continue;
                    };
                    let Some(key_doc) = entry.get("Key") else {
                        cx.warn(format!("pair {index} is missing `Key`; skipped"));
                        continue;
                    };
                    let mut k = map.spawn_key();
                    cx.load_in(format!("[{index}].Key"), key_doc, k.as_mut())?;
                    let mut v = map.spawn_value();
                    match entry.get("Value") {
                        Some(value_doc) => {
                            cx.load_in(format!("[{index}].Value"), value_doc, v.as_mut())?;
                        }
                        None => {
                            cx.warn(format!("pair {index} is missing `Value`; default kept"));
                        }
                    }
                    if !map.insert_boxed(k, v) {
                        cx.warn(format!("pair {index} replaced an earlier entry"));
                    }
                }
            }
            other => {
                cx.warn(format!(
                    "expected object or pair array for {type_name}, found {}",
                    other.shape_name()
                ));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Collection
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered sequences. Overwriting reuses existing elements in place and
/// drops the tail, so shared element state survives a reload where possible.
struct CollectionConverter;

impl Converter for CollectionConverter {
    fn name(&self) -> &'static str {
        "collection"
    }

    fn can_process(&self, value: &dyn Reflect) -> bool {
        value.kind() == Kind::List
    }

    fn serialize(&self, cx: &mut SaveCtx<'_>, value: &dyn Reflect)
        -> Result<Document, SerialError> {
        let list = value.as_list().ok_or(SerialError::WrongKind {
            name: value.type_name(),
            expected: "list",
        })?;
        let mut out = Vec::with_capacity(list.len());
        for index in 0..list.len() {
            let Some(item) = list.get(index) else {
                break;
            };
            out.push(cx.save_in(format!("[{index}]"), item)?);
        }
        Ok(Document::Array(out))
    }

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        let type_name = value.type_name();
        let list = value.as_list_mut().ok_or(SerialError::WrongKind {
            name: type_name,
            expected: "list",
        })?;
        let Some(items) = doc.as_array() else {
            cx.warn(format!(
                "expected array for {type_name}, found {}",
                doc.shape_name()
            ));
            return Ok(());
        };

        for (index, item_doc) in items.iter().enumerate() {
            if let Some(slot) = list.get_mut(index) {
                cx.load_in(format!("[{index}]"), item_doc, slot)?;
            } else {
                let mut fresh = list.spawn_item();
                cx.load_in(format!("[{index}]"), item_doc, fresh.as_mut())?;
                if !list.push_boxed(fresh) {
                    cx.warn(format!("element {index} rejected by {type_name}"));
                }
            }
        }
        list.truncate(items.len());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reflected Object
// ─────────────────────────────────────────────────────────────────────────────

/// Schema-driven struct walk honoring field flags.
struct ObjectConverter;

impl Converter for ObjectConverter {
    fn name(&self) -> &'static str {
        "object"
    }

    fn can_process(&self, value: &dyn Reflect) -> bool {
        value.kind() == Kind::Struct
    }

    fn serialize(&self, cx: &mut SaveCtx<'_>, value: &dyn Reflect)
        -> Result<Document, SerialError> {
        let type_name = value.type_name();
        let entry = cx
            .registry
            .entry_for(value.as_any().type_id())
            .ok_or_else(|| SerialError::NoSchema(type_name.to_string()))?;

        let mut out = DocumentMap::new();
        for field in entry.schema.fields() {
            if field.flags().write_only {
                continue;
            }
            let Some(view) = field.get(value) else {
                cx.warn(format!("field `{}` is not readable on {type_name}", field.name()));
                continue;
            };
            let doc = cx.save_in(field.name(), view)?;
            out.insert(field.name().to_string(), doc);
        }
        Ok(Document::Object(out))
    }

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        let type_name = value.type_name();
        let Some(entries) = doc.as_object() else {
            cx.warn(format!(
                "expected object for {type_name}, found {}",
                doc.shape_name()
            ));
            return Ok(());
        };
        let entry = cx
            .registry
            .entry_for(value.as_any().type_id())
            .ok_or_else(|| SerialError::NoSchema(type_name.to_string()))?;
        let schema = &entry.schema;

        for key in entries.keys() {
            if document::is_reserved_key(key) {
                continue;
            }
            if schema.field(key).is_none() {
                cx.warn(format!("unknown member `{key}` on {type_name}"));
            }
        }

        for field in schema.fields() {
            if field.flags().read_only {
                continue;
            }
            match entries.get(field.name()) {
                Some(field_doc) => {
                    let Some(slot) = field.get_mut(value) else {
                        cx.warn(format!(
                            "field `{}` is not writable on {type_name}",
                            field.name()
                        ));
                        continue;
                    };
                    cx.load_in(field.name(), field_doc, slot)?;
                }
                None if field.flags().auto_instance => {
                    if let Some(slot) = field.get_mut(value) {
                        if let Some(optional) = slot.as_optional_mut() {
                            optional.ensure_default();
                        }
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External Reference
// ─────────────────────────────────────────────────────────────────────────────

/// Host-object handles stored as reference-table indices, 0 meaning null.
struct ExternalConverter;

impl Converter for ExternalConverter {
    fn name(&self) -> &'static str {
        "external"
    }

    fn can_process(&self, value: &dyn Reflect) -> bool {
        value.kind() == Kind::External
    }

    fn serialize(&self, cx: &mut SaveCtx<'_>, value: &dyn Reflect)
        -> Result<Document, SerialError> {
        let ext = value.as_external().ok_or(SerialError::WrongKind {
            name: value.type_name(),
            expected: "external",
        })?;
        let index = match ext.handle() {
            Some(handle) => cx.refs.intern(handle),
            None => 0,
        };
        Ok(Document::from(index))
    }

    fn deserialize(
        &self,
        cx: &mut LoadCtx<'_>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        let type_name = value.type_name();
        let ext = value.as_external_mut().ok_or(SerialError::WrongKind {
            name: type_name,
            expected: "external",
        })?;
        let Some(raw) = doc.as_f64() else {
            cx.warn(format!(
                "expected reference index for {type_name}, found {}",
                doc.shape_name()
            ));
            ext.set_handle(None);
            return Ok(());
        };
        if raw < 0.0 || raw.fract() != 0.0 {
            cx.warn(format!("reference index {raw} is not a table slot"));
            ext.set_handle(None);
            return Ok(());
        }
        let index = raw as usize;
        if index == 0 {
            ext.set_handle(None);
            return Ok(());
        }
        match cx.refs.resolve(index) {
            Some(handle) => ext.set_handle(Some(handle.clone())),
            None => {
                cx.warn(format!("reference index {index} is not in the reference table"));
                ext.set_handle(None);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::refs::ExternalRef;

    #[derive(Default)]
    struct Crate {
        weight: f64,
    }
    crate::reflect_struct!(Crate);

    #[test]
    fn test_chain_picks_by_kind() {
        let chain = ConverterChain::standard();

        assert_eq!(chain.pick(&5_i32).unwrap().name(), "direct");
        assert_eq!(chain.pick(&String::new()).unwrap().name(), "direct");

        let list: Vec<i32> = Vec::new();
        assert_eq!(chain.pick(&list).unwrap().name(), "collection");

        let map: HashMap<String, i32> = HashMap::new();
        assert_eq!(chain.pick(&map).unwrap().name(), "dictionary");

        let boxed = Crate { weight: 4.0 };
        assert_eq!(chain.pick(&boxed).unwrap().name(), "object");

        assert_eq!(chain.pick(&ExternalRef::none()).unwrap().name(), "external");
    }

    struct NullStub;

    impl Converter for NullStub {
        fn name(&self) -> &'static str {
            "null-stub"
        }
        fn can_process(&self, value: &dyn Reflect) -> bool {
            value.kind() == Kind::Primitive
        }
        fn serialize(
            &self,
            _cx: &mut SaveCtx<'_>,
            _value: &dyn Reflect,
        ) -> Result<Document, SerialError> {
            Ok(Document::Null)
        }
        fn deserialize(
            &self,
            _cx: &mut LoadCtx<'_>,
            _doc: &Document,
            _value: &mut dyn Reflect,
        ) -> Result<(), SerialError> {
            Ok(())
        }
    }

    #[test]
    fn test_prepended_converter_wins() {
        let mut chain = ConverterChain::standard();
        chain.prepend(Box::new(NullStub));
        assert_eq!(chain.pick(&5_i32).unwrap().name(), "null-stub");
    }
}
