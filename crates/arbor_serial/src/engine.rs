//! The serializer engine: entry points, pass contexts and the wrapper
//! handling that runs ahead of converter dispatch.
//!
//! A pass walks the value graph recursively. Before a value reaches the
//! converter chain the engine unwraps the shapes with engine-level meaning:
//! missing-type placeholders re-emit their captured document, optionals are
//! transparent, shared handles get `$id`/`$ref` cycle bookkeeping and poly
//! slots get their `$type` discriminator.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::convert::{Converter, ConverterChain};
use crate::document::{self, Document, DocumentMap};
use crate::error::SerialError;
use crate::notes::Notes;
use crate::reflect::{Kind, Reflect, ReflectShared};
use crate::refs::ReferenceTable;
use crate::registry::TypeRegistry;

/// Nesting bound for one pass. Only pathological graphs get here: a literal
/// walk over a cyclic graph, or hostile hand-built documents.
const MAX_DEPTH: usize = 128;

// ─────────────────────────────────────────────────────────────────────────────
// Options & Output
// ─────────────────────────────────────────────────────────────────────────────

/// Switches applied to every pass run through one serializer.
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Pretty-print emitted JSON.
    pub pretty: bool,
    /// Walk shared handles literally instead of emitting `$id`/`$ref` pairs.
    /// Cyclic graphs fail with a depth error in this mode.
    pub ignore_cycle_references: bool,
}

/// Audit hook invoked with every reflected struct and its serialized members.
pub type Observer = dyn Fn(&dyn Reflect, &mut DocumentMap) + Send + Sync;

/// Product of one save pass.
#[derive(Debug, Clone)]
pub struct SaveOutput {
    pub json: String,
    pub refs: ReferenceTable,
    pub notes: Notes,
}

// ─────────────────────────────────────────────────────────────────────────────
// Save Pass
// ─────────────────────────────────────────────────────────────────────────────

/// State of one serialize pass; converters call back into it for nested
/// values and warnings.
pub struct SaveCtx<'a> {
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) chain: &'a ConverterChain,
    pub(crate) options: &'a SerializeOptions,
    pub(crate) refs: &'a mut ReferenceTable,
    pub(crate) notes: Notes,
    observer: Option<&'a Observer>,
    seen: HashMap<usize, u64>,
    next_id: u64,
    path: Vec<String>,
    depth: usize,
}

impl<'a> SaveCtx<'a> {
    /// Serialize one value, running the wrapper stages then the chain.
    pub fn save_value(&mut self, value: &dyn Reflect) -> Result<Document, SerialError> {
        if self.depth >= MAX_DEPTH {
            return Err(SerialError::DepthExceeded(MAX_DEPTH));
        }
        self.depth += 1;
        let result = self.save_stages(value);
        self.depth -= 1;
        result
    }

    /// Serialize a nested value under a path segment.
    pub fn save_in(
        &mut self,
        segment: impl Into<String>,
        value: &dyn Reflect,
    ) -> Result<Document, SerialError> {
        self.path.push(segment.into());
        let result = self.save_value(value);
        self.path.pop();
        result
    }

    /// Record a warning at the current path.
    pub fn warn(&mut self, message: impl Into<String>) {
        let path = join_path(&self.path);
        self.notes.warn(path, message);
    }

    fn save_stages(&mut self, value: &dyn Reflect) -> Result<Document, SerialError> {
        // Placeholders re-emit the document they were built from, verbatim.
        if let Some((_, raw)) = value.recovery() {
            return Ok(raw.clone());
        }

        // Optionals are transparent; an empty one is null.
        if let Some(optional) = value.as_optional() {
            return match optional.get() {
                Some(inner) => self.save_value(inner),
                None => Ok(Document::Null),
            };
        }

        // Shared handles: identity map for cycles, unless the pass walks
        // references literally.
        if let Some(shared) = value.as_shared() {
            if self.options.ignore_cycle_references {
                return self.save_shared_content(shared);
            }
            let identity = shared.identity();
            if let Some(&id) = self.seen.get(&identity) {
                let mut map = DocumentMap::new();
                map.insert(document::KEY_REF.to_string(), Document::from(id));
                return Ok(Document::Object(map));
            }
            let id = self.next_id;
            self.next_id += 1;
            self.seen.insert(identity, id);
            let inner = self.save_shared_content(shared)?;
            return Ok(identify_document(id, inner));
        }

        // Poly slots carry their payload's discriminator.
        if let Some(poly) = value.as_poly() {
            let Some(payload) = poly.value() else {
                return Ok(Document::Null);
            };
            if payload.recovery().is_some() {
                // The captured document already starts with its tag.
                return self.save_value(payload);
            }
            let Some(tag) = poly.tag() else {
                return Ok(Document::Null);
            };
            let inner = self.save_value(payload)?;
            return Ok(tag_document(tag, inner));
        }

        let chain = self.chain;
        let Some(converter) = chain.pick(value) else {
            self.warn(format!(
                "no converter accepts {} ({:?})",
                value.type_name(),
                value.kind()
            ));
            return Ok(Document::Null);
        };
        let mut doc = converter.serialize(self, value)?;

        if value.kind() == Kind::Struct {
            if let (Some(observer), Document::Object(map)) = (self.observer, &mut doc) {
                observer(value, map);
            }
        }
        Ok(doc)
    }

    fn save_shared_content(
        &mut self,
        shared: &dyn ReflectShared,
    ) -> Result<Document, SerialError> {
        let mut doc = Document::Null;
        let mut failure = None;
        shared.visit(&mut |inner| match self.save_value(inner) {
            Ok(d) => doc = d,
            Err(e) => failure = Some(e),
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(doc),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Load Pass
// ─────────────────────────────────────────────────────────────────────────────

/// State of one deserialize pass.
pub struct LoadCtx<'a> {
    pub(crate) registry: &'a TypeRegistry,
    pub(crate) chain: &'a ConverterChain,
    pub(crate) refs: &'a ReferenceTable,
    pub(crate) notes: Notes,
    seen: HashMap<u64, Box<dyn Reflect>>,
    path: Vec<String>,
}

impl<'a> LoadCtx<'a> {
    /// Overwrite one value from a document.
    pub fn load_value(
        &mut self,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        // Optionals first, so back-references can pierce them.
        if let Some(optional) = value.as_optional_mut() {
            if doc.is_null() {
                optional.clear();
                return Ok(());
            }
            let inner = optional.ensure_default();
            return self.load_value(doc, inner);
        }

        if let Some(id) = ref_id(doc) {
            return self.resolve_back_reference(id, value);
        }

        if let Some(shared) = value.as_shared() {
            let (id, content) = split_identity(doc);
            if let Some(id) = id {
                // Register the handle before filling it so nested
                // back-references land on this allocation.
                self.seen.insert(id, shared.clone_handle());
            }
            let mut result = Ok(());
            shared.visit_mut(&mut |inner| {
                if result.is_ok() {
                    result = self.load_value(content, inner);
                }
            });
            return result;
        }

        if value.as_poly().is_some() {
            return self.load_poly(doc, value);
        }

        let chain = self.chain;
        let Some(converter) = chain.pick(&*value) else {
            self.warn(format!("no converter accepts {}", value.type_name()));
            return Ok(());
        };
        converter.deserialize(self, doc, value)
    }

    /// Overwrite a nested value under a path segment.
    pub fn load_in(
        &mut self,
        segment: impl Into<String>,
        doc: &Document,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        self.path.push(segment.into());
        let result = self.load_value(doc, value);
        self.path.pop();
        result
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let path = join_path(&self.path);
        self.notes.warn(path, message);
    }

    pub fn recovered(&mut self, message: impl Into<String>) {
        let path = join_path(&self.path);
        self.notes.recovered(path, message);
    }

    fn resolve_back_reference(
        &mut self,
        id: u64,
        value: &mut dyn Reflect,
    ) -> Result<(), SerialError> {
        if !self.seen.contains_key(&id) {
            self.warn(format!("unknown back-reference {id}; slot left as built"));
            return Ok(());
        }
        let outcome = {
            let handle = &self.seen[&id];
            value
                .as_shared_mut()
                .map(|shared| shared.assign_from(handle.as_ref()))
        };
        match outcome {
            Some(true) => {}
            Some(false) => {
                self.warn(format!("back-reference {id} does not match the slot type"));
            }
            None => self.warn(format!(
                "back-reference {id} targets {}, which is not shared",
                value.type_name()
            )),
        }
        Ok(())
    }

    fn load_poly(&mut self, doc: &Document, value: &mut dyn Reflect) -> Result<(), SerialError> {
        if doc.is_null() {
            if let Some(poly) = value.as_poly_mut() {
                poly.clear();
            }
            return Ok(());
        }
        let (family, current_tag) = match value.as_poly() {
            Some(poly) => (poly.family(), poly.tag()),
            None => return Ok(()),
        };
        let (tag, content) = split_tag(doc);
        let Some(tag) = tag else {
            self.warn("missing $type discriminator; slot cleared");
            if let Some(poly) = value.as_poly_mut() {
                poly.clear();
            }
            return Ok(());
        };

        // Matching tag: refill the live payload in place.
        if current_tag == Some(tag) {
            if let Some(payload) = value.as_poly_mut().and_then(|p| p.value_mut()) {
                return self.load_value(content, payload);
            }
        }

        if let Some(spawner) = self.registry.family_spawner(family) {
            if spawner.has(tag) && spawner.spawn_into(tag, value) {
                if let Some(payload) = value.as_poly_mut().and_then(|p| p.value_mut()) {
                    return self.load_value(content, payload);
                }
                return Ok(());
            }
            // Unknown or unconstructable: keep the document in a placeholder
            // rather than dropping data.
            if spawner.spawn_missing_into(value, tag, doc.clone()) {
                self.recovered(format!("unknown type `{tag}` preserved as a placeholder"));
                return Ok(());
            }
            self.warn(format!("unknown type `{tag}` and no placeholder factory; slot cleared"));
        } else {
            self.warn(format!("no polymorphic family registered here; `{tag}` dropped"));
        }
        if let Some(poly) = value.as_poly_mut() {
            poly.clear();
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn join_path(path: &[String]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    let mut out = String::from("$");
    for segment in path {
        if !segment.starts_with('[') {
            out.push('.');
        }
        out.push_str(segment);
    }
    out
}

/// Front-insert `$id`, wrapping non-object content in `$content`.
fn identify_document(id: u64, doc: Document) -> Document {
    match doc {
        Document::Object(map) => {
            Document::Object(document::lead(document::KEY_ID, Document::from(id), map))
        }
        other => {
            let mut map = DocumentMap::new();
            map.insert(document::KEY_ID.to_string(), Document::from(id));
            map.insert(document::KEY_CONTENT.to_string(), other);
            Document::Object(map)
        }
    }
}

/// Front-insert `$type`, wrapping non-object content in `$content`.
fn tag_document(tag: &str, doc: Document) -> Document {
    match doc {
        Document::Object(map) => {
            Document::Object(document::lead(document::KEY_TYPE, Document::from(tag), map))
        }
        other => {
            let mut map = DocumentMap::new();
            map.insert(document::KEY_TYPE.to_string(), Document::from(tag));
            map.insert(document::KEY_CONTENT.to_string(), other);
            Document::Object(map)
        }
    }
}

fn ref_id(doc: &Document) -> Option<u64> {
    doc.as_object()?
        .get(document::KEY_REF)?
        .as_f64()
        .map(|n| n as u64)
}

/// Strip a leading `$id`, unwrapping `$content` when present.
fn split_identity(doc: &Document) -> (Option<u64>, &Document) {
    let Some(map) = doc.as_object() else {
        return (None, doc);
    };
    let id = map
        .get(document::KEY_ID)
        .and_then(Document::as_f64)
        .map(|n| n as u64);
    if id.is_none() {
        return (None, doc);
    }
    match map.get(document::KEY_CONTENT) {
        Some(content) => (id, content),
        None => (id, doc),
    }
}

/// Strip a leading `$type`, unwrapping `$content` when present.
fn split_tag(doc: &Document) -> (Option<&str>, &Document) {
    let Some(map) = doc.as_object() else {
        return (None, doc);
    };
    let tag = map.get(document::KEY_TYPE).and_then(Document::as_str);
    if tag.is_none() {
        return (None, doc);
    }
    match map.get(document::KEY_CONTENT) {
        Some(content) => (tag, content),
        None => (tag, doc),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Serializer
// ─────────────────────────────────────────────────────────────────────────────

struct Pass {
    chain: ConverterChain,
    options: SerializeOptions,
    observer: Option<Box<Observer>>,
}

/// The serializer facade.
///
/// Cheap to share behind an `Arc`; a coarse mutex serializes whole passes on
/// one instance, independent instances never contend.
pub struct Serializer {
    registry: Arc<TypeRegistry>,
    gate: Mutex<Pass>,
}

impl std::fmt::Debug for Serializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The pass gate holds converters and an observer closure, none of
        // which can print themselves.
        f.debug_struct("Serializer").finish_non_exhaustive()
    }
}

impl Serializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_options(registry, SerializeOptions::default())
    }

    pub fn with_options(registry: Arc<TypeRegistry>, options: SerializeOptions) -> Self {
        Self {
            registry,
            gate: Mutex::new(Pass {
                chain: ConverterChain::standard(),
                options,
                observer: None,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn set_options(&self, options: SerializeOptions) {
        self.gate.lock().options = options;
    }

    /// Install a host converter ahead of the built-in chain.
    pub fn add_converter(&self, converter: Box<dyn Converter>) {
        self.gate.lock().chain.prepend(converter);
    }

    /// Install the per-object audit hook.
    pub fn set_observer(
        &self,
        observer: impl Fn(&dyn Reflect, &mut DocumentMap) + Send + Sync + 'static,
    ) {
        self.gate.lock().observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&self) {
        self.gate.lock().observer = None;
    }

    /// Build a default instance of a registered type by discriminator.
    pub fn instantiate(&self, type_name: &str) -> Result<Box<dyn Reflect>, SerialError> {
        self.registry.instantiate(type_name)
    }

    /// Serialize to JSON, discarding external references.
    pub fn to_json(&self, value: &dyn Reflect) -> Result<(String, Notes), SerialError> {
        let mut refs = ReferenceTable::default();
        let (json, mut notes) = self.to_json_with_refs(value, &mut refs)?;
        if !refs.is_empty() {
            notes.warn("$", "external references were captured but the table was discarded");
        }
        Ok((json, notes))
    }

    /// Serialize to JSON, interning external references into `refs`.
    pub fn to_json_with_refs(
        &self,
        value: &dyn Reflect,
        refs: &mut ReferenceTable,
    ) -> Result<(String, Notes), SerialError> {
        let (doc, notes) = self.to_document(value, refs)?;
        let pretty = self.gate.lock().options.pretty;
        let json = if pretty {
            doc.to_json_pretty()?
        } else {
            doc.to_json()?
        };
        Ok((json, notes))
    }

    /// Serialize to a document tree.
    pub fn to_document(
        &self,
        value: &dyn Reflect,
        refs: &mut ReferenceTable,
    ) -> Result<(Document, Notes), SerialError> {
        tracing::debug!(type_name = value.type_name(), "serialize pass");
        let pass = self.gate.lock();
        let mut cx = SaveCtx {
            registry: &self.registry,
            chain: &pass.chain,
            options: &pass.options,
            refs,
            notes: Notes::none(),
            observer: pass.observer.as_deref(),
            seen: HashMap::new(),
            next_id: 0,
            path: Vec::new(),
            depth: 0,
        };
        let doc = cx.save_value(value)?;
        Ok((doc, cx.notes))
    }

    /// Build and fill a `T` from JSON.
    pub fn from_json<T: Reflect + Default>(
        &self,
        json: &str,
        refs: &ReferenceTable,
    ) -> Result<(T, Notes), SerialError> {
        let mut value = T::default();
        let notes = self.overwrite_from_json(&mut value, json, refs)?;
        Ok((value, notes))
    }

    /// Overwrite an existing value from JSON, preserving handle identity.
    pub fn overwrite_from_json(
        &self,
        value: &mut dyn Reflect,
        json: &str,
        refs: &ReferenceTable,
    ) -> Result<Notes, SerialError> {
        let doc = Document::from_json(json)?;
        self.overwrite_from_document(value, &doc, refs)
    }

    /// Overwrite an existing value from a document tree.
    pub fn overwrite_from_document(
        &self,
        value: &mut dyn Reflect,
        doc: &Document,
        refs: &ReferenceTable,
    ) -> Result<Notes, SerialError> {
        tracing::debug!(type_name = value.type_name(), "deserialize pass");
        let pass = self.gate.lock();
        let mut cx = LoadCtx {
            registry: &self.registry,
            chain: &pass.chain,
            refs,
            notes: Notes::none(),
            seen: HashMap::new(),
            path: Vec::new(),
        };
        cx.load_value(doc, value)?;
        Ok(cx.notes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::reflect::{Poly, Shared};
    use crate::refs::{ExternalHandle, ExternalRef};
    use crate::schema::{FieldFlags, TypeSchema};

    #[derive(Default)]
    struct Pack {
        label: String,
        weights: Vec<f64>,
        lookup: IndexMap<String, i32>,
    }
    crate::reflect_struct!(Pack);

    #[derive(Default)]
    struct Member {
        nick: String,
        buddy: Option<Shared<Member>>,
    }
    crate::reflect_struct!(Member);

    trait Gadget: Reflect {}

    #[derive(Default)]
    struct Winch {
        coils: i32,
    }
    crate::reflect_struct!(Winch);
    impl Gadget for Winch {}

    struct LostGadget {
        tag: String,
        raw: Document,
    }

    impl Reflect for LostGadget {
        fn type_name(&self) -> &'static str {
            "LostGadget"
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
    impl Gadget for LostGadget {}

    #[derive(Default)]
    struct Bench {
        slot: Poly<dyn Gadget>,
    }
    crate::reflect_struct!(Bench);

    #[derive(Default)]
    struct Rig {
        anchor: ExternalRef,
        spare: ExternalRef,
    }
    crate::reflect_struct!(Rig);

    #[derive(Default)]
    struct Vault {
        serial: i64,
        secret: String,
        stash: Option<Vec<i32>>,
    }
    crate::reflect_struct!(Vault);

    fn registry() -> Arc<TypeRegistry> {
        let registry = TypeRegistry::new();
        registry.register::<Pack>(
            TypeSchema::builder::<Pack>("Pack")
                .with_field("label", |p: &Pack| &p.label, |p: &mut Pack| &mut p.label)
                .with_field("weights", |p: &Pack| &p.weights, |p: &mut Pack| {
                    &mut p.weights
                })
                .with_field("lookup", |p: &Pack| &p.lookup, |p: &mut Pack| &mut p.lookup)
                .finish(),
        );
        registry.register::<Member>(
            TypeSchema::builder::<Member>("Member")
                .with_field("nick", |m: &Member| &m.nick, |m: &mut Member| &mut m.nick)
                .with_field("buddy", |m: &Member| &m.buddy, |m: &mut Member| &mut m.buddy)
                .finish(),
        );
        registry.register::<Winch>(
            TypeSchema::builder::<Winch>("Winch")
                .with_field("coils", |w: &Winch| &w.coils, |w: &mut Winch| &mut w.coils)
                .finish(),
        );
        registry.register::<Bench>(
            TypeSchema::builder::<Bench>("Bench")
                .with_field("slot", |b: &Bench| &b.slot, |b: &mut Bench| &mut b.slot)
                .finish(),
        );
        registry.register::<Rig>(
            TypeSchema::builder::<Rig>("Rig")
                .with_field("anchor", |r: &Rig| &r.anchor, |r: &mut Rig| &mut r.anchor)
                .with_field("spare", |r: &Rig| &r.spare, |r: &mut Rig| &mut r.spare)
                .finish(),
        );
        registry.register::<Vault>(
            TypeSchema::builder::<Vault>("Vault")
                .with_flagged_field(
                    "serial",
                    FieldFlags::read_only(),
                    |v: &Vault| &v.serial,
                    |v: &mut Vault| &mut v.serial,
                )
                .with_flagged_field(
                    "secret",
                    FieldFlags::write_only(),
                    |v: &Vault| &v.secret,
                    |v: &mut Vault| &mut v.secret,
                )
                .with_flagged_field(
                    "stash",
                    FieldFlags::auto_instance(),
                    |v: &Vault| &v.stash,
                    |v: &mut Vault| &mut v.stash,
                )
                .finish(),
        );
        registry.register_poly::<dyn Gadget>(|| Box::new(Winch::default()));
        registry.declare_family::<dyn Gadget>(|tag, raw| {
            Box::new(LostGadget {
                tag: tag.to_string(),
                raw,
            })
        });
        Arc::new(registry)
    }

    #[test]
    fn test_round_trip_scalars_and_collections() {
        let serializer = Serializer::new(registry());
        let mut pack = Pack {
            label: "field kit".into(),
            weights: vec![1.5, 2.0],
            lookup: IndexMap::new(),
        };
        pack.lookup.insert("bolts".to_string(), 12);
        pack.lookup.insert("nuts".to_string(), 9);

        let (json, notes) = serializer.to_json(&pack).unwrap();
        assert!(notes.is_clean());
        assert_eq!(
            json,
            r#"{"label":"field kit","weights":[1.5,2],"lookup":{"bolts":12,"nuts":9}}"#
        );

        let refs = ReferenceTable::default();
        let (loaded, notes) = serializer.from_json::<Pack>(&json, &refs).unwrap();
        assert!(notes.is_clean());
        assert_eq!(loaded.label, pack.label);
        assert_eq!(loaded.weights, pack.weights);
        assert_eq!(loaded.lookup, pack.lookup);
    }

    #[test]
    fn test_shared_cycle_round_trips_to_one_allocation() {
        let serializer = Serializer::new(registry());
        let left = Shared::new(Member {
            nick: "left".into(),
            buddy: None,
        });
        let right = Shared::new(Member {
            nick: "right".into(),
            buddy: Some(left.clone()),
        });
        left.write().buddy = Some(right.clone());

        let (json, notes) = serializer.to_json(&left).unwrap();
        assert!(notes.is_clean());
        assert_eq!(
            json,
            r#"{"$id":0,"nick":"left","buddy":{"$id":1,"nick":"right","buddy":{"$ref":0}}}"#
        );

        let refs = ReferenceTable::default();
        let (loaded, notes) = serializer.from_json::<Shared<Member>>(&json, &refs).unwrap();
        assert!(notes.is_clean());
        let buddy = loaded.read().buddy.clone().unwrap();
        assert_eq!(loaded.read().nick, "left");
        assert_eq!(buddy.read().nick, "right");
        let back = buddy.read().buddy.clone().unwrap();
        assert!(loaded.ptr_eq(&back));
    }

    #[test]
    fn test_dictionary_pair_array_shape() {
        let serializer = Serializer::new(registry());
        let mut levels: IndexMap<i32, String> = IndexMap::new();
        levels.insert(3, "low".to_string());
        levels.insert(9, "high".to_string());

        let (json, notes) = serializer.to_json(&levels).unwrap();
        assert!(notes.is_clean());
        assert_eq!(json, r#"[{"Key":3,"Value":"low"},{"Key":9,"Value":"high"}]"#);

        let refs = ReferenceTable::default();
        let (loaded, notes) = serializer
            .from_json::<IndexMap<i32, String>>(&json, &refs)
            .unwrap();
        assert!(notes.is_clean());
        assert_eq!(loaded, levels);
    }

    #[test]
    fn test_unknown_type_survives_reload() {
        let serializer = Serializer::new(registry());
        let json = r#"{"slot":{"$type":"Crane","boom":12.5}}"#;

        let refs = ReferenceTable::default();
        let (bench, notes) = serializer.from_json::<Bench>(json, &refs).unwrap();
        assert!(notes.has_recovered());
        let (tag, _) = bench.slot.get().unwrap().recovery().unwrap();
        assert_eq!(tag, "Crane");

        let (out, notes) = serializer.to_json(&bench).unwrap();
        assert!(notes.is_clean());
        assert_eq!(out, json);
    }

    #[test]
    fn test_external_references_intern_and_resolve() {
        let serializer = Serializer::new(registry());
        let rig = Rig {
            anchor: ExternalRef::from(ExternalHandle::new("Anchor", "dock-3")),
            spare: ExternalRef::none(),
        };

        let mut refs = ReferenceTable::default();
        let (json, notes) = serializer.to_json_with_refs(&rig, &mut refs).unwrap();
        assert!(notes.is_clean());
        assert_eq!(json, r#"{"anchor":1,"spare":0}"#);
        let expected = ExternalHandle::new("Anchor", "dock-3");
        assert_eq!(refs.resolve(1), Some(&expected));

        let (loaded, notes) = serializer.from_json::<Rig>(&json, &refs).unwrap();
        assert!(notes.is_clean());
        assert_eq!(loaded.anchor.get(), Some(&expected));
        assert!(loaded.spare.get().is_none());

        // Lookup misses warn and resolve to null.
        let (missing, notes) = serializer
            .from_json::<Rig>(r#"{"anchor":7,"spare":0}"#, &refs)
            .unwrap();
        assert!(!notes.is_clean());
        assert!(missing.anchor.get().is_none());
    }

    #[test]
    fn test_field_flags() {
        let serializer = Serializer::new(registry());
        let vault = Vault {
            serial: 77,
            secret: "hushed".into(),
            stash: None,
        };

        let (json, _) = serializer.to_json(&vault).unwrap();
        assert_eq!(json, r#"{"serial":77,"stash":null}"#);

        let refs = ReferenceTable::default();
        let (loaded, notes) = serializer
            .from_json::<Vault>(r#"{"serial":900,"secret":"loud","extra":1}"#, &refs)
            .unwrap();
        assert_eq!(loaded.serial, 0);
        assert_eq!(loaded.secret, "loud");
        assert_eq!(loaded.stash, Some(Vec::new()));
        assert!(!notes.is_clean());
    }

    #[test]
    fn test_overwrite_preserves_shared_identity() {
        let serializer = Serializer::new(registry());
        let mut slot = Shared::new(Member {
            nick: "before".into(),
            buddy: None,
        });
        let watcher = slot.clone();

        let refs = ReferenceTable::default();
        let notes = serializer
            .overwrite_from_json(&mut slot, r#"{"$id":0,"nick":"after","buddy":null}"#, &refs)
            .unwrap();
        assert!(notes.is_clean());
        assert_eq!(watcher.read().nick, "after");
        assert!(slot.ptr_eq(&watcher));
    }

    #[test]
    fn test_poly_same_tag_refills_in_place() {
        let serializer = Serializer::new(registry());
        let mut bench = Bench::default();
        bench.slot.put(Box::new(Winch { coils: 7 }));
        let before = bench
            .slot
            .get()
            .map(|g| g as *const dyn Gadget as *const ())
            .unwrap();

        let refs = ReferenceTable::default();
        let notes = serializer
            .overwrite_from_json(&mut bench, r#"{"slot":{"$type":"Winch","coils":9}}"#, &refs)
            .unwrap();
        assert!(notes.is_clean());
        let after = bench
            .slot
            .get()
            .map(|g| g as *const dyn Gadget as *const ())
            .unwrap();
        assert_eq!(before, after);
        let winch = bench.slot.get().unwrap().as_any().downcast_ref::<Winch>().unwrap();
        assert_eq!(winch.coils, 9);
    }

    #[test]
    fn test_literal_walk_rejects_cycles() {
        let serializer = Serializer::with_options(
            registry(),
            SerializeOptions {
                ignore_cycle_references: true,
                ..SerializeOptions::default()
            },
        );
        let left = Shared::new(Member {
            nick: "left".into(),
            buddy: None,
        });
        let right = Shared::new(Member {
            nick: "right".into(),
            buddy: Some(left.clone()),
        });
        left.write().buddy = Some(right.clone());

        assert!(matches!(
            serializer.to_json(&left),
            Err(SerialError::DepthExceeded(_))
        ));
    }

    #[test]
    fn test_discarded_reference_table_warns() {
        let serializer = Serializer::new(registry());
        let rig = Rig {
            anchor: ExternalRef::from(ExternalHandle::new("Anchor", "dock-9")),
            spare: ExternalRef::none(),
        };
        let (_, notes) = serializer.to_json(&rig).unwrap();
        assert!(!notes.is_clean());
    }

    #[test]
    fn test_observer_sees_every_struct() {
        let serializer = Serializer::new(registry());
        let count = Arc::new(AtomicUsize::new(0));
        let tally = count.clone();
        serializer.set_observer(move |_, _| {
            tally.fetch_add(1, Ordering::SeqCst);
        });

        serializer.to_json(&Pack::default()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        serializer.clear_observer();
        serializer.to_json(&Pack::default()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instantiate_by_name() {
        let serializer = Serializer::new(registry());
        let value = serializer.instantiate("Pack").unwrap();
        assert_eq!(value.type_name(), "Pack");
    }
}
