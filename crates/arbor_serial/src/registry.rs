//! Explicit type registry: schemas, instance factories and polymorphic
//! families.
//!
//! There is no ambient global state; hosts construct one registry, run their
//! registration calls against it, and hand it to the serializer. `DashMap`
//! internals allow registration after startup and concurrent reads.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::document::Document;
use crate::error::SerialError;
use crate::reflect::{Poly, Reflect};
use crate::schema::TypeSchema;

// ─────────────────────────────────────────────────────────────────────────────
// Registered Types
// ─────────────────────────────────────────────────────────────────────────────

/// Schema plus default-instance factory for one registered type.
pub struct TypeEntry {
    pub schema: TypeSchema,
    factory: Box<dyn Fn() -> Box<dyn Reflect> + Send + Sync>,
}

impl TypeEntry {
    /// Build a default instance of the registered type.
    pub fn instantiate(&self) -> Box<dyn Reflect> {
        (self.factory)()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Polymorphic Families
// ─────────────────────────────────────────────────────────────────────────────

type PolyFactory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;
type MissingFactory<T> = Box<dyn Fn(&str, Document) -> Box<T> + Send + Sync>;

/// Concrete factories for one trait-object family `T`.
struct FamilyTable<T: ?Sized> {
    factories: DashMap<String, PolyFactory<T>>,
    missing: RwLock<Option<MissingFactory<T>>>,
}

impl<T: ?Sized> FamilyTable<T> {
    fn new() -> Self {
        Self {
            factories: DashMap::new(),
            missing: RwLock::new(None),
        }
    }
}

/// Type-erased spawn interface the engine drives `Poly` slots through.
pub(crate) trait FamilySpawner: Send + Sync {
    fn has(&self, tag: &str) -> bool;
    /// Instantiate `tag` into `slot` (which must be the family's `Poly<T>`).
    fn spawn_into(&self, tag: &str, slot: &mut dyn Reflect) -> bool;
    /// Instantiate the family's missing-type placeholder into `slot`.
    fn spawn_missing_into(&self, slot: &mut dyn Reflect, tag: &str, raw: Document) -> bool;
    fn tags(&self) -> Vec<String>;
}

impl<T: ?Sized + Reflect> FamilySpawner for FamilyTable<T> {
    fn has(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    fn spawn_into(&self, tag: &str, slot: &mut dyn Reflect) -> bool {
        let Some(factory) = self.factories.get(tag) else {
            return false;
        };
        let Some(poly) = slot.as_any_mut().downcast_mut::<Poly<T>>() else {
            return false;
        };
        poly.put((factory.value())());
        true
    }

    fn spawn_missing_into(&self, slot: &mut dyn Reflect, tag: &str, raw: Document) -> bool {
        let guard = self.missing.read();
        let Some(make) = guard.as_ref() else {
            return false;
        };
        let Some(poly) = slot.as_any_mut().downcast_mut::<Poly<T>>() else {
            return false;
        };
        poly.put(make(tag, raw));
        true
    }

    fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }
}

struct FamilyEntry {
    spawner: Arc<dyn FamilySpawner>,
    table: Arc<dyn Any + Send + Sync>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Maps discriminator names and `TypeId`s to schemas, factories and families.
#[derive(Default)]
pub struct TypeRegistry {
    by_name: DashMap<String, TypeId>,
    entries: DashMap<TypeId, Arc<TypeEntry>>,
    families: DashMap<TypeId, FamilyEntry>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reflected struct with its schema.
    ///
    /// Panics when the schema was built for a different type; replacing an
    /// existing registration logs a warning and wins.
    pub fn register<T: Reflect + Default>(&self, schema: TypeSchema) {
        assert_eq!(
            schema.type_id(),
            TypeId::of::<T>(),
            "schema `{}` was built for a different type",
            schema.name()
        );
        let name = schema.name();
        let id = schema.type_id();
        if let Some(prev) = self.by_name.insert(name.to_string(), id) {
            if prev != id {
                tracing::warn!(type_name = name, "discriminator remapped to a different type");
            }
        }
        tracing::debug!(type_name = name, "registered type");
        let factory: Box<dyn Fn() -> Box<dyn Reflect> + Send + Sync> =
            Box::new(|| -> Box<dyn Reflect> { Box::new(T::default()) });
        self.entries.insert(id, Arc::new(TypeEntry { schema, factory }));
    }

    /// Entry for a concrete type id.
    pub fn entry_for(&self, id: TypeId) -> Option<Arc<TypeEntry>> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    /// Resolve a discriminator name.
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).map(|e| *e.value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Build a default instance of a registered type by name.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Reflect>, SerialError> {
        let id = self
            .lookup(name)
            .ok_or_else(|| SerialError::UnknownType(name.to_string()))?;
        let entry = self
            .entry_for(id)
            .ok_or_else(|| SerialError::UnknownType(name.to_string()))?;
        Ok(entry.instantiate())
    }

    /// Register a concrete member of the polymorphic family `T`.
    ///
    /// The discriminator is taken from the instance's `type_name`, so the
    /// tag written on save always matches the factory registered here.
    pub fn register_poly<T: ?Sized + Reflect>(
        &self,
        factory: impl Fn() -> Box<T> + Send + Sync + 'static,
    ) {
        let table = self.family_table::<T>();
        let tag = factory().type_name();
        tracing::debug!(tag, "registered polymorphic type");
        if table.factories.insert(tag.to_string(), Box::new(factory)).is_some() {
            tracing::warn!(tag, "replaced existing polymorphic factory");
        }
    }

    /// Install the missing-type placeholder factory for the family `T`.
    ///
    /// The factory receives the unknown discriminator and the raw document
    /// and must return a payload that re-serializes them losslessly.
    pub fn declare_family<T: ?Sized + Reflect>(
        &self,
        missing: impl Fn(&str, Document) -> Box<T> + Send + Sync + 'static,
    ) {
        let table = self.family_table::<T>();
        *table.missing.write() = Some(Box::new(missing));
    }

    /// Registered discriminators of the family `T`, sorted.
    pub fn family_tags<T: ?Sized + Reflect>(&self) -> Vec<String> {
        match self.families.get(&TypeId::of::<T>()) {
            Some(entry) => entry.spawner.tags(),
            None => Vec::new(),
        }
    }

    pub(crate) fn family_spawner(&self, family: TypeId) -> Option<Arc<dyn FamilySpawner>> {
        self.families.get(&family).map(|e| e.spawner.clone())
    }

    fn family_table<T: ?Sized + Reflect>(&self) -> Arc<FamilyTable<T>> {
        let id = TypeId::of::<T>();
        let entry = self.families.entry(id).or_insert_with(|| {
            let table: Arc<FamilyTable<T>> = Arc::new(FamilyTable::new());
            FamilyEntry {
                spawner: table.clone(),
                table,
            }
        });
        let table = entry.table.clone();
        drop(entry);
        match table.downcast::<FamilyTable<T>>() {
            Ok(table) => table,
            Err(_) => unreachable!("family table is keyed by its family's TypeId"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::ReflectPoly;
    use crate::schema::TypeSchema;

    #[derive(Default)]
    struct Kettle {
        liters: f64,
    }
    crate::reflect_struct!(Kettle);

    trait Critter: Reflect {}

    #[derive(Default)]
    struct Toad {
        warts: i32,
    }
    crate::reflect_struct!(Toad);
    impl Critter for Toad {}

    struct LostCritter {
        tag: String,
        raw: Document,
    }

    impl Reflect for LostCritter {
        fn type_name(&self) -> &'static str {
            "LostCritter"
        }
        fn kind(&self) -> crate::Kind {
            crate::Kind::Struct
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
    impl Critter for LostCritter {}

    #[test]
    fn test_register_and_instantiate() {
        let registry = TypeRegistry::new();
        registry.register::<Kettle>(
            TypeSchema::builder::<Kettle>("Kettle")
                .with_field("liters", |o: &Kettle| &o.liters, |o: &mut Kettle| {
                    &mut o.liters
                })
                .finish(),
        );

        assert!(registry.contains("Kettle"));
        let instance = registry.instantiate("Kettle").unwrap();
        assert_eq!(instance.type_name(), "Kettle");

        assert!(matches!(
            registry.instantiate("Samovar"),
            Err(SerialError::UnknownType(_))
        ));
    }

    #[test]
    fn test_family_spawn_into_slot() {
        let registry = TypeRegistry::new();
        registry.register_poly::<dyn Critter>(|| Box::new(Toad::default()));

        assert_eq!(registry.family_tags::<dyn Critter>(), vec!["Toad".to_string()]);

        let mut slot: Poly<dyn Critter> = Poly::empty();
        let spawner = registry.family_spawner(TypeId::of::<dyn Critter>()).unwrap();
        assert!(spawner.has("Toad"));
        assert!(spawner.spawn_into("Toad", &mut slot));
        assert_eq!(ReflectPoly::tag(&slot), Some("Toad"));
        assert_eq!(slot.get().unwrap().as_any().downcast_ref::<Toad>().unwrap().warts, 0);
    }

    #[test]
    fn test_missing_factory_carries_recovery() {
        let registry = TypeRegistry::new();
        registry.register_poly::<dyn Critter>(|| Box::new(Toad::default()));
        registry.declare_family::<dyn Critter>(|tag, raw| {
            Box::new(LostCritter {
                tag: tag.to_string(),
                raw,
            })
        });

        let mut slot: Poly<dyn Critter> = Poly::empty();
        let spawner = registry.family_spawner(TypeId::of::<dyn Critter>()).unwrap();
        assert!(!spawner.has("Axolotl"));
        assert!(spawner.spawn_missing_into(&mut slot, "Axolotl", Document::from("payload")));

        let (tag, raw) = slot.get().unwrap().recovery().unwrap();
        assert_eq!(tag, "Axolotl");
        assert_eq!(raw, &Document::from("payload"));
    }
}
