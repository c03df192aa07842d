//! Type descriptors for reflected structs.
//!
//! A [`TypeSchema`] lists the serializable fields of one concrete type in
//! declaration order. Field access is type-erased: the typed
//! [`SchemaBuilder`] wraps plain projection functions into closures that
//! downcast an `&dyn Reflect` owner and hand back the field as
//! `&dyn Reflect`, so converters never see the concrete type.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::reflect::Reflect;

// ─────────────────────────────────────────────────────────────────────────────
// Field Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// Per-field serialization behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldFlags {
    /// Emitted on save, never written back on load.
    pub read_only: bool,
    /// Written back on load, never emitted on save.
    pub write_only: bool,
    /// If the member is absent or null in the document, fill an empty
    /// optional with its default value instead of leaving it `None`.
    pub auto_instance: bool,
}

impl FieldFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            write_only: true,
            ..Self::default()
        }
    }

    pub fn auto_instance() -> Self {
        Self {
            auto_instance: true,
            ..Self::default()
        }
    }
}

type FieldGet = Box<dyn for<'a> Fn(&'a dyn Reflect) -> Option<&'a dyn Reflect> + Send + Sync>;
type FieldGetMut =
    Box<dyn for<'a> Fn(&'a mut dyn Reflect) -> Option<&'a mut dyn Reflect> + Send + Sync>;

/// One serializable field of a reflected struct.
pub struct FieldSchema {
    name: &'static str,
    flags: FieldFlags,
    get_fn: FieldGet,
    get_mut_fn: FieldGetMut,
}

impl FieldSchema {
    /// Serialized member name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// Project the field out of an owner; `None` when `owner` is not the
    /// schema's type.
    pub fn get<'a>(&self, owner: &'a dyn Reflect) -> Option<&'a dyn Reflect> {
        (self.get_fn)(owner)
    }

    pub fn get_mut<'a>(&self, owner: &'a mut dyn Reflect) -> Option<&'a mut dyn Reflect> {
        (self.get_mut_fn)(owner)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered field list for one concrete type.
pub struct TypeSchema {
    name: &'static str,
    type_id: TypeId,
    fields: Vec<FieldSchema>,
}

impl TypeSchema {
    /// Start a builder for `O`.
    pub fn builder<O: Reflect>(name: &'static str) -> SchemaBuilder<O> {
        SchemaBuilder {
            name,
            fields: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Discriminator name the type registers under.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Look up a field by serialized name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Typed schema builder; `O` is the owning struct.
pub struct SchemaBuilder<O: Reflect> {
    name: &'static str,
    fields: Vec<FieldSchema>,
    _owner: PhantomData<fn() -> O>,
}

impl<O: Reflect> SchemaBuilder<O> {
    /// Add a plain read-write field.
    pub fn with_field<F: Reflect>(
        self,
        name: &'static str,
        get: fn(&O) -> &F,
        get_mut: fn(&mut O) -> &mut F,
    ) -> Self {
        self.with_flagged_field(name, FieldFlags::default(), get, get_mut)
    }

    /// Add a field with explicit flags.
    ///
    /// Panics on a duplicate serialized name; schemas are built once at
    /// registration time.
    pub fn with_flagged_field<F: Reflect>(
        mut self,
        name: &'static str,
        flags: FieldFlags,
        get: fn(&O) -> &F,
        get_mut: fn(&mut O) -> &mut F,
    ) -> Self {
        assert!(
            self.fields.iter().all(|f| f.name != name),
            "duplicate field name `{}` in schema `{}`",
            name,
            self.name
        );
        self.fields.push(FieldSchema {
            name,
            flags,
            get_fn: make_get(get),
            get_mut_fn: make_get_mut(get_mut),
        });
        self
    }

    pub fn finish(self) -> TypeSchema {
        TypeSchema {
            name: self.name,
            type_id: TypeId::of::<O>(),
            fields: self.fields,
        }
    }
}

fn make_get<O: Reflect, F: Reflect>(project: fn(&O) -> &F) -> FieldGet {
    Box::new(move |owner: &dyn Reflect| {
        owner
            .as_any()
            .downcast_ref::<O>()
            .map(|o| project(o).as_reflect())
    })
}

fn make_get_mut<O: Reflect, F: Reflect>(project: fn(&mut O) -> &mut F) -> FieldGetMut {
    Box::new(move |owner: &mut dyn Reflect| {
        owner
            .as_any_mut()
            .downcast_mut::<O>()
            .map(|o| project(o).as_reflect_mut())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
