//! Capability-based value model driving the serializer.
//!
//! Every serializable value implements [`Reflect`], which names the value's
//! concrete type, classifies it by [`Kind`], and exposes the capability view
//! matching that kind. The engine and converters only ever talk to these
//! views; they never know concrete types.
//!
//! Wrapper types with engine-level semantics live here too: [`Shared`]
//! (reference semantics with cycle support), [`Poly`] (tagged trait-object
//! slot) and the blanket impls for std containers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::Document;

// ─────────────────────────────────────────────────────────────────────────────
// Kind & Reflect
// ─────────────────────────────────────────────────────────────────────────────

/// Classification steering converter dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Scalar value serialized directly (numbers, bools, strings, enums).
    Primitive,
    /// Ordered sequence of one element type.
    List,
    /// Keyed collection, serialized in dual shape.
    Map,
    /// Named fields described by a registered schema.
    Struct,
    /// Nullable wrapper around one inner value.
    Optional,
    /// Shared handle with identity; serialized with cycle support.
    Reference,
    /// Nullable trait-object slot serialized with a type tag.
    Poly,
    /// Opaque host object stored as a reference-table index.
    External,
}

/// The serializable-value contract.
///
/// Implementations expose exactly the capability view their [`Kind`] claims;
/// the others keep the `None` defaults.
pub trait Reflect: Any + Send + Sync {
    /// Stable short discriminator for the concrete type.
    fn type_name(&self) -> &'static str;

    /// Which capability view this value exposes.
    fn kind(&self) -> Kind;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn as_reflect(&self) -> &dyn Reflect;
    fn as_reflect_mut(&mut self) -> &mut dyn Reflect;

    /// Scalar snapshot of the value.
    fn as_primitive(&self) -> Option<Document> {
        None
    }

    /// Assign from a scalar document; false on shape mismatch.
    fn set_primitive(&mut self, _doc: &Document) -> bool {
        false
    }

    fn as_list(&self) -> Option<&dyn ReflectList> {
        None
    }

    fn as_list_mut(&mut self) -> Option<&mut dyn ReflectList> {
        None
    }

    fn as_map(&self) -> Option<&dyn ReflectMap> {
        None
    }

    fn as_map_mut(&mut self) -> Option<&mut dyn ReflectMap> {
        None
    }

    fn as_optional(&self) -> Option<&dyn ReflectOptional> {
        None
    }

    fn as_optional_mut(&mut self) -> Option<&mut dyn ReflectOptional> {
        None
    }

    fn as_shared(&self) -> Option<&dyn ReflectShared> {
        None
    }

    fn as_shared_mut(&mut self) -> Option<&mut dyn ReflectShared> {
        None
    }

    fn as_poly(&self) -> Option<&dyn ReflectPoly> {
        None
    }

    fn as_poly_mut(&mut self) -> Option<&mut dyn ReflectPoly> {
        None
    }

    fn as_external(&self) -> Option<&dyn crate::refs::ReflectExternal> {
        None
    }

    fn as_external_mut(&mut self) -> Option<&mut dyn crate::refs::ReflectExternal> {
        None
    }

    /// Original discriminator and raw document carried by a missing-type
    /// placeholder, re-emitted losslessly on save. `None` for ordinary values.
    fn recovery(&self) -> Option<(&str, &Document)> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Views
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered-sequence view.
pub trait ReflectList {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get(&self, index: usize) -> Option<&dyn Reflect>;
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
    /// Build a default-initialized element without inserting it.
    fn spawn_item(&self) -> Box<dyn Reflect>;
    /// Append an element; false when the element is not this list's type.
    fn push_boxed(&mut self, item: Box<dyn Reflect>) -> bool;
    fn truncate(&mut self, len: usize);
    fn clear(&mut self);
}

/// Keyed-collection view.
pub trait ReflectMap {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Snapshot of the entries in iteration order.
    fn pairs(&self) -> Vec<(&dyn Reflect, &dyn Reflect)>;
    fn spawn_key(&self) -> Box<dyn Reflect>;
    fn spawn_value(&self) -> Box<dyn Reflect>;
    /// Insert an entry; false when a downcast fails or the key was already
    /// present (the previous value is replaced).
    fn insert_boxed(&mut self, key: Box<dyn Reflect>, value: Box<dyn Reflect>) -> bool;
    fn clear(&mut self);
}

/// Nullable-wrapper view.
pub trait ReflectOptional {
    fn is_some(&self) -> bool;
    fn get(&self) -> Option<&dyn Reflect>;
    fn get_mut(&mut self) -> Option<&mut dyn Reflect>;
    /// Fill with the default inner value when empty; returns the inner value.
    fn ensure_default(&mut self) -> &mut dyn Reflect;
    fn clear(&mut self);
}

/// Shared-handle view. Writes go through interior locking, so visiting only
/// needs `&self`; rebinding the handle itself needs `&mut self`.
pub trait ReflectShared {
    /// Allocation identity; equal for clones of the same handle.
    fn identity(&self) -> usize;
    /// A new handle to the same allocation, boxed for the identity map.
    fn clone_handle(&self) -> Box<dyn Reflect>;
    /// Rebind to the allocation behind `other`; false unless `other` is a
    /// handle of the same type.
    fn assign_from(&mut self, other: &dyn Reflect) -> bool;
    fn visit(&self, f: &mut dyn FnMut(&dyn Reflect));
    fn visit_mut(&self, f: &mut dyn FnMut(&mut dyn Reflect));
}

/// Trait-object-slot view.
pub trait ReflectPoly {
    /// Registry key of the polymorphic family this slot belongs to.
    fn family(&self) -> TypeId;
    fn is_empty(&self) -> bool;
    /// Discriminator of the current payload.
    fn tag(&self) -> Option<&'static str>;
    fn value(&self) -> Option<&dyn Reflect>;
    fn value_mut(&mut self) -> Option<&mut dyn Reflect>;
    fn clear(&mut self);
}

// ─────────────────────────────────────────────────────────────────────────────
// Primitive Impls
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! reflect_base {
    () => {
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
    };
}

macro_rules! reflect_number {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_name(&self) -> &'static str {
                    stringify!($ty)
                }
                fn kind(&self) -> Kind {
                    Kind::Primitive
                }
                reflect_base!();
                fn as_primitive(&self) -> Option<Document> {
                    Some(Document::Number(*self as f64))
                }
                fn set_primitive(&mut self, doc: &Document) -> bool {
                    match doc.as_f64() {
                        Some(n) => {
                            *self = n as $ty;
                            true
                        }
                        None => false,
                    }
                }
            }
        )+
    };
}

reflect_number!(i32, i64, u32, u64, usize, f32, f64);

impl Reflect for bool {
    fn type_name(&self) -> &'static str {
        "bool"
    }
    fn kind(&self) -> Kind {
        Kind::Primitive
    }
    reflect_base!();
    fn as_primitive(&self) -> Option<Document> {
        Some(Document::Bool(*self))
    }
    fn set_primitive(&mut self, doc: &Document) -> bool {
        match doc.as_bool() {
            Some(b) => {
                *self = b;
                true
            }
            None => false,
        }
    }
}

impl Reflect for String {
    fn type_name(&self) -> &'static str {
        "String"
    }
    fn kind(&self) -> Kind {
        Kind::Primitive
    }
    reflect_base!();
    fn as_primitive(&self) -> Option<Document> {
        Some(Document::String(self.clone()))
    }
    fn set_primitive(&mut self, doc: &Document) -> bool {
        match doc.as_str() {
            Some(s) => {
                *self = s.to_string();
                true
            }
            None => false,
        }
    }
}

/// A `Document` field passes through serialization verbatim.
impl Reflect for Document {
    fn type_name(&self) -> &'static str {
        "Document"
    }
    fn kind(&self) -> Kind {
        Kind::Primitive
    }
    reflect_base!();
    fn as_primitive(&self) -> Option<Document> {
        Some(self.clone())
    }
    fn set_primitive(&mut self, doc: &Document) -> bool {
        *self = doc.clone();
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Container Impls
// ─────────────────────────────────────────────────────────────────────────────

impl<T: Reflect + Default> Reflect for Vec<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn kind(&self) -> Kind {
        Kind::List
    }
    reflect_base!();
    fn as_list(&self) -> Option<&dyn ReflectList> {
        Some(self)
    }
    fn as_list_mut(&mut self) -> Option<&mut dyn ReflectList> {
        Some(self)
    }
}

impl<T: Reflect + Default> ReflectList for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
    fn get(&self, index: usize) -> Option<&dyn Reflect> {
        self.as_slice().get(index).map(|v| v.as_reflect())
    }
    fn get_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.as_mut_slice().get_mut(index).map(|v| v.as_reflect_mut())
    }
    fn spawn_item(&self) -> Box<dyn Reflect> {
        Box::new(T::default())
    }
    fn push_boxed(&mut self, item: Box<dyn Reflect>) -> bool {
        match item.into_any().downcast::<T>() {
            Ok(v) => {
                self.push(*v);
                true
            }
            Err(_) => false,
        }
    }
    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }
    fn clear(&mut self) {
        Vec::clear(self);
    }
}

macro_rules! reflect_map_impl {
    ($map:ident) => {
        impl<K, V> Reflect for $map<K, V>
        where
            K: Reflect + Default + Eq + std::hash::Hash,
            V: Reflect + Default,
        {
            fn type_name(&self) -> &'static str {
                std::any::type_name::<Self>()
            }
            fn kind(&self) -> Kind {
                Kind::Map
            }
            reflect_base!();
            fn as_map(&self) -> Option<&dyn ReflectMap> {
                Some(self)
            }
            fn as_map_mut(&mut self) -> Option<&mut dyn ReflectMap> {
                Some(self)
            }
        }

        impl<K, V> ReflectMap for $map<K, V>
        where
            K: Reflect + Default + Eq + std::hash::Hash,
            V: Reflect + Default,
        {
            fn len(&self) -> usize {
                $map::len(self)
            }
            fn pairs(&self) -> Vec<(&dyn Reflect, &dyn Reflect)> {
                self.iter().map(|(k, v)| (k.as_reflect(), v.as_reflect())).collect()
            }
            fn spawn_key(&self) -> Box<dyn Reflect> {
                Box::new(K::default())
            }
            fn spawn_value(&self) -> Box<dyn Reflect> {
                Box::new(V::default())
            }
            fn insert_boxed(&mut self, key: Box<dyn Reflect>, value: Box<dyn Reflect>) -> bool {
                let Ok(key) = key.into_any().downcast::<K>() else {
                    return false;
                };
                let Ok(value) = value.into_any().downcast::<V>() else {
                    return false;
                };
                self.insert(*key, *value).is_none()
            }
            fn clear(&mut self) {
                $map::clear(self);
            }
        }
    };
}

reflect_map_impl!(HashMap);
reflect_map_impl!(IndexMap);

impl<T: Reflect + Default> Reflect for Option<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn kind(&self) -> Kind {
        Kind::Optional
    }
    reflect_base!();
    fn as_optional(&self) -> Option<&dyn ReflectOptional> {
        Some(self)
    }
    fn as_optional_mut(&mut self) -> Option<&mut dyn ReflectOptional> {
        Some(self)
    }
}

impl<T: Reflect + Default> ReflectOptional for Option<T> {
    fn is_some(&self) -> bool {
        Option::is_some(self)
    }
    fn get(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|v| v.as_reflect())
    }
    fn get_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.as_mut().map(|v| v.as_reflect_mut())
    }
    fn ensure_default(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default).as_reflect_mut()
    }
    fn clear(&mut self) {
        *self = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared
// ─────────────────────────────────────────────────────────────────────────────

/// Reference-semantics wrapper: clones share one allocation.
///
/// Serialized with cycle support (`$id`/`$ref`) and overwritten in place on
/// deserialize, so every live clone observes the loaded state.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Allocation identity, stable for the lifetime of the allocation.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(guard) => write!(f, "Shared({:?})", &*guard),
            None => write!(f, "Shared(<locked>)"),
        }
    }
}

impl<T: Reflect + Default> Reflect for Shared<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn kind(&self) -> Kind {
        Kind::Reference
    }
    reflect_base!();
    fn as_shared(&self) -> Option<&dyn ReflectShared> {
        Some(self)
    }
    fn as_shared_mut(&mut self) -> Option<&mut dyn ReflectShared> {
        Some(self)
    }
}

impl<T: Reflect + Default> ReflectShared for Shared<T> {
    fn identity(&self) -> usize {
        Shared::identity(self)
    }
    fn clone_handle(&self) -> Box<dyn Reflect> {
        Box::new(self.clone())
    }
    fn assign_from(&mut self, other: &dyn Reflect) -> bool {
        match other.as_any().downcast_ref::<Shared<T>>() {
            Some(o) => {
                self.0 = o.0.clone();
                true
            }
            None => false,
        }
    }
    fn visit(&self, f: &mut dyn FnMut(&dyn Reflect)) {
        let guard = self.0.read();
        f(guard.as_reflect());
    }
    fn visit_mut(&self, f: &mut dyn FnMut(&mut dyn Reflect)) {
        let mut guard = self.0.write();
        f(guard.as_reflect_mut());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poly
// ─────────────────────────────────────────────────────────────────────────────

/// Nullable trait-object slot.
///
/// Serialized as its concrete payload with a leading `$type` discriminator;
/// deserialization instantiates through the registry's family for `T`.
pub struct Poly<T: ?Sized>(Option<Box<T>>);

impl<T: ?Sized> Poly<T> {
    pub fn new(value: Box<T>) -> Self {
        Self(Some(value))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.0.as_deref_mut()
    }

    /// Remove and return the payload, leaving the slot empty.
    pub fn take(&mut self) -> Option<Box<T>> {
        self.0.take()
    }

    pub fn put(&mut self, value: Box<T>) {
        self.0 = Some(value);
    }

    pub fn set(&mut self, value: Option<Box<T>>) {
        self.0 = value;
    }
}

impl<T: ?Sized> Default for Poly<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T: ?Sized + Reflect> fmt::Debug for Poly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "Poly({})", v.type_name()),
            None => write!(f, "Poly(<empty>)"),
        }
    }
}

impl<T: ?Sized + Reflect> Reflect for Poly<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
    fn kind(&self) -> Kind {
        Kind::Poly
    }
    reflect_base!();
    fn as_poly(&self) -> Option<&dyn ReflectPoly> {
        Some(self)
    }
    fn as_poly_mut(&mut self) -> Option<&mut dyn ReflectPoly> {
        Some(self)
    }
}

impl<T: ?Sized + Reflect> ReflectPoly for Poly<T> {
    fn family(&self) -> TypeId {
        TypeId::of::<T>()
    }
    fn is_empty(&self) -> bool {
        self.0.is_none()
    }
    fn tag(&self) -> Option<&'static str> {
        self.0.as_deref().map(|v| v.type_name())
    }
    fn value(&self) -> Option<&dyn Reflect> {
        self.0.as_deref().map(|v| v.as_reflect())
    }
    fn value_mut(&mut self) -> Option<&mut dyn Reflect> {
        self.0.as_deref_mut().map(|v| v.as_reflect_mut())
    }
    fn clear(&mut self) {
        self.0 = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Impl Macros
// ─────────────────────────────────────────────────────────────────────────────

/// Implement [`Reflect`] for a plain struct whose fields are described by a
/// registered schema.
#[macro_export]
macro_rules! reflect_struct {
    ($ty:ident) => {
        impl $crate::Reflect for $ty {
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }
            fn kind(&self) -> $crate::Kind {
                $crate::Kind::Struct
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
            fn as_reflect(&self) -> &dyn $crate::Reflect {
                self
            }
            fn as_reflect_mut(&mut self) -> &mut dyn $crate::Reflect {
                self
            }
        }
    };
}

/// Implement [`Reflect`] for a unit enum, serialized as its variant name.
#[macro_export]
macro_rules! reflect_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::Reflect for $ty {
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }
            fn kind(&self) -> $crate::Kind {
                $crate::Kind::Primitive
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
            fn into_any(self: ::std::boxed::Box<Self>) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
            fn as_reflect(&self) -> &dyn $crate::Reflect {
                self
            }
            fn as_reflect_mut(&mut self) -> &mut dyn $crate::Reflect {
                self
            }
            fn as_primitive(&self) -> ::std::option::Option<$crate::Document> {
                let name = match self {
                    $( $ty::$variant => stringify!($variant), )+
                };
                ::std::option::Option::Some($crate::Document::from(name))
            }
            fn set_primitive(&mut self, doc: &$crate::Document) -> bool {
                let ::std::option::Option::Some(name) = doc.as_str() else {
                    return false;
                };
                match name {
                    $( stringify!($variant) => {
                        *self = $ty::$variant;
                        true
                    } )+
                    _ => false,
                }
            }
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    enum Flavor {
        #[default]
        Plain,
        Sour,
        Sweet,
    }

    crate::reflect_enum!(Flavor { Plain, Sour, Sweet });

    #[test]
    fn test_enum_round_trips_as_string() {
        let flavor = Flavor::Sour;
        let doc = flavor.as_primitive().unwrap();
        assert_eq!(doc, Document::from("Sour"));

        let mut back = Flavor::Plain;
        assert!(back.set_primitive(&doc));
        assert_eq!(back, Flavor::Sour);

        assert!(!back.set_primitive(&Document::from("Bitter")));
    }

    #[test]
    fn test_number_set_primitive() {
        let mut n = 0i32;
        assert!(n.set_primitive(&Document::from(7)));
        assert_eq!(n, 7);
        assert!(!n.set_primitive(&Document::from("seven")));
    }

    #[test]
    fn test_vec_list_capability() {
        let mut list: Vec<i32> = vec![1, 2];
        {
            let view = list.as_list().unwrap();
            assert_eq!(view.len(), 2);
            assert_eq!(view.get(1).unwrap().as_primitive(), Some(Document::from(2)));
            assert!(view.get(5).is_none());
        }
        let item = ReflectList::spawn_item(&list);
        assert!(list.as_list_mut().unwrap().push_boxed(item));
        assert_eq!(list, vec![1, 2, 0]);
    }

    #[test]
    fn test_map_insert_boxed_rejects_wrong_types() {
        let mut map: HashMap<String, i32> = HashMap::new();
        let key = Box::new("a".to_string());
        let value = Box::new(1i32);
        assert!(map.as_map_mut().unwrap().insert_boxed(key, value));

        let bad_key = Box::new(1.5f64);
        let value = Box::new(2i32);
        assert!(!map.as_map_mut().unwrap().insert_boxed(bad_key, value));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_optional_ensure_default() {
        let mut opt: Option<String> = None;
        {
            let view = opt.as_optional_mut().unwrap();
            assert!(!view.is_some());
            view.ensure_default();
        }
        assert_eq!(opt, Some(String::new()));
    }

    #[test]
    fn test_shared_identity_and_assign() {
        let a = Shared::new(1i32);
        let b = a.clone();
        assert_eq!(ReflectShared::identity(&a), ReflectShared::identity(&b));

        let mut c = Shared::new(2i32);
        assert_ne!(ReflectShared::identity(&a), ReflectShared::identity(&c));
        assert!(c.assign_from(a.as_reflect()));
        assert!(a.ptr_eq(&c));
        assert_eq!(*c.read(), 1);
    }

    #[test]
    fn test_shared_visit_mut_writes_through() {
        let a = Shared::new(String::from("x"));
        let b = a.clone();
        b.visit_mut(&mut |inner| {
            assert!(inner.set_primitive(&Document::from("y")));
        });
        assert_eq!(*a.read(), "y");
    }

    trait Snack: Reflect {}

    #[derive(Default)]
    struct Pretzel;
    crate::reflect_struct!(Pretzel);
    impl Snack for Pretzel {}

    #[test]
    fn test_poly_tag_and_clear() {
        let mut slot: Poly<dyn Snack> = Poly::new(Box::new(Pretzel));
        assert_eq!(ReflectPoly::tag(&slot), Some("Pretzel"));
        assert_eq!(slot.family(), TypeId::of::<dyn Snack>());
        assert!(ReflectPoly::value(&slot).is_some());

        ReflectPoly::clear(&mut slot);
        assert!(Poly::is_empty(&slot));
        assert_eq!(ReflectPoly::tag(&slot), None);
    }
}
