//! Arbor Serial - Reflection-driven JSON serialization for object graphs
//!
//! This crate turns live object graphs into JSON and back without derive
//! macros on the data itself: values expose a capability view through
//! [`Reflect`], structs describe their fields in a registered [`TypeSchema`],
//! and the [`Serializer`] walks the graph through a converter chain.
//!
//! The wire format handles the shapes plain serde does not: shared handles
//! with cycles (`$id`/`$ref`), tagged trait objects (`$type`), host-object
//! references interned in a side table, and unknown types preserved through
//! placeholder payloads.

mod convert;
mod document;
mod engine;
mod error;
mod notes;
mod refs;
mod reflect;
mod registry;
mod schema;

pub use convert::*;
pub use document::*;
pub use engine::*;
pub use error::*;
pub use notes::*;
pub use reflect::*;
pub use refs::*;
pub use registry::*;
pub use schema::*;
