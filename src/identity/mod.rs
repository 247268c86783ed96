//! Identity & Naming Module
//!
//! Canonical object identity and auxiliary field names.

mod names;
mod object;

pub use names::{bind, Binding, FieldBindings, FieldNames, NameOverrides};
pub use object::{ModelCatalog, ModelMeta, ObjectId, ObjectRef};
