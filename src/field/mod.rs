//! Cached Field Module
//!
//! Field kinds, per-field configuration and the registry that validates it.

mod kind;
mod registry;
mod spec;

pub use kind::FieldKind;
pub use registry::{FieldRegistry, RegisteredField};
pub use spec::{CachedFieldBuilder, CachedFieldSpec, ComputeFn, FieldDefaults};
