//! Cached Fields - Expiring derived values on persistent objects
//!
//! Keeps expensive-to-compute field values next to their host objects,
//! serves them without waiting, and refreshes stale ones in the background
//! with at most one recalculation in flight per object and field.

pub mod api;
pub mod config;
pub mod demo;
pub mod error;
pub mod field;
pub mod host;
pub mod identity;
pub mod models;
pub mod policy;
pub mod recalc;
pub mod storage;
pub mod tasks;
pub mod transport;

pub use api::{create_router, AppState};
pub use config::Config;
pub use error::{CachedFieldError, Result};
pub use field::{CachedFieldSpec, FieldKind, FieldRegistry};
pub use recalc::{Accessor, Coordinator, RecalcWorker};
pub use tasks::{spawn_reaper_task, spawn_worker_pool};
