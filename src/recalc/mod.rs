//! Recalculation Module
//!
//! The coordination protocol: coordinator, worker and accessor sharing one
//! auxiliary store.
//!
//! # Protocol
//! - A stale read claims the field by swapping its flag false -> true
//! - The claim holder dispatches one job; everyone else returns
//! - The worker re-checks the flag, computes, and writes value, expiration
//!   and a cleared flag in one step
//! - A failed compute clears only the flag

mod accessor;
mod coordinator;
mod stats;
mod worker;

#[cfg(test)]
mod property_tests;

use std::sync::Arc;

use crate::field::FieldRegistry;
use crate::host::ObjectSource;
use crate::policy::Clock;
use crate::storage::AuxiliaryStorage;

// Re-export public types
pub use accessor::Accessor;
pub use coordinator::{ClaimOutcome, Coordinator, Expiry};
pub use stats::{RecalcStats, StatsSnapshot};
pub use worker::{JobOutcome, RecalcWorker};

/// Handles shared by the coordinator, worker and accessor.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn AuxiliaryStorage>,
    pub objects: Arc<dyn ObjectSource>,
    pub registry: Arc<FieldRegistry>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<RecalcStats>,
}
