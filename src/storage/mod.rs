//! Auxiliary Storage Module
//!
//! Persistent per-object, per-field facts behind the recalculation protocol.
//! Every read is authoritative; nothing above this layer caches records.

mod memory;
mod record;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identity::{FieldNames, ObjectRef};
use crate::policy::Timestamp;

// Re-export public types
pub use memory::MemoryStorage;
pub use record::{AuxKey, AuxiliaryRecord, IndexHints, RecordWrite};

/// Storage backend for auxiliary records.
///
/// Implementations must be shared by every reader and worker process, and
/// must make `conditional_set_flag` and `write_if_claimed` true
/// compare-and-set operations and `write` atomic across all three facts. In-process locking on top of a backend
/// that lacks these guarantees is not enough.
#[async_trait]
pub trait AuxiliaryStorage: Send + Sync {
    /// Announces the columns of a cached field along with its index hints.
    async fn declare_field(&self, model: &str, names: &FieldNames, hints: IndexHints)
        -> Result<()>;

    /// Reads the current record, or `None` if nothing was ever stored.
    async fn get(&self, object: &ObjectRef, field: &str) -> Result<Option<AuxiliaryRecord>>;

    /// Sets the recalculation flag to `new` only if it currently equals
    /// `expected`. An absent record counts as flag `false`.
    ///
    /// Returns whether the swap happened. A successful swap to `true` stamps
    /// `claimed_at` with `at`.
    async fn conditional_set_flag(
        &self,
        object: &ObjectRef,
        field: &str,
        expected: bool,
        new: bool,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Replaces value, flag and expiration in one step.
    async fn write(&self, object: &ObjectRef, field: &str, write: RecordWrite) -> Result<()>;

    /// Applies `write` only while the flag is set and `claimed_at` still
    /// equals `claim`. Returns whether the write happened.
    ///
    /// Workers complete through this call, so a claim that was revoked,
    /// reaped or purged while the compute ran never gets written back.
    async fn write_if_claimed(
        &self,
        object: &ObjectRef,
        field: &str,
        claim: DateTime<Utc>,
        write: RecordWrite,
    ) -> Result<bool>;

    /// Clears the flag only while the claim stamped `claim` is still held.
    async fn release_claim(&self, object: &ObjectRef, field: &str, claim: DateTime<Utc>)
        -> Result<bool>;

    /// Clears the expiration and revokes any in-flight claim in one step.
    /// The revoked claim's `claimed_at` is kept. Returns the resulting
    /// record, or `None` if nothing was stored.
    async fn expire_now(&self, object: &ObjectRef, field: &str)
        -> Result<Option<AuxiliaryRecord>>;

    /// Overwrites only the expiration. Clearing the expiration of an absent
    /// record is a no-op.
    async fn set_expiration(
        &self,
        object: &ObjectRef,
        field: &str,
        expires_at: Option<Timestamp>,
    ) -> Result<()>;

    /// Clears every flag claimed before `claimed_before` and returns the
    /// affected keys.
    async fn release_stuck_claims(&self, claimed_before: DateTime<Utc>) -> Result<Vec<AuxKey>>;

    /// Drops every record of a deleted object. Returns how many went away.
    async fn purge_object(&self, object: &ObjectRef) -> Result<usize>;
}
