//! Recalculation Coordinator Module
//!
//! Staleness checks and the flag handshake. The conditional flag swap in
//! storage is the only mutual exclusion; nothing here holds a lock across
//! calls.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::worker::{JobOutcome, RecalcWorker};
use super::Collaborators;
use crate::error::{CachedFieldError, Result};
use crate::field::RegisteredField;
use crate::identity::ObjectRef;
use crate::policy::Timestamp;
use crate::storage::AuxiliaryRecord;
use crate::transport::{JobTransport, RecalculationJob};

// == Claim Outcome ==
/// Result of a freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// Value is fresh
    NotNeeded,
    /// Stale, but a recalculation is already in flight
    AlreadyRecalculating,
    /// Stale; this caller took the claim and dispatched a job
    Claimed,
    /// Stale; another caller took the claim first
    RaceLost,
}

impl ClaimOutcome {
    pub fn was_stale(self) -> bool {
        !matches!(self, ClaimOutcome::NotNeeded)
    }
}

// == Expiry ==
/// Explicit expiration requested through `expire_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Relative to now
    After(Duration),
    /// Absolute; must be of the field's time kind
    At(Timestamp),
    /// The field's own `expires_after`
    Default,
}

// == Coordinator ==
pub struct Coordinator {
    deps: Collaborators,
    transport: Arc<dyn JobTransport>,
    worker: Arc<RecalcWorker>,
    /// Default for `flag_as_stale(and_recalculate = None)`
    eager_recalculation: bool,
}

impl Coordinator {
    pub fn new(
        deps: Collaborators,
        transport: Arc<dyn JobTransport>,
        worker: Arc<RecalcWorker>,
        eager_recalculation: bool,
    ) -> Self {
        Self {
            deps,
            transport,
            worker,
            eager_recalculation,
        }
    }

    // == Current ==
    /// Authoritative read; an absent record reads as the default.
    pub async fn current(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
    ) -> Result<AuxiliaryRecord> {
        Ok(self
            .deps
            .storage
            .get(object, field.name())
            .await?
            .unwrap_or_default())
    }

    // == Ensure Fresh ==
    /// Reads the record and dispatches a recalculation if it is stale and
    /// nobody else is on it. Never waits for the recalculation itself.
    pub async fn ensure_fresh(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
    ) -> Result<AuxiliaryRecord> {
        let record = self.current(field, object).await?;
        let (record, _) = self.refresh_if_stale(field, object, record).await?;
        Ok(record)
    }

    /// `ensure_fresh` on a record the caller has already read.
    ///
    /// # Errors
    /// Storage failures, and `Transport` if the job cannot be enqueued. The
    /// claim is released before a transport error is returned.
    pub async fn refresh_if_stale(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
        mut record: AuxiliaryRecord,
    ) -> Result<(AuxiliaryRecord, ClaimOutcome)> {
        let now = self.deps.clock.now(field.spec.time_mode());
        if !record.is_stale(&now) {
            return Ok((record, ClaimOutcome::NotNeeded));
        }
        if record.is_recalculating {
            return Ok((record, ClaimOutcome::AlreadyRecalculating));
        }

        let claimed_at = self.next_claim(record.claimed_at);
        let claimed = self
            .deps
            .storage
            .conditional_set_flag(object, field.name(), false, true, claimed_at)
            .await?;
        if !claimed {
            debug!("lost claim on {}.{}", object, field.name());
            self.deps.stats.record_race_lost();
            return Ok((record, ClaimOutcome::RaceLost));
        }

        let job = RecalculationJob::new(object.clone(), field.name(), claimed_at);
        if let Err(err) = self.transport.enqueue(job, &field.spec.dispatch).await {
            self.release(field, object, claimed_at).await;
            return Err(err);
        }

        self.deps.stats.record_dispatch();
        info!("dispatched recalculation of {}.{}", object, field.name());
        record.is_recalculating = true;
        record.claimed_at = Some(claimed_at);
        Ok((record, ClaimOutcome::Claimed))
    }

    // == Force Recalculate ==
    /// Recalculates in-line and returns the fresh value.
    ///
    /// If another caller holds the claim, the value is computed without
    /// being written; the claim holder stays the only writer.
    ///
    /// # Errors
    /// `Compute` if the callback fails, `ObjectNotFound` if the host object
    /// is gone, plus storage failures.
    pub async fn force_recalculate(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
    ) -> Result<Value> {
        let previous = self.current(field, object).await?.claimed_at;
        let claimed_at = self.next_claim(previous);
        let claimed = self
            .deps
            .storage
            .conditional_set_flag(object, field.name(), false, true, claimed_at)
            .await?;
        if !claimed {
            debug!(
                "{}.{} is already being recalculated; computing detached",
                object,
                field.name()
            );
            self.deps.stats.record_race_lost();
            return self.detached(field, object).await;
        }

        match self.worker.run(field, object, claimed_at).await? {
            JobOutcome::Written { value, .. } => Ok(value),
            JobOutcome::ComputeFailed { message } => Err(CachedFieldError::Compute {
                object: object.to_string(),
                method: field.spec.method_name().to_string(),
                message,
            }),
            JobOutcome::ObjectMissing => Err(CachedFieldError::ObjectNotFound(object.to_string())),
            // Claim was revoked or reaped under us
            JobOutcome::StaleWriteRejected => self.detached(field, object).await,
        }
    }

    // == Flag As Stale ==
    /// Expires the value now, and optionally dispatches a recalculation.
    /// `None` uses the configured eager-recalculation default.
    ///
    /// A recalculation already in flight loses its claim: it computed from
    /// data older than this call, so its write is rejected.
    pub async fn flag_as_stale(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
        and_recalculate: Option<bool>,
    ) -> Result<AuxiliaryRecord> {
        let record = self
            .deps
            .storage
            .expire_now(object, field.name())
            .await?
            .unwrap_or_default();
        debug!("flagged {}.{} as stale", object, field.name());

        if and_recalculate.unwrap_or(self.eager_recalculation) {
            let (record, _) = self.refresh_if_stale(field, object, record).await?;
            return Ok(record);
        }
        Ok(record)
    }

    // == Expire After ==
    /// Sets the expiration explicitly and returns it.
    ///
    /// # Errors
    /// `Configuration` for an absolute instant of the other time kind or a
    /// duration that overflows the calendar.
    pub async fn expire_after(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
        expiry: Expiry,
    ) -> Result<Timestamp> {
        let mode = field.spec.time_mode();
        let now = self.deps.clock.now(mode);
        let at = match expiry {
            Expiry::At(at) if at.mode() != mode => {
                return Err(CachedFieldError::Configuration(format!(
                    "{}.{} uses {} time, got a {} expiration",
                    field.model,
                    field.name(),
                    mode,
                    at.mode()
                )))
            }
            Expiry::At(at) => Some(at),
            Expiry::After(duration) => now.checked_add(duration),
            Expiry::Default => now.checked_add(field.spec.expires_after),
        }
        .ok_or_else(|| {
            CachedFieldError::Configuration(format!("expiration overflows from {}", now))
        })?;

        self.deps
            .storage
            .set_expiration(object, field.name(), Some(at))
            .await?;
        debug!("{}.{} now expires at {}", object, field.name(), at);
        Ok(at)
    }

    /// Stamp for a new claim: now, or just past the last claim on the
    /// record when the clock has not moved beyond it.
    fn next_claim(&self, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.deps.clock.now_utc();
        match previous {
            Some(last) if last >= now => last + TimeDelta::microseconds(1),
            _ => now,
        }
    }

    async fn detached(&self, field: &RegisteredField, object: &ObjectRef) -> Result<Value> {
        let write = self.worker.preview(field, object).await?;
        Ok(write.cached_value.unwrap_or_default())
    }

    async fn release(&self, field: &RegisteredField, object: &ObjectRef, claim: DateTime<Utc>) {
        let released = self
            .deps
            .storage
            .release_claim(object, field.name(), claim)
            .await;
        if let Err(err) = released {
            warn!(
                "could not release claim on {}.{}: {}",
                object,
                field.name(),
                err
            );
        }
    }
}
