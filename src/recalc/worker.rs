//! Recalculation Worker Module
//!
//! Consumes recalculation jobs. Every job re-checks persisted state before
//! computing, so redelivered and superseded jobs are harmless.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Collaborators;
use crate::error::{CachedFieldError, Result};
use crate::field::RegisteredField;
use crate::host::DomainObject;
use crate::identity::ObjectRef;
use crate::policy::{compute_expiration, settle_expiration, Timestamp, TriggerContext};
use crate::storage::RecordWrite;
use crate::transport::RecalculationJob;

// == Job Outcome ==
/// What handling a job did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// New value and expiration written, flag cleared
    Written { value: Value, expires_at: Timestamp },
    /// Compute failed; only the flag was cleared
    ComputeFailed { message: String },
    /// The job's claim is no longer held; nothing written
    StaleWriteRejected,
    /// Host object is gone; flag cleared
    ObjectMissing,
}

// == Recalc Worker ==
/// Runs the recalculation path for jobs and synchronous forces.
pub struct RecalcWorker {
    deps: Collaborators,
}

impl RecalcWorker {
    pub fn new(deps: Collaborators) -> Self {
        Self { deps }
    }

    /// Handles one delivered job.
    ///
    /// # Errors
    /// `UnknownField` if the job names a field no longer registered, plus
    /// storage and configuration failures. Compute failures are an outcome,
    /// not an error.
    pub async fn handle(&self, job: &RecalculationJob) -> Result<JobOutcome> {
        let field = self.deps.registry.lookup(&job.object.model, &job.field)?;
        self.run(&field, &job.object, job.enqueued_at).await
    }

    /// Recalculates `field` for `object` if, and only if, the claim stamped
    /// `claim` is still held, both before computing and at the final write.
    pub async fn run(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
        claim: DateTime<Utc>,
    ) -> Result<JobOutcome> {
        let name = field.name();
        let record = match self.deps.storage.get(object, name).await? {
            Some(record) if record.holds_claim(claim) => record,
            _ => {
                debug!("{}.{} is not claimed by this job; dropping it", object, name);
                self.deps.stats.record_stale_job();
                return Ok(JobOutcome::StaleWriteRejected);
            }
        };

        let Some(loaded) = self.deps.objects.load(object).await? else {
            warn!("{} no longer exists; releasing claim on {}", object, name);
            self.release(object, name, claim).await?;
            return Ok(JobOutcome::ObjectMissing);
        };

        match self.compute_write(field, &loaded, record.expires_at.as_ref()).await {
            Ok((value, expires_at)) => {
                let written = self
                    .deps
                    .storage
                    .write_if_claimed(
                        object,
                        name,
                        claim,
                        RecordWrite::completed(value.clone(), expires_at),
                    )
                    .await?;
                if !written {
                    debug!(
                        "claim on {}.{} was revoked mid-recalculation; discarding {}",
                        object, name, value
                    );
                    self.deps.stats.record_stale_job();
                    return Ok(JobOutcome::StaleWriteRejected);
                }
                self.deps.stats.record_recalculation();
                info!(
                    "recalculated {}.{}; expires at {}",
                    object, name, expires_at
                );
                Ok(JobOutcome::Written { value, expires_at })
            }
            Err(CachedFieldError::Compute { message, .. }) => {
                warn!(
                    "{} failed for {}: {}; keeping previous value",
                    field.spec.method_name(),
                    object,
                    message
                );
                self.deps.stats.record_compute_failure();
                self.release(object, name, claim).await?;
                Ok(JobOutcome::ComputeFailed { message })
            }
            Err(err) => {
                self.release(object, name, claim).await?;
                Err(err)
            }
        }
    }

    /// Computes the write a recalculation would perform, without performing
    /// it. Ignores the flag.
    ///
    /// # Errors
    /// `ObjectNotFound` if the host object is gone, `Compute` if the
    /// callback fails.
    pub async fn preview(&self, field: &RegisteredField, object: &ObjectRef) -> Result<RecordWrite> {
        let loaded = self
            .deps
            .objects
            .load(object)
            .await?
            .ok_or_else(|| CachedFieldError::ObjectNotFound(object.to_string()))?;
        let previous = self
            .deps
            .storage
            .get(object, field.name())
            .await?
            .and_then(|record| record.expires_at);
        let (value, expires_at) = self.compute_write(field, &loaded, previous.as_ref()).await?;
        Ok(RecordWrite::completed(value, expires_at))
    }

    async fn compute_write(
        &self,
        field: &RegisteredField,
        object: &DomainObject,
        previous: Option<&Timestamp>,
    ) -> Result<(Value, Timestamp)> {
        let spec = &field.spec;
        let compute_error = |message: String| CachedFieldError::Compute {
            object: object.identity.to_string(),
            method: spec.method_name().to_string(),
            message,
        };

        let value = spec
            .compute
            .compute(object)
            .map_err(|e| compute_error(format!("{:#}", e)))?;
        spec.kind.validate(&value).map_err(compute_error)?;

        let ctx = self.trigger_context(field, &object.identity).await?;
        let now = self.deps.clock.now(spec.time_mode());
        let expiration = compute_expiration(
            now,
            &spec.triggers,
            spec.expires_after,
            spec.use_timezone,
            &ctx,
        )?;

        Ok((value, settle_expiration(previous, expiration)))
    }

    /// Current expirations of the fields this one aligns with.
    async fn trigger_context(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
    ) -> Result<TriggerContext> {
        let mut ctx = TriggerContext::new();
        for sibling in field.spec.triggers.iter().filter_map(|t| t.aligned_field()) {
            let expires_at = self
                .deps
                .storage
                .get(object, sibling)
                .await?
                .and_then(|record| record.expires_at);
            if let Some(at) = expires_at {
                ctx.insert(sibling, at);
            }
        }
        Ok(ctx)
    }

    async fn release(&self, object: &ObjectRef, field: &str, claim: DateTime<Utc>) -> Result<()> {
        let released = self.deps.storage.release_claim(object, field, claim).await?;
        if !released {
            debug!("claim on {}.{} was already released or replaced", object, field);
        }
        Ok(())
    }
}
