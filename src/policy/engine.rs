//! Expiration Engine
//!
//! Pure decisions about when a cached value expires and whether it is stale.

use std::cmp::Ordering;
use std::time::Duration;

use tracing::warn;

use super::timestamp::{TimeMode, Timestamp};
use super::trigger::{Expiration, TemporalTrigger, TriggerContext};
use crate::error::{CachedFieldError, Result};
use crate::storage::AuxiliaryRecord;

// == Compute Expiration ==
/// Plans the next expiration after a recalculation at `now`.
///
/// Triggers are tried in order and the first one that applies wins. With no
/// applicable trigger the value lives for `expires_after`.
///
/// # Errors
/// `Configuration` if `now` is not of the kind `use_timezone` demands, or if
/// `expires_after` overflows the calendar.
pub fn compute_expiration(
    now: Timestamp,
    triggers: &[TemporalTrigger],
    expires_after: Duration,
    use_timezone: bool,
    ctx: &TriggerContext,
) -> Result<Expiration> {
    let mode = TimeMode::from_use_timezone(use_timezone);
    if now.mode() != mode {
        return Err(CachedFieldError::Configuration(format!(
            "field expects {} time but was evaluated with {} time",
            mode,
            now.mode()
        )));
    }

    if let Some(expiration) = triggers.iter().find_map(|t| t.evaluate(&now, ctx)) {
        return Ok(expiration);
    }

    now.checked_add(expires_after)
        .map(Expiration::planned)
        .ok_or_else(|| {
            CachedFieldError::Configuration(format!(
                "expires_after of {:?} overflows from {}",
                expires_after, now
            ))
        })
}

// == Staleness ==
/// An absent expiration, or one at or before `now`, is stale.
///
/// An expiration of the other time kind cannot be ordered against `now`;
/// it is reported and treated as stale so the value gets rewritten.
pub fn is_expired(expires_at: Option<&Timestamp>, now: &Timestamp) -> bool {
    match expires_at {
        None => true,
        Some(at) => match at.try_cmp(now) {
            Some(Ordering::Greater) => false,
            Some(_) => true,
            None => {
                warn!(
                    "expiration {} is {} but the field runs on {} time; treating as stale",
                    at,
                    at.mode(),
                    now.mode()
                );
                true
            }
        },
    }
}

/// Whether the record needs recalculation at `now`.
pub fn is_stale(record: &AuxiliaryRecord, now: &Timestamp) -> bool {
    is_expired(record.expires_at.as_ref(), now)
}

/// Clears the expiration so the next access sees the record as stale.
pub fn force_expire(record: &mut AuxiliaryRecord) {
    record.expires_at = None;
}

// == Settle ==
/// Final expiration to store after a recalculation.
///
/// Expirations never move backwards: a still-later previous expiration is
/// kept, unless the new one is forced.
pub fn settle_expiration(previous: Option<&Timestamp>, next: Expiration) -> Timestamp {
    if next.forced {
        return next.at;
    }
    match previous {
        Some(prev) if prev.is_after(&next.at) => *prev,
        _ => next.at,
    }
}
