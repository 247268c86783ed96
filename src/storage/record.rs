//! Auxiliary Record Module
//!
//! The three persisted facts kept for each (object, field) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::ObjectRef;
use crate::policy::{self, Timestamp};

// == Auxiliary Record ==
/// Persisted state of one cached field on one object.
///
/// An absent record reads as `AuxiliaryRecord::default()`: no value, not
/// recalculating, no expiration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryRecord {
    /// Last successfully computed value
    pub cached_value: Option<Value>,
    /// A recalculation has been claimed and not yet finished
    pub is_recalculating: bool,
    /// When the cached value stops being fresh
    pub expires_at: Option<Timestamp>,
    /// When the current claim was taken. A revoked claim keeps its stamp
    /// so the next claim can be told apart from it.
    pub claimed_at: Option<DateTime<Utc>>,
}

impl AuxiliaryRecord {
    pub fn is_stale(&self, now: &Timestamp) -> bool {
        policy::is_stale(self, now)
    }

    /// Never computed: the maximally-stale state.
    pub fn is_cold(&self) -> bool {
        self.cached_value.is_none()
    }

    /// Whether the claim stamped `claim` is still the one in flight.
    pub fn holds_claim(&self, claim: DateTime<Utc>) -> bool {
        self.is_recalculating && self.claimed_at == Some(claim)
    }
}

// == Record Write ==
/// A full replacement of the three facts, applied atomically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordWrite {
    pub cached_value: Option<Value>,
    pub is_recalculating: bool,
    pub expires_at: Option<Timestamp>,
}

impl RecordWrite {
    /// A finished recalculation: new value, flag cleared, new expiration.
    pub fn completed(value: Value, expires_at: Timestamp) -> Self {
        Self {
            cached_value: Some(value),
            is_recalculating: false,
            expires_at: Some(expires_at),
        }
    }
}

// == Aux Key ==
/// Storage key of an auxiliary record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AuxKey {
    pub object: ObjectRef,
    pub field: String,
}

impl AuxKey {
    pub fn new(object: &ObjectRef, field: &str) -> Self {
        Self {
            object: object.clone(),
            field: field.to_string(),
        }
    }
}

// == Index Hints ==
/// `db_index` requests for the flag and expiration columns. Hints only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexHints {
    pub expiration: bool,
    pub recalculation_flag: bool,
}
