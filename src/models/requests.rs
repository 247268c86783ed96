//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::policy::{TimeMode, Timestamp};
use crate::recalc::Expiry;

/// Request body for PUT /objects/:model/:id
#[derive(Debug, Clone, Deserialize)]
pub struct PutObjectRequest {
    /// Object attributes handed to compute callbacks
    pub data: Value,
}

impl PutObjectRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if !self.data.is_object() {
            return Some("data must be a JSON object".to_string());
        }
        None
    }
}

/// Request body for POST /objects/:model/:id/:field/stale
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagStaleRequest {
    /// Dispatch a recalculation right away; server default if omitted
    #[serde(default)]
    pub and_recalculate: Option<bool>,
}

/// Request body for POST /objects/:model/:id/:field/expire
///
/// # Fields
/// - `after_secs`: expire this many seconds from now
/// - `at`: expire at an RFC 3339 instant (timezone-aware fields) or a
///   `YYYY-MM-DDTHH:MM:SS` local time (naive fields)
///
/// Neither: the field's default expiration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExpireRequest {
    #[serde(default)]
    pub after_secs: Option<u64>,
    #[serde(default)]
    pub at: Option<String>,
}

impl ExpireRequest {
    pub fn validate(&self) -> Option<String> {
        if self.after_secs.is_some() && self.at.is_some() {
            return Some("Specify either after_secs or at, not both".to_string());
        }
        None
    }

    /// The requested expiry, with `at` parsed for a field of kind `mode`.
    pub fn expiry(&self, mode: TimeMode) -> Result<Expiry, String> {
        match (&self.at, self.after_secs) {
            (Some(raw), _) => parse_instant(raw, mode).map(Expiry::At),
            (None, Some(secs)) => Ok(Expiry::After(Duration::from_secs(secs))),
            (None, None) => Ok(Expiry::Default),
        }
    }
}

fn parse_instant(raw: &str, mode: TimeMode) -> Result<Timestamp, String> {
    match mode {
        TimeMode::Aware => DateTime::parse_from_rfc3339(raw)
            .map(|at| Timestamp::Aware(at.with_timezone(&Utc)))
            .map_err(|e| format!("'{}' is not an RFC 3339 instant: {}", raw, e)),
        TimeMode::Naive => raw
            .parse::<NaiveDateTime>()
            .map(Timestamp::Naive)
            .map_err(|e| format!("'{}' is not a local date-time: {}", raw, e)),
    }
}
