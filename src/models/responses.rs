//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::field::{FieldKind, RegisteredField};
use crate::identity::{FieldBindings, ObjectRef};
use crate::policy::{TemporalTrigger, Timestamp};
use crate::recalc::StatsSnapshot;
use crate::storage::AuxiliaryRecord;

/// Response body for reads and forced recalculations
#[derive(Debug, Clone, Serialize)]
pub struct FieldValueResponse {
    pub object: ObjectRef,
    pub field: String,
    pub value: Value,
}

impl FieldValueResponse {
    pub fn new(object: ObjectRef, field: impl Into<String>, value: Value) -> Self {
        Self {
            object,
            field: field.into(),
            value,
        }
    }
}

/// Response body for GET .../record and POST .../stale
#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub object: ObjectRef,
    pub field: String,
    pub record: AuxiliaryRecord,
    /// Whether the record is stale right now
    pub stale: bool,
}

impl RecordResponse {
    pub fn new(
        object: ObjectRef,
        field: impl Into<String>,
        record: AuxiliaryRecord,
        stale: bool,
    ) -> Self {
        Self {
            object,
            field: field.into(),
            record,
            stale,
        }
    }
}

/// Response body for GET .../preview
#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub object: ObjectRef,
    pub field: String,
    pub value: Option<Value>,
    pub expires_at: Option<Timestamp>,
}

/// Response body for POST .../expire
#[derive(Debug, Clone, Serialize)]
pub struct ExpireResponse {
    pub object: ObjectRef,
    pub field: String,
    pub expires_at: Timestamp,
}

/// Response body for PUT /objects/:model/:id
#[derive(Debug, Clone, Serialize)]
pub struct ObjectResponse {
    /// Success message
    pub message: String,
    pub object: ObjectRef,
}

impl ObjectResponse {
    pub fn stored(object: ObjectRef, replaced: bool) -> Self {
        let verb = if replaced { "updated" } else { "created" };
        Self {
            message: format!("Object {} {}", object, verb),
            object,
        }
    }
}

/// Response body for DELETE /objects/:model/:id
#[derive(Debug, Clone, Serialize)]
pub struct DeleteObjectResponse {
    /// Success message
    pub message: String,
    pub object: ObjectRef,
    /// Auxiliary records dropped with the object
    pub purged_records: usize,
}

impl DeleteObjectResponse {
    pub fn new(object: ObjectRef, purged_records: usize) -> Self {
        Self {
            message: format!("Object {} deleted", object),
            object,
            purged_records,
        }
    }
}

/// One entry of GET /fields
#[derive(Debug, Clone, Serialize)]
pub struct FieldResponse {
    pub model: String,
    pub field: String,
    pub kind: FieldKind,
    pub expires_after_secs: u64,
    pub use_timezone: bool,
    pub triggers: Vec<TemporalTrigger>,
    pub bindings: FieldBindings,
}

impl From<&RegisteredField> for FieldResponse {
    fn from(field: &RegisteredField) -> Self {
        Self {
            model: field.model.clone(),
            field: field.spec.name.clone(),
            kind: field.spec.kind,
            expires_after_secs: field.spec.expires_after.as_secs(),
            use_timezone: field.spec.use_timezone,
            triggers: field.spec.triggers.clone(),
            bindings: field.bindings.clone(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    /// Reads that found a fresh value / all reads
    pub fresh_rate: f64,
    /// Registered cached fields
    pub fields: usize,
}

impl StatsResponse {
    pub fn new(counters: StatsSnapshot, fields: usize) -> Self {
        Self {
            fresh_rate: counters.fresh_rate(),
            counters,
            fields,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book() -> ObjectRef {
        ObjectRef::new("library.Book", 7i64)
    }

    #[test]
    fn test_field_value_response_serialize() {
        let resp = FieldValueResponse::new(book(), "rating", json!(4.5));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["object"]["model"], "library.Book");
        assert_eq!(json["object"]["id"], 7);
        assert_eq!(json["value"], 4.5);
    }

    #[test]
    fn test_object_response_message() {
        assert!(ObjectResponse::stored(book(), false)
            .message
            .contains("created"));
        assert!(ObjectResponse::stored(book(), true)
            .message
            .contains("updated"));
    }

    #[test]
    fn test_stats_response_flattens_counters() {
        let counters = StatsSnapshot {
            reads: 4,
            stale_reads: 1,
            ..StatsSnapshot::default()
        };
        let json = serde_json::to_value(StatsResponse::new(counters, 2)).unwrap();
        assert_eq!(json["reads"], 4);
        assert_eq!(json["fields"], 2);
        assert!((json["fresh_rate"].as_f64().unwrap() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
