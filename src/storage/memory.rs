//! Memory Storage Module
//!
//! In-process auxiliary storage. Each operation runs under a single write
//! guard, which makes the flag swap a real compare-and-set and record writes
//! atomic for every task sharing the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{AuxKey, AuxiliaryRecord, AuxiliaryStorage, IndexHints, RecordWrite};
use crate::error::Result;
use crate::identity::{FieldNames, ObjectRef};
use crate::policy::{force_expire, Timestamp};

// == Memory Storage ==
/// HashMap-backed auxiliary storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    /// Records keyed by (object, field)
    records: RwLock<HashMap<AuxKey, AuxiliaryRecord>>,
    /// Declared columns per (model, field)
    columns: RwLock<HashMap<(String, String), (FieldNames, IndexHints)>>,
    /// Number of accepted mutations
    mutations: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations accepted since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Columns and hints declared for a field, if any.
    pub async fn declared(&self, model: &str, field: &str) -> Option<(FieldNames, IndexHints)> {
        self.columns
            .read()
            .await
            .get(&(model.to_string(), field.to_string()))
            .cloned()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuxiliaryStorage for MemoryStorage {
    async fn declare_field(
        &self,
        model: &str,
        names: &FieldNames,
        hints: IndexHints,
    ) -> Result<()> {
        debug!(
            "declaring {}.{} columns ({}, {}, {}) with {:?}",
            model,
            names.field,
            names.cached_value,
            names.recalculation_flag,
            names.expiration,
            hints
        );
        self.columns
            .write()
            .await
            .insert((model.to_string(), names.field.clone()), (names.clone(), hints));
        Ok(())
    }

    async fn get(&self, object: &ObjectRef, field: &str) -> Result<Option<AuxiliaryRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&AuxKey::new(object, field)).cloned())
    }

    async fn conditional_set_flag(
        &self,
        object: &ObjectRef,
        field: &str,
        expected: bool,
        new: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        let key = AuxKey::new(object, field);

        let current = records.get(&key).map(|r| r.is_recalculating).unwrap_or(false);
        if current != expected {
            return Ok(false);
        }

        let record = records.entry(key).or_default();
        record.is_recalculating = new;
        record.claimed_at = new.then_some(at);
        self.record_mutation();
        Ok(true)
    }

    async fn write(&self, object: &ObjectRef, field: &str, write: RecordWrite) -> Result<()> {
        let mut records = self.records.write().await;
        let claimed_at = match records.get(&AuxKey::new(object, field)) {
            Some(existing) if write.is_recalculating => existing.claimed_at,
            _ => None,
        };
        records.insert(
            AuxKey::new(object, field),
            AuxiliaryRecord {
                cached_value: write.cached_value,
                is_recalculating: write.is_recalculating,
                expires_at: write.expires_at,
                claimed_at,
            },
        );
        self.record_mutation();
        Ok(())
    }

    async fn write_if_claimed(
        &self,
        object: &ObjectRef,
        field: &str,
        claim: DateTime<Utc>,
        write: RecordWrite,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&AuxKey::new(object, field)) else {
            return Ok(false);
        };
        if !record.holds_claim(claim) {
            return Ok(false);
        }

        record.cached_value = write.cached_value;
        record.expires_at = write.expires_at;
        record.is_recalculating = write.is_recalculating;
        if !record.is_recalculating {
            record.claimed_at = None;
        }
        self.record_mutation();
        Ok(true)
    }

    async fn release_claim(
        &self,
        object: &ObjectRef,
        field: &str,
        claim: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&AuxKey::new(object, field)) {
            Some(record) if record.holds_claim(claim) => {
                record.is_recalculating = false;
                record.claimed_at = None;
                self.record_mutation();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_now(&self, object: &ObjectRef, field: &str) -> Result<Option<AuxiliaryRecord>> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&AuxKey::new(object, field)) else {
            return Ok(None);
        };

        force_expire(record);
        if record.is_recalculating {
            debug!("revoking in-flight claim on {}.{}", object, field);
            record.is_recalculating = false;
        }
        self.record_mutation();
        Ok(Some(record.clone()))
    }

    async fn set_expiration(
        &self,
        object: &ObjectRef,
        field: &str,
        expires_at: Option<Timestamp>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let key = AuxKey::new(object, field);
        if let Some(record) = records.get_mut(&key) {
            record.expires_at = expires_at;
        } else if let Some(at) = expires_at {
            records.insert(
                key,
                AuxiliaryRecord {
                    expires_at: Some(at),
                    ..AuxiliaryRecord::default()
                },
            );
        } else {
            return Ok(());
        }
        self.record_mutation();
        Ok(())
    }

    async fn release_stuck_claims(&self, claimed_before: DateTime<Utc>) -> Result<Vec<AuxKey>> {
        let mut records = self.records.write().await;
        let mut released = Vec::new();

        for (key, record) in records.iter_mut() {
            let stuck = record.is_recalculating
                && record.claimed_at.map_or(true, |at| at < claimed_before);
            if stuck {
                record.is_recalculating = false;
                record.claimed_at = None;
                released.push(key.clone());
            }
        }

        if !released.is_empty() {
            self.record_mutation();
        }
        released.sort();
        Ok(released)
    }

    async fn purge_object(&self, object: &ObjectRef) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|key, _| &key.object != object);
        let removed = before - records.len();
        if removed > 0 {
            self.record_mutation();
        }
        Ok(removed)
    }
}
