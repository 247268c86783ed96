//! Host Object Module
//!
//! The domain objects cached fields are attached to. Their persistence
//! belongs to the host; the recalculation machinery only loads them.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::identity::ObjectRef;

// == Domain Object ==
/// A loaded host object, as handed to compute callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainObject {
    pub identity: ObjectRef,
    pub data: Value,
}

impl DomainObject {
    pub fn new(identity: ObjectRef, data: Value) -> Self {
        Self { identity, data }
    }
}

// == Object Source ==
/// Loads host objects by canonical identity.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// `None` when the object does not exist (any more).
    async fn load(&self, identity: &ObjectRef) -> Result<Option<DomainObject>>;
}

// == Memory Objects ==
/// In-memory host for the admin server and tests.
#[derive(Debug, Default)]
pub struct MemoryObjects {
    objects: RwLock<HashMap<ObjectRef, Value>>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an object. Returns whether it already existed.
    pub async fn put(&self, identity: ObjectRef, data: Value) -> bool {
        self.objects.write().await.insert(identity, data).is_some()
    }

    /// Removes an object. Returns whether it existed.
    pub async fn remove(&self, identity: &ObjectRef) -> bool {
        self.objects.write().await.remove(identity).is_some()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectSource for MemoryObjects {
    async fn load(&self, identity: &ObjectRef) -> Result<Option<DomainObject>> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(identity)
            .map(|data| DomainObject::new(identity.clone(), data.clone())))
    }
}
