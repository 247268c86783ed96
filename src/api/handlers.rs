//! API Handlers
//!
//! HTTP request handlers for each admin endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::config::Config;
use crate::error::{CachedFieldError, Result};
use crate::field::{FieldRegistry, RegisteredField};
use crate::host::MemoryObjects;
use crate::identity::ObjectRef;
use crate::models::{
    DeleteObjectResponse, ExpireRequest, ExpireResponse, FieldResponse, FieldValueResponse,
    FlagStaleRequest, HealthResponse, ObjectResponse, PreviewResponse, PutObjectRequest,
    RecordResponse, StatsResponse,
};
use crate::policy::{Clock, SystemClock};
use crate::recalc::{Accessor, Collaborators, Coordinator, RecalcStats, RecalcWorker};
use crate::storage::{AuxiliaryRecord, AuxiliaryStorage, MemoryStorage};
use crate::transport::{ChannelTransport, JobReceiver, JobTransport};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FieldRegistry>,
    pub storage: Arc<dyn AuxiliaryStorage>,
    pub objects: Arc<MemoryObjects>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<RecalcStats>,
    pub worker: Arc<RecalcWorker>,
    pub coordinator: Arc<Coordinator>,
    pub accessor: Arc<Accessor>,
}

impl AppState {
    /// Wires the recalculation machinery around the given collaborators.
    pub fn new(
        registry: FieldRegistry,
        storage: Arc<dyn AuxiliaryStorage>,
        objects: Arc<MemoryObjects>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn JobTransport>,
        eager_recalculation: bool,
    ) -> Self {
        let registry = Arc::new(registry);
        let stats = Arc::new(RecalcStats::new());
        let deps = Collaborators {
            storage: storage.clone(),
            objects: objects.clone(),
            registry: registry.clone(),
            clock: clock.clone(),
            stats: stats.clone(),
        };
        let worker = Arc::new(RecalcWorker::new(deps.clone()));
        let coordinator = Arc::new(Coordinator::new(
            deps.clone(),
            transport,
            worker.clone(),
            eager_recalculation,
        ));
        let accessor = Arc::new(Accessor::new(deps, coordinator.clone()));

        Self {
            registry,
            storage,
            objects,
            clock,
            stats,
            worker,
            coordinator,
            accessor,
        }
    }

    /// Creates an in-memory AppState from configuration.
    ///
    /// Returns the receiving end of the job queue for the worker pool.
    pub fn from_config(config: &Config, registry: FieldRegistry) -> (Self, JobReceiver) {
        let (transport, receiver) = ChannelTransport::channel();
        let state = Self::new(
            registry,
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryObjects::new()),
            Arc::new(SystemClock),
            Arc::new(transport),
            config.eager_recalculation,
        );
        (state, receiver)
    }

    /// Looks up a field and resolves the object it is read on.
    fn field(
        &self,
        model: &str,
        id: &str,
        field: &str,
    ) -> Result<(Arc<RegisteredField>, ObjectRef)> {
        let registered = self.registry.lookup(model, field)?;
        let object = self.registry.catalog().resolve(model, id)?;
        Ok((registered, object))
    }

    fn record_response(
        &self,
        field: &RegisteredField,
        object: ObjectRef,
        record: AuxiliaryRecord,
    ) -> RecordResponse {
        let stale = record.is_stale(&self.clock.now(field.spec.time_mode()));
        RecordResponse::new(object, field.name(), record, stale)
    }
}

/// Handler for GET /objects/:model/:id/:field
///
/// Serves the cached value; stale values trigger a background refresh.
pub async fn read_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
) -> Result<Json<FieldValueResponse>> {
    let (registered, object) = state.field(&model, &id, &field)?;
    let value = state.accessor.read(&registered, &object).await?;
    Ok(Json(FieldValueResponse::new(object, field, value)))
}

/// Handler for GET /objects/:model/:id/:field/record
pub async fn record_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
) -> Result<Json<RecordResponse>> {
    let (registered, object) = state.field(&model, &id, &field)?;
    let record = state.coordinator.current(&registered, &object).await?;
    Ok(Json(state.record_response(&registered, object, record)))
}

/// Handler for GET /objects/:model/:id/:field/preview
///
/// Computes the value a recalculation would write, without writing it.
pub async fn preview_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
) -> Result<Json<PreviewResponse>> {
    let (registered, object) = state.field(&model, &id, &field)?;
    let write = state.worker.preview(&registered, &object).await?;
    Ok(Json(PreviewResponse {
        object,
        field,
        value: write.cached_value,
        expires_at: write.expires_at,
    }))
}

/// Handler for POST /objects/:model/:id/:field/recalculate
pub async fn recalculate_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
) -> Result<Json<FieldValueResponse>> {
    let (registered, object) = state.field(&model, &id, &field)?;
    let value = state
        .coordinator
        .force_recalculate(&registered, &object)
        .await?;
    Ok(Json(FieldValueResponse::new(object, field, value)))
}

/// Handler for POST /objects/:model/:id/:field/stale
pub async fn stale_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
    req: Option<Json<FlagStaleRequest>>,
) -> Result<Json<RecordResponse>> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let (registered, object) = state.field(&model, &id, &field)?;
    let record = state
        .coordinator
        .flag_as_stale(&registered, &object, req.and_recalculate)
        .await?;
    Ok(Json(state.record_response(&registered, object, record)))
}

/// Handler for POST /objects/:model/:id/:field/expire
pub async fn expire_handler(
    State(state): State<AppState>,
    Path((model, id, field)): Path<(String, String, String)>,
    req: Option<Json<ExpireRequest>>,
) -> Result<Json<ExpireResponse>> {
    let req = req.map(|Json(req)| req).unwrap_or_default();
    if let Some(error_msg) = req.validate() {
        return Err(CachedFieldError::InvalidRequest(error_msg));
    }

    let (registered, object) = state.field(&model, &id, &field)?;
    let expiry = req
        .expiry(registered.spec.time_mode())
        .map_err(CachedFieldError::InvalidRequest)?;
    let expires_at = state
        .coordinator
        .expire_after(&registered, &object, expiry)
        .await?;
    Ok(Json(ExpireResponse {
        object,
        field,
        expires_at,
    }))
}

/// Handler for PUT /objects/:model/:id
///
/// Host-side upsert of a domain object.
pub async fn put_object_handler(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
    Json(req): Json<PutObjectRequest>,
) -> Result<Json<ObjectResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CachedFieldError::InvalidRequest(error_msg));
    }

    let object = state.registry.catalog().resolve(&model, &id)?;
    let replaced = state.objects.put(object.clone(), req.data).await;
    Ok(Json(ObjectResponse::stored(object, replaced)))
}

/// Handler for DELETE /objects/:model/:id
///
/// Host-side delete; auxiliary records go with the object.
pub async fn delete_object_handler(
    State(state): State<AppState>,
    Path((model, id)): Path<(String, String)>,
) -> Result<Json<DeleteObjectResponse>> {
    let object = state.registry.catalog().resolve(&model, &id)?;
    if !state.objects.remove(&object).await {
        return Err(CachedFieldError::ObjectNotFound(object.to_string()));
    }
    let purged = state.storage.purge_object(&object).await?;
    Ok(Json(DeleteObjectResponse::new(object, purged)))
}

/// Handler for GET /fields
pub async fn fields_handler(State(state): State<AppState>) -> Json<Vec<FieldResponse>> {
    Json(
        state
            .registry
            .fields()
            .map(|field| FieldResponse::from(field.as_ref()))
            .collect(),
    )
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.stats.snapshot(),
        state.registry.len(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
