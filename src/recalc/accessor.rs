//! Value Accessor Module
//!
//! The read path. Returns whatever value is stored, stale or not, and leaves
//! refreshing to the background. Only a field that was never computed is
//! computed in-line.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::coordinator::Coordinator;
use super::Collaborators;
use crate::error::{CachedFieldError, Result};
use crate::field::RegisteredField;
use crate::identity::ObjectRef;

// == Accessor ==
pub struct Accessor {
    deps: Collaborators,
    coordinator: Arc<Coordinator>,
}

impl Accessor {
    pub fn new(deps: Collaborators, coordinator: Arc<Coordinator>) -> Self {
        Self { deps, coordinator }
    }

    /// Current value of `field` on `object`.
    ///
    /// A stale value is returned as-is while a recalculation is dispatched;
    /// failures of that dispatch are logged and swallowed.
    ///
    /// # Errors
    /// Storage failures on the read itself, and any failure of the in-line
    /// computation when there is no value yet.
    pub async fn read(&self, field: &RegisteredField, object: &ObjectRef) -> Result<Value> {
        let record = self.coordinator.current(field, object).await?;

        let Some(value) = record.cached_value.clone() else {
            info!("{}.{} has no value yet; computing in-line", object, field.name());
            self.deps.stats.record_read(true);
            self.deps.stats.record_cold_start();
            return self.coordinator.force_recalculate(field, object).await;
        };

        let stale = match self.coordinator.refresh_if_stale(field, object, record).await {
            Ok((_, outcome)) => outcome.was_stale(),
            Err(err) => {
                warn!(
                    "refresh of {}.{} failed, serving cached value: {}",
                    object,
                    field.name(),
                    err
                );
                true
            }
        };
        self.deps.stats.record_read(stale);
        Ok(value)
    }

    /// `read` addressed by model label, raw id and field name.
    pub async fn read_named(&self, model_label: &str, raw_id: &str, field: &str) -> Result<Value> {
        let registered = self.deps.registry.lookup(model_label, field)?;
        let object = self.deps.registry.catalog().resolve(model_label, raw_id)?;
        self.read(&registered, &object).await
    }

    /// `read`, deserialized into `T`.
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        field: &RegisteredField,
        object: &ObjectRef,
    ) -> Result<T> {
        let value = self.read(field, object).await?;
        serde_json::from_value(value).map_err(|e| {
            CachedFieldError::InvalidRequest(format!(
                "{}.{} does not hold the requested type: {}",
                object,
                field.name(),
                e
            ))
        })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::recalc::test_support::{book, harness};
    use crate::storage::{AuxiliaryStorage, RecordWrite};
    use serde_json::json;

    #[tokio::test]
    async fn test_cold_read_computes_inline() {
        let h = harness().await;
        let field = h.field("page_count");

        let value = h.accessor.read(&field, &book(1)).await.unwrap();
        assert_eq!(value, json!(120));
        assert!(h.receiver.try_recv().await.is_none());

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.cold_starts, 1);
        assert_eq!(snapshot.recalculations, 1);
    }

    #[tokio::test]
    async fn test_stale_read_returns_old_value_and_dispatches() {
        let h = harness().await;
        let field = h.field("page_count");
        h.storage
            .write(&book(1), "page_count", RecordWrite::completed(json!(99), h.naive(60)))
            .await
            .unwrap();
        h.clock.set_secs(61);

        let value = h.accessor.read(&field, &book(1)).await.unwrap();
        assert_eq!(value, json!(99));
        assert!(h.receiver.try_recv().await.is_some());
        assert_eq!(h.stats.snapshot().stale_reads, 1);
    }

    #[tokio::test]
    async fn test_cold_read_failure_surfaces() {
        let h = harness().await;
        let field = h.field("flaky");
        assert!(matches!(
            h.accessor.read(&field, &book(1)).await,
            Err(CachedFieldError::Compute { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_named_resolves_proxy_and_string_id() {
        let h = harness().await;
        let value = h
            .accessor
            .read_named("library.PublishedBook", "1", "page_count")
            .await
            .unwrap();
        assert_eq!(value, json!(120));

        assert!(matches!(
            h.accessor.read_named("library.Book", "1", "nope").await,
            Err(CachedFieldError::UnknownField(_))
        ));
        assert!(matches!(
            h.accessor.read_named("library.Book", " ", "page_count").await,
            Err(CachedFieldError::IdentityResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_read_as_typed() {
        let h = harness().await;
        let field = h.field("page_count");
        let pages: u32 = h.accessor.read_as(&field, &book(1)).await.unwrap();
        assert_eq!(pages, 120);

        let wrong: Result<String> = h.accessor.read_as(&field, &book(1)).await;
        assert!(matches!(wrong, Err(CachedFieldError::InvalidRequest(_))));
    }
}
