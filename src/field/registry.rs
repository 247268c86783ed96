//! Field Registry Module
//!
//! Explicit mapping from (model, field name) to configuration. Every
//! configuration problem is raised here, at registration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::info;

use super::spec::{CachedFieldBuilder, CachedFieldSpec, FieldDefaults};
use crate::error::{CachedFieldError, Result};
use crate::identity::{bind, FieldBindings, ModelCatalog};
use crate::storage::AuxiliaryStorage;

// == Registered Field ==
/// A cached field attached to a concrete model.
#[derive(Debug)]
pub struct RegisteredField {
    /// Canonical model label
    pub model: String,
    pub spec: CachedFieldSpec,
    pub bindings: FieldBindings,
}

impl RegisteredField {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

// == Field Registry ==
/// All cached fields known to the process.
#[derive(Debug)]
pub struct FieldRegistry {
    catalog: ModelCatalog,
    defaults: FieldDefaults,
    fields: BTreeMap<(String, String), Arc<RegisteredField>>,
}

impl FieldRegistry {
    pub fn new(catalog: ModelCatalog, defaults: FieldDefaults) -> Self {
        Self {
            catalog,
            defaults,
            fields: BTreeMap::new(),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn defaults(&self) -> &FieldDefaults {
        &self.defaults
    }

    /// Builds and attaches a field to `model_label`.
    ///
    /// # Errors
    /// `Configuration` for an unknown model, a duplicate field, a name
    /// collision, a trigger pinned to the other time kind, or an alignment
    /// target that is missing, self-referential or on the other time kind.
    pub fn register(
        &mut self,
        model_label: &str,
        builder: CachedFieldBuilder,
    ) -> Result<Arc<RegisteredField>> {
        let model = self
            .catalog
            .canonical_name(model_label)
            .map_err(|e| CachedFieldError::Configuration(e.to_string()))?;
        let key = (model.clone(), builder.name().to_string());
        if self.fields.contains_key(&key) {
            return Err(CachedFieldError::Configuration(format!(
                "cached field {:?} is already registered on {}",
                key.1, model
            )));
        }

        let spec = builder.build(&self.defaults);
        self.check_triggers(&model, &spec)?;

        let taken = self.taken_names(&model);
        let bindings = bind(spec.names.clone(), &taken)?;

        info!(
            "registered cached field {}.{} ({} time, expires after {:?})",
            model,
            spec.name,
            spec.time_mode(),
            spec.expires_after
        );
        let field = Arc::new(RegisteredField {
            model,
            spec,
            bindings,
        });
        self.fields.insert(key, field.clone());
        Ok(field)
    }

    /// Finds a field by model label, following proxies.
    pub fn lookup(&self, model_label: &str, field: &str) -> Result<Arc<RegisteredField>> {
        let model = self.catalog.canonical_name(model_label)?;
        self.fields
            .get(&(model.clone(), field.to_string()))
            .cloned()
            .ok_or_else(|| CachedFieldError::UnknownField(format!("{}.{}", model, field)))
    }

    /// Registered fields in (model, field) order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<RegisteredField>> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Announces every field's columns and index hints to storage.
    pub async fn declare_all(&self, storage: &dyn AuxiliaryStorage) -> Result<()> {
        for field in self.fields.values() {
            storage
                .declare_field(&field.model, &field.spec.names, field.spec.index)
                .await?;
        }
        Ok(())
    }

    fn check_triggers(&self, model: &str, spec: &CachedFieldSpec) -> Result<()> {
        let mode = spec.time_mode();
        for trigger in &spec.triggers {
            if let Some(pinned) = trigger.pinned_mode() {
                if pinned != mode {
                    return Err(CachedFieldError::Configuration(format!(
                        "{}.{} uses {} time but has a trigger pinned to {} time",
                        model, spec.name, mode, pinned
                    )));
                }
            }

            if let Some(target) = trigger.aligned_field() {
                if target == spec.name {
                    return Err(CachedFieldError::Configuration(format!(
                        "{}.{} cannot align its expiration with itself",
                        model, spec.name
                    )));
                }
                let other = self
                    .fields
                    .get(&(model.to_string(), target.to_string()))
                    .ok_or_else(|| {
                        CachedFieldError::Configuration(format!(
                            "{}.{} aligns with {:?}, which is not a cached field of {}",
                            model, spec.name, target, model
                        ))
                    })?;
                if other.spec.use_timezone != spec.use_timezone {
                    return Err(CachedFieldError::Configuration(format!(
                        "{}.{} uses {} time but aligns with {}, which uses {} time",
                        model,
                        spec.name,
                        mode,
                        target,
                        other.spec.time_mode()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Model attributes plus every name claimed by fields already on it:
    /// the field itself, its storage columns, its helpers and its
    /// calculation method.
    fn taken_names(&self, model: &str) -> BTreeSet<String> {
        let mut taken = self
            .catalog
            .get(model)
            .map(|meta| meta.attributes.clone())
            .unwrap_or_default();
        for field in self.fields.values().filter(|f| f.model == model) {
            let bindings = &field.bindings;
            taken.insert(field.spec.name.clone());
            taken.extend(
                bindings
                    .names
                    .storage_names()
                    .iter()
                    .map(|name| name.to_string()),
            );
            taken.extend(
                [
                    &bindings.recalculate,
                    &bindings.flag_as_stale,
                    &bindings.expire_after,
                ]
                .iter()
                .map(|helper| helper.name().to_string()),
            );
            taken.insert(bindings.names.calculation_method.clone());
        }
        taken
    }
}
