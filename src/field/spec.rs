//! Cached Field Spec Module
//!
//! Static per-field configuration, built once at setup and immutable after.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::kind::FieldKind;
use crate::host::DomainObject;
use crate::identity::{FieldNames, NameOverrides};
use crate::policy::{TemporalTrigger, TimeMode};
use crate::storage::IndexHints;
use crate::transport::DispatchOptions;

// == Compute Callback ==
/// Produces a fresh value for a cached field.
///
/// May run more than once per staleness window and must not assume
/// otherwise.
pub trait ComputeFn: Send + Sync {
    fn compute(&self, object: &DomainObject) -> anyhow::Result<Value>;
}

impl<F> ComputeFn for F
where
    F: Fn(&DomainObject) -> anyhow::Result<Value> + Send + Sync,
{
    fn compute(&self, object: &DomainObject) -> anyhow::Result<Value> {
        self(object)
    }
}

// == Field Defaults ==
/// Values applied to every field that does not set its own.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefaults {
    pub expires_after: Duration,
    pub use_timezone: bool,
    pub dispatch: DispatchOptions,
}

impl Default for FieldDefaults {
    fn default() -> Self {
        Self {
            expires_after: Duration::from_secs(3600),
            use_timezone: true,
            dispatch: DispatchOptions::default(),
        }
    }
}

// == Cached Field Spec ==
/// Complete configuration of one cached field.
#[derive(Clone)]
pub struct CachedFieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub compute: Arc<dyn ComputeFn>,
    pub expires_after: Duration,
    /// Tried in order; the first that applies wins
    pub triggers: Vec<TemporalTrigger>,
    pub use_timezone: bool,
    pub index: IndexHints,
    pub names: FieldNames,
    pub dispatch: DispatchOptions,
}

impl CachedFieldSpec {
    /// Starts a builder; unset options come from `FieldDefaults` at build time.
    pub fn builder<C>(name: impl Into<String>, kind: FieldKind, compute: C) -> CachedFieldBuilder
    where
        C: ComputeFn + 'static,
    {
        CachedFieldBuilder {
            name: name.into(),
            kind,
            compute: Arc::new(compute),
            expires_after: None,
            triggers: Vec::new(),
            use_timezone: None,
            index: IndexHints::default(),
            overrides: NameOverrides::default(),
            countdown: None,
        }
    }

    pub fn time_mode(&self) -> TimeMode {
        TimeMode::from_use_timezone(self.use_timezone)
    }

    /// Name of the calculation method, as used in diagnostics.
    pub fn method_name(&self) -> &str {
        &self.names.calculation_method
    }
}

impl fmt::Debug for CachedFieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("expires_after", &self.expires_after)
            .field("triggers", &self.triggers)
            .field("use_timezone", &self.use_timezone)
            .field("index", &self.index)
            .field("names", &self.names)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

// == Builder ==
/// Builder for `CachedFieldSpec`.
pub struct CachedFieldBuilder {
    name: String,
    kind: FieldKind,
    compute: Arc<dyn ComputeFn>,
    expires_after: Option<Duration>,
    triggers: Vec<TemporalTrigger>,
    use_timezone: Option<bool>,
    index: IndexHints,
    overrides: NameOverrides,
    countdown: Option<Duration>,
}

impl CachedFieldBuilder {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expires_after(mut self, duration: Duration) -> Self {
        self.expires_after = Some(duration);
        self
    }

    pub fn trigger(mut self, trigger: TemporalTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn use_timezone(mut self, use_timezone: bool) -> Self {
        self.use_timezone = Some(use_timezone);
        self
    }

    pub fn index_expiration(mut self, index: bool) -> Self {
        self.index.expiration = index;
        self
    }

    pub fn index_recalculation_flag(mut self, index: bool) -> Self {
        self.index.recalculation_flag = index;
        self
    }

    pub fn cached_value_name(mut self, name: impl Into<String>) -> Self {
        self.overrides.cached_value = Some(name.into());
        self
    }

    pub fn recalculation_flag_name(mut self, name: impl Into<String>) -> Self {
        self.overrides.recalculation_flag = Some(name.into());
        self
    }

    pub fn expiration_name(mut self, name: impl Into<String>) -> Self {
        self.overrides.expiration = Some(name.into());
        self
    }

    pub fn calculation_method_name(mut self, name: impl Into<String>) -> Self {
        self.overrides.calculation_method = Some(name.into());
        self
    }

    /// Delay before a dispatched job becomes visible to workers.
    pub fn countdown(mut self, delay: Duration) -> Self {
        self.countdown = Some(delay);
        self
    }

    pub fn build(self, defaults: &FieldDefaults) -> CachedFieldSpec {
        let names = FieldNames::derive(&self.name, &self.overrides);
        let dispatch = match self.countdown {
            Some(delay) => DispatchOptions {
                countdown: Some(delay),
            },
            None => defaults.dispatch,
        };
        CachedFieldSpec {
            name: self.name,
            kind: self.kind,
            compute: self.compute,
            expires_after: self.expires_after.unwrap_or(defaults.expires_after),
            triggers: self.triggers,
            use_timezone: self.use_timezone.unwrap_or(defaults.use_timezone),
            index: self.index,
            names,
            dispatch,
        }
    }
}
