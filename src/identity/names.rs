//! Field Naming Module
//!
//! Derives the auxiliary storage names of a cached field and binds its
//! helper operations without shadowing anything the model already defines.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{CachedFieldError, Result};

// == Name Overrides ==
/// Custom names replacing the derived defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameOverrides {
    pub cached_value: Option<String>,
    pub recalculation_flag: Option<String>,
    pub expiration: Option<String>,
    pub calculation_method: Option<String>,
}

// == Field Names ==
/// Auxiliary storage names for one cached field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldNames {
    pub field: String,
    /// `cached_{field}`
    pub cached_value: String,
    /// `{field}_recalculation_needed`
    pub recalculation_flag: String,
    /// `{field}_expires_after`
    pub expiration: String,
    /// `calculate_{field}`
    pub calculation_method: String,
}

impl FieldNames {
    pub fn derive(field: &str, overrides: &NameOverrides) -> Self {
        let pick = |custom: &Option<String>, default: String| custom.clone().unwrap_or(default);
        Self {
            field: field.to_string(),
            cached_value: pick(&overrides.cached_value, format!("cached_{}", field)),
            recalculation_flag: pick(
                &overrides.recalculation_flag,
                format!("{}_recalculation_needed", field),
            ),
            expiration: pick(&overrides.expiration, format!("{}_expires_after", field)),
            calculation_method: pick(
                &overrides.calculation_method,
                format!("calculate_{}", field),
            ),
        }
    }

    /// Names that occupy storage columns on the model.
    pub fn storage_names(&self) -> [&str; 3] {
        [
            self.cached_value.as_str(),
            self.recalculation_flag.as_str(),
            self.expiration.as_str(),
        ]
    }
}

// == Bindings ==
/// Whether a helper operation is ours or the model's own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", content = "name", rename_all = "snake_case")]
pub enum Binding {
    Generated(String),
    Custom(String),
}

impl Binding {
    pub fn name(&self) -> &str {
        match self {
            Binding::Generated(name) | Binding::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Binding::Custom(_))
    }
}

/// Resolved names for one cached field on one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldBindings {
    pub names: FieldNames,
    pub recalculate: Binding,
    pub flag_as_stale: Binding,
    pub expire_after: Binding,
}

/// Checks `names` against the model's `attributes`.
///
/// Storage names must be free. A helper the model already defines is kept
/// as the model's own.
pub fn bind(names: FieldNames, attributes: &BTreeSet<String>) -> Result<FieldBindings> {
    {
        let mut claimed = BTreeSet::new();
        for storage_name in names.storage_names() {
            if storage_name == names.field
                || attributes.contains(storage_name)
                || !claimed.insert(storage_name)
            {
                return Err(CachedFieldError::Configuration(format!(
                    "cached field {:?} needs storage name {:?}, which is already taken",
                    names.field, storage_name
                )));
            }
        }
    }

    let helper = |name: String| {
        if attributes.contains(&name) {
            Binding::Custom(name)
        } else {
            Binding::Generated(name)
        }
    };

    Ok(FieldBindings {
        recalculate: helper(format!("recalculate_{}", names.field)),
        flag_as_stale: helper(format!("flag_{}_as_stale", names.field)),
        expire_after: helper(format!("expire_{}_after", names.field)),
        names,
    })
}
