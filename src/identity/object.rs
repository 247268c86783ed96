//! Object Identity Module
//!
//! Canonical model labels and normalized object ids, stable regardless of
//! whether an object was reached through a proxy model.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CachedFieldError, Result};

// == Object Id ==
/// A domain object's primary key, numeric or string.
///
/// `Display` quotes string ids so `42` and `"42"` never look alike in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Int(i64),
    Str(String),
}

impl ObjectId {
    /// Normalizes a raw id: digits that fit in an `i64` become numeric.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CachedFieldError::IdentityResolution(
                "object id is empty".to_string(),
            ));
        }
        let numeric = raw.strip_prefix('-').unwrap_or(raw);
        if numeric.chars().all(|c| c.is_ascii_digit()) && !numeric.is_empty() {
            if let Ok(id) = raw.parse::<i64>() {
                return Ok(ObjectId::Int(id));
            }
        }
        Ok(ObjectId::Str(raw.to_string()))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Int(id) => write!(f, "{}", id),
            ObjectId::Str(id) => write!(f, "{:?}", id),
        }
    }
}

impl From<i64> for ObjectId {
    fn from(id: i64) -> Self {
        ObjectId::Int(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId::Str(id.to_string())
    }
}

// == Object Ref ==
/// Canonical identity of a domain object: concrete model label plus id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub model: String,
    pub id: ObjectId,
}

impl ObjectRef {
    pub fn new(model: impl Into<String>, id: impl Into<ObjectId>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model, self.id)
    }
}

// == Model Meta ==
/// What the host tells us about one of its models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub app_label: String,
    pub object_name: String,
    /// Label of the model this one is a proxy for
    pub proxy_for: Option<String>,
    /// Attribute and method names already defined on the model
    pub attributes: BTreeSet<String>,
}

impl ModelMeta {
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            object_name: object_name.into(),
            proxy_for: None,
            attributes: BTreeSet::new(),
        }
    }

    pub fn proxy(
        app_label: impl Into<String>,
        object_name: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            proxy_for: Some(target.into()),
            ..Self::new(app_label, object_name)
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// `app_label.ObjectName`
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.object_name)
    }
}

// == Model Catalog ==
/// Registry of host models, used to canonicalize identities.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    models: HashMap<String, ModelMeta>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, meta: ModelMeta) -> &mut Self {
        self.models.insert(meta.label(), meta);
        self
    }

    pub fn get(&self, label: &str) -> Option<&ModelMeta> {
        self.models.get(label)
    }

    /// Follows the proxy chain from `label` to the concrete model.
    pub fn canonical_name(&self, label: &str) -> Result<String> {
        let mut seen = HashSet::new();
        let mut current = label;
        loop {
            let meta = self.models.get(current).ok_or_else(|| {
                CachedFieldError::IdentityResolution(format!("unknown model {:?}", current))
            })?;
            if !seen.insert(current) {
                return Err(CachedFieldError::IdentityResolution(format!(
                    "proxy cycle through model {:?}",
                    current
                )));
            }
            match meta.proxy_for.as_deref() {
                Some(target) => current = target,
                None => return Ok(meta.label()),
            }
        }
    }

    /// Canonical identity for an object reached through `label`.
    pub fn resolve(&self, label: &str, raw_id: &str) -> Result<ObjectRef> {
        let model = self.canonical_name(label)?;
        let id = ObjectId::parse(raw_id).map_err(|_| {
            CachedFieldError::IdentityResolution(format!("empty object id for model {}", model))
        })?;
        Ok(ObjectRef { model, id })
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        let mut catalog = ModelCatalog::new();
        catalog
            .register(ModelMeta::new("library", "Book"))
            .register(ModelMeta::proxy("library", "PublishedBook", "library.Book"))
            .register(ModelMeta::proxy("library", "Bestseller", "library.PublishedBook"));
        catalog
    }

    #[test]
    fn test_parse_numeric_and_string_ids() {
        assert_eq!(ObjectId::parse("42").unwrap(), ObjectId::Int(42));
        assert_eq!(ObjectId::parse(" -7 ").unwrap(), ObjectId::Int(-7));
        assert_eq!(
            ObjectId::parse("isbn-123").unwrap(),
            ObjectId::Str("isbn-123".into())
        );
        // Too large for i64 stays a string
        assert_eq!(
            ObjectId::parse("99999999999999999999").unwrap(),
            ObjectId::Str("99999999999999999999".into())
        );
        assert!(matches!(
            ObjectId::parse("  "),
            Err(CachedFieldError::IdentityResolution(_))
        ));
    }

    #[test]
    fn test_display_distinguishes_kinds() {
        assert_eq!(ObjectId::Int(42).to_string(), "42");
        assert_eq!(ObjectId::Str("42".into()).to_string(), "\"42\"");
        assert_eq!(
            ObjectRef::new("library.Book", 3i64).to_string(),
            "library.Book(3)"
        );
    }

    #[test]
    fn test_proxy_chain_resolves_to_concrete() {
        let catalog = catalog();
        assert_eq!(catalog.canonical_name("library.Bestseller").unwrap(), "library.Book");

        let via_proxy = catalog.resolve("library.PublishedBook", "5").unwrap();
        let direct = catalog.resolve("library.Book", "5").unwrap();
        assert_eq!(via_proxy, direct);
    }

    #[test]
    fn test_unknown_model_and_cycles() {
        let mut catalog = catalog();
        assert!(matches!(
            catalog.canonical_name("library.Missing"),
            Err(CachedFieldError::IdentityResolution(_))
        ));

        catalog
            .register(ModelMeta::proxy("loop", "A", "loop.B"))
            .register(ModelMeta::proxy("loop", "B", "loop.A"));
        let err = catalog.canonical_name("loop.A").unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_resolve_rejects_empty_id() {
        let err = catalog().resolve("library.Book", "").unwrap_err();
        assert!(err.to_string().contains("library.Book"));
    }

    #[test]
    fn test_object_id_serde_untagged() {
        let ids: Vec<ObjectId> = serde_json::from_str(r#"[1, "a"]"#).unwrap();
        assert_eq!(ids, vec![ObjectId::Int(1), ObjectId::Str("a".into())]);
    }
}
