//! Demo Host Model
//!
//! A small library catalog served by the admin binary.

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveTime;
use serde_json::{json, Value};

use crate::field::{CachedFieldSpec, FieldDefaults, FieldKind, FieldRegistry};
use crate::host::DomainObject;
use crate::identity::{ModelCatalog, ModelMeta};
use crate::policy::TemporalTrigger;

/// Words read per minute, for `reading_minutes`.
const WORDS_PER_MINUTE: f64 = 250.0;
/// Average words on a page.
const WORDS_PER_PAGE: f64 = 300.0;

/// Host models of the demo: books, a proxy for published books, and members.
pub fn catalog() -> ModelCatalog {
    let mut catalog = ModelCatalog::new();
    catalog
        .register(ModelMeta::new("library", "Book").with_attributes(["title", "pages", "ratings"]))
        .register(ModelMeta::proxy("library", "PublishedBook", "library.Book"))
        .register(ModelMeta::new("library", "Member").with_attributes(["name", "loans"]));
    catalog
}

/// Builds the demo registry on top of `defaults`.
pub fn registry(defaults: FieldDefaults) -> anyhow::Result<FieldRegistry> {
    let mut registry = FieldRegistry::new(catalog(), defaults);

    registry
        .register(
            "library.Book",
            CachedFieldSpec::builder("page_count", FieldKind::PositiveInteger, page_count)
                .index_expiration(true),
        )
        .context("registering library.Book.page_count")?;

    registry
        .register(
            "library.Book",
            CachedFieldSpec::builder("reading_minutes", FieldKind::Integer, reading_minutes)
                .trigger(TemporalTrigger::AlignWith("page_count".to_string())),
        )
        .context("registering library.Book.reading_minutes")?;

    let nightly = NaiveTime::from_hms_opt(3, 0, 0).context("nightly refresh time")?;
    registry
        .register(
            "library.Book",
            CachedFieldSpec::builder("rating", FieldKind::Float, average_rating)
                .trigger(TemporalTrigger::DailyAt(nightly))
                .countdown(Duration::from_secs(1)),
        )
        .context("registering library.Book.rating")?;

    registry
        .register(
            "library.Member",
            CachedFieldSpec::builder("open_loans", FieldKind::SmallInteger, open_loans)
                .trigger(TemporalTrigger::MonthsAfter(1))
                .index_recalculation_flag(true),
        )
        .context("registering library.Member.open_loans")?;

    Ok(registry)
}

fn page_count(book: &DomainObject) -> anyhow::Result<Value> {
    let pages = book.data["pages"]
        .as_u64()
        .context("book has no page count")?;
    Ok(json!(pages))
}

fn reading_minutes(book: &DomainObject) -> anyhow::Result<Value> {
    let pages = book.data["pages"]
        .as_u64()
        .context("book has no page count")?;
    let minutes = (pages as f64 * WORDS_PER_PAGE / WORDS_PER_MINUTE).ceil();
    Ok(json!(minutes as i64))
}

fn average_rating(book: &DomainObject) -> anyhow::Result<Value> {
    let ratings: Vec<f64> = book.data["ratings"]
        .as_array()
        .map(|all| all.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if ratings.is_empty() {
        return Ok(json!(0.0));
    }
    Ok(json!(ratings.iter().sum::<f64>() / ratings.len() as f64))
}

fn open_loans(member: &DomainObject) -> anyhow::Result<Value> {
    let loans = member.data["loans"].as_array().context("member has no loans")?;
    let open = loans
        .iter()
        .filter(|loan| loan["returned"].as_bool() != Some(true))
        .count();
    Ok(json!(open))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ObjectRef;

    fn book(data: Value) -> DomainObject {
        DomainObject::new(ObjectRef::new("library.Book", 1i64), data)
    }

    #[test]
    fn test_demo_registry_registers_all_fields() {
        let registry = registry(FieldDefaults::default()).unwrap();
        assert_eq!(registry.len(), 4);
        assert!(registry.lookup("library.PublishedBook", "rating").is_ok());
        assert!(registry.lookup("library.Member", "open_loans").is_ok());
    }

    #[test]
    fn test_reading_minutes_rounds_up() {
        let minutes = reading_minutes(&book(json!({ "pages": 1 }))).unwrap();
        assert_eq!(minutes, json!(2));
    }

    #[test]
    fn test_average_rating() {
        let rating = average_rating(&book(json!({ "ratings": [3, 4, 5] }))).unwrap();
        assert_eq!(rating, json!(4.0));
        assert_eq!(average_rating(&book(json!({}))).unwrap(), json!(0.0));
    }

    #[test]
    fn test_page_count_requires_pages() {
        assert!(page_count(&book(json!({ "title": "Untitled" }))).is_err());
    }

    #[test]
    fn test_open_loans_skips_returned() {
        let member = DomainObject::new(
            ObjectRef::new("library.Member", 9i64),
            json!({ "loans": [{ "returned": true }, { "returned": false }, {}] }),
        );
        assert_eq!(open_loans(&member).unwrap(), json!(2));
    }
}
