//! Field Kind Module
//!
//! The value type a cached field stores. A computed value that does not fit
//! its kind is a compute failure and never reaches storage.

use std::net::IpAddr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").expect("decimal pattern"));
static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern"));
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("email pattern")
});

// == Field Kind ==
/// Storage type of a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    BigInteger,
    Boolean,
    Char { max_length: usize },
    Date,
    DateTime,
    Decimal,
    Email,
    Float,
    Integer,
    IpAddress,
    NullBoolean,
    PositiveInteger,
    PositiveSmallInteger,
    Slug,
    SmallInteger,
    Text,
    Time,
    /// Any JSON value
    Json,
}

impl FieldKind {
    /// Checks `value` against the kind, describing the mismatch on failure.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            FieldKind::Json => true,
            FieldKind::NullBoolean => value.is_null() || value.is_boolean(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::BigInteger => value.is_i64(),
            FieldKind::Integer => int_in(value, i32::MIN as i64, i32::MAX as i64),
            FieldKind::SmallInteger => int_in(value, i16::MIN as i64, i16::MAX as i64),
            FieldKind::PositiveInteger => int_in(value, 0, i32::MAX as i64),
            FieldKind::PositiveSmallInteger => int_in(value, 0, i16::MAX as i64),
            FieldKind::Float => value.is_number(),
            FieldKind::Decimal => match value {
                Value::Number(_) => true,
                Value::String(s) => is_decimal(s),
                _ => false,
            },
            FieldKind::Char { max_length } => {
                return match value.as_str() {
                    Some(s) if s.chars().count() <= *max_length => Ok(()),
                    Some(s) => Err(format!(
                        "{} characters exceeds max_length {}",
                        s.chars().count(),
                        max_length
                    )),
                    None => Err(self.mismatch(value)),
                };
            }
            FieldKind::Text => value.is_string(),
            FieldKind::Slug => value.as_str().is_some_and(is_slug),
            FieldKind::Email => value.as_str().is_some_and(is_email),
            FieldKind::IpAddress => value.as_str().is_some_and(|s| s.parse::<IpAddr>().is_ok()),
            FieldKind::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            FieldKind::Time => value.as_str().is_some_and(|s| s.parse::<NaiveTime>().is_ok()),
            FieldKind::DateTime => value.as_str().is_some_and(|s| {
                DateTime::parse_from_rfc3339(s).is_ok() || s.parse::<NaiveDateTime>().is_ok()
            }),
        };

        if ok {
            Ok(())
        } else {
            Err(self.mismatch(value))
        }
    }

    fn mismatch(&self, value: &Value) -> String {
        format!("{} does not fit a {:?} field", value, self)
    }
}

fn int_in(value: &Value, min: i64, max: i64) -> bool {
    value.as_i64().is_some_and(|n| (min..=max).contains(&n))
}

fn is_decimal(raw: &str) -> bool {
    DECIMAL.is_match(raw)
}

fn is_slug(raw: &str) -> bool {
    SLUG.is_match(raw)
}

fn is_email(raw: &str) -> bool {
    EMAIL.is_match(raw)
}
