//! Temporal Trigger Module
//!
//! Rules that each produce a concrete expiration instant from "now".

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Serialize;

use super::timestamp::{TimeMode, Timestamp};

// == Expiration ==
/// A planned expiration. `forced` marks an immediate re-expiration, which is
/// exempt from the never-move-backwards rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Expiration {
    pub at: Timestamp,
    pub forced: bool,
}

impl Expiration {
    pub fn planned(at: Timestamp) -> Self {
        Self { at, forced: false }
    }

    pub fn forced(at: Timestamp) -> Self {
        Self { at, forced: true }
    }
}

// == Temporal Trigger ==
/// An expiration rule. A trigger applies when it yields an instant strictly
/// after now; `Immediately` always applies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TemporalTrigger {
    /// Expire a fixed duration after recalculation
    After(Duration),
    /// Expire at a fixed instant, while it is still ahead
    At(Timestamp),
    /// Expire at the next occurrence of a wall-clock time
    DailyAt(NaiveTime),
    /// Expire a number of calendar months after recalculation
    MonthsAfter(u32),
    /// Expire together with another cached field of the same object
    AlignWith(String),
    /// Expire as soon as the value is written
    Immediately,
}

impl TemporalTrigger {
    pub fn evaluate(&self, now: &Timestamp, ctx: &TriggerContext) -> Option<Expiration> {
        let ahead = |at: &Timestamp| at.is_after(now);
        match self {
            TemporalTrigger::After(duration) => now
                .checked_add(*duration)
                .filter(ahead)
                .map(Expiration::planned),
            TemporalTrigger::At(at) => Some(*at).filter(ahead).map(Expiration::planned),
            TemporalTrigger::DailyAt(time) => now
                .next_wall_time(*time)
                .filter(ahead)
                .map(Expiration::planned),
            TemporalTrigger::MonthsAfter(months) => now
                .checked_add_months(*months)
                .filter(ahead)
                .map(Expiration::planned),
            TemporalTrigger::AlignWith(field) => ctx
                .expiration_of(field)
                .filter(ahead)
                .map(Expiration::planned),
            TemporalTrigger::Immediately => Some(Expiration::forced(*now)),
        }
    }

    /// Kind of instant the trigger is pinned to, if any.
    pub fn pinned_mode(&self) -> Option<TimeMode> {
        match self {
            TemporalTrigger::At(at) => Some(at.mode()),
            _ => None,
        }
    }

    /// Sibling field this trigger depends on.
    pub fn aligned_field(&self) -> Option<&str> {
        match self {
            TemporalTrigger::AlignWith(field) => Some(field),
            _ => None,
        }
    }
}

// == Trigger Context ==
/// Current expirations of the sibling fields a trigger may align with.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    siblings: HashMap<String, Timestamp>,
}

impl TriggerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sibling(mut self, field: impl Into<String>, expires_at: Timestamp) -> Self {
        self.siblings.insert(field.into(), expires_at);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, expires_at: Timestamp) {
        self.siblings.insert(field.into(), expires_at);
    }

    pub fn expiration_of(&self, field: &str) -> Option<Timestamp> {
        self.siblings.get(field).copied()
    }
}
