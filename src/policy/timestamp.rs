//! Timestamp Module
//!
//! Expiration instants are either timezone-aware (UTC) or naive, chosen per
//! field. The two kinds never compare with each other.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::time::Duration;

use chrono::{DateTime, Local, Months, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// == Time Mode ==
/// Which kind of instant a field works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeMode {
    Aware,
    Naive,
}

impl TimeMode {
    pub fn from_use_timezone(use_timezone: bool) -> Self {
        if use_timezone {
            TimeMode::Aware
        } else {
            TimeMode::Naive
        }
    }

    pub fn uses_timezone(self) -> bool {
        matches!(self, TimeMode::Aware)
    }
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeMode::Aware => f.write_str("timezone-aware"),
            TimeMode::Naive => f.write_str("naive"),
        }
    }
}

// == Timestamp ==
/// A point in time, either UTC-aware or naive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Timestamp {
    Aware(DateTime<Utc>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    pub fn mode(&self) -> TimeMode {
        match self {
            Timestamp::Aware(_) => TimeMode::Aware,
            Timestamp::Naive(_) => TimeMode::Naive,
        }
    }

    /// Orders two instants of the same kind. Mixed kinds have no order.
    pub fn try_cmp(&self, other: &Timestamp) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Aware(a), Timestamp::Aware(b)) => Some(a.cmp(b)),
            (Timestamp::Naive(a), Timestamp::Naive(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Strictly later than `other`; false when the kinds differ.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.try_cmp(other) == Some(Ordering::Greater)
    }

    pub fn checked_add(&self, duration: Duration) -> Option<Timestamp> {
        let delta = TimeDelta::from_std(duration).ok()?;
        match self {
            Timestamp::Aware(at) => at.checked_add_signed(delta).map(Timestamp::Aware),
            Timestamp::Naive(at) => at.checked_add_signed(delta).map(Timestamp::Naive),
        }
    }

    pub fn checked_add_months(&self, months: u32) -> Option<Timestamp> {
        let months = Months::new(months);
        match self {
            Timestamp::Aware(at) => at.checked_add_months(months).map(Timestamp::Aware),
            Timestamp::Naive(at) => at.checked_add_months(months).map(Timestamp::Naive),
        }
    }

    /// Next instant strictly after `self` whose wall-clock time is `time`.
    ///
    /// Aware instants use UTC wall-clock time.
    pub fn next_wall_time(&self, time: NaiveTime) -> Option<Timestamp> {
        let naive = self.naive();
        let today = naive.date().and_time(time);
        let next = if today > naive {
            today
        } else {
            naive.date().succ_opt()?.and_time(time)
        };
        Some(self.rebuild(next))
    }

    fn naive(&self) -> NaiveDateTime {
        match self {
            Timestamp::Aware(at) => at.naive_utc(),
            Timestamp::Naive(at) => *at,
        }
    }

    fn rebuild(&self, naive: NaiveDateTime) -> Timestamp {
        match self {
            Timestamp::Aware(_) => Timestamp::Aware(Utc.from_utc_datetime(&naive)),
            Timestamp::Naive(_) => Timestamp::Naive(naive),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Aware(at) => write!(f, "{}", at.to_rfc3339()),
            Timestamp::Naive(at) => write!(f, "{}", at.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

// == Clock ==
/// Source of "now" for the policy engine.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC instant; also used to stamp recalculation claims.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current instant in the requested kind.
    fn now(&self, mode: TimeMode) -> Timestamp {
        let now = self.now_utc();
        match mode {
            TimeMode::Aware => Timestamp::Aware(now),
            TimeMode::Naive => Timestamp::Naive(now.naive_utc()),
        }
    }
}

/// Wall clock. Naive instants are local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now(&self, mode: TimeMode) -> Timestamp {
        match mode {
            TimeMode::Aware => Timestamp::Aware(Utc::now()),
            TimeMode::Naive => Timestamp::Naive(Local::now().naive_local()),
        }
    }
}

/// Hand-driven clock for tests and simulations. Naive instants are UTC
/// wall-clock time.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Clock set `secs` seconds after the Unix epoch.
    pub fn at_secs(secs: i64) -> Self {
        Self {
            millis: AtomicI64::new(secs.saturating_mul(1000)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), AtomicOrdering::SeqCst);
    }

    pub fn set_secs(&self, secs: i64) {
        self.millis
            .store(secs.saturating_mul(1000), AtomicOrdering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(millis, AtomicOrdering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let millis = self.millis.load(AtomicOrdering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_mixed_kinds_do_not_compare() {
        let aware = Timestamp::Aware(Utc.from_utc_datetime(&naive(10, 0)));
        let plain = Timestamp::Naive(naive(9, 0));
        assert_eq!(aware.try_cmp(&plain), None);
        assert!(!aware.is_after(&plain));
        assert!(!plain.is_after(&aware));
    }

    #[test]
    fn test_checked_add_keeps_kind() {
        let start = Timestamp::Naive(naive(10, 0));
        let later = start.checked_add(Duration::from_secs(90)).unwrap();
        assert_eq!(later, Timestamp::Naive(naive(10, 1) + TimeDelta::seconds(30)));
        assert_eq!(later.mode(), TimeMode::Naive);
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        let start = Timestamp::Naive(naive(8, 0));
        let next = start.checked_add_months(1).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        assert_eq!(next, Timestamp::Naive(expected));
    }

    #[test]
    fn test_next_wall_time_rolls_to_tomorrow() {
        let start = Timestamp::Naive(naive(18, 0));
        let six_am = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        let next = start.next_wall_time(six_am).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_time(six_am);
        assert_eq!(next, Timestamp::Naive(expected));

        let same_time = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert!(start.next_wall_time(same_time).unwrap().is_after(&start));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_secs(0);
        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now_utc().timestamp(), 61);
        assert_eq!(clock.now(TimeMode::Naive).mode(), TimeMode::Naive);

        clock.set_secs(5);
        assert_eq!(clock.now_utc().timestamp(), 5);
    }

    #[test]
    fn test_timestamp_serde_is_tagged() {
        let ts = Timestamp::Naive(naive(10, 0));
        let json = serde_json::to_value(ts).unwrap();
        assert_eq!(json["kind"], "naive");
        let back: Timestamp = serde_json::from_value(json).unwrap();
        assert_eq!(back, ts);
    }
}
