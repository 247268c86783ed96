//! Expiration Policy Module
//!
//! Decides when a cached value is stale and when it next becomes stale.

mod engine;
mod timestamp;
mod trigger;


// Re-export public types
pub use engine::{compute_expiration, force_expire, is_expired, is_stale, settle_expiration};
pub use timestamp::{Clock, ManualClock, SystemClock, TimeMode, Timestamp};
pub use trigger::{Expiration, TemporalTrigger, TriggerContext};
