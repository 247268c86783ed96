//! Background Tasks Module
//!
//! Contains background tasks that run during server operation.
//!
//! # Tasks
//! - Worker pool: consumes recalculation jobs
//! - Reaper: releases recalculation claims that never finished

mod reaper;
mod worker_pool;

pub use reaper::{reap_stuck_claims, spawn_reaper_task};
pub use worker_pool::spawn_worker_pool;
