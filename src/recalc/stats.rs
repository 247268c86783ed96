//! Recalculation Statistics Module
//!
//! Tracks reads, dispatches and worker outcomes across every cached field.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Recalc Stats ==
/// Shared counters, updated without locking.
#[derive(Debug, Default)]
pub struct RecalcStats {
    reads: AtomicU64,
    stale_reads: AtomicU64,
    cold_starts: AtomicU64,
    jobs_dispatched: AtomicU64,
    races_lost: AtomicU64,
    recalculations: AtomicU64,
    compute_failures: AtomicU64,
    stale_jobs_skipped: AtomicU64,
    claims_reaped: AtomicU64,
}

/// Point-in-time copy of `RecalcStats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Accessor reads
    pub reads: u64,
    /// Reads that found the value stale
    pub stale_reads: u64,
    /// Reads that had no value and computed in-line
    pub cold_starts: u64,
    /// Jobs handed to the transport
    pub jobs_dispatched: u64,
    /// Claims lost to another caller
    pub races_lost: u64,
    /// Successful writes by the worker path
    pub recalculations: u64,
    /// Compute callbacks that failed
    pub compute_failures: u64,
    /// Jobs dropped by the worker re-check
    pub stale_jobs_skipped: u64,
    /// Claims released by the reaper
    pub claims_reaped: u64,
}

impl RecalcStats {
    // == Constructor ==
    /// Creates a new RecalcStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Fresh Rate ==
    /// Fraction of reads that found a fresh value, or 0.0 with no reads.
    pub fn fresh_rate(&self) -> f64 {
        self.snapshot().fresh_rate()
    }

    // == Recorders ==
    pub fn record_read(&self, stale: bool) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if stale {
            self.stale_reads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cold_start(&self) {
        self.cold_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_race_lost(&self) {
        self.races_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recalculation(&self) {
        self.recalculations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute_failure(&self) {
        self.compute_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_job(&self) {
        self.stale_jobs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaped(&self, count: usize) {
        self.claims_reaped.fetch_add(count as u64, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
            cold_starts: self.cold_starts.load(Ordering::Relaxed),
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            races_lost: self.races_lost.load(Ordering::Relaxed),
            recalculations: self.recalculations.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            stale_jobs_skipped: self.stale_jobs_skipped.load(Ordering::Relaxed),
            claims_reaped: self.claims_reaped.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    pub fn fresh_rate(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            (self.reads - self.stale_reads) as f64 / self.reads as f64
        }
    }
}
