//! Protocol Tests
//!
//! End-to-end runs of the recalculation protocol on a hand-driven clock:
//! the 60 second timeline plus the core guarantees of the coordinator,
//! worker and accessor working together, including changes that land while
//! a recalculation is still computing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tokio::task::{JoinHandle, JoinSet};

use cached_fields::{
    field::{CachedFieldSpec, FieldDefaults, FieldKind, FieldRegistry, RegisteredField},
    host::{DomainObject, MemoryObjects},
    identity::{ModelCatalog, ModelMeta, ObjectRef},
    policy::{ManualClock, Timestamp},
    recalc::{ClaimOutcome, JobOutcome},
    storage::{AuxiliaryStorage, MemoryStorage},
    tasks::reap_stuck_claims,
    transport::{ChannelTransport, JobReceiver, RecalculationJob},
    AppState,
};

// == Fixture ==

/// Holds the next compute call until the test lets it go.
struct Gate {
    armed: AtomicBool,
    entered: Barrier,
    released: Barrier,
}

impl Gate {
    fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            entered: Barrier::new(2),
            released: Barrier::new(2),
        }
    }

    fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.released.wait();
        }
    }
}

struct Protocol {
    state: AppState,
    storage: Arc<MemoryStorage>,
    objects: Arc<MemoryObjects>,
    clock: Arc<ManualClock>,
    receiver: JobReceiver,
    field: Arc<RegisteredField>,
    object: ObjectRef,
    gate: Arc<Gate>,
}

impl Protocol {
    async fn new() -> Self {
        let mut catalog = ModelCatalog::new();
        catalog.register(ModelMeta::new("reports", "Dashboard").with_attributes(["version"]));

        let defaults = FieldDefaults {
            expires_after: Duration::from_secs(60),
            use_timezone: false,
            ..FieldDefaults::default()
        };
        let gate = Arc::new(Gate::new());
        let held = gate.clone();
        let mut registry = FieldRegistry::new(catalog, defaults);
        registry
            .register(
                "reports.Dashboard",
                CachedFieldSpec::builder(
                    "snapshot",
                    FieldKind::Text,
                    move |o: &DomainObject| -> anyhow::Result<Value> {
                        held.pass();
                        Ok(json!(format!("V{}", o.data["version"])))
                    },
                ),
            )
            .unwrap();

        let storage = Arc::new(MemoryStorage::new());
        let objects = Arc::new(MemoryObjects::new());
        let clock = Arc::new(ManualClock::at_secs(0));
        let (transport, receiver) = ChannelTransport::channel();
        let state = AppState::new(
            registry,
            storage.clone(),
            objects.clone(),
            clock.clone(),
            Arc::new(transport),
            true,
        );

        let object = ObjectRef::new("reports.Dashboard", 1i64);
        objects.put(object.clone(), json!({ "version": 1 })).await;
        let field = state.registry.lookup("reports.Dashboard", "snapshot").unwrap();

        Self {
            state,
            storage,
            objects,
            clock,
            receiver,
            field,
            object,
            gate,
        }
    }

    /// Starts `job` on a worker task and returns once its compute is
    /// underway and parked.
    async fn hold(&self, job: RecalculationJob) -> JoinHandle<JobOutcome> {
        self.gate.armed.store(true, Ordering::SeqCst);
        let worker = self.state.worker.clone();
        let handle = tokio::spawn(async move { worker.handle(&job).await.unwrap() });

        let gate = self.gate.clone();
        tokio::task::spawn_blocking(move || gate.entered.wait())
            .await
            .unwrap();
        handle
    }

    /// Lets a held compute finish and returns the job outcome.
    async fn finish(&self, held: JoinHandle<JobOutcome>) -> JobOutcome {
        let gate = self.gate.clone();
        tokio::task::spawn_blocking(move || gate.released.wait())
            .await
            .unwrap();
        held.await.unwrap()
    }

    /// Record at t=61 with a recalculation claimed and its job taken.
    async fn stale_with_job(&self) -> RecalculationJob {
        self.read().await;
        self.clock.set_secs(61);
        self.read().await;
        self.receiver.try_recv().await.unwrap()
    }

    async fn read(&self) -> Value {
        self.state
            .accessor
            .read(&self.field, &self.object)
            .await
            .unwrap()
    }

    async fn bump_version(&self, version: u64) {
        self.objects
            .put(self.object.clone(), json!({ "version": version }))
            .await;
    }

    async fn drain_jobs(&self) -> usize {
        let mut count = 0;
        while self.receiver.try_recv().await.is_some() {
            count += 1;
        }
        count
    }

    async fn expires_at(&self) -> Option<Timestamp> {
        self.storage
            .get(&self.object, "snapshot")
            .await
            .unwrap()
            .and_then(|record| record.expires_at)
    }
}

fn naive(secs: i64) -> Timestamp {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Timestamp::Naive(epoch + chrono::TimeDelta::seconds(secs))
}

// == Timeline ==

#[tokio::test]
async fn test_sixty_second_timeline() {
    let p = Protocol::new().await;

    // t=0: first computation
    assert_eq!(p.read().await, json!("V1"));
    assert_eq!(p.expires_at().await, Some(naive(60)));
    assert_eq!(p.drain_jobs().await, 0);

    // t=30: fresh, nothing dispatched
    p.clock.set_secs(30);
    assert_eq!(p.read().await, json!("V1"));
    assert_eq!(p.drain_jobs().await, 0);

    // t=61: stale value served, one job out
    p.bump_version(2).await;
    p.clock.set_secs(61);
    assert_eq!(p.read().await, json!("V1"));
    let job = p.receiver.try_recv().await.unwrap();
    assert_eq!(p.drain_jobs().await, 0);

    // worker runs
    let outcome = p.state.worker.handle(&job).await.unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Written {
            value: json!("V2"),
            expires_at: naive(121),
        }
    );
    let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
    assert_eq!(record.cached_value, Some(json!("V2")));
    assert!(!record.is_recalculating);
    assert_eq!(record.expires_at, Some(naive(121)));

    // t=65: new value, still fresh
    p.clock.set_secs(65);
    assert_eq!(p.read().await, json!("V2"));
    assert_eq!(p.drain_jobs().await, 0);
}

// == Mutual Exclusion ==

#[tokio::test]
async fn test_concurrent_ensure_fresh_dispatches_one_job() {
    let p = Protocol::new().await;
    p.read().await;
    p.clock.set_secs(100);
    let mutations_before = p.storage.mutation_count();

    let mut callers = JoinSet::new();
    for _ in 0..16 {
        let coordinator = p.state.coordinator.clone();
        let field = p.field.clone();
        let object = p.object.clone();
        callers.spawn(async move {
            let record = coordinator.current(&field, &object).await.unwrap();
            let (_, outcome) = coordinator
                .refresh_if_stale(&field, &object, record)
                .await
                .unwrap();
            outcome
        });
    }

    let mut claimed = 0;
    while let Some(outcome) = callers.join_next().await {
        if outcome.unwrap() == ClaimOutcome::Claimed {
            claimed += 1;
        }
    }

    assert_eq!(claimed, 1);
    assert_eq!(p.drain_jobs().await, 1);
    // The flag flipped exactly once
    assert_eq!(p.storage.mutation_count() - mutations_before, 1);
    assert_eq!(p.state.stats.snapshot().jobs_dispatched, 1);
}

// == Atomic Visibility ==

#[tokio::test]
async fn test_value_and_expiration_come_from_same_run() {
    let p = Protocol::new().await;
    p.read().await;

    for version in 2..6u64 {
        p.bump_version(version).await;
        let at = 61 * (version as i64 - 1);
        p.clock.set_secs(at);

        p.read().await;
        let job = p.receiver.try_recv().await.unwrap();
        p.state.worker.handle(&job).await.unwrap();

        let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
        assert_eq!(record.cached_value, Some(json!(format!("V{}", version))));
        assert_eq!(record.expires_at, Some(naive(at + 60)));
    }
}

// == Idempotent Redelivery ==

#[tokio::test]
async fn test_redelivered_job_performs_no_writes() {
    let p = Protocol::new().await;
    p.read().await;
    p.clock.set_secs(61);
    p.read().await;

    let job = p.receiver.try_recv().await.unwrap();
    p.state.worker.handle(&job).await.unwrap();
    let mutations = p.storage.mutation_count();

    for _ in 0..3 {
        let outcome = p.state.worker.handle(&job).await.unwrap();
        assert_eq!(outcome, JobOutcome::StaleWriteRejected);
    }
    assert_eq!(p.storage.mutation_count(), mutations);
    assert_eq!(p.state.stats.snapshot().stale_jobs_skipped, 3);
}

// == Non-blocking Read ==

#[tokio::test]
async fn test_read_does_not_wait_for_in_flight_job() {
    let p = Protocol::new().await;
    p.read().await;
    p.clock.set_secs(61);

    // No worker is running; the job stays queued
    for _ in 0..3 {
        let value = tokio::time::timeout(Duration::from_secs(1), p.read())
            .await
            .expect("read blocked on recalculation");
        assert_eq!(value, json!("V1"));
    }
    assert_eq!(p.drain_jobs().await, 1);
}

// == Cold Start ==

#[tokio::test]
async fn test_first_read_yields_value() {
    let p = Protocol::new().await;
    assert!(p.storage.get(&p.object, "snapshot").await.unwrap().is_none());

    assert_eq!(p.read().await, json!("V1"));
    let snapshot = p.state.stats.snapshot();
    assert_eq!(snapshot.cold_starts, 1);
    assert_eq!(snapshot.recalculations, 1);
}

// == Object Deleted Mid-flight ==

#[tokio::test]
async fn test_job_for_deleted_object_is_dropped() {
    let p = Protocol::new().await;
    p.read().await;
    p.clock.set_secs(61);
    p.read().await;
    let job = p.receiver.try_recv().await.unwrap();

    p.objects.remove(&p.object).await;
    p.storage.purge_object(&p.object).await.unwrap();

    let outcome = p.state.worker.handle(&job).await.unwrap();
    assert_eq!(outcome, JobOutcome::StaleWriteRejected);
    assert!(p.storage.get(&p.object, "snapshot").await.unwrap().is_none());
}

#[tokio::test]
async fn test_job_for_vanished_object_releases_claim() {
    let p = Protocol::new().await;
    p.read().await;
    p.clock.set_secs(61);
    p.read().await;
    let job = p.receiver.try_recv().await.unwrap();

    p.objects.remove(&p.object).await;

    let outcome = p.state.worker.handle(&job).await.unwrap();
    assert_eq!(outcome, JobOutcome::ObjectMissing);
    let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
    assert!(!record.is_recalculating);
    assert_eq!(record.cached_value, Some(json!("V1")));
}

// == Changes During Recalculation ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flag_as_stale_during_recalculation_keeps_field_stale() {
    let p = Protocol::new().await;
    let job = p.stale_with_job().await;

    let held = p.hold(job).await;
    p.bump_version(3).await;
    p.state
        .coordinator
        .flag_as_stale(&p.field, &p.object, Some(false))
        .await
        .unwrap();

    assert_eq!(p.finish(held).await, JobOutcome::StaleWriteRejected);
    let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
    assert_eq!(record.cached_value, Some(json!("V1")));
    assert_eq!(record.expires_at, None);
    assert!(!record.is_recalculating);

    // The next access recalculates from the new data
    assert_eq!(p.read().await, json!("V1"));
    let job = p.receiver.try_recv().await.unwrap();
    p.state.worker.handle(&job).await.unwrap();
    assert_eq!(p.read().await, json!("V3"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flag_as_stale_with_recalculation_during_recalculation() {
    let p = Protocol::new().await;
    let job = p.stale_with_job().await;

    let held = p.hold(job).await;
    p.bump_version(3).await;
    let record = p
        .state
        .coordinator
        .flag_as_stale(&p.field, &p.object, Some(true))
        .await
        .unwrap();
    assert_eq!(record.expires_at, None);
    assert!(record.is_recalculating);
    let reissued = p.receiver.try_recv().await.unwrap();

    assert_eq!(p.finish(held).await, JobOutcome::StaleWriteRejected);
    let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
    assert_eq!(record.cached_value, Some(json!("V1")));
    assert_eq!(record.expires_at, None);
    assert!(record.is_recalculating);

    assert_eq!(
        p.state.worker.handle(&reissued).await.unwrap(),
        JobOutcome::Written {
            value: json!("V3"),
            expires_at: naive(121),
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_during_recalculation_stays_deleted() {
    let p = Protocol::new().await;
    let job = p.stale_with_job().await;

    let held = p.hold(job).await;
    p.objects.remove(&p.object).await;
    assert_eq!(p.storage.purge_object(&p.object).await.unwrap(), 1);

    assert_eq!(p.finish(held).await, JobOutcome::StaleWriteRejected);
    assert!(p.storage.get(&p.object, "snapshot").await.unwrap().is_none());
    assert!(p.storage.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reaped_recalculation_cannot_overwrite_new_claim() {
    let p = Protocol::new().await;
    let job = p.stale_with_job().await;

    let held = p.hold(job).await;
    p.clock.set_secs(761);
    let reaped = reap_stuck_claims(
        &*p.storage,
        &*p.clock,
        &p.state.stats,
        Duration::from_secs(600),
    )
    .await
    .unwrap();
    assert_eq!(reaped, 1);

    // Another reader claims again
    p.bump_version(3).await;
    assert_eq!(p.read().await, json!("V1"));
    let second = p.receiver.try_recv().await.unwrap();

    assert_eq!(p.finish(held).await, JobOutcome::StaleWriteRejected);
    let record = p.storage.get(&p.object, "snapshot").await.unwrap().unwrap();
    assert!(record.holds_claim(second.enqueued_at));
    assert_eq!(record.cached_value, Some(json!("V1")));

    assert_eq!(
        p.state.worker.handle(&second).await.unwrap(),
        JobOutcome::Written {
            value: json!("V3"),
            expires_at: naive(821),
        }
    );
}
