//! Property-Based Tests for the Recalculation Protocol
//!
//! Uses proptest with `tokio_test::block_on` to drive concurrent readers and
//! repeated job deliveries against the in-memory store.

use proptest::prelude::*;
use serde_json::json;

use crate::policy::Clock;
use crate::recalc::test_support::{book, harness};
use crate::recalc::JobOutcome;
use crate::storage::{AuxiliaryStorage, RecordWrite};
use crate::transport::RecalculationJob;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Any number of concurrent stale reads claim the field once and
    // dispatch exactly one job.
    #[test]
    fn prop_concurrent_ensure_fresh_dispatches_once(
        readers in 2usize..24,
        read_at in 60i64..10_000,
    ) {
        let (jobs, claims, flagged) = tokio_test::block_on(async {
            let h = harness().await;
            h.storage
                .write(&book(1), "page_count", RecordWrite::completed(json!(1), h.naive(60)))
                .await
                .unwrap();
            h.clock.set_secs(read_at);
            let before = h.storage.mutation_count();

            let field = h.field("page_count");
            let mut handles = Vec::new();
            for _ in 0..readers {
                let coordinator = h.coordinator.clone();
                let field = field.clone();
                handles.push(tokio::spawn(async move {
                    coordinator.ensure_fresh(&field, &book(1)).await.unwrap()
                }));
            }
            let mut flagged = 0;
            for handle in handles {
                if handle.await.unwrap().is_recalculating {
                    flagged += 1;
                }
            }

            let mut jobs = 0;
            while h.receiver.try_recv().await.is_some() {
                jobs += 1;
            }
            (jobs, h.storage.mutation_count() - before, flagged)
        });

        prop_assert_eq!(jobs, 1);
        prop_assert_eq!(claims, 1);
        prop_assert!(flagged >= 1);
    }

    // However often a job is delivered, it writes once.
    #[test]
    fn prop_redelivered_job_writes_once(deliveries in 1usize..8) {
        let outcomes = tokio_test::block_on(async {
            let h = harness().await;
            h.storage
                .conditional_set_flag(&book(1), "page_count", false, true, h.clock.now_utc())
                .await
                .unwrap();
            let job = RecalculationJob::new(book(1), "page_count", h.clock.now_utc());

            let mut outcomes = Vec::new();
            for _ in 0..deliveries {
                outcomes.push(h.worker.handle(&job).await.unwrap());
            }
            outcomes
        });

        let written = outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Written { .. }))
            .count();
        prop_assert_eq!(written, 1);
        prop_assert!(
            matches!(outcomes[0], JobOutcome::Written { .. }),
            "first delivery writes"
        );
        prop_assert!(outcomes[1..]
            .iter()
            .all(|o| *o == JobOutcome::StaleWriteRejected));
    }

    // After each recalculation the stored value and expiration come from
    // that same recalculation.
    #[test]
    fn prop_value_and_expiration_move_together(
        steps in prop::collection::vec((1i64..500, 1i64..10_000), 1..8),
    ) {
        let observed = tokio_test::block_on(async {
            let h = harness().await;
            let field = h.field("page_count");
            let mut now = 0;
            let mut observed = Vec::new();

            for (gap, pages) in &steps {
                now += 60 + gap;
                h.clock.set_secs(now);
                h.objects.put(book(1), json!({"pages": pages})).await;

                h.coordinator.force_recalculate(&field, &book(1)).await.unwrap();
                let record = h.storage.get(&book(1), "page_count").await.unwrap().unwrap();
                observed.push((
                    record.cached_value,
                    record.expires_at,
                    json!(pages),
                    h.naive(now + 60),
                ));
            }
            observed
        });

        for (value, expires_at, expected_value, expected_at) in observed {
            prop_assert_eq!(value, Some(expected_value));
            prop_assert_eq!(expires_at, Some(expected_at));
        }
    }
}
