//! Worker Pool Task
//!
//! Background tasks that consume recalculation jobs from the shared queue.

use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::recalc::RecalcWorker;
use crate::transport::JobReceiver;

/// Spawns `concurrency` workers sharing one job queue.
///
/// The returned handle owns the workers: aborting it stops all of them. It
/// also finishes on its own once every transport sender is gone.
///
/// # Example
/// ```ignore
/// let (transport, receiver) = ChannelTransport::channel();
/// let pool = spawn_worker_pool(worker, receiver, 4);
/// // Later, during shutdown:
/// pool.abort();
/// ```
pub fn spawn_worker_pool(
    worker: Arc<RecalcWorker>,
    receiver: JobReceiver,
    concurrency: usize,
) -> JoinHandle<()> {
    let concurrency = concurrency.max(1);

    tokio::spawn(async move {
        info!("Starting {} recalculation workers", concurrency);

        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            let worker = worker.clone();
            let receiver = receiver.clone();
            workers.spawn(async move {
                while let Some(job) = receiver.recv().await {
                    match worker.handle(&job).await {
                        Ok(outcome) => debug!(
                            "worker {} finished {}.{}: {:?}",
                            id, job.object, job.field, outcome
                        ),
                        Err(err) => warn!(
                            "worker {} gave up on {}.{}: {}",
                            id, job.object, job.field, err
                        ),
                    }
                }
                debug!("worker {} stopping", id);
            });
        }

        while workers.join_next().await.is_some() {}
        info!("Recalculation queue closed, worker pool stopped");
    })
}
