//! Task Transport Module
//!
//! Recalculation jobs are plain messages handed to a transport. Delivery is
//! at-least-once: a job may arrive twice, or never.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{CachedFieldError, Result};
use crate::identity::ObjectRef;

// == Recalculation Job ==
/// Request to recalculate one field of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationJob {
    pub object: ObjectRef,
    pub field: String,
    pub enqueued_at: DateTime<Utc>,
}

impl RecalculationJob {
    pub fn new(object: ObjectRef, field: impl Into<String>, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            object,
            field: field.into(),
            enqueued_at,
        }
    }
}

// == Dispatch Options ==
/// Per-field delivery options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchOptions {
    /// Delay before the job becomes visible to workers
    pub countdown: Option<Duration>,
}

// == Transport Trait ==
/// Fire-and-forget job hand-off.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn enqueue(&self, job: RecalculationJob, options: &DispatchOptions) -> Result<()>;
}

// == Channel Transport ==
/// In-process transport over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<RecalculationJob>,
}

/// Receiving half shared by every worker task.
#[derive(Debug, Clone)]
pub struct JobReceiver {
    inner: Arc<Mutex<mpsc::UnboundedReceiver<RecalculationJob>>>,
}

impl ChannelTransport {
    /// Creates a connected transport and receiver.
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self { sender },
            JobReceiver {
                inner: Arc::new(Mutex::new(receiver)),
            },
        )
    }
}

#[async_trait]
impl JobTransport for ChannelTransport {
    async fn enqueue(&self, job: RecalculationJob, options: &DispatchOptions) -> Result<()> {
        if self.sender.is_closed() {
            return Err(CachedFieldError::Transport(
                "recalculation queue is closed".to_string(),
            ));
        }

        match options.countdown {
            Some(delay) if !delay.is_zero() => {
                debug!("delaying job for {} by {:?}", job.object, delay);
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // A closed queue by now means shutdown; the claim is left
                    // for the reaper.
                    let _ = sender.send(job);
                });
                Ok(())
            }
            _ => self
                .sender
                .send(job)
                .map_err(|_| CachedFieldError::Transport("recalculation queue is closed".into())),
        }
    }
}

impl JobReceiver {
    /// Waits for the next job; `None` once every sender is gone.
    pub async fn recv(&self) -> Option<RecalculationJob> {
        self.inner.lock().await.recv().await
    }

    /// Takes a job if one is ready.
    pub async fn try_recv(&self) -> Option<RecalculationJob> {
        self.inner.lock().await.try_recv().ok()
    }
}
