//! The pub/sub event bus: every subscriber sees every job transition from
//! the moment it subscribes, with no replay, and a slow subscriber is
//! dropped rather than allowed to slow the broker.
//!
//! Grounded on `original_source/src/core/job_manager.py`'s `subscribers`
//! list + `_broadcast`'s `put_nowait`, upgraded from an unbounded queue to
//! a bounded mailbox that drops a slow subscriber instead of growing
//! without limit.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

const SUBSCRIBER_MAILBOX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct JobUpdateEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub job_id: Uuid,
    pub status: String,
}

impl JobUpdateEvent {
    pub fn new(job_id: Uuid, status: &str) -> Self {
        Self { event_type: "job_update", job_id, status: status.to_string() }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: DashMap<u64, mpsc::Sender<JobUpdateEvent>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: DashMap::new(), next_id: std::sync::atomic::AtomicU64::new(0) }
    }

    pub fn subscribe(&self) -> mpsc::Receiver<JobUpdateEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_MAILBOX_CAPACITY);
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.subscribers.insert(id, tx);
        rx
    }

    /// Non-blocking send to every subscriber; a full or closed mailbox is
    /// dropped from the subscriber list rather than awaited.
    pub fn publish(&self, event: JobUpdateEvent) {
        self.subscribers.retain(|_, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(job_id = %event.job_id, "dropping slow subscriber (mailbox full)");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}
