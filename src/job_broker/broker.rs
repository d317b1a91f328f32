//! The `JobBroker`: queue, worker pool, retry loop, cleanup task.
//!
//! Grounded on `original_source/src/core/job_manager.py`'s `JobManager`
//! (`_worker`/`start`/`_cleanup_task`), with the in-memory `asyncio.Queue`
//! kept as `tokio::sync::mpsc` and the fixed worker pool spawned the way
//! `browser_pool/mod.rs` spawns its pool of long-lived tasks.

use super::events::{EventBus, JobUpdateEvent};
use super::job::{ErrorDetails, Job, JobStatus};
use super::retry::backoff_delay;
use super::store::Store;
use crate::config::Settings;
use crate::fetch_engine::{FetchEngine, FetchError};
use crate::webhook;
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Queue + worker pool + persistence + pub/sub, wired around a shared
/// [`FetchEngine`]. Cheap to clone (everything inside is `Arc`-backed);
/// clone it into each worker/cleanup task rather than sharing `&JobBroker`.
#[derive(Clone)]
pub struct JobBroker {
    store: Arc<Store>,
    events: Arc<EventBus>,
    engine: Arc<FetchEngine>,
    settings: Settings,
    queue_tx: mpsc::UnboundedSender<Uuid>,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    queue_size: Arc<AtomicI64>,
}

impl JobBroker {
    pub fn new(settings: Settings, store: Store, engine: Arc<FetchEngine>) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            store: Arc::new(store),
            events: Arc::new(EventBus::new()),
            engine,
            settings,
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            queue_size: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Allocate a fresh id, persist `queued`, enqueue. Never blocks on
    /// worker availability.
    pub async fn submit(
        &self,
        url: String,
        session_key: Option<String>,
        callback_url: Option<String>,
        issue_ref: Option<i64>,
    ) -> Result<Uuid, super::store::StoreError> {
        let job = Job::new(url, session_key, callback_url, issue_ref);
        let id = job.id;
        self.store.save(&job).await?;
        self.queue_tx.send(id).ok();
        self.queue_size.fetch_add(1, Ordering::Relaxed);
        gauge!("queue_size").set(self.queue_size.load(Ordering::Relaxed) as f64);
        info!(job_id = %id, url = %job.url, "job submitted");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Job>, super::store::StoreError> {
        self.store.get(id).await
    }

    pub fn subscribe(&self) -> mpsc::Receiver<JobUpdateEvent> {
        self.events.subscribe()
    }

    /// Jobs currently enqueued but not yet picked up by a worker
    /// (`/health`'s `active_jobs_queue`).
    pub fn queue_depth(&self) -> i64 {
        self.queue_size.load(Ordering::Relaxed).max(0)
    }

    /// If `REQUEUE_ABANDONED_ON_START` is set, jobs left `processing` by a
    /// prior crash are resurfaced as `queued` and re-enqueued.
    pub async fn requeue_abandoned(&self) -> Result<usize, super::store::StoreError> {
        if !self.settings.requeue_abandoned_on_start {
            return Ok(0);
        }
        let abandoned = self.store.find_abandoned_processing().await?;
        for job in &abandoned {
            self.store.mark_queued(job.id).await?;
            self.queue_tx.send(job.id).ok();
            self.queue_size.fetch_add(1, Ordering::Relaxed);
        }
        if !abandoned.is_empty() {
            warn!(count = abandoned.len(), "requeued jobs abandoned in processing by a prior crash");
        }
        Ok(abandoned.len())
    }

    /// Spawn the fixed worker pool (size `W = MAX_CONCURRENT_BROWSERS`) and
    /// the hourly cleanup task. Returns immediately; the spawned tasks run
    /// for the lifetime of the process.
    pub fn start(&self) {
        for worker_id in 0..self.settings.max_concurrent_browsers {
            let broker = self.clone();
            tokio::spawn(async move { broker.run_worker(worker_id).await });
        }
        let broker = self.clone();
        tokio::spawn(async move { broker.run_cleanup().await });
        info!(workers = self.settings.max_concurrent_browsers, "job broker started");
    }

    async fn run_worker(&self, worker_id: usize) {
        gauge!("active_workers").increment(1.0);
        loop {
            let job_id = {
                let mut rx = self.queue_rx.lock().await;
                match rx.recv().await {
                    Some(id) => id,
                    None => break,
                }
            };
            self.queue_size.fetch_sub(1, Ordering::Relaxed);
            gauge!("queue_size").set(self.queue_size.load(Ordering::Relaxed).max(0) as f64);

            let job = match self.store.get(job_id).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    warn!(%job_id, "skipping deleted job");
                    continue;
                }
                Err(e) => {
                    error!(%job_id, error = %e, "failed to load job, skipping");
                    continue;
                }
            };

            self.process(worker_id, job).await;
        }
        gauge!("active_workers").decrement(1.0);
    }

    async fn process(&self, worker_id: usize, mut job: Job) {
        job.status = JobStatus::Processing;
        job.started_at = Some(chrono::Utc::now());
        if let Err(e) = self.store.save(&job).await {
            error!(job_id = %job.id, error = %e, "failed to persist processing state");
        }
        self.events.publish(JobUpdateEvent::new(job.id, job.status.as_str()));

        let start = std::time::Instant::now();
        let mut attempt = 0u32;

        loop {
            info!(job_id = %job.id, worker_id, url = %job.url, attempt, "fetch attempt");
            match self.engine.fetch(&job.url).await {
                Ok(artifact) => {
                    job.result = Some(artifact);
                    job.error = None;
                    job.status = JobStatus::Completed;
                    counter!("jobs_total", "status" => "completed").increment(1);
                    break;
                }
                Err(err) => {
                    let retryable = retryable(&err);
                    job.error = Some(ErrorDetails { message: err.to_string(), code: err.code(), retryable });

                    if retryable && attempt < self.settings.max_retries {
                        let delay = backoff_delay(attempt);
                        warn!(job_id = %job.id, attempt, delay_secs = delay.as_secs_f64(), "retrying after error: {err}");
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    job.status = JobStatus::Failed;
                    counter!("jobs_total", "status" => "failed").increment(1);
                    break;
                }
            }
        }

        job.completed_at = Some(chrono::Utc::now());
        histogram!("job_duration_seconds").record(start.elapsed().as_secs_f64());

        if let Err(e) = self.store.save(&job).await {
            error!(job_id = %job.id, error = %e, "failed to persist terminal state");
        }
        self.events.publish(JobUpdateEvent::new(job.id, job.status.as_str()));

        webhook::dispatch_side_effects(job, self.settings.github_repo.clone());
    }

    async fn run_cleanup(&self) {
        loop {
            tokio::time::sleep(CLEANUP_INTERVAL).await;
            let cutoff = chrono::Utc::now() - chrono::Duration::from_std(self.settings.job_ttl()).unwrap_or(chrono::Duration::days(1));
            match self.store.delete_completed_before(cutoff).await {
                Ok(deleted) if deleted > 0 => info!(deleted, "purged expired jobs"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "job cleanup failed"),
            }
        }
    }
}

/// Every `FetchError` variant already carries its own retry classification;
/// this just exposes it under the name the retry loop reads.
fn retryable(err: &FetchError) -> bool {
    err.retryable()
}
