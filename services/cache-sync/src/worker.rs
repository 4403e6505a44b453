//! Background sync queue
//!
//! The request path must not wait for cache fan-out. Committing services
//! call [`SyncHandle::on_committed`] once per committed balance-affecting
//! mutation; the handle enqueues a job and returns immediately. A single
//! [`SyncWorker`] drains the queue and runs the coordinator for each job.
//!
//! Backpressure is drop-oldest-caller: when the queue is full the job is
//! discarded and counted, matching the coordinator's stance that a missed
//! sync costs freshness, not correctness. Shutdown drains whatever is
//! already queued before exiting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use types::errors::SyncError;
use types::ids::UserId;
use types::sync::{FieldValue, SyncContext, UserType};

use crate::coordinator::SyncCoordinator;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

const QUEUE_NAME: &str = "cache-sync.jobs";

/// One committed mutation awaiting cache fan-out.
#[derive(Debug)]
pub struct SyncJob {
    pub user_id: UserId,
    pub user_type: UserType,
    pub changed_fields: BTreeMap<String, FieldValue>,
    pub context: SyncContext,
}

/// Enqueue side of the sync queue, held by committing services.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<SyncJob>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl SyncHandle {
    /// Commit hook. Call exactly once per committed balance-affecting
    /// mutation, after the transaction has committed.
    ///
    /// Never blocks and never fails: a full or closed queue drops the job
    /// and records it.
    pub fn on_committed(
        &self,
        user_id: UserId,
        user_type: UserType,
        changed_fields: BTreeMap<String, FieldValue>,
        context: SyncContext,
    ) {
        let job = SyncJob {
            user_id,
            user_type,
            changed_fields,
            context,
        };
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    user_id = job.user_id.as_i64(),
                    user_type = %job.user_type,
                    operation = %job.context.operation,
                    error = %SyncError::QueueFull { capacity: self.capacity },
                    "sync job dropped"
                );
            }
            Err(TrySendError::Closed(job)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    user_id = job.user_id.as_i64(),
                    user_type = %job.user_type,
                    operation = %job.context.operation,
                    error = %SyncError::ChannelClosed { channel: QUEUE_NAME.to_string() },
                    "sync job dropped"
                );
            }
        }
    }

    /// Jobs discarded because the queue was full or the worker gone.
    pub fn dropped_jobs(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of the sync queue.
pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    rx: mpsc::Receiver<SyncJob>,
    shutdown: CancellationToken,
}

impl SyncWorker {
    pub async fn run(mut self) {
        info!("sync worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let drained = self.drain().await;
                    info!(drained, "sync worker stopped");
                    break;
                }
                job = self.rx.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => {
                        info!("sync queue closed, worker exiting");
                        break;
                    }
                },
            }
        }
    }

    /// Run everything already queued at shutdown time.
    async fn drain(&mut self) -> u64 {
        let mut drained = 0;
        while let Ok(job) = self.rx.try_recv() {
            self.process(job).await;
            drained += 1;
        }
        drained
    }

    async fn process(&self, job: SyncJob) {
        debug!(
            user_id = job.user_id.as_i64(),
            operation = %job.context.operation,
            correlation_id = %job.context.correlation_id,
            "processing sync job"
        );
        self.coordinator
            .sync_user_after_change(job.user_id, job.user_type, job.changed_fields, &job.context)
            .await;
    }
}

/// Build a connected handle/worker pair without starting the worker.
pub fn sync_queue(
    coordinator: Arc<SyncCoordinator>,
    capacity: usize,
    shutdown: CancellationToken,
) -> (SyncHandle, SyncWorker) {
    let (tx, rx) = mpsc::channel(capacity);
    let handle = SyncHandle {
        tx,
        capacity,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let worker = SyncWorker {
        coordinator,
        rx,
        shutdown,
    };
    (handle, worker)
}

/// Build the queue and spawn its worker onto the current runtime.
pub fn spawn_sync_worker(
    coordinator: Arc<SyncCoordinator>,
    capacity: usize,
    shutdown: CancellationToken,
) -> (SyncHandle, JoinHandle<()>) {
    let (handle, worker) = sync_queue(coordinator, capacity, shutdown);
    (handle, tokio::spawn(worker.run()))
}
