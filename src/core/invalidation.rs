//! Background invalidation queue.
//!
//! Writes enqueue an [`UpdateTask`]; a dispatcher pulls tasks off a bounded
//! channel and runs each one as a cascade on its own tokio task, with at most
//! `workers` cascades in flight.

use crate::core::instance_cache::{CascadeReport, InstanceCache};
use crate::domain::model::Pk;
use crate::utils::error::{CacheError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTask {
    pub model: String,
    pub pk: Pk,
    pub version: Option<String>,
    pub update_only: bool,
}

impl UpdateTask {
    pub fn new(model: impl Into<String>, pk: impl Into<Pk>) -> Self {
        Self {
            model: model.into(),
            pk: pk.into(),
            version: None,
            update_only: false,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn update_only(mut self, update_only: bool) -> Self {
        self.update_only = update_only;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub capacity: usize,
    pub workers: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    /// Total `update_instance` calls, follow-ups included.
    pub updates: usize,
}

#[derive(Default)]
struct QueueState {
    pending: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    updates: AtomicUsize,
    idle: Notify,
    shutdown: Notify,
}

impl QueueState {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct InvalidationQueue {
    tx: mpsc::Sender<UpdateTask>,
    state: Arc<QueueState>,
}

impl InvalidationQueue {
    /// Spawn the dispatcher. The returned handle completes after
    /// [`InvalidationQueue::shutdown`] once queued work has drained.
    pub fn start(cache: Arc<InstanceCache>, settings: QueueSettings) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        let state = Arc::new(QueueState::default());
        let handle = tokio::spawn(dispatch(cache, rx, Arc::clone(&state), settings.workers.max(1)));

        tracing::info!(
            capacity = settings.capacity,
            workers = settings.workers,
            "invalidation queue started"
        );
        (Self { tx, state }, handle)
    }

    pub async fn enqueue(&self, task: UpdateTask) -> Result<()> {
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(task).await.is_err() {
            self.state.finish_one();
            return Err(CacheError::QueueClosed);
        }
        Ok(())
    }

    /// Shorthand for the task a write on `model` should trigger.
    pub async fn notify_write(&self, model: &str, pk: impl Into<Pk>) -> Result<()> {
        self.enqueue(UpdateTask::new(model, pk)).await
    }

    /// Resolves once every enqueued task, follow-ups included, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.state.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.state.pending.load(Ordering::Acquire),
            completed: self.state.completed.load(Ordering::Acquire),
            failed: self.state.failed.load(Ordering::Acquire),
            updates: self.state.updates.load(Ordering::Acquire),
        }
    }

    /// Stop accepting work, drain what is queued, and wait for the dispatcher.
    pub async fn shutdown(&self, handle: JoinHandle<()>) -> Result<()> {
        self.state.shutdown.notify_one();
        handle.await.map_err(|e| CacheError::BackendError {
            message: format!("invalidation dispatcher panicked: {}", e),
        })?;
        tracing::info!(stats = ?self.stats(), "invalidation queue stopped");
        Ok(())
    }
}

async fn dispatch(
    cache: Arc<InstanceCache>,
    mut rx: mpsc::Receiver<UpdateTask>,
    state: Arc<QueueState>,
    workers: usize,
) {
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(task) = received else { break };
                spawn_task(&mut running, &cache, &state, &permits, task).await;
            }
            Some(joined) = running.join_next(), if !running.is_empty() => log_join(joined),
            _ = state.shutdown.notified() => {
                tracing::debug!("invalidation queue draining");
                break;
            }
        }
    }

    rx.close();
    while let Some(task) = rx.recv().await {
        spawn_task(&mut running, &cache, &state, &permits, task).await;
    }
    while let Some(joined) = running.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "cache update task did not finish");
    }
}

/// Settles one task's bookkeeping even if the cascade unwinds.
struct InFlight {
    state: Arc<QueueState>,
    recorded: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.recorded {
            self.state.failed.fetch_add(1, Ordering::AcqRel);
        }
        self.state.finish_one();
    }
}

async fn spawn_task(
    running: &mut JoinSet<()>,
    cache: &Arc<InstanceCache>,
    state: &Arc<QueueState>,
    permits: &Arc<Semaphore>,
    task: UpdateTask,
) {
    let Ok(permit) = Arc::clone(permits).acquire_owned().await else {
        state.finish_one();
        return;
    };
    let cache = Arc::clone(cache);
    let mut in_flight = InFlight {
        state: Arc::clone(state),
        recorded: false,
    };

    running.spawn(async move {
        let _permit = permit;
        let outcome = cache
            .update_cascade(&task.model, &task.pk, task.version.as_deref(), task.update_only)
            .await;
        record(&in_flight.state, &task, outcome);
        in_flight.recorded = true;
    });
}

fn record(state: &QueueState, task: &UpdateTask, outcome: Result<CascadeReport>) {
    match outcome {
        Ok(report) => {
            state.updates.fetch_add(report.updated, Ordering::AcqRel);
            if report.failed.is_empty() {
                state.completed.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(
                    model = %task.model,
                    pk = %task.pk,
                    updates = report.updated,
                    "cache update finished"
                );
            } else {
                state.failed.fetch_add(1, Ordering::AcqRel);
                tracing::warn!(
                    model = %task.model,
                    pk = %task.pk,
                    failed_followups = report.failed.len(),
                    "cache update finished with failed follow-ups"
                );
            }
        }
        Err(e) => {
            state.failed.fetch_add(1, Ordering::AcqRel);
            tracing::error!(model = %task.model, pk = %task.pk, error = %e, "cache update failed");
        }
    }
}
