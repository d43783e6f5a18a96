//! Controller runtime - drives a [`Reconciler`] from a store's change stream.
//!
//! One watcher task turns the store's watch stream into queue entries and
//! restarts the watch whenever it ends or the resync interval elapses. A pool
//! of workers drains the [`WorkQueue`], one delivery per key at a time, and
//! hands failures back to the queue for backoff.

pub mod queue;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::ReconcileError;
use crate::reconciler::{Reconciler, reconcile_key};
use crate::resource::{ObjectKey, Resource};
use crate::store::{Notifier, ObjectStore};

pub use queue::{Backoff, WorkQueue};

/// Pause before re-opening a watch stream that ended on its own.
const WATCH_RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Concurrent deliveries (for distinct keys).
    pub workers: usize,
    pub backoff: Backoff,
    /// Re-list every key this often to heal drift in the database server.
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            backoff: Backoff::default(),
            resync_interval: Duration::from_secs(600),
        }
    }
}

pub struct Controller<R, S> {
    reconciler: Arc<R>,
    store: Arc<S>,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
}

impl<R, S> Controller<R, S>
where
    R: Reconciler + 'static,
    S: ObjectStore<R::Object> + Notifier + 'static,
{
    pub fn new(reconciler: Arc<R>, store: Arc<S>, config: ControllerConfig) -> Self {
        Self {
            reconciler,
            store,
            queue: Arc::new(WorkQueue::new(config.backoff)),
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let kind = R::Object::KIND;
        let workers = self.config.workers.max(1);
        info!("Starting {} controller with {} workers", kind, workers);

        let watcher = tokio::spawn(watch_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            self.config.resync_interval,
            shutdown.clone(),
        ));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.reconciler),
                    Arc::clone(&self.store),
                    Arc::clone(&self.queue),
                    shutdown.clone(),
                ))
            })
            .collect();

        let mut shutdown = shutdown;
        wait_for_shutdown(&mut shutdown).await;
        info!("{} controller shutting down", kind);
        self.queue.shut_down();

        watcher.await.context("Watcher task failed")?;
        for handle in handles {
            handle.await.context("Worker task failed")?;
        }

        info!("{} controller stopped", kind);
        Ok(())
    }
}

/// Resolves once shutdown is requested or the signal's sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn watch_loop<S: Notifier>(
    store: Arc<S>,
    queue: Arc<WorkQueue>,
    resync_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let mut stream = store.watch();
        let resync = tokio::time::sleep(resync_interval);
        tokio::pin!(resync);

        let ended = loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return,
                _ = &mut resync => {
                    debug!("Resync interval elapsed, restarting watch");
                    break false;
                }
                next = stream.next() => match next {
                    Some(key) => queue.add(key),
                    None => break true,
                },
            }
        };

        if ended {
            warn!(
                "Watch stream ended, restarting in {:?}",
                WATCH_RESTART_DELAY
            );
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return,
                _ = tokio::time::sleep(WATCH_RESTART_DELAY) => {}
            }
        }
    }
}

async fn worker<R, S>(
    id: usize,
    reconciler: Arc<R>,
    store: Arc<S>,
    queue: Arc<WorkQueue>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: Reconciler,
    S: ObjectStore<R::Object>,
{
    let kind = R::Object::KIND;
    while let Some(key) = queue.get().await {
        debug!("Worker {} picked up {} {}", id, kind, key);

        // Shutdown abandons the in-flight call; it never counts as success.
        let result = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => Err(ReconcileError::Cancelled),
            result = reconcile_key(reconciler.as_ref(), store.as_ref(), &key) => result,
        };

        handle_result(kind, &queue, &key, result);
        queue.done(&key);
    }
    debug!("Worker {} exiting", id);
}

fn handle_result(
    kind: &str,
    queue: &Arc<WorkQueue>,
    key: &ObjectKey,
    result: Result<crate::reconciler::Outcome, ReconcileError>,
) {
    match result {
        Ok(outcome) => {
            debug!("Reconciled {} {}: {:?}", kind, key, outcome);
            queue.forget(key);
        }
        Err(ReconcileError::Cancelled) => {
            warn!("Reconciliation of {} {} cancelled by shutdown", kind, key);
        }
        Err(e) if e.is_retryable() => {
            let delay = queue.add_rate_limited(key.clone());
            warn!(
                "Reconciliation of {} {} failed: {}. Retrying in {:?}",
                kind, key, e, delay
            );
        }
        Err(e) => {
            queue.forget(key);
            error!(
                "Reconciliation of {} {} failed permanently: {}. Not retrying",
                kind, key, e
            );
        }
    }
}
