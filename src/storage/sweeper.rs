//! Background Expiry Sweeper
//!
//! `get` never removes expired entries, so an expired key that is never
//! touched again would stay in memory forever. The sweeper reclaims them.
//!
//! ## Design
//!
//! One scanner task and a fixed pool of deletion workers, connected by a
//! bounded queue whose capacity equals the worker count:
//!
//! ```text
//!              ┌───────────────────────┐
//!              │      Scanner task     │  sleep(interval)
//!              │  write lock + scan    │  capture `now` once
//!              └──────────┬────────────┘
//!                         │ expired keys (bounded mpsc)
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!     ┌─────────┐    ┌─────────┐    ┌─────────┐
//!     │Worker 0 │    │Worker 1 │    │Worker N │  cache delete, each
//!     └─────────┘    └─────────┘    └─────────┘  re-taking the write lock
//! ```
//!
//! Each cycle:
//! 1. Sleeps for the configured interval
//! 2. Takes the cache's write lock and captures the current time once
//! 3. Offers every key whose deadline is strictly in the past to the queue
//! 4. Releases the lock, then waits to enqueue any keys the queue had no room for
//!
//! Keys are only *offered* (`try_send`) while the lock is held. A scanner
//! blocking on a full queue under the write lock would starve the workers,
//! which need that same lock to delete.
//!
//! ## Renewal Race
//!
//! A key can be renewed by `set` after the scan found it expired but before a
//! worker removes it. By default the worker deletes it anyway. Enable
//! [`SweeperConfig::verify_before_delete`] to have workers re-check the
//! deadline under the write lock and skip renewed keys.
//!
//! ## Lifecycle
//!
//! The sweeper stops when its [`Sweeper`] handle is stopped or dropped: the
//! scanner exits, the queue closes and the workers drain out. Call
//! [`Sweeper::detach`] to let it run for the rest of the process instead.
//!
//! Starting two sweepers on one cache runs two independent pools. Deletes
//! are idempotent so this is harmless, but it is wasted work and left to the
//! caller to avoid.

use crate::storage::Cache;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, trace};

/// Errors that can occur when starting a sweeper.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SweeperError {
    /// The pool would have nobody to consume the queue
    #[error("sweeper needs at least one deletion worker")]
    NoWorkers,

    /// Started outside of a Tokio runtime
    #[error("sweeper must be started from within a Tokio runtime")]
    NoRuntime,
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Pause between sweep cycles (default: 1s)
    pub interval: Duration,

    /// Number of concurrent deletion workers, also the queue capacity (default: 4)
    pub workers: usize,

    /// Re-check each key's deadline before deleting it (default: false)
    pub verify_before_delete: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            workers: 4,
            verify_before_delete: false,
        }
    }
}

impl SweeperConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pause between sweep cycles.
    ///
    /// Shorter intervals reclaim memory sooner at a higher scanning cost.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the number of deletion workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Makes workers skip keys that were renewed after being discovered.
    pub fn with_verify_before_delete(mut self, verify: bool) -> Self {
        self.verify_before_delete = verify;
        self
    }
}

/// A handle to a running sweeper.
///
/// When this handle is dropped, the sweeper is stopped.
#[derive(Debug)]
#[must_use = "dropping the handle stops the sweeper; call `detach` to keep it running"]
pub struct Sweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Starts the scanner and its deletion workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SweeperError::NoWorkers`] if `config.workers` is zero
    /// - [`SweeperError::NoRuntime`] if called outside a Tokio runtime
    ///
    /// # Example
    ///
    /// ```ignore
    /// use sweepcache::{Cache, Sweeper, SweeperConfig};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let cache = Arc::new(Cache::<String>::new());
    /// let config = SweeperConfig::default().with_interval(Duration::from_millis(500));
    /// let sweeper = Sweeper::start(Arc::clone(&cache), config)?;
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start<V>(cache: Arc<Cache<V>>, config: SweeperConfig) -> Result<Self, SweeperError>
    where
        V: Send + Sync + 'static,
    {
        if config.workers == 0 {
            return Err(SweeperError::NoWorkers);
        }
        let runtime = Handle::try_current().map_err(|_| SweeperError::NoRuntime)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel(config.workers);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        for id in 0..config.workers {
            runtime.spawn(deletion_worker(
                id,
                Arc::clone(&cache),
                Arc::clone(&queue_rx),
                config.verify_before_delete,
            ));
        }

        info!(
            interval_ms = config.interval.as_millis(),
            workers = config.workers,
            verify = config.verify_before_delete,
            "Background expiry sweeper started"
        );

        runtime.spawn(scanner_loop(cache, config.interval, queue_tx, shutdown_rx));

        Ok(Self { shutdown_tx })
    }

    /// Stops the sweeper.
    ///
    /// This is called automatically when the handle is dropped. Keys already
    /// queued are still deleted before the workers exit.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }

    /// Lets the sweeper run until the runtime shuts down.
    pub fn detach(self) {
        debug!("Background expiry sweeper detached");
        // Keeping the sender alive forever means no shutdown is ever observed.
        std::mem::forget(self);
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    /// Starts a sweeper for this cache with `workers` deletion workers,
    /// scanning every `interval`.
    ///
    /// Equivalent to [`Sweeper::start`] with a [`SweeperConfig`] built from
    /// the arguments.
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        workers: usize,
    ) -> Result<Sweeper, SweeperError> {
        let config = SweeperConfig::default()
            .with_interval(interval)
            .with_workers(workers);
        Sweeper::start(Arc::clone(self), config)
    }
}

/// Outcome of one scan under the write lock.
#[derive(Debug, Default)]
struct Dispatch {
    /// Keys handed to the queue during the scan
    queued: usize,
    /// Keys found expired while the queue was full
    backlog: Vec<String>,
}

/// Scans for expired keys under the write lock, offering each to the queue.
///
/// Returns `None` once the queue has been closed.
fn dispatch_expired<V>(cache: &Cache<V>, queue: &mpsc::Sender<String>) -> Option<Dispatch> {
    let mut dispatch = Dispatch::default();

    let flow = cache.scan_stale(|key| match queue.try_send(key) {
        Ok(()) => {
            dispatch.queued += 1;
            ControlFlow::Continue(())
        }
        Err(TrySendError::Full(key)) => {
            dispatch.backlog.push(key);
            ControlFlow::Continue(())
        }
        Err(TrySendError::Closed(_)) => ControlFlow::Break(()),
    });

    flow.is_continue().then_some(dispatch)
}

/// The scanner loop.
async fn scanner_loop<V>(
    cache: Arc<Cache<V>>,
    interval: Duration,
    queue: mpsc::Sender<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    V: Send + Sync + 'static,
{
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry scanner received shutdown signal");
                    return;
                }
            }
        }

        let Some(dispatch) = dispatch_expired(&cache, &queue) else {
            debug!("Deletion queue closed, expiry scanner exiting");
            return;
        };

        let backlogged = dispatch.backlog.len();

        // The write lock is released; now it is safe to wait for room.
        for key in dispatch.backlog {
            if queue.send(key).await.is_err() {
                debug!("Deletion queue closed, expiry scanner exiting");
                return;
            }
        }

        if dispatch.queued + backlogged > 0 {
            debug!(
                queued = dispatch.queued,
                backlogged = backlogged,
                entries = cache.len(),
                "Expired keys dispatched for deletion"
            );
        }
    }
}

/// A deletion worker: pulls keys off the shared queue until it closes.
async fn deletion_worker<V>(
    id: usize,
    cache: Arc<Cache<V>>,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    verify: bool,
) where
    V: Send + Sync + 'static,
{
    loop {
        let next = queue.lock().await.recv().await;
        let Some(key) = next else {
            break;
        };

        let removed = cache.evict(&key, verify);
        trace!(worker = id, key = %key, removed = removed, "Expired key processed");
    }

    trace!(worker = id, "Deletion worker exiting");
}
