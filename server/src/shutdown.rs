//! Shutdown signalling and connection draining

use crate::pipeline::BroadcastPipeline;
use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Creates a connected trigger/listener pair
pub fn signal() -> (ShutdownHandle, ShutdownListener) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, ShutdownListener { rx })
}

/// Fires the shutdown signal; cheap to clone and hand to any trigger source
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Requests shutdown. Repeated calls have no further effect.
    pub fn trigger(&self) {
        let already = self.tx.send_replace(true);
        if !already {
            info!("Shutdown requested");
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown has been requested, immediately if it already was
    pub async fn wait(&mut self) {
        // A dropped trigger can never fire, so treat it like a shutdown
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Counts connection workers that have not reached their terminal state
///
/// The accept loop calls [`enter`](Self::enter) before spawning a worker and
/// moves the returned guard into the worker task. The count drops when the
/// guard does, so a panicking worker is still accounted for.
#[derive(Debug, Clone)]
pub struct WorkerTracker {
    count: Arc<watch::Sender<usize>>,
}

impl WorkerTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    pub fn enter(&self) -> WorkerGuard {
        self.count.send_modify(|count| *count += 1);
        WorkerGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn active(&self) -> usize {
        *self.count.borrow()
    }

    /// Waits until no worker is live
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so this only returns once the count is zero
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for WorkerTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks one live worker; dropping it is the worker's last act
#[derive(Debug)]
pub struct WorkerGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.count.send_modify(|count| *count -= 1);
    }
}

/// Runs the drain-then-close half of shutdown
///
/// The accept loop must already have stopped when [`drain_and_close`]
/// is called, otherwise a worker could be spawned after the count was
/// observed at zero.
///
/// [`drain_and_close`]: ShutdownCoordinator::drain_and_close
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    workers: WorkerTracker,
    pipeline: BroadcastPipeline,
}

impl ShutdownCoordinator {
    pub fn new(workers: WorkerTracker, pipeline: BroadcastPipeline) -> Self {
        Self { workers, pipeline }
    }

    /// Waits for every worker to finish, then closes the pipeline
    ///
    /// Returns true if this call closed the pipeline.
    pub async fn drain_and_close(&self) -> bool {
        let active = self.workers.active();
        if active > 0 {
            info!("Waiting for {} client(s) to finish...", active);
        }
        self.workers.wait_idle().await;
        info!("All clients finished");
        self.pipeline.close()
    }
}
