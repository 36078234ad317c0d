//! ExtensionLoader: timer-driven retry loop around the privileged
//! driver-extension load.
//!
//! The load may fail transiently for a long time (for example while the
//! extension package is not yet approved by the user), so the loader never
//! gives up: it retries at a fixed period, persisting its state after every
//! attempt so other processes can observe progress, and nudges the version
//! monitor on each tick to prompt the conditions that let the next retry
//! succeed. On success it stops its own timer and emits a single "loaded"
//! notification.
//!
//! Ticks run inside one task; they never overlap, and shutdown only lands
//! between ticks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hidsys_core::{LoaderState, StatusCode};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

/// Default retry period between load attempts.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(3000);

/// The privileged load primitive. Installing/activating the extension is a
/// single bounded call returning an opaque status code.
#[cfg_attr(test, automock)]
pub trait LoadPrimitive: Send + Sync {
    fn load(&self, path: &Path) -> StatusCode;
}

/// Dependent version checker. The nudge is fire-and-forget; its outcome is
/// never observed.
#[cfg_attr(test, automock)]
pub trait VersionMonitor: Send + Sync {
    fn request_manual_check(&self);
}

/// Persistence for the loader state record. `persist` must not fail loudly:
/// implementations log their own errors and the loader carries on.
#[cfg_attr(test, automock)]
pub trait StatusStore: Send + Sync {
    fn persist(&self, state: &LoaderState);
}

/// Notification emitted once after a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionLoaded;

/// Handle to a running loader task.
pub struct LoaderHandle {
    loaded_tx: broadcast::Sender<ExtensionLoaded>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoaderHandle {
    /// Subscribes to the one-shot "loaded" notification.
    pub fn subscribe(&self) -> broadcast::Receiver<ExtensionLoaded> {
        self.loaded_tx.subscribe()
    }

    /// Disarms the timer and waits for the task to finish. A tick already
    /// in progress completes; no further state is persisted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Returns `true` once the loader has stopped (success or shutdown).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The retry loop. Construct with [`ExtensionLoader::new`] and start it with
/// [`ExtensionLoader::spawn`].
pub struct ExtensionLoader {
    primitive: Arc<dyn LoadPrimitive>,
    monitor: Arc<dyn VersionMonitor>,
    store: Arc<dyn StatusStore>,
    extension_path: PathBuf,
    period: Duration,
    state: LoaderState,
}

impl ExtensionLoader {
    pub fn new(
        primitive: Arc<dyn LoadPrimitive>,
        monitor: Arc<dyn VersionMonitor>,
        store: Arc<dyn StatusStore>,
        extension_path: impl Into<PathBuf>,
        period: Duration,
    ) -> Self {
        Self {
            primitive,
            monitor,
            store,
            extension_path: extension_path.into(),
            period,
            state: LoaderState::default(),
        }
    }

    /// Persists the initial "in progress" record, arms the repeating timer,
    /// and returns a handle. The first attempt happens immediately on arm.
    pub fn spawn(self) -> LoaderHandle {
        let (loaded_tx, _) = broadcast::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(loaded_tx.clone(), shutdown_rx));
        LoaderHandle {
            loaded_tx,
            shutdown_tx,
            task,
        }
    }

    async fn run(
        mut self,
        loaded_tx: broadcast::Sender<ExtensionLoaded>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        // Announce "in progress" before the first attempt.
        self.store.persist(&self.state);

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("extension loader shut down");
                    return;
                }
                _ = ticker.tick() => {
                    if self.tick() {
                        break;
                    }
                }
            }
        }

        // The timer is disarmed (the loop is done) before observers hear
        // about the load.
        drop(ticker);
        let _ = loaded_tx.send(ExtensionLoaded);
        info!("extension loaded; retry timer stopped");
    }

    /// One attempt. Returns `true` when the loader should stop.
    fn tick(&mut self) -> bool {
        self.monitor.request_manual_check();

        let code = self.primitive.load(&self.extension_path);
        if code.is_success() {
            info!("extension load: {code}");
        } else {
            warn!("extension load: {code}; will retry");
        }

        self.state.attempted = true;
        self.state.last_result = Some(code);
        self.store.persist(&self.state);

        code.is_success()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
