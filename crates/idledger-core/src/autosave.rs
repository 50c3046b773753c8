//! Background snapshot scheduler.
//!
//! One task owns every write to the storage directory. It saves on a fixed
//! interval, whenever a save is requested through the trigger channel, and
//! once more on shutdown before its handle resolves.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AutoSaveConfig;
use crate::error::PersistenceError;
use crate::service::IdentityService;
use crate::storage::PersistenceStore;

/// Pending save requests beyond this are coalesced into the queued one.
pub const SAVE_TRIGGER_CAPACITY: usize = 1;

/// Channel used to request a save; hand the sender to [`IdentityService::with_save_trigger`].
pub fn save_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(SAVE_TRIGGER_CAPACITY)
}

/// Something whose state can be written to a [`PersistenceStore`].
pub trait StateSource: Send + Sync + 'static {
    /// Blocking write of the current state. Returns `false` on failure.
    fn save_to(&self, store: &PersistenceStore) -> bool;
}

impl StateSource for IdentityService {
    fn save_to(&self, store: &PersistenceStore) -> bool {
        self.save_state(store)
    }
}

/// Save counters reported when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub saves: u64,
    pub failures: u64,
}

pub struct AutoSaveScheduler<S> {
    source: Arc<S>,
    store: PersistenceStore,
    config: AutoSaveConfig,
}

impl<S: StateSource> AutoSaveScheduler<S> {
    pub fn new(source: Arc<S>, store: PersistenceStore, config: AutoSaveConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Start the scheduler task.
    pub fn spawn(self, triggers: mpsc::Receiver<()>) -> AutoSaveHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(triggers, shutdown_rx));
        AutoSaveHandle { shutdown_tx, task }
    }

    async fn run(
        self,
        mut triggers: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SaveStats {
        let mut stats = SaveStats::default();
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            interval_secs = self.config.interval().as_secs(),
            save_on_write = self.config.save_on_write,
            dir = %self.store.dir().display(),
            "auto-save scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(()) = triggers.recv(), if self.config.save_on_write => {
                    self.save("write", &mut stats).await;
                }
                _ = ticker.tick() => {
                    self.save("interval", &mut stats).await;
                }
            }
        }

        self.save("shutdown", &mut stats).await;
        info!(
            saves = stats.saves,
            failures = stats.failures,
            "auto-save scheduler stopped"
        );
        stats
    }

    async fn save(&self, reason: &'static str, stats: &mut SaveStats) {
        let source = Arc::clone(&self.source);
        let store = self.store.clone();

        match tokio::task::spawn_blocking(move || source.save_to(&store)).await {
            Ok(true) => {
                stats.saves += 1;
                debug!(reason, "snapshot written");
            }
            Ok(false) => {
                stats.failures += 1;
                warn!(reason, "snapshot save failed");
            }
            Err(e) => {
                stats.failures += 1;
                error!(reason, error = %e, "snapshot save task panicked");
            }
        }
    }
}

/// Handle to a running [`AutoSaveScheduler`].
pub struct AutoSaveHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<SaveStats>,
}

impl AutoSaveHandle {
    /// Stop the scheduler and wait for its final save.
    pub async fn shutdown(self) -> Result<SaveStats, PersistenceError> {
        // The task also stops if the receiver side observes the sender dropping.
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))
    }
}
