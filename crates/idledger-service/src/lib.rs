//! idledgerd library: wires the identity service, its snapshot store, and the
//! auto-save scheduler together for the daemon binary.

pub mod config;

use std::sync::Arc;

use idledger_core::{
    save_channel, AutoSaveHandle, AutoSaveScheduler, IdentityError, IdentityService,
    PersistenceError, PersistenceStore, SaveStats, SystemClock,
};
use thiserror::Error;
use tracing::info;

pub use config::{LoggingConfig, ServiceConfig};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Running daemon state.
pub struct ServiceState {
    pub service: Arc<IdentityService>,
    pub store: PersistenceStore,
    autosave: Option<AutoSaveHandle>,
}

impl ServiceState {
    /// Restore state from the storage directory and start auto-save when enabled.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let engine = &config.engine;
        let store = PersistenceStore::new(&engine.storage_dir)?;
        let service = IdentityService::bootstrap(engine, &store, Arc::new(SystemClock))?;

        let (service, autosave) = if engine.auto_save.enabled {
            let (trigger, triggers) = save_channel();
            let service = Arc::new(service.with_save_trigger(trigger));
            let handle = AutoSaveScheduler::new(
                Arc::clone(&service),
                store.clone(),
                engine.auto_save.clone(),
            )
            .spawn(triggers);
            (service, Some(handle))
        } else {
            info!("auto-save disabled; state will not be persisted");
            (Arc::new(service), None)
        };

        info!(
            contract = service.contract_address(),
            operator = service.operator(),
            dir = %store.dir().display(),
            "identity ledger ready"
        );

        Ok(Self {
            service,
            store,
            autosave,
        })
    }

    pub fn auto_save_enabled(&self) -> bool {
        self.autosave.is_some()
    }

    /// Stop the scheduler, waiting for its final save.
    pub async fn shutdown(self) -> Result<Option<SaveStats>, ServiceError> {
        match self.autosave {
            Some(handle) => Ok(Some(handle.shutdown().await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idledger_core::{AutoSaveConfig, EngineConfig, SnapshotKind};
    use uuid::Uuid;

    fn config(enabled: bool) -> ServiceConfig {
        ServiceConfig {
            engine: EngineConfig {
                storage_dir: std::env::temp_dir().join(format!("idledgerd-{}", Uuid::new_v4())),
                auto_save: AutoSaveConfig {
                    enabled,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn shutdown_persists_state() {
        let config = config(true);
        let state = ServiceState::bootstrap(&config).unwrap();
        assert!(state.auto_save_enabled());
        state.service.create_identity("alice", "alice").unwrap();

        let store = state.store.clone();
        let stats = state.shutdown().await.unwrap().unwrap();
        assert!(stats.saves >= 1);
        assert!(store.path(SnapshotKind::Ledger).exists());
        assert!(store.path(SnapshotKind::Identity).exists());

        let restored = ServiceState::bootstrap(&config).unwrap();
        assert!(restored.service.identity("alice").unwrap().is_some());
        restored.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn disabled_auto_save_writes_nothing() {
        let config = config(false);
        let state = ServiceState::bootstrap(&config).unwrap();
        state.service.create_identity("alice", "alice").unwrap();

        let store = state.store.clone();
        assert!(state.shutdown().await.unwrap().is_none());
        assert!(!store.path(SnapshotKind::Identity).exists());
    }
}
