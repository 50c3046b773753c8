//! JSON snapshot persistence.
//!
//! Each snapshot kind lives in its own file under the storage directory and is
//! replaced atomically: the new content is written to `<file>.tmp` and renamed
//! over the target.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::identity::IdentitySnapshot;
use crate::ledger::LedgerSnapshot;

/// Format version stamped into every snapshot. Not used for migrations.
pub const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Ledger,
    Identity,
}

impl SnapshotKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Ledger => "blockchain_state.json",
            Self::Identity => "identity_contract_state.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl SnapshotMetadata {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        }
    }
}

/// A state type that can be written by [`PersistenceStore`].
pub trait Snapshot: Serialize + DeserializeOwned {
    const KIND: SnapshotKind;

    fn metadata(&self) -> Option<&SnapshotMetadata>;

    fn stamp(&mut self, metadata: SnapshotMetadata);
}

impl Snapshot for LedgerSnapshot {
    const KIND: SnapshotKind = SnapshotKind::Ledger;

    fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.metadata.as_ref()
    }

    fn stamp(&mut self, metadata: SnapshotMetadata) {
        self.metadata = Some(metadata);
    }
}

impl Snapshot for IdentitySnapshot {
    const KIND: SnapshotKind = SnapshotKind::Identity;

    fn metadata(&self) -> Option<&SnapshotMetadata> {
        self.metadata.as_ref()
    }

    fn stamp(&mut self, metadata: SnapshotMetadata) {
        self.metadata = Some(metadata);
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceStore {
    dir: PathBuf,
}

impl PersistenceStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PersistenceError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: SnapshotKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Stamp `state` with fresh metadata and atomically replace its file.
    pub fn save<T: Snapshot>(&self, mut state: T) -> Result<(), PersistenceError> {
        state.stamp(SnapshotMetadata::now());
        let path = self.path(T::KIND);
        let bytes = serde_json::to_vec_pretty(&state)?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, bytes).map_err(|e| PersistenceError::io(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| PersistenceError::io(&path, e))?;

        debug!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Typed read. `Ok(None)` when the file does not exist.
    pub fn read<T: Snapshot>(&self) -> Result<Option<T>, PersistenceError> {
        let path = self.path(T::KIND);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(|e| PersistenceError::io(&path, e))?;
        let state = serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(state))
    }

    /// Like [`Self::read`], but failures are logged and reported as absent.
    pub fn load<T: Snapshot>(&self) -> Option<T> {
        match self.read::<T>() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, kind = ?T::KIND, "ignoring unreadable snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::{IdentityState, VerificationStatus, VerificationType};
    use crate::ledger::{genesis_account, Ledger};
    use std::sync::Arc;
    use uuid::Uuid;

    fn store() -> PersistenceStore {
        let dir = std::env::temp_dir().join(format!("idledger-store-{}", Uuid::new_v4()));
        PersistenceStore::new(dir).unwrap()
    }

    #[test]
    fn missing_files_read_as_none() {
        let store = store();
        assert!(store.read::<LedgerSnapshot>().unwrap().is_none());
        assert!(store.load::<IdentitySnapshot>().is_none());
    }

    #[test]
    fn ledger_snapshot_round_trips_large_balances() {
        let store = store();
        let mut ledger = Ledger::with_clock(Arc::new(ManualClock::new(1_000)));
        ledger
            .create_transaction(&genesis_account(3), None, "noop", Default::default())
            .unwrap();
        ledger.mine_block();

        store.save(ledger.snapshot()).unwrap();
        assert!(store.path(SnapshotKind::Ledger).exists());
        assert!(!store.dir().join("blockchain_state.json.tmp").exists());

        let loaded: LedgerSnapshot = store.read().unwrap().unwrap();
        assert_eq!(loaded.metadata.as_ref().map(|m| m.version.as_str()), Some("1.0"));
        assert_eq!(loaded.blocks, ledger.snapshot().blocks);
        assert_eq!(loaded.accounts, ledger.snapshot().accounts);
        assert_eq!(loaded.nonces.get(&genesis_account(3)), Some(&1));
    }

    #[test]
    fn identity_snapshot_round_trips() {
        let store = store();
        let mut state = IdentityState::new();
        state.insert_identity("alice", 5);
        state.set_verification("alice", VerificationType::Biometric, VerificationStatus::Verified);

        store.save(IdentitySnapshot::from(state.clone())).unwrap();
        let loaded = store.load::<IdentitySnapshot>().unwrap();
        assert!(loaded.metadata().is_some());
        assert_eq!(IdentityState::from(loaded), state);
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let store = store();
        fs::write(store.path(SnapshotKind::Identity), b"{not json").unwrap();

        let err = store.read::<IdentitySnapshot>().unwrap_err();
        assert!(err.is_decode());
        assert!(store.load::<IdentitySnapshot>().is_none());
    }

    #[test]
    fn stale_tmp_file_is_overwritten() {
        let store = store();
        fs::write(store.dir().join("identity_contract_state.json.tmp"), b"garbage").unwrap();

        store.save(IdentitySnapshot::default()).unwrap();
        assert!(store.read::<IdentitySnapshot>().unwrap().is_some());
    }
}
