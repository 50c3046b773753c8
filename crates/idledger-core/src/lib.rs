//! Local hash-linked ledger simulator with an identity verification contract.
//!
//! The crate models a single-node chain (blocks, transactions, receipts,
//! contract event logs), an identity state machine recording verification
//! statuses, time-boxed third-party access grants and ZKP verification audit
//! entries, plus JSON snapshot persistence driven by a background scheduler.

#![deny(unsafe_code)]

pub mod autosave;
pub mod clock;
pub mod config;
pub mod contract;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod ledger;
pub mod service;
pub mod storage;
pub mod types;

pub use autosave::{save_channel, AutoSaveHandle, AutoSaveScheduler, SaveStats, StateSource};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AutoSaveConfig, EngineConfig};
pub use contract::{Contract, ContractRegistry};
pub use error::{IdentityError, LedgerError, PersistenceError};
pub use identity::{
    AccessGrant, AccessGrantView, GrantStatus, IdentityRecord, IdentitySnapshot, IdentityState,
    VerificationAudit, VerificationHistoryEntry, VerificationStatus, VerificationType,
    ZkpVerificationRecord,
};
pub use ledger::{genesis_account, Ledger, LedgerSnapshot, LogFilter};
pub use service::{IdentityService, CONTRACT_NAME};
pub use storage::{PersistenceStore, Snapshot, SnapshotKind, SnapshotMetadata};
pub use types::{args, Args, Block, BlockId, Event, Receipt, Transaction};
