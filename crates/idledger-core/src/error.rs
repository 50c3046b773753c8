use std::path::PathBuf;

use thiserror::Error;

/// Ledger-level failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance for {address}: have {balance}, need at least {required}")]
    InsufficientBalance {
        address: String,
        balance: u128,
        required: u128,
    },

    #[error("contract not found: {0}")]
    UnknownContract(String),

    #[error("chain integrity violation at block {number}: {reason}")]
    IntegrityViolation { number: u64, reason: String },
}

/// Snapshot persistence failures.
///
/// These never abort a domain operation; callers log them and report a failed save.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot at {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("snapshot encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("background save task failed: {0}")]
    Task(String),
}

impl PersistenceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Identity state machine errors surfaced to the API collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity already exists for {0}")]
    DuplicateIdentity(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("identity state lock poisoned")]
    LockPoisoned,
}

impl IdentityError {
    /// Stable machine-readable code for transport mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity(_) => "duplicate_identity",
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Ledger(LedgerError::InsufficientBalance { .. }) => "insufficient_balance",
            Self::Ledger(_) => "ledger_error",
            Self::LockPoisoned => "internal",
        }
    }
}
