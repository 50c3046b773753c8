//! Identity verification domain: records, access grants, ZKP audit entries,
//! and the in-memory maps they live in.
//!
//! [`IdentityState`] holds the pure state transitions. Ledger transactions,
//! mining, and events are layered on top by [`crate::IdentityService`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::storage::SnapshotMetadata;

/// Kind of verification performed on an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum VerificationType {
    GovernmentId = 0,
    Biometric = 1,
    Address = 2,
}

impl VerificationType {
    pub const ALL: [VerificationType; 3] = [Self::GovernmentId, Self::Biometric, Self::Address];

    /// Parse a collaborator-facing name. `document` and `facial` are accepted aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "government_id" | "document" => Some(Self::GovernmentId),
            "biometric" | "facial" => Some(Self::Biometric),
            "address" => Some(Self::Address),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GovernmentId => "government_id",
            Self::Biometric => "biometric",
            Self::Address => "address",
        }
    }
}

impl From<VerificationType> for u8 {
    fn from(value: VerificationType) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for VerificationType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::GovernmentId),
            1 => Ok(Self::Biometric),
            2 => Ok(Self::Address),
            other => Err(format!("unknown verification type {other}")),
        }
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum VerificationStatus {
    #[default]
    Pending = 0,
    Verified = 1,
    Rejected = 2,
}

impl From<VerificationStatus> for u8 {
    fn from(value: VerificationStatus) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for VerificationStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Verified),
            2 => Ok(Self::Rejected),
            other => Err(format!("unknown verification status {other}")),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub owner: String,
    pub created_at: i64,
    /// Latest status per verification type.
    #[serde(default)]
    pub verification_types: BTreeMap<VerificationType, VerificationStatus>,
    /// Latest expiry per third party.
    #[serde(default)]
    pub third_party_access: BTreeMap<String, i64>,
}

impl IdentityRecord {
    pub fn new(owner: impl Into<String>, created_at: i64) -> Self {
        Self {
            owner: owner.into(),
            created_at,
            verification_types: BTreeMap::new(),
            third_party_access: BTreeMap::new(),
        }
    }
}

/// A third party's time-boxed permission over an owner's data categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub expiry_timestamp: i64,
    pub data_types: Vec<String>,
    pub granted_at: i64,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<i64>,
}

impl AccessGrant {
    pub fn new(expiry_timestamp: i64, data_types: Vec<String>, granted_at: i64) -> Self {
        Self {
            expiry_timestamp,
            data_types,
            granted_at,
            revoked: false,
            revoked_at: None,
        }
    }

    /// Expiry is exclusive: a grant is no longer usable at `now == expiry_timestamp`.
    pub fn status_at(&self, now: i64) -> GrantStatus {
        if self.revoked {
            GrantStatus::Revoked
        } else if now >= self.expiry_timestamp {
            GrantStatus::Expired
        } else {
            GrantStatus::Active
        }
    }
}

/// Derived grant state. `Expired` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkpVerificationRecord {
    pub user: String,
    pub verifier: String,
    pub proof_hash: String,
    pub data_type: String,
    pub timestamp: i64,
}

/// Grant listing entry returned to audit collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrantView {
    pub third_party: String,
    pub grant: AccessGrant,
    pub status: GrantStatus,
}

/// One `VerificationUpdated` event, flattened for history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationHistoryEntry {
    pub verification_type: VerificationType,
    pub status: VerificationStatus,
    pub tx_hash: String,
    pub block_number: u64,
    pub timestamp: i64,
}

/// Everything recorded about one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationAudit {
    pub owner: String,
    pub identity: Option<IdentityRecord>,
    pub verification_history: Vec<VerificationHistoryEntry>,
    pub access_grants: Vec<AccessGrantView>,
    pub zkp_verifications: Vec<ZkpVerificationRecord>,
    pub generated_at: DateTime<Utc>,
}

/// The four identity maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityState {
    #[serde(default)]
    pub identity_records: BTreeMap<String, IdentityRecord>,
    #[serde(default)]
    pub verification_records: BTreeMap<String, BTreeMap<VerificationType, VerificationStatus>>,
    #[serde(default)]
    pub access_grants: BTreeMap<String, BTreeMap<String, AccessGrant>>,
    #[serde(default)]
    pub zkp_verifications: Vec<ZkpVerificationRecord>,
}

/// Persisted form of [`IdentityState`], written to `identity_contract_state.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SnapshotMetadata>,
    #[serde(default)]
    pub identity_records: BTreeMap<String, IdentityRecord>,
    #[serde(default)]
    pub verification_records: BTreeMap<String, BTreeMap<VerificationType, VerificationStatus>>,
    #[serde(default)]
    pub access_grants: BTreeMap<String, BTreeMap<String, AccessGrant>>,
    #[serde(default)]
    pub zkp_verifications: Vec<ZkpVerificationRecord>,
}

impl From<IdentityState> for IdentitySnapshot {
    fn from(state: IdentityState) -> Self {
        Self {
            metadata: None,
            identity_records: state.identity_records,
            verification_records: state.verification_records,
            access_grants: state.access_grants,
            zkp_verifications: state.zkp_verifications,
        }
    }
}

impl From<IdentitySnapshot> for IdentityState {
    fn from(snapshot: IdentitySnapshot) -> Self {
        Self {
            identity_records: snapshot.identity_records,
            verification_records: snapshot.verification_records,
            access_grants: snapshot.access_grants,
            zkp_verifications: snapshot.zkp_verifications,
        }
    }
}

impl IdentityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_identity(&self, owner: &str) -> bool {
        self.identity_records.contains_key(owner)
    }

    pub fn identity(&self, owner: &str) -> Option<&IdentityRecord> {
        self.identity_records.get(owner)
    }

    pub fn ensure_absent(&self, owner: &str) -> Result<(), IdentityError> {
        if self.has_identity(owner) {
            return Err(IdentityError::DuplicateIdentity(owner.to_string()));
        }
        Ok(())
    }

    pub fn insert_identity(&mut self, owner: &str, now: i64) {
        self.identity_records
            .insert(owner.to_string(), IdentityRecord::new(owner, now));
    }

    pub fn set_verification(
        &mut self,
        owner: &str,
        verification_type: VerificationType,
        status: VerificationStatus,
    ) {
        self.verification_records
            .entry(owner.to_string())
            .or_default()
            .insert(verification_type, status);
        if let Some(record) = self.identity_records.get_mut(owner) {
            record.verification_types.insert(verification_type, status);
        }
    }

    pub fn verification_status(
        &self,
        owner: &str,
        verification_type: VerificationType,
    ) -> VerificationStatus {
        self.verification_records
            .get(owner)
            .and_then(|types| types.get(&verification_type))
            .copied()
            .unwrap_or_default()
    }

    /// Replace any prior grant for `(owner, third_party)`.
    pub fn put_grant(&mut self, owner: &str, third_party: &str, grant: AccessGrant) {
        if let Some(record) = self.identity_records.get_mut(owner) {
            record
                .third_party_access
                .insert(third_party.to_string(), grant.expiry_timestamp);
        }
        self.access_grants
            .entry(owner.to_string())
            .or_default()
            .insert(third_party.to_string(), grant);
    }

    pub fn grant(&self, owner: &str, third_party: &str) -> Option<&AccessGrant> {
        self.access_grants
            .get(owner)
            .and_then(|grants| grants.get(third_party))
    }

    pub fn ensure_grant_exists(&self, owner: &str, third_party: &str) -> Result<(), IdentityError> {
        self.grant(owner, third_party).map(|_| ()).ok_or_else(|| {
            IdentityError::NotFound(format!("no access grant from {owner} to {third_party}"))
        })
    }

    /// Flag a grant revoked. The record itself is kept.
    pub fn revoke_grant(
        &mut self,
        owner: &str,
        third_party: &str,
        now: i64,
    ) -> Result<(), IdentityError> {
        let grant = self
            .access_grants
            .get_mut(owner)
            .and_then(|grants| grants.get_mut(third_party))
            .ok_or_else(|| {
                IdentityError::NotFound(format!("no access grant from {owner} to {third_party}"))
            })?;
        grant.revoked = true;
        grant.revoked_at = Some(now);
        Ok(())
    }

    pub fn check_access(&self, third_party: &str, owner: &str, now: i64) -> bool {
        self.grant(owner, third_party)
            .is_some_and(|grant| grant.status_at(now) == GrantStatus::Active)
    }

    pub fn push_zkp(&mut self, record: ZkpVerificationRecord) {
        self.zkp_verifications.push(record);
    }

    pub fn grants_for(&self, owner: &str, now: i64) -> Vec<AccessGrantView> {
        self.access_grants
            .get(owner)
            .map(|grants| {
                grants
                    .iter()
                    .map(|(third_party, grant)| AccessGrantView {
                        third_party: third_party.clone(),
                        grant: grant.clone(),
                        status: grant.status_at(now),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn zkp_for(&self, owner: &str) -> Vec<ZkpVerificationRecord> {
        self.zkp_verifications
            .iter()
            .filter(|record| record.user == owner)
            .cloned()
            .collect()
    }
}
