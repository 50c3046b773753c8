//! Identity verification contract bound to the ledger.
//!
//! Every mutating operation runs under one lock: validate, submit the ledger
//! transaction, apply the map change, mine, then emit the domain event at the
//! new head. The transaction is submitted before the maps change, so any
//! failure leaves the state untouched.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{IdentityError, LedgerError};
use crate::identity::{
    AccessGrant, AccessGrantView, IdentityRecord, IdentitySnapshot, IdentityState,
    VerificationAudit, VerificationHistoryEntry, VerificationStatus, VerificationType,
    ZkpVerificationRecord,
};
use crate::ledger::{genesis_account, Ledger, LedgerSnapshot};
use crate::storage::PersistenceStore;
use crate::types::{args, Args, Event, Receipt, Transaction};

/// Registry name of the identity contract.
pub const CONTRACT_NAME: &str = "IdentityVerification";

/// Transaction data key carrying the business-level caller.
pub const SENDER_KEY: &str = "sender";

/// Event ABI published with the deployed contract.
pub fn identity_abi() -> Vec<Value> {
    let event = |name: &str, inputs: Value| json!({"name": name, "type": "event", "inputs": inputs});
    vec![
        event(
            "IdentityCreated",
            json!([{"name": "owner", "type": "address", "indexed": true}]),
        ),
        event(
            "VerificationUpdated",
            json!([
                {"name": "owner", "type": "address", "indexed": true},
                {"name": "verificationType", "type": "uint8", "indexed": true},
                {"name": "status", "type": "uint8", "indexed": false}
            ]),
        ),
        event(
            "AccessGranted",
            json!([
                {"name": "user", "type": "address", "indexed": true},
                {"name": "thirdParty", "type": "address", "indexed": true},
                {"name": "expiryTimestamp", "type": "uint256", "indexed": false}
            ]),
        ),
        event(
            "AccessRevoked",
            json!([
                {"name": "user", "type": "address", "indexed": true},
                {"name": "thirdParty", "type": "address", "indexed": true}
            ]),
        ),
        event(
            "ZKProofVerified",
            json!([
                {"name": "user", "type": "address", "indexed": true},
                {"name": "verifier", "type": "address", "indexed": true},
                {"name": "dataType", "type": "bytes32", "indexed": false}
            ]),
        ),
    ]
}

struct Inner {
    ledger: Ledger,
    identity: IdentityState,
}

impl Inner {
    fn submit(
        &mut self,
        contract: &str,
        operator: &str,
        function_name: &str,
        mut data: Args,
        sender: &str,
    ) -> Result<Transaction, IdentityError> {
        if self.ledger.contract(contract).is_none() {
            return Err(LedgerError::UnknownContract(contract.to_string()).into());
        }
        data.insert(SENDER_KEY.to_string(), Value::from(sender));
        // Plain transaction: the identity maps are the contract state, so the
        // generic call memo in contract storage is left untouched.
        Ok(self
            .ledger
            .create_transaction(operator, Some(contract), function_name, data)?)
    }

    fn past_events(
        &self,
        contract: &str,
        event_name: &str,
        from_block: u64,
        to_block: Option<u64>,
        filters: Option<&Args>,
    ) -> Result<Vec<Event>, IdentityError> {
        let contract = self
            .ledger
            .contract(contract)
            .ok_or_else(|| LedgerError::UnknownContract(contract.to_string()))?;
        Ok(contract.past_events(event_name, from_block, to_block, filters))
    }

    fn verification_history(
        &self,
        contract: &str,
        owner: &str,
    ) -> Result<Vec<VerificationHistoryEntry>, IdentityError> {
        let filters = args(json!({"owner": owner}));
        let events = self.past_events(contract, "VerificationUpdated", 0, None, Some(&filters))?;
        Ok(events.iter().filter_map(history_entry).collect())
    }

    /// Mine the pending transaction and emit `event_name` at the new head.
    fn commit(
        &mut self,
        contract: &str,
        transaction: &Transaction,
        event_name: &str,
        event_args: Args,
    ) -> Result<Receipt, IdentityError> {
        let block = self.ledger.mine_block();
        self.ledger
            .emit_event(contract, event_name, event_args, &transaction.hash, block.number)?;
        self.ledger
            .get_transaction_receipt(&transaction.hash)
            .ok_or_else(|| IdentityError::NotFound(format!("receipt for {}", transaction.hash)))
    }

    fn create_identity(
        &mut self,
        contract: &str,
        operator: &str,
        owner: &str,
        from: &str,
    ) -> Result<Receipt, IdentityError> {
        let now = self.ledger.now();
        let tx = self.submit(
            contract,
            operator,
            "createIdentity",
            args(json!({"owner": owner})),
            from,
        )?;
        self.identity.insert_identity(owner, now);
        self.commit(contract, &tx, "IdentityCreated", args(json!({"owner": owner})))
    }
}

/// The identity contract, its ledger, and the in-memory identity maps.
pub struct IdentityService {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    operator: String,
    contract_address: String,
    save_trigger: Option<mpsc::Sender<()>>,
}

impl IdentityService {
    /// Attach to the identity contract on `ledger`, deploying it when missing.
    ///
    /// `contract_address` is used when the ledger knows it; otherwise the first
    /// contract registered as `IdentityVerification` is reused.
    pub fn new(
        ledger: Ledger,
        identity: IdentityState,
        operator: Option<String>,
        contract_address: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let mut ledger = ledger;
        let clock = Arc::clone(ledger.clock());
        let operator = operator.unwrap_or_else(|| genesis_account(0));

        let existing = contract_address
            .filter(|address| ledger.contract(address).is_some())
            .map(str::to_string)
            .or_else(|| {
                ledger
                    .contracts()
                    .find_by_name(CONTRACT_NAME)
                    .map(|contract| contract.address.clone())
            });

        let contract_address = match existing {
            Some(address) => {
                info!(%address, "reattached to identity contract");
                address
            }
            None => {
                if let Some(requested) = contract_address {
                    warn!(%requested, "configured contract address not on ledger; deploying");
                }
                ledger
                    .deploy_contract(CONTRACT_NAME, identity_abi(), &operator)?
                    .address
            }
        };

        Ok(Self {
            inner: Mutex::new(Inner { ledger, identity }),
            clock,
            operator,
            contract_address,
            save_trigger: None,
        })
    }

    /// Fresh ledger and empty identity maps.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, IdentityError> {
        Self::new(Ledger::with_clock(clock), IdentityState::new(), None, None)
    }

    /// Restore from `store`, falling back to a fresh ledger for missing or
    /// invalid snapshots.
    pub fn bootstrap(
        config: &EngineConfig,
        store: &PersistenceStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IdentityError> {
        let ledger = match store.read::<LedgerSnapshot>() {
            Ok(Some(snapshot)) => match Ledger::restore(snapshot, Arc::clone(&clock)) {
                Ok(ledger) => ledger,
                Err(e) => {
                    warn!(error = %e, "ledger snapshot failed verification; starting from genesis");
                    Ledger::with_clock(Arc::clone(&clock))
                }
            },
            Ok(None) => {
                info!(dir = %store.dir().display(), "no ledger snapshot; starting from genesis");
                Ledger::with_clock(Arc::clone(&clock))
            }
            Err(e) => {
                warn!(error = %e, "ledger snapshot unreadable; starting from genesis");
                Ledger::with_clock(Arc::clone(&clock))
            }
        };

        let identity = store
            .load::<IdentitySnapshot>()
            .map(IdentityState::from)
            .unwrap_or_default();
        info!(
            identities = identity.identity_records.len(),
            "identity state loaded"
        );

        Self::new(
            ledger,
            identity,
            config.operator.clone(),
            config.contract_address.as_deref(),
        )
    }

    /// Request a background save after every successful mutation.
    pub fn with_save_trigger(mut self, trigger: mpsc::Sender<()>) -> Self {
        self.save_trigger = Some(trigger);
        self
    }

    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, IdentityError> {
        self.inner.lock().map_err(|_| IdentityError::LockPoisoned)
    }

    fn request_save(&self) {
        let Some(trigger) = &self.save_trigger else {
            return;
        };
        match trigger.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("save trigger closed; skipping save request"),
        }
    }

    #[instrument(skip(self), fields(contract = %self.contract_address))]
    pub fn create_identity(&self, owner: &str, from: &str) -> Result<Receipt, IdentityError> {
        let receipt = {
            let mut inner = self.lock()?;
            inner.identity.ensure_absent(owner)?;
            inner.create_identity(&self.contract_address, &self.operator, owner, from)?
        };
        info!(owner, tx_hash = %receipt.tx_hash, "identity created");
        self.request_save();
        Ok(receipt)
    }

    /// Overwrite one verification status, creating the identity first if needed.
    #[instrument(skip(self), fields(contract = %self.contract_address))]
    pub fn update_verification(
        &self,
        owner: &str,
        verification_type: VerificationType,
        status: VerificationStatus,
        from: &str,
    ) -> Result<Receipt, IdentityError> {
        let receipt = {
            let mut inner = self.lock()?;
            if !inner.identity.has_identity(owner) {
                inner.create_identity(&self.contract_address, &self.operator, owner, from)?;
            }

            let event_args = args(json!({
                "owner": owner,
                "verificationType": u8::from(verification_type),
                "status": u8::from(status),
            }));
            let tx = inner.submit(
                &self.contract_address,
                &self.operator,
                "updateVerification",
                event_args.clone(),
                from,
            )?;
            inner
                .identity
                .set_verification(owner, verification_type, status);
            inner.commit(&self.contract_address, &tx, "VerificationUpdated", event_args)?
        };
        info!(owner, %verification_type, %status, "verification updated");
        self.request_save();
        Ok(receipt)
    }

    pub fn get_verification_status(
        &self,
        owner: &str,
        verification_type: VerificationType,
    ) -> Result<VerificationStatus, IdentityError> {
        Ok(self
            .lock()?
            .identity
            .verification_status(owner, verification_type))
    }

    /// Grant `third_party` access until `expiry_timestamp`, replacing any earlier grant.
    #[instrument(skip(self, data_types), fields(contract = %self.contract_address))]
    pub fn grant_access(
        &self,
        owner: &str,
        third_party: &str,
        expiry_timestamp: i64,
        data_types: Vec<String>,
        from: &str,
    ) -> Result<Receipt, IdentityError> {
        if from != owner {
            return Err(IdentityError::Unauthorized(
                "only the identity owner can grant access".to_string(),
            ));
        }

        let receipt = {
            let mut inner = self.lock()?;
            if !inner.identity.has_identity(owner) {
                inner.create_identity(&self.contract_address, &self.operator, owner, from)?;
            }

            let now = self.clock.now();
            let tx = inner.submit(
                &self.contract_address,
                &self.operator,
                "grantAccess",
                args(json!({
                    "thirdParty": third_party,
                    "expiryTimestamp": expiry_timestamp,
                    "dataTypes": data_types,
                })),
                from,
            )?;
            inner.identity.put_grant(
                owner,
                third_party,
                AccessGrant::new(expiry_timestamp, data_types, now),
            );
            inner.commit(
                &self.contract_address,
                &tx,
                "AccessGranted",
                args(json!({
                    "user": owner,
                    "thirdParty": third_party,
                    "expiryTimestamp": expiry_timestamp,
                })),
            )?
        };
        info!(owner, third_party, expiry_timestamp, "access granted");
        self.request_save();
        Ok(receipt)
    }

    #[instrument(skip(self), fields(contract = %self.contract_address))]
    pub fn revoke_access(
        &self,
        owner: &str,
        third_party: &str,
        from: &str,
    ) -> Result<Receipt, IdentityError> {
        if from != owner {
            return Err(IdentityError::Unauthorized(
                "only the identity owner can revoke access".to_string(),
            ));
        }

        let receipt = {
            let mut inner = self.lock()?;
            inner.identity.ensure_grant_exists(owner, third_party)?;

            let tx = inner.submit(
                &self.contract_address,
                &self.operator,
                "revokeAccess",
                args(json!({"thirdParty": third_party})),
                from,
            )?;
            inner
                .identity
                .revoke_grant(owner, third_party, self.clock.now())?;
            inner.commit(
                &self.contract_address,
                &tx,
                "AccessRevoked",
                args(json!({"user": owner, "thirdParty": third_party})),
            )?
        };
        info!(owner, third_party, "access revoked");
        self.request_save();
        Ok(receipt)
    }

    /// True while an unrevoked grant exists and `now < expiry`.
    pub fn check_access(&self, third_party: &str, owner: &str) -> Result<bool, IdentityError> {
        let now = self.clock.now();
        Ok(self.lock()?.identity.check_access(third_party, owner, now))
    }

    /// Record that `from` verified a proof about `owner`. Requires active access.
    #[instrument(skip(self), fields(contract = %self.contract_address))]
    pub fn record_zkp_verification(
        &self,
        owner: &str,
        proof_hash: &str,
        data_type: &str,
        from: &str,
    ) -> Result<Receipt, IdentityError> {
        let receipt = {
            let mut inner = self.lock()?;
            let now = self.clock.now();
            if !inner.identity.check_access(from, owner, now) {
                return Err(IdentityError::Unauthorized(format!(
                    "verifier {from} does not have access to {owner}"
                )));
            }

            let tx = inner.submit(
                &self.contract_address,
                &self.operator,
                "recordZKProofVerification",
                args(json!({
                    "user": owner,
                    "proofHash": proof_hash,
                    "dataType": data_type,
                })),
                from,
            )?;
            inner.identity.push_zkp(ZkpVerificationRecord {
                user: owner.to_string(),
                verifier: from.to_string(),
                proof_hash: proof_hash.to_string(),
                data_type: data_type.to_string(),
                timestamp: now,
            });
            inner.commit(
                &self.contract_address,
                &tx,
                "ZKProofVerified",
                args(json!({"user": owner, "verifier": from, "dataType": data_type})),
            )?
        };
        info!(owner, verifier = from, data_type, "zkp verification recorded");
        self.request_save();
        Ok(receipt)
    }

    /// Events emitted by the identity contract.
    pub fn get_past_events(
        &self,
        event_name: &str,
        from_block: u64,
        to_block: Option<u64>,
        filters: Option<&Args>,
    ) -> Result<Vec<Event>, IdentityError> {
        self.lock()?.past_events(
            &self.contract_address,
            event_name,
            from_block,
            to_block,
            filters,
        )
    }

    pub fn identity(&self, owner: &str) -> Result<Option<IdentityRecord>, IdentityError> {
        Ok(self.lock()?.identity.identity(owner).cloned())
    }

    pub fn access_grants_for(&self, owner: &str) -> Result<Vec<AccessGrantView>, IdentityError> {
        let now = self.clock.now();
        Ok(self.lock()?.identity.grants_for(owner, now))
    }

    pub fn zkp_verifications_for(
        &self,
        owner: &str,
    ) -> Result<Vec<ZkpVerificationRecord>, IdentityError> {
        Ok(self.lock()?.identity.zkp_for(owner))
    }

    /// Verification changes for `owner`, oldest first, read back from events.
    pub fn verification_history(
        &self,
        owner: &str,
    ) -> Result<Vec<VerificationHistoryEntry>, IdentityError> {
        self.lock()?
            .verification_history(&self.contract_address, owner)
    }

    /// Full report for `owner`, read under a single lock acquisition.
    pub fn audit(&self, owner: &str) -> Result<VerificationAudit, IdentityError> {
        let now = self.clock.now();
        let inner = self.lock()?;
        Ok(VerificationAudit {
            owner: owner.to_string(),
            identity: inner.identity.identity(owner).cloned(),
            verification_history: inner.verification_history(&self.contract_address, owner)?,
            access_grants: inner.identity.grants_for(owner, now),
            zkp_verifications: inner.identity.zkp_for(owner),
            generated_at: Utc::now(),
        })
    }

    /// Run `f` with read access to the ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&Ledger) -> R) -> Result<R, IdentityError> {
        Ok(f(&self.lock()?.ledger))
    }

    /// Consistent copy of both snapshots, taken under one lock acquisition.
    pub fn capture(&self) -> Result<(LedgerSnapshot, IdentitySnapshot), IdentityError> {
        let inner = self.lock()?;
        Ok((
            inner.ledger.snapshot(),
            IdentitySnapshot::from(inner.identity.clone()),
        ))
    }

    /// Write both snapshots. Failures are logged and reported as `false`.
    pub fn save_state(&self, store: &PersistenceStore) -> bool {
        let (ledger, identity) = match self.capture() {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!(error = %e, "failed to capture state for saving");
                return false;
            }
        };

        let mut saved = true;
        if let Err(e) = store.save(ledger) {
            error!(error = %e, "failed to save ledger snapshot");
            saved = false;
        }
        if let Err(e) = store.save(identity) {
            error!(error = %e, "failed to save identity snapshot");
            saved = false;
        }
        if saved {
            debug!(dir = %store.dir().display(), "state saved");
        }
        saved
    }
}

fn history_entry(event: &Event) -> Option<VerificationHistoryEntry> {
    let small = |key: &str| {
        event
            .args
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
    };
    Some(VerificationHistoryEntry {
        verification_type: VerificationType::try_from(small("verificationType")?).ok()?,
        status: VerificationStatus::try_from(small("status")?).ok()?,
        tx_hash: event.tx_hash.clone(),
        block_number: event.block_number,
        timestamp: event.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::GrantStatus;

    const NOW: i64 = 1_700_000_000;

    fn service() -> (IdentityService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let service = IdentityService::in_memory(clock.clone()).unwrap();
        (service, clock)
    }

    #[test]
    fn deploys_contract_from_operator() {
        let (service, _) = service();
        assert_eq!(service.operator(), genesis_account(0));
        let name = service
            .with_ledger(|ledger| {
                ledger
                    .contract(service.contract_address())
                    .map(|c| c.name.clone())
            })
            .unwrap();
        assert_eq!(name.as_deref(), Some(CONTRACT_NAME));
    }

    #[test]
    fn duplicate_identity_is_rejected_without_a_transaction() {
        let (service, _) = service();
        service.create_identity("alice", "alice").unwrap();
        let height = service.with_ledger(Ledger::height).unwrap();

        let err = service.create_identity("alice", "alice").unwrap_err();
        assert_eq!(err, IdentityError::DuplicateIdentity("alice".to_string()));
        assert_eq!(service.with_ledger(Ledger::height).unwrap(), height);
    }

    #[test]
    fn create_identity_emits_event_at_mined_block() {
        let (service, _) = service();
        let receipt = service.create_identity("alice", "alice").unwrap();

        let events = service.get_past_events("IdentityCreated", 0, None, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(Some(events[0].block_number), receipt.block_number);
        assert_eq!(events[0].tx_hash, receipt.tx_hash);
        assert_eq!(receipt.from, genesis_account(0));
    }

    #[test]
    fn relay_transaction_records_business_sender() {
        let (service, _) = service();
        let receipt = service.create_identity("alice", "alice").unwrap();
        let sender = service
            .with_ledger(|ledger| {
                ledger
                    .get_transaction(&receipt.tx_hash)
                    .and_then(|tx| tx.data.get(SENDER_KEY).cloned())
            })
            .unwrap();
        assert_eq!(sender, Some(json!("alice")));
    }

    #[test]
    fn update_verification_auto_creates_identity() {
        let (service, _) = service();
        service
            .update_verification(
                "carol",
                VerificationType::Biometric,
                VerificationStatus::Verified,
                "verifier",
            )
            .unwrap();

        assert!(service.identity("carol").unwrap().is_some());
        assert_eq!(
            service
                .get_verification_status("carol", VerificationType::Biometric)
                .unwrap(),
            VerificationStatus::Verified
        );
        assert_eq!(
            service
                .get_verification_status("carol", VerificationType::Address)
                .unwrap(),
            VerificationStatus::Pending
        );

        let history = service.verification_history("carol").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].verification_type, VerificationType::Biometric);
    }

    #[test]
    fn only_owner_may_grant_or_revoke() {
        let (service, _) = service();
        let err = service
            .grant_access("alice", "bob", NOW + 60, vec![], "mallory")
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        assert!(service.identity("alice").unwrap().is_none());

        service
            .grant_access("alice", "bob", NOW + 60, vec![], "alice")
            .unwrap();
        let err = service.revoke_access("alice", "bob", "bob").unwrap_err();
        assert_eq!(err.code(), "unauthorized");
        assert!(service.check_access("bob", "alice").unwrap());
    }

    #[test]
    fn revoke_without_grant_is_not_found() {
        let (service, _) = service();
        let err = service.revoke_access("alice", "bob", "alice").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn grants_report_derived_status() {
        let (service, clock) = service();
        service
            .grant_access("alice", "bob", NOW + 10, vec!["facial".into()], "alice")
            .unwrap();
        service
            .grant_access("alice", "carol", NOW + 1_000, vec![], "alice")
            .unwrap();
        service.revoke_access("alice", "carol", "alice").unwrap();
        clock.advance(10);

        let grants = service.access_grants_for("alice").unwrap();
        let status = |tp: &str| grants.iter().find(|g| g.third_party == tp).map(|g| g.status);
        assert_eq!(status("bob"), Some(GrantStatus::Expired));
        assert_eq!(status("carol"), Some(GrantStatus::Revoked));
    }

    #[test]
    fn zkp_requires_active_access() {
        let (service, _) = service();
        let err = service
            .record_zkp_verification("alice", "0xabc", "facial", "bob")
            .unwrap_err();
        assert_eq!(err.code(), "unauthorized");

        service
            .grant_access("alice", "bob", NOW + 3_600, vec!["facial".into()], "alice")
            .unwrap();
        service
            .record_zkp_verification("alice", "0xabc", "facial", "bob")
            .unwrap();

        let audit = service.audit("alice").unwrap();
        assert_eq!(audit.zkp_verifications.len(), 1);
        assert_eq!(audit.zkp_verifications[0].verifier, "bob");
        assert_eq!(audit.access_grants.len(), 1);
        assert!(audit.identity.is_some());
    }

    #[test]
    fn insufficient_operator_balance_rejects_atomically() {
        let clock = Arc::new(ManualClock::new(NOW));
        let ledger = Ledger::with_clock(clock);
        let service = IdentityService::new(ledger, IdentityState::new(), None, None)
            .unwrap();
        let broke = IdentityService {
            operator: "0xbroke".to_string(),
            ..service
        };

        let err = broke.create_identity("alice", "alice").unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");
        assert!(broke.identity("alice").unwrap().is_none());
    }

    #[test]
    fn identity_operations_leave_contract_storage_untouched() {
        let (service, _) = service();
        service
            .grant_access("alice", "bob", NOW + 60, vec![], "alice")
            .unwrap();
        service
            .update_verification(
                "alice",
                VerificationType::Address,
                VerificationStatus::Verified,
                "alice",
            )
            .unwrap();
        service
            .record_zkp_verification("alice", "0xabc", "address", "bob")
            .unwrap();

        let storage_len = service
            .with_ledger(|ledger| {
                ledger
                    .contract(service.contract_address())
                    .map(|c| c.storage.len())
            })
            .unwrap();
        assert_eq!(storage_len, Some(0));
    }

    #[test]
    fn audit_matches_individual_accessors() {
        let (service, _) = service();
        service
            .update_verification(
                "alice",
                VerificationType::GovernmentId,
                VerificationStatus::Verified,
                "kyc",
            )
            .unwrap();
        service
            .grant_access("alice", "bob", NOW + 60, vec!["document".into()], "alice")
            .unwrap();

        let audit = service.audit("alice").unwrap();
        assert_eq!(audit.identity, service.identity("alice").unwrap());
        assert_eq!(
            audit.verification_history,
            service.verification_history("alice").unwrap()
        );
        assert_eq!(audit.access_grants, service.access_grants_for("alice").unwrap());
        assert!(audit.zkp_verifications.is_empty());
    }

    #[tokio::test]
    async fn mutations_request_a_save() {
        let (tx, mut rx) = mpsc::channel(1);
        let clock = Arc::new(ManualClock::new(NOW));
        let service = IdentityService::in_memory(clock).unwrap().with_save_trigger(tx);

        service.create_identity("alice", "alice").unwrap();
        service
            .grant_access("alice", "bob", NOW + 60, vec![], "alice")
            .unwrap();

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }
}
