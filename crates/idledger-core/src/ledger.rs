//! Local single-node chain.
//!
//! The ledger queues transactions as pending, folds them into hash-linked
//! blocks on [`Ledger::mine_block`], and lets contracts addressed by mined
//! transactions emit a synthetic `<function>Event`. There is no consensus and
//! no gas accounting: balances only gate who may submit.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::contract::{Contract, ContractRegistry};
use crate::error::LedgerError;
use crate::hashing::{self, GENESIS_PREVIOUS_HASH};
use crate::storage::SnapshotMetadata;
use crate::types::{Args, Block, BlockId, Event, Receipt, Transaction, MIN_FEE};

/// Number of pre-funded accounts in a fresh ledger.
pub const GENESIS_ACCOUNT_COUNT: u64 = 10;

/// 100 ether, in wei.
pub const GENESIS_BALANCE: u128 = 100 * 1_000_000_000_000_000_000;

/// Address of the `index`-th pre-funded account.
pub fn genesis_account(index: u64) -> String {
    format!("0x{index:040x}")
}

/// Serializable ledger state persisted to `blockchain_state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SnapshotMetadata>,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
    #[serde(default)]
    pub accounts: BTreeMap<String, u128>,
    #[serde(default)]
    pub nonces: BTreeMap<String, u64>,
    #[serde(default)]
    pub contracts: ContractRegistry,
}

/// Filter accepted by [`Ledger::get_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub from_block: u64,
    /// Inclusive upper bound; defaults to the chain head.
    pub to_block: Option<u64>,
    pub address: Option<String>,
    /// Event names; an event matches when its name is listed. Empty matches all.
    pub topics: Option<Vec<String>>,
}

pub struct Ledger {
    // Never empty: every constructor installs at least the genesis block.
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    accounts: BTreeMap<String, u128>,
    nonces: BTreeMap<String, u64>,
    contracts: ContractRegistry,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Fresh chain with a genesis block and the pre-funded accounts.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let genesis = Block::genesis(clock.now());
        let mut accounts = BTreeMap::new();
        let mut nonces = BTreeMap::new();
        for index in 0..GENESIS_ACCOUNT_COUNT {
            let address = genesis_account(index);
            accounts.insert(address.clone(), GENESIS_BALANCE);
            nonces.insert(address, 0);
        }

        Self {
            chain: vec![genesis],
            pending: Vec::new(),
            accounts,
            nonces,
            contracts: ContractRegistry::new(),
            clock,
        }
    }

    /// Rebuild a ledger from a snapshot, re-verifying block linkage.
    pub fn restore(snapshot: LedgerSnapshot, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        if snapshot.blocks.is_empty() {
            return Err(LedgerError::IntegrityViolation {
                number: 0,
                reason: "snapshot contains no genesis block".to_string(),
            });
        }

        let ledger = Self {
            chain: snapshot.blocks,
            pending: snapshot.pending_transactions,
            accounts: snapshot.accounts,
            nonces: snapshot.nonces,
            contracts: snapshot.contracts,
            clock,
        };
        ledger.verify_chain()?;

        info!(
            blocks = ledger.chain.len(),
            contracts = ledger.contracts.len(),
            "ledger restored from snapshot"
        );
        Ok(ledger)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            metadata: None,
            blocks: self.chain.clone(),
            pending_transactions: self.pending.clone(),
            accounts: self.accounts.clone(),
            nonces: self.nonces.clone(),
            contracts: self.contracts.clone(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Queue a transaction without mining it.
    pub fn create_transaction(
        &mut self,
        from: &str,
        to: Option<&str>,
        function_name: &str,
        data: Args,
    ) -> Result<Transaction, LedgerError> {
        let balance = self.balance(from);
        if balance < MIN_FEE {
            return Err(LedgerError::InsufficientBalance {
                address: from.to_string(),
                balance,
                required: MIN_FEE,
            });
        }

        let transaction = Transaction::new(
            from,
            to.map(str::to_string),
            function_name,
            data,
            self.clock.now(),
        );
        *self.nonces.entry(from.to_string()).or_insert(0) += 1;
        self.pending.push(transaction.clone());

        debug!(
            tx_hash = %transaction.hash,
            from,
            function = function_name,
            "transaction queued"
        );
        Ok(transaction)
    }

    /// Fold every pending transaction into the next block.
    ///
    /// Receipts are back-filled with the block number and hash, and each
    /// transaction addressed to a known contract makes that contract emit
    /// `<function>Event` with the transaction data as arguments.
    pub fn mine_block(&mut self) -> Block {
        let now = self.clock.now();
        let (number, previous_hash) = {
            let head = self.head();
            (head.number + 1, head.hash.clone())
        };
        let mut block = Block::new(number, now, previous_hash);

        for mut transaction in std::mem::take(&mut self.pending) {
            transaction.receipt.block_number = Some(number);

            if let Some(contract) = transaction
                .to
                .as_deref()
                .and_then(|to| self.contracts.get_mut(to))
            {
                contract.emit_event(
                    format!("{}Event", transaction.function_name),
                    transaction.data.clone(),
                    transaction.hash.clone(),
                    number,
                    now,
                );
            }

            block.push_transaction(transaction);
        }

        for transaction in &mut block.transactions {
            transaction.receipt.block_hash = Some(block.hash.clone());
        }

        debug!(
            number,
            hash = %block.hash,
            transactions = block.transactions.len(),
            "block mined"
        );
        self.chain.push(block.clone());
        block
    }

    /// Deploy a contract and mine its constructor transaction.
    pub fn deploy_contract(
        &mut self,
        name: &str,
        abi: Vec<Value>,
        from: &str,
    ) -> Result<Contract, LedgerError> {
        let address = hashing::contract_address(name, from, self.contracts.len());
        let mut data = Args::new();
        data.insert("contract_name".to_string(), Value::from(name));

        self.create_transaction(from, None, "constructor", data)?;
        self.contracts
            .insert(Contract::new(address.clone(), name, abi));
        self.mine_block();

        info!(name, %address, deployer = from, "contract deployed");
        self.contracts
            .get(&address)
            .cloned()
            .ok_or(LedgerError::UnknownContract(address))
    }

    /// Submit a contract transaction and mark its signature as executed.
    pub fn transact(
        &mut self,
        address: &str,
        function_name: &str,
        args: Args,
        from: &str,
    ) -> Result<Transaction, LedgerError> {
        if !self.contracts.contains(address) {
            return Err(LedgerError::UnknownContract(address.to_string()));
        }

        let transaction =
            self.create_transaction(from, Some(address), function_name, args.clone())?;
        if let Some(contract) = self.contracts.get_mut(address) {
            contract.mark_executed(function_name, &args);
        }
        Ok(transaction)
    }

    pub fn call(
        &self,
        address: &str,
        function_name: &str,
        args: &Args,
    ) -> Result<Option<Value>, LedgerError> {
        self.contracts
            .get(address)
            .map(|contract| contract.call(function_name, args))
            .ok_or_else(|| LedgerError::UnknownContract(address.to_string()))
    }

    /// Emit an event from a deployed contract outside of mining.
    pub fn emit_event(
        &mut self,
        address: &str,
        name: &str,
        args: Args,
        tx_hash: &str,
        block_number: u64,
    ) -> Result<Event, LedgerError> {
        let now = self.clock.now();
        self.contracts
            .get_mut(address)
            .map(|contract| contract.emit_event(name, args, tx_hash, block_number, now))
            .ok_or_else(|| LedgerError::UnknownContract(address.to_string()))
    }

    pub fn get_block(&self, id: &BlockId) -> Option<&Block> {
        match id {
            BlockId::Latest => Some(self.head()),
            BlockId::Number(number) => self.chain.iter().find(|block| block.number == *number),
            BlockId::Hash(hash) => self.chain.iter().find(|block| &block.hash == hash),
        }
    }

    /// Receipt of a mined transaction. Pending transactions are not found.
    pub fn get_transaction_receipt(&self, tx_hash: &str) -> Option<Receipt> {
        self.get_transaction(tx_hash)
            .map(|transaction| transaction.receipt.clone())
    }

    pub fn get_transaction(&self, tx_hash: &str) -> Option<&Transaction> {
        self.chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .find(|transaction| transaction.hash == tx_hash)
    }

    /// Events across all contracts, ordered by block then contract then log index.
    pub fn get_logs(&self, filter: &LogFilter) -> Vec<Event> {
        let to_block = filter.to_block.unwrap_or_else(|| self.head().number);
        let topics = filter.topics.as_deref().filter(|topics| !topics.is_empty());

        let mut logs: Vec<Event> = self
            .contracts
            .iter()
            .filter(|contract| {
                filter
                    .address
                    .as_deref()
                    .map_or(true, |address| contract.address == address)
            })
            .flat_map(|contract| contract.events.iter())
            .filter(|event| event.block_number >= filter.from_block)
            .filter(|event| event.block_number <= to_block)
            .filter(|event| topics.map_or(true, |topics| topics.contains(&event.name)))
            .cloned()
            .collect();

        logs.sort_by_key(|event| event.block_number);
        logs
    }

    /// Check numbering, previous-hash links, and block fingerprints.
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        for (index, block) in self.chain.iter().enumerate() {
            let expected_number = index as u64;
            if block.number != expected_number {
                return Err(LedgerError::IntegrityViolation {
                    number: block.number,
                    reason: format!("expected block number {expected_number}"),
                });
            }

            let expected_previous = match index {
                0 => GENESIS_PREVIOUS_HASH,
                _ => self.chain[index - 1].hash.as_str(),
            };
            if block.previous_hash != expected_previous {
                return Err(LedgerError::IntegrityViolation {
                    number: block.number,
                    reason: "previous hash link mismatch".to_string(),
                });
            }

            if block.hash != block.compute_hash() {
                return Err(LedgerError::IntegrityViolation {
                    number: block.number,
                    reason: "block hash mismatch".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn head(&self) -> &Block {
        &self.chain[self.chain.len() - 1]
    }

    /// Number of blocks including genesis.
    pub fn height(&self) -> usize {
        self.chain.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn balance(&self, address: &str) -> u128 {
        self.accounts.get(address).copied().unwrap_or(0)
    }

    /// Nonce of `address`, i.e. the number of transactions it has submitted.
    pub fn transaction_count(&self, address: &str) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    pub fn accounts(&self) -> &BTreeMap<String, u128> {
        &self.accounts
    }

    pub fn contracts(&self) -> &ContractRegistry {
        &self.contracts
    }

    pub fn contract(&self, address: &str) -> Option<&Contract> {
        self.contracts.get(address)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("height", &self.chain.len())
            .field("head", &self.head().hash)
            .field("pending", &self.pending.len())
            .field("accounts", &self.accounts.len())
            .field("contracts", &self.contracts.len())
            .finish()
    }
}
