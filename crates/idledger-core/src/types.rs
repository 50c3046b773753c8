//! Chain data model: blocks, transactions, receipts, and events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Argument bag carried by transactions and events.
pub type Args = Map<String, Value>;

/// Base cost of any transaction; also the minimum balance a sender must hold.
pub const MIN_FEE: u128 = 21_000;

const GAS_PER_DATA_BYTE: u64 = 100;

/// Receipt status for a successfully executed transaction.
pub const STATUS_SUCCESS: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    pub timestamp: i64,
    pub status: u8,
    pub gas_used: u64,
    pub function_name: String,
}

impl Receipt {
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub data: Args,
    pub function_name: String,
    pub timestamp: i64,
    pub receipt: Receipt,
}

impl Transaction {
    /// Build a transaction and its pending receipt.
    pub fn new(
        from: impl Into<String>,
        to: Option<String>,
        function_name: impl Into<String>,
        data: Args,
        timestamp: i64,
    ) -> Self {
        let from = from.into();
        let function_name = function_name.into();
        let hash = crate::hashing::transaction_hash(&from, to.as_deref(), &data, timestamp);
        let gas_used = simulated_gas(&data);

        let receipt = Receipt {
            tx_hash: hash.clone(),
            from: from.clone(),
            to: to.clone(),
            block_number: None,
            block_hash: None,
            timestamp,
            status: STATUS_SUCCESS,
            gas_used,
            function_name: function_name.clone(),
        };

        Self {
            hash,
            from,
            to,
            data,
            function_name,
            timestamp,
            receipt,
        }
    }
}

/// Reported gas. Nothing is ever charged against balances.
fn simulated_gas(data: &Args) -> u64 {
    let encoded_len = serde_json::to_string(data).map_or(0, |s| s.len()) as u64;
    MIN_FEE as u64 + encoded_len * GAS_PER_DATA_BYTE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub hash: String,
}

impl Block {
    pub fn genesis(timestamp: i64) -> Self {
        Self::new(0, timestamp, crate::hashing::GENESIS_PREVIOUS_HASH.to_string())
    }

    pub fn new(number: u64, timestamp: i64, previous_hash: String) -> Self {
        let hash = crate::hashing::block_hash(number, timestamp, &previous_hash, 0);
        Self {
            number,
            timestamp,
            transactions: Vec::new(),
            previous_hash,
            hash,
        }
    }

    /// Attach a transaction and refresh the fingerprint.
    pub fn push_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
        self.hash = self.compute_hash();
    }

    pub fn compute_hash(&self) -> String {
        crate::hashing::block_hash(
            self.number,
            self.timestamp,
            &self.previous_hash,
            self.transactions.len(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub args: Args,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub address: String,
    pub timestamp: i64,
}

impl Event {
    /// Exact-match AND filter; a key missing from `args` never matches.
    pub fn matches_filters(&self, filters: &Args) -> bool {
        filters
            .iter()
            .all(|(key, expected)| self.args.get(key) == Some(expected))
    }
}

/// Block lookup key accepted by [`crate::Ledger::get_block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockId {
    Latest,
    Number(u64),
    Hash(String),
}

impl From<u64> for BlockId {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl FromStr for BlockId {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        Ok(match value.parse::<u64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Hash(value.to_string()),
        })
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::Number(number) => write!(f, "{number}"),
            Self::Hash(hash) => write!(f, "{hash}"),
        }
    }
}

/// Build an [`Args`] map from a `serde_json::json!` object literal.
///
/// Non-object values yield an empty map.
pub fn args(value: Value) -> Args {
    match value {
        Value::Object(map) => map,
        _ => Args::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_receipt_has_no_block() {
        let tx = Transaction::new("0xaa", None, "constructor", args(json!({"a": 1})), 5);
        assert!(!tx.receipt.is_mined());
        assert_eq!(tx.receipt.tx_hash, tx.hash);
        assert_eq!(tx.receipt.status, STATUS_SUCCESS);
        assert!(tx.receipt.gas_used > MIN_FEE as u64);
    }

    #[test]
    fn pushing_transactions_changes_block_hash() {
        let mut block = Block::new(1, 10, "prev".to_string());
        let before = block.hash.clone();
        block.push_transaction(Transaction::new("a", None, "f", Args::new(), 10));
        assert_ne!(block.hash, before);
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn block_id_parses_all_forms() {
        assert_eq!("latest".parse::<BlockId>().unwrap(), BlockId::Latest);
        assert_eq!("12".parse::<BlockId>().unwrap(), BlockId::Number(12));
        assert_eq!(
            "abc".parse::<BlockId>().unwrap(),
            BlockId::Hash("abc".to_string())
        );
    }

    #[test]
    fn unknown_filter_key_excludes_event() {
        let event = Event {
            name: "AccessGranted".into(),
            args: args(json!({"user": "alice", "thirdParty": "bob"})),
            tx_hash: "0x1".into(),
            block_number: 1,
            log_index: 0,
            address: "0xc".into(),
            timestamp: 0,
        };
        assert!(event.matches_filters(&args(json!({"user": "alice"}))));
        assert!(!event.matches_filters(&args(json!({"user": "carol"}))));
        assert!(!event.matches_filters(&args(json!({"missing": "alice"}))));
        assert!(event.matches_filters(&Args::new()));
    }
}
