//! Fingerprints and address derivation.
//!
//! None of these are security primitives. Block hashes link a block to its
//! predecessor but do not cover transaction contents, and addresses are
//! truncated digests used purely as lookup keys.

use uuid::Uuid;

use crate::types::Args;

/// Previous-hash value carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Block fingerprint over `number ‖ timestamp ‖ previous_hash ‖ transaction_count`.
pub fn block_hash(number: u64, timestamp: i64, previous_hash: &str, tx_count: usize) -> String {
    let material = format!("{number}{timestamp}{previous_hash}{tx_count}");
    blake3::hash(material.as_bytes()).to_hex().to_string()
}

/// Unique transaction hash. A fresh UUID is mixed in so identical inputs never collide.
pub fn transaction_hash(from: &str, to: Option<&str>, data: &Args, timestamp: i64) -> String {
    let encoded = serde_json::to_string(data).unwrap_or_default();
    let material = format!(
        "{from}{}{encoded}{timestamp}{}",
        to.unwrap_or_default(),
        Uuid::new_v4()
    );
    format!("0x{}", blake3::hash(material.as_bytes()).to_hex())
}

/// Contract address from name, deployer, deployment sequence, and randomness.
///
/// Not reproducible across replays.
pub fn contract_address(name: &str, deployer: &str, sequence: usize) -> String {
    let material = format!("{name}{deployer}{sequence}{}", Uuid::new_v4());
    last_20_bytes_hex(material.as_bytes())
}

/// Map a free-form user id onto a ledger address.
///
/// Inputs that already look like `0x` + 40 hex digits are returned unchanged.
pub fn user_address(user_id: &str) -> String {
    if is_address(user_id) {
        return user_id.to_string();
    }
    last_20_bytes_hex(user_id.as_bytes())
}

pub fn is_address(candidate: &str) -> bool {
    candidate.len() == 42
        && candidate.starts_with("0x")
        && candidate[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn last_20_bytes_hex(material: &[u8]) -> String {
    let digest = blake3::hash(material);
    let hex = digest.to_hex();
    format!("0x{}", &hex[hex.len() - 40..])
}
