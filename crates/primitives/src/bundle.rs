use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::Encodable;

use crate::{Rip7560Receipt, TxRip7560};

/// A bundle of RIP-7560 transactions pushed by a trusted builder.
///
/// The block builder includes the bundle in the original order atomically or
/// drops it completely.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternallyReceivedBundle {
    /// Free-form identifier of the submitting bundler.
    pub bundler_id: String,
    /// The block number the bundle was built for.
    #[serde(with = "alloy_serde::quantity")]
    pub valid_for_block: u64,
    /// Canonical hash of the bundle, see [`calculate_bundle_hash`].
    pub bundle_hash: B256,
    /// The transactions, in inclusion order.
    pub transactions: Vec<TxRip7560>,
}

/// Inclusion state of a submitted bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleStatus {
    /// All transactions of the bundle are part of a canonical block.
    Included = 0,
    /// The bundle is known but not yet included.
    Pending = 1,
    /// The bundle was dropped during block building.
    Invalid = 2,
    /// The bundle hash is not known.
    Unknown = 3,
}

/// Receipt for a bundle that reached a terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    /// Canonical hash of the bundle.
    pub bundle_hash: B256,
    /// Number of transactions in the bundle.
    #[serde(with = "alloy_serde::quantity")]
    pub count: u64,
    /// Inclusion state.
    pub status: BundleStatus,
    /// Number of the including block, zero while pending.
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    /// Hash of the including block.
    pub block_hash: B256,
    /// Per-transaction receipts for included bundles.
    pub transaction_receipts: Vec<Rip7560Receipt>,
    /// Total gas used by the bundle's transactions.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    /// Total priority fee paid to the coinbase by the bundle.
    pub gas_paid_priority: alloy_primitives::U256,
    /// Timestamp of the including block.
    #[serde(with = "alloy_serde::quantity")]
    pub block_timestamp: u64,
}

/// Why a transaction was dropped during block building.
///
/// Recorded even for silently skipped transactions; this is the only way
/// clients learn why their transaction never made it into a block.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rip7560TransactionDebugInfo {
    /// Hash of the dropped transaction.
    pub transaction_hash: B256,
    /// The contract the failure is attributed to, or `"n/a"`.
    pub revert_entity_name: String,
    /// Revert bytes as a hex string, or the error message when no frame
    /// reverted.
    pub revert_data: String,
    /// True if a frame reverted, false if validation failed outside the EVM
    /// (e.g. a missing EntryPoint callback).
    pub frame_reverted: bool,
}

/// Canonical bundle hash: `keccak256(rlp(h_1 ∥ h_2 ∥ … ∥ h_n))` over the
/// concatenated 32-byte transaction hashes encoded as a single RLP byte
/// string.
///
/// The concatenation is deliberately hashed as one string rather than an RLP
/// list; submitters compute the same value, so the layout must not change.
pub fn calculate_bundle_hash(tx_hashes: impl IntoIterator<Item = B256>) -> B256 {
    let concatenated: Vec<u8> = tx_hashes
        .into_iter()
        .flat_map(|hash| hash.0)
        .collect();
    let mut encoded = Vec::with_capacity(concatenated.len() + 3);
    Bytes::from(concatenated).encode(&mut encoded);
    keccak256(&encoded)
}
