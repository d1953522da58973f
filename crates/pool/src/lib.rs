//! Bundle ingress for RIP-7560 transactions.
//!
//! Trusted builders push ordered bundles; the pool stores them for block
//! building, tracks their inclusion status, and keeps per-transaction debug
//! records so clients can learn why a transaction was dropped.

use alloy_primitives::{B256, U256};
use parking_lot::RwLock;
use rip7560_primitives::{
    BundleReceipt, BundleStatus, ExternallyReceivedBundle, Rip7560Receipt,
    Rip7560TransactionDebugInfo,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Errors of the bundle ingress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The node is not configured to accept pushed bundles.
    #[error("bundle push is disabled on this node")]
    PushDisabled,
    /// A bundle must contain at least one transaction.
    #[error("submitted bundle has zero length")]
    EmptyBundle,
    /// A bundle with this hash is already known.
    #[error("bundle {0} already known")]
    AlreadyKnown(B256),
}

/// The pool surface the RPC layer and the block builder talk to.
///
/// Atomic inclusion-or-drop of a bundle is the block builder's contract;
/// the pool records outcomes.
pub trait Rip7560PoolApi: Send + Sync {
    /// Accepts a pushed bundle from a trusted submitter.
    fn submit_bundle(&self, bundle: ExternallyReceivedBundle) -> Result<(), PoolError>;

    /// The next pending bundle valid for `block_number`, if any.
    fn pending_bundle(&self, block_number: u64) -> Option<ExternallyReceivedBundle>;

    /// The status receipt of a bundle, `None` for unknown hashes.
    fn bundle_status(&self, bundle_hash: B256) -> Option<BundleReceipt>;

    /// Marks a bundle as included and attaches the block context.
    fn mark_included(
        &self,
        bundle_hash: B256,
        block_number: u64,
        block_hash: B256,
        block_timestamp: u64,
        receipts: Vec<Rip7560Receipt>,
        gas_paid_priority: U256,
    );

    /// Marks a bundle as dropped during block building.
    fn mark_invalid(&self, bundle_hash: B256);

    /// Records why transactions were dropped, keyed by transaction hash.
    fn set_transaction_debug_info(&self, infos: Vec<Rip7560TransactionDebugInfo>);

    /// The debug record of a dropped transaction.
    fn transaction_debug_info(&self, tx_hash: B256) -> Option<Rip7560TransactionDebugInfo>;
}

#[derive(Clone, Debug)]
struct StoredBundle {
    bundle: ExternallyReceivedBundle,
    status: BundleStatus,
    block_number: u64,
    block_hash: B256,
    block_timestamp: u64,
    receipts: Vec<Rip7560Receipt>,
    gas_paid_priority: U256,
}

/// An in-memory bundle pool.
#[derive(Debug, Default)]
pub struct InMemoryBundlePool {
    accept_push: bool,
    bundles: RwLock<HashMap<B256, StoredBundle>>,
    debug_info: RwLock<HashMap<B256, Rip7560TransactionDebugInfo>>,
}

impl InMemoryBundlePool {
    /// A pool that accepts pushed bundles iff `accept_push` is set.
    pub fn new(accept_push: bool) -> Self {
        Self {
            accept_push,
            ..Default::default()
        }
    }
}

impl Rip7560PoolApi for InMemoryBundlePool {
    fn submit_bundle(&self, bundle: ExternallyReceivedBundle) -> Result<(), PoolError> {
        if !self.accept_push {
            return Err(PoolError::PushDisabled);
        }
        if bundle.transactions.is_empty() {
            return Err(PoolError::EmptyBundle);
        }

        let mut bundles = self.bundles.write();
        if bundles.contains_key(&bundle.bundle_hash) {
            return Err(PoolError::AlreadyKnown(bundle.bundle_hash));
        }

        info!(
            target: "rip7560::pool",
            bundle_hash = %bundle.bundle_hash,
            bundler_id = %bundle.bundler_id,
            txs = bundle.transactions.len(),
            valid_for_block = bundle.valid_for_block,
            "accepted pushed bundle"
        );
        bundles.insert(
            bundle.bundle_hash,
            StoredBundle {
                bundle,
                status: BundleStatus::Pending,
                block_number: 0,
                block_hash: B256::ZERO,
                block_timestamp: 0,
                receipts: Vec::new(),
                gas_paid_priority: U256::ZERO,
            },
        );
        Ok(())
    }

    fn pending_bundle(&self, block_number: u64) -> Option<ExternallyReceivedBundle> {
        self.bundles
            .read()
            .values()
            .filter(|stored| {
                stored.status == BundleStatus::Pending && stored.bundle.valid_for_block == block_number
            })
            .min_by_key(|stored| stored.bundle.bundle_hash)
            .map(|stored| stored.bundle.clone())
    }

    fn bundle_status(&self, bundle_hash: B256) -> Option<BundleReceipt> {
        let bundles = self.bundles.read();
        let stored = bundles.get(&bundle_hash)?;
        let gas_used = stored.receipts.iter().map(|r| r.gas_used).sum();
        Some(BundleReceipt {
            bundle_hash,
            count: stored.bundle.transactions.len() as u64,
            status: stored.status,
            block_number: stored.block_number,
            block_hash: stored.block_hash,
            transaction_receipts: stored.receipts.clone(),
            gas_used,
            gas_paid_priority: stored.gas_paid_priority,
            block_timestamp: stored.block_timestamp,
        })
    }

    fn mark_included(
        &self,
        bundle_hash: B256,
        block_number: u64,
        block_hash: B256,
        block_timestamp: u64,
        receipts: Vec<Rip7560Receipt>,
        gas_paid_priority: U256,
    ) {
        let mut bundles = self.bundles.write();
        if let Some(stored) = bundles.get_mut(&bundle_hash) {
            stored.status = BundleStatus::Included;
            stored.block_number = block_number;
            stored.block_hash = block_hash;
            stored.block_timestamp = block_timestamp;
            stored.receipts = receipts;
            stored.gas_paid_priority = gas_paid_priority;
        }
    }

    fn mark_invalid(&self, bundle_hash: B256) {
        let mut bundles = self.bundles.write();
        if let Some(stored) = bundles.get_mut(&bundle_hash) {
            stored.status = BundleStatus::Invalid;
        }
    }

    fn set_transaction_debug_info(&self, infos: Vec<Rip7560TransactionDebugInfo>) {
        let mut map = self.debug_info.write();
        for info in infos {
            debug!(
                target: "rip7560::pool",
                tx_hash = %info.transaction_hash,
                entity = %info.revert_entity_name,
                frame_reverted = info.frame_reverted,
                "recorded transaction debug info"
            );
            map.insert(info.transaction_hash, info);
        }
    }

    fn transaction_debug_info(&self, tx_hash: B256) -> Option<Rip7560TransactionDebugInfo> {
        self.debug_info.read().get(&tx_hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rip7560_primitives::{calculate_bundle_hash, TxRip7560};

    fn bundle(valid_for_block: u64) -> ExternallyReceivedBundle {
        let txs = vec![TxRip7560::default()];
        let bundle_hash = calculate_bundle_hash(txs.iter().map(|tx| tx.tx_hash()));
        ExternallyReceivedBundle {
            bundler_id: "bundler-1".to_string(),
            valid_for_block,
            bundle_hash,
            transactions: txs,
        }
    }

    #[test]
    fn push_gate_is_enforced() {
        let pool = InMemoryBundlePool::new(false);
        assert_eq!(pool.submit_bundle(bundle(1)), Err(PoolError::PushDisabled));

        let pool = InMemoryBundlePool::new(true);
        assert_eq!(pool.submit_bundle(bundle(1)), Ok(()));
    }

    #[test]
    fn empty_and_duplicate_bundles_are_rejected() {
        let pool = InMemoryBundlePool::new(true);

        let mut empty = bundle(1);
        empty.transactions.clear();
        assert_eq!(pool.submit_bundle(empty), Err(PoolError::EmptyBundle));

        let b = bundle(1);
        pool.submit_bundle(b.clone()).unwrap();
        assert_eq!(
            pool.submit_bundle(b.clone()),
            Err(PoolError::AlreadyKnown(b.bundle_hash))
        );
    }

    #[test]
    fn status_lifecycle() {
        let pool = InMemoryBundlePool::new(true);
        let b = bundle(7);
        pool.submit_bundle(b.clone()).unwrap();

        let receipt = pool.bundle_status(b.bundle_hash).unwrap();
        assert_eq!(receipt.status, BundleStatus::Pending);
        assert_eq!(receipt.count, 1);

        assert!(pool.pending_bundle(7).is_some());
        assert!(pool.pending_bundle(8).is_none());

        pool.mark_included(
            b.bundle_hash,
            7,
            B256::repeat_byte(0x11),
            1_700_000_000,
            Vec::new(),
            U256::from(42u64),
        );
        let receipt = pool.bundle_status(b.bundle_hash).unwrap();
        assert_eq!(receipt.status, BundleStatus::Included);
        assert_eq!(receipt.block_number, 7);
        assert_eq!(receipt.gas_paid_priority, U256::from(42u64));
        assert!(pool.pending_bundle(7).is_none());

        // Unknown hashes have no receipt.
        assert!(pool.bundle_status(B256::ZERO).is_none());
    }

    #[test]
    fn invalid_bundles_keep_their_record() {
        let pool = InMemoryBundlePool::new(true);
        let b = bundle(3);
        pool.submit_bundle(b.clone()).unwrap();
        pool.mark_invalid(b.bundle_hash);
        assert_eq!(
            pool.bundle_status(b.bundle_hash).unwrap().status,
            BundleStatus::Invalid
        );
    }

    #[test]
    fn debug_info_is_keyed_by_tx_hash() {
        let pool = InMemoryBundlePool::new(true);
        let info = Rip7560TransactionDebugInfo {
            transaction_hash: B256::repeat_byte(0xab),
            revert_entity_name: "paymaster".to_string(),
            revert_data: "0xdeadbeef".to_string(),
            frame_reverted: true,
        };
        pool.set_transaction_debug_info(vec![info.clone()]);
        assert_eq!(
            pool.transaction_debug_info(B256::repeat_byte(0xab)),
            Some(info)
        );
        assert!(pool.transaction_debug_info(B256::ZERO).is_none());
    }
}
