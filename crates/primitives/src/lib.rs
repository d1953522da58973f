//! Consensus primitives for RIP-7560 native account abstraction.
//!
//! This crate defines the type-`0x04` transaction, its intrinsic gas rules,
//! the receipt and execution status produced by the state processor, and the
//! bundle envelope used by trusted block builders at ingress.

mod bundle;
mod receipt;
mod result;
mod transaction;

pub use bundle::{
    calculate_bundle_hash, BundleReceipt, BundleStatus, ExternallyReceivedBundle,
    Rip7560TransactionDebugInfo,
};
pub use receipt::{ExecutionStatus, Rip7560Receipt};
pub use result::ValidationPhaseResult;
pub use transaction::{
    checked_gas_sum, TxRip7560, ACCESS_LIST_ADDRESS_GAS, ACCESS_LIST_STORAGE_KEY_GAS,
    MAX_GAS_FIELD, RIP7560_BASE_TX_GAS, RIP7560_TX_TYPE_ID, TX_DATA_NON_ZERO_GAS, TX_DATA_ZERO_GAS,
};
