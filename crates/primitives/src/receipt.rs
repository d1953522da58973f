use alloy_primitives::{logs_bloom, Bloom, Log, B256};

use crate::RIP7560_TX_TYPE_ID;

/// Outcome of the execution and post-op frames, written into the
/// `RIP7560TransactionEvent` log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    /// Both the execution frame and the post-op frame (if any) succeeded.
    #[default]
    Success = 0,
    /// The execution frame reverted; the post-op frame (if any) succeeded.
    ExecutionFailure = 1,
    /// The execution frame succeeded but the post-op frame reverted.
    PostOpFailure = 2,
    /// Both the execution frame and the post-op frame reverted.
    ExecutionAndPostOpFailure = 3,
}

impl ExecutionStatus {
    /// Whether the receipt status byte should read "success".
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Folds a post-op failure into the current status.
    pub fn with_post_op_failure(self) -> Self {
        match self {
            Self::ExecutionFailure | Self::ExecutionAndPostOpFailure => {
                Self::ExecutionAndPostOpFailure
            }
            _ => Self::PostOpFailure,
        }
    }
}

impl From<ExecutionStatus> for u64 {
    fn from(status: ExecutionStatus) -> Self {
        status as u64
    }
}

/// Receipt of an RIP-7560 transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rip7560Receipt {
    /// Transaction type, always [`RIP7560_TX_TYPE_ID`].
    pub tx_type: u8,
    /// Hash of the transaction.
    pub tx_hash: B256,
    /// EIP-658 status flag.
    pub success: bool,
    /// Fine grained frame outcome, mirrored in the transaction event log.
    pub execution_status: ExecutionStatus,
    /// Gas consumed by this transaction, penalties included, refunds applied.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    /// Running total of gas used in the block up to and including this
    /// transaction.
    #[serde(with = "alloy_serde::quantity")]
    pub cumulative_gas_used: u64,
    /// Logs emitted during validation and execution, in emission order.
    pub logs: Vec<Log>,
    /// Bloom filter over `logs`.
    pub logs_bloom: Bloom,
    /// Index of the transaction within its block.
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
}

impl Rip7560Receipt {
    /// Builds a receipt, deriving the bloom filter from the logs.
    pub fn new(
        tx_hash: B256,
        execution_status: ExecutionStatus,
        gas_used: u64,
        cumulative_gas_used: u64,
        logs: Vec<Log>,
        transaction_index: u64,
    ) -> Self {
        let logs_bloom = logs_bloom(logs.iter());
        Self {
            tx_type: RIP7560_TX_TYPE_ID,
            tx_hash,
            success: execution_status.is_success(),
            execution_status,
            gas_used,
            cumulative_gas_used,
            logs,
            logs_bloom,
            transaction_index,
        }
    }
}
