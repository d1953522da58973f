use alloy_primitives::{Bytes, B256, U256};

/// Everything the execution phase needs from a completed validation phase.
///
/// Produced by the validation pipeline, consumed exactly once by the
/// execution pipeline of the same transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationPhaseResult {
    /// Hash of the validated transaction.
    pub tx_hash: B256,
    /// Wei subtracted from the gas payer up front:
    /// `total_gas_limit × effective_gas_price`.
    pub pre_charge: U256,
    /// `min(gas_fee_cap, base_fee + gas_tip_cap)` at the validating block.
    pub effective_gas_price: U256,
    /// Context returned by `acceptPaymaster`, handed to the post-op frame.
    pub paymaster_context: Bytes,
    /// Intrinsic (pre-transaction) gas cost.
    #[serde(with = "alloy_serde::quantity")]
    pub pre_transaction_gas: u64,
    /// Gas used by the RIP-7712 nonce manager frame, zero for 1-D nonces.
    #[serde(with = "alloy_serde::quantity")]
    pub nonce_manager_used_gas: u64,
    /// Gas used by the deployer frame, zero without a deployer.
    #[serde(with = "alloy_serde::quantity")]
    pub deployment_used_gas: u64,
    /// Gas used by the account validation frame.
    #[serde(with = "alloy_serde::quantity")]
    pub validation_used_gas: u64,
    /// Gas used by the paymaster validation frame.
    #[serde(with = "alloy_serde::quantity")]
    pub pm_validation_used_gas: u64,
    /// EIP-3529 refund counter accumulated during the validation frames.
    #[serde(with = "alloy_serde::quantity")]
    pub validation_refund: u64,
    /// Account validity window start, zero meaning unconstrained.
    #[serde(with = "alloy_serde::quantity")]
    pub sender_valid_after: u64,
    /// Account validity window end, zero meaning unconstrained.
    #[serde(with = "alloy_serde::quantity")]
    pub sender_valid_until: u64,
    /// Paymaster validity window start.
    #[serde(with = "alloy_serde::quantity")]
    pub pm_valid_after: u64,
    /// Paymaster validity window end.
    #[serde(with = "alloy_serde::quantity")]
    pub pm_valid_until: u64,
}

impl ValidationPhaseResult {
    /// Total gas consumed by the validation phase frames.
    pub fn validation_phase_used_gas(&self) -> u64 {
        self.pre_transaction_gas
            + self.nonce_manager_used_gas
            + self.deployment_used_gas
            + self.validation_used_gas
            + self.pm_validation_used_gas
    }
}
