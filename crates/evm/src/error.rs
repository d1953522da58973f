//! Validation failure taxonomy.

use alloy_primitives::{hex, Address, Bytes, U256};
use rip7560_contracts::{decode_revert_reason, EntryPointCodecError};

use crate::ctx::FrameResult;

/// The contract a validation failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityName {
    /// The sender account contract.
    Account,
    /// The paymaster contract.
    Paymaster,
    /// The deployer (factory) contract.
    Deployer,
    /// The RIP-7712 nonce manager contract.
    NonceManager,
}

impl std::fmt::Display for EntityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => f.write_str("account"),
            Self::Paymaster => f.write_str("paymaster"),
            Self::Deployer => f.write_str("deployer"),
            Self::NonceManager => f.write_str("NonceManager"),
        }
    }
}

/// Everything that can make an RIP-7560 transaction invalid before or during
/// its validation phase.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rip7560InvalidTransaction {
    /// The RIP-7560 fork is not active at this block.
    #[error("RIP-7560 transactions are not enabled at this block")]
    TxTypeNotEnabled,

    /// Deployer data without a deployer address.
    #[error("deployer data provided without a deployer address")]
    DeployerDataWithoutDeployer,

    /// Paymaster data without a paymaster address.
    #[error("paymaster data provided without a paymaster address")]
    PaymasterDataWithoutPaymaster,

    /// Paymaster gas limit without a paymaster address.
    #[error("paymaster validation gas limit provided without a paymaster address")]
    PaymasterGasWithoutPaymaster,

    /// The configured paymaster account holds no code.
    #[error("paymaster {0} has no code")]
    PaymasterNotDeployed(Address),

    /// A paymaster cannot validate with a zero gas budget.
    #[error("paymaster validation gas limit is zero")]
    ZeroPaymasterValidationGas,

    /// A deployer was given although the account already has code.
    #[error("account deployment failed: {0} is already deployed")]
    SenderAlreadyDeployed(Address),

    /// The configured deployer account holds no code.
    #[error("deployer {0} has no code")]
    DeployerNotDeployed(Address),

    /// The sender has no code and no deployer was specified.
    #[error("account {0} is not deployed and no deployer is specified")]
    SenderNotDeployed(Address),

    /// The deployer frame succeeded but left no code at the sender.
    #[error("sender not deployed by the deployer, sender: {sender} deployer: {deployer}")]
    SenderNotDeployedByFactory {
        /// The account that should have been created.
        sender: Address,
        /// The deployer that was supposed to create it.
        deployer: Address,
    },

    /// The validation gas limit cannot even cover the intrinsic cost.
    #[error("insufficient validation gas limit {limit} to cover pre-transaction gas cost {intrinsic}")]
    InsufficientValidationGas {
        /// The declared validation gas limit.
        limit: u64,
        /// The computed intrinsic cost.
        intrinsic: u64,
    },

    /// A gas field exceeds 2^62 or the total overflows.
    #[error("invalid gas values, each gas field is limited to 2^62")]
    GasFieldOverflow,

    /// The fee cap cannot cover the block base fee.
    #[error("max fee per gas {fee_cap} is below block base fee {base_fee}")]
    FeeCapBelowBaseFee {
        /// The transaction's fee cap.
        fee_cap: U256,
        /// The block base fee.
        base_fee: U256,
    },

    /// A non-zero nonce key before the RIP-7712 fork.
    #[error("two-dimensional nonce is disabled")]
    Rip7712NonceDisabled,

    /// A paymaster returned context but declared no post-op gas.
    #[error("paymaster context requires a non-zero postOp gas limit")]
    ContextWithoutPostOpGas,

    /// The gas payer cannot cover the pre-charge.
    #[error("insufficient funds for gas * price: address {address} have {have} want {want}")]
    InsufficientFunds {
        /// The gas payer.
        address: Address,
        /// Its balance.
        have: U256,
        /// The required pre-charge.
        want: U256,
    },

    /// The block gas pool cannot reserve the total gas limit.
    #[error("gas limit reached: block gas pool has {have}, transaction needs {want}")]
    BlockGasLimitReached {
        /// Gas left in the pool.
        have: u64,
        /// Gas the transaction reserves.
        want: u64,
    },

    /// 1-D nonce above the account nonce.
    #[error("nonce too high: address {address}, tx: {tx} state: {state}")]
    NonceTooHigh {
        /// The sender account.
        address: Address,
        /// The transaction nonce.
        tx: u64,
        /// The state nonce.
        state: u64,
    },

    /// 1-D nonce below the account nonce.
    #[error("nonce too low: address {address}, tx: {tx} state: {state}")]
    NonceTooLow {
        /// The sender account.
        address: Address,
        /// The transaction nonce.
        tx: u64,
        /// The state nonce.
        state: u64,
    },

    /// The account nonce cannot be incremented any further.
    #[error("nonce has max value: address {address}, nonce: {nonce}")]
    NonceMax {
        /// The sender account.
        address: Address,
        /// The saturated nonce.
        nonce: u64,
    },

    /// A validation frame made no call to the EntryPoint.
    #[error("{0} validation did not call the EntryPoint callback")]
    MissingCallback(EntityName),

    /// A validation frame called the EntryPoint more than once.
    #[error("illegal repeated call to the EntryPoint callback")]
    RepeatedCallback,

    /// The EntryPoint callback came from the wrong contract.
    #[error("invalid call to the EntryPoint from {got}, expected {expected}")]
    WrongCallbackSender {
        /// The entity under validation.
        expected: Address,
        /// The contract that actually called.
        got: Address,
    },

    /// The callback failed to decode, used a disallowed selector, or
    /// returned oversized context.
    #[error(transparent)]
    Codec(#[from] EntryPointCodecError),

    /// `validUntil` precedes `validAfter`.
    #[error("validity range invalid: validUntil {valid_until} is before validAfter {valid_after}")]
    ValidityRangeInvalid {
        /// Window start.
        valid_after: u64,
        /// Window end.
        valid_until: u64,
    },

    /// The block timestamp has not reached `validAfter` yet.
    #[error("transaction validity not reached yet: block time {time}, validAfter {valid_after}")]
    ValidityNotReached {
        /// The block timestamp.
        time: u64,
        /// Window start.
        valid_after: u64,
    },

    /// The block timestamp is past `validUntil`.
    #[error("transaction validity expired: block time {time}, validUntil {valid_until}")]
    ValidityExpired {
        /// The block timestamp.
        time: u64,
        /// Window end.
        valid_until: u64,
    },

    /// The EVM was cancelled, typically by an RPC timeout.
    #[error("execution cancelled")]
    Cancelled,
}

/// A structured validation phase failure.
///
/// Carries the revert bytes (hex-exposed to RPC callers), the entity the
/// failure is attributed to, and whether an actual frame revert happened (as
/// opposed to a violated callback rule). Construction from an already built
/// `ValidationPhaseError` is the identity, so the innermost entity and
/// reason always survive re-wrapping.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ValidationPhaseError {
    message: String,
    /// Raw revert bytes of the failed frame, if one reverted.
    pub revert_reason: Option<Bytes>,
    /// The contract the failure is attributed to.
    pub revert_entity_name: Option<EntityName>,
    /// True when a frame reverted, false for rule violations outside the EVM.
    pub frame_reverted: bool,
    /// True when the failing frame ran out of gas; gas estimation raises the
    /// probed limit instead of bailing out on such failures.
    pub out_of_gas: bool,
}

impl ValidationPhaseError {
    /// A failure attributed to no particular frame.
    pub fn new(inner: impl std::fmt::Display) -> Self {
        Self {
            message: format!("validation phase failed with exception: {inner}"),
            revert_reason: None,
            revert_entity_name: None,
            frame_reverted: false,
            out_of_gas: false,
        }
    }

    /// A failure of a contract frame, keeping its revert data.
    pub fn frame(entity: EntityName, result: &FrameResult) -> Self {
        let revert_reason = result.revert_data();
        let mut message = format!(
            "validation phase failed in contract {entity} with exception: {}",
            result.outcome
        );
        if let Some(reason) = decode_revert_reason(&revert_reason) {
            message.push_str(&format!(": {reason}"));
        }
        Self {
            message,
            revert_reason: (!revert_reason.is_empty()).then_some(revert_reason),
            revert_entity_name: Some(entity),
            frame_reverted: true,
            out_of_gas: result.is_out_of_gas(),
        }
    }

    /// The revert bytes as a `0x`-prefixed hex string, for the RPC `data`
    /// field.
    pub fn error_data(&self) -> Option<String> {
        self.revert_reason
            .as_ref()
            .map(|data| hex::encode_prefixed(data))
    }

    /// The entity name as reported in debug info, `"n/a"` when the failure
    /// is not attributed to a contract.
    pub fn entity_name(&self) -> String {
        self.revert_entity_name
            .map(|entity| entity.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    }
}

impl From<Rip7560InvalidTransaction> for ValidationPhaseError {
    fn from(err: Rip7560InvalidTransaction) -> Self {
        Self::new(err)
    }
}
