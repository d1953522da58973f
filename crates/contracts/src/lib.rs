//! The EntryPoint pseudo-contract surface of RIP-7560.
//!
//! Accounts, paymasters and deployers never interact with node internals
//! directly; every callback flows through the ABI defined here, addressed to
//! the reserved [`ENTRY_POINT`] address. This crate owns that ABI: the
//! calldata sent into contracts during validation, the callback selectors the
//! tracer hook captures, and the four consensus events.

use alloy_primitives::{address, aliases::U192, Address, Bytes, Log, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent, SolValue};
use rip7560_primitives::TxRip7560;

/// The EntryPoint pseudo-contract: `from` of system frames into the account
/// and paymaster, sole legal callee of the validation callbacks, and the
/// `address` of every RIP-7560 log.
pub const ENTRY_POINT: Address = address!("0000000000000000000000000000000000007560");

/// `from` of the deployer frame.
pub const SENDER_CREATOR: Address = address!("00000000000000000000000000000000ffff7560");

/// `version` argument passed to every validation callback.
pub const ABI_VERSION: u64 = 0;

/// Upper bound on the paymaster context returned by `acceptPaymaster`.
pub const PAYMASTER_MAX_CONTEXT_SIZE: usize = 65_536;

sol! {
    /// The transaction as seen by contracts: the single `bytes` parameter of
    /// the validation callbacks ABI-decodes into this tuple.
    struct Rip7560Transaction {
        address sender;
        uint256 nonceKey;
        uint256 nonce;
        uint256 validationGasLimit;
        uint256 paymasterValidationGasLimit;
        uint256 postOpGasLimit;
        uint256 callGasLimit;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        uint256 builderFee;
        address paymaster;
        bytes paymasterData;
        address deployer;
        bytes deployerData;
        bytes executionData;
        bytes authorizationData;
    }

    function validateTransaction(uint256 version, bytes32 txHash, bytes transaction);
    function validatePaymasterTransaction(uint256 version, bytes32 txHash, bytes transaction);
    function postPaymasterTransaction(bool success, uint256 actualGasCost, bytes context);

    function acceptAccount(uint256 validAfter, uint256 validUntil);
    function sigFailAccount(uint256 validAfter, uint256 validUntil);
    function acceptPaymaster(uint256 validAfter, uint256 validUntil, bytes context);
    function sigFailPaymaster(uint256 validAfter, uint256 validUntil, bytes context);

    event RIP7560TransactionEvent(
        address indexed sender,
        address indexed paymaster,
        uint256 nonceKey,
        uint256 nonceSequence,
        uint256 executionStatus
    );
    event RIP7560AccountDeployed(
        address indexed sender,
        address indexed paymaster,
        address indexed deployer
    );
    event RIP7560TransactionRevertReason(
        address indexed sender,
        uint256 nonceKey,
        uint256 nonceSequence,
        bytes revertReason
    );
    event RIP7560TransactionPostOpRevertReason(
        address indexed sender,
        address indexed paymaster,
        uint256 nonceKey,
        uint256 nonceSequence,
        bytes revertReason
    );
}

/// Errors produced while decoding EntryPoint callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryPointCodecError {
    /// The callback input is shorter than a 4-byte selector.
    #[error("EntryPoint callback input too short")]
    InputTooShort,
    /// The callback selector matches none of the known methods.
    #[error("unknown EntryPoint callback selector {0:?}")]
    UnknownSelector([u8; 4]),
    /// A paymaster callback arrived where an account callback was expected,
    /// or vice versa.
    #[error("unexpected EntryPoint callback method {got}, expected {expected}")]
    UnexpectedMethod {
        /// Method name found in the input.
        got: &'static str,
        /// Method name required by the running frame.
        expected: &'static str,
    },
    /// A `sigFail*` selector on a path that does not tolerate signature
    /// failures (the consensus path).
    #[error("{0} signature error")]
    SignatureFailure(&'static str),
    /// `acceptPaymaster` returned more context than allowed.
    #[error("paymaster return data: context too large ({0} bytes)")]
    ContextTooLarge(usize),
    /// The arguments did not ABI-decode.
    #[error("unable to decode EntryPoint callback: {0}")]
    Abi(String),
}

impl From<alloy_sol_types::Error> for EntryPointCodecError {
    fn from(err: alloy_sol_types::Error) -> Self {
        Self::Abi(err.to_string())
    }
}

/// Decoded `acceptAccount` / `sigFailAccount` callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptAccountData {
    /// Start of the validity window, zero meaning unconstrained.
    pub valid_after: u64,
    /// End of the validity window, zero meaning unconstrained.
    pub valid_until: u64,
}

/// Decoded `acceptPaymaster` / `sigFailPaymaster` callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptPaymasterData {
    /// Start of the validity window, zero meaning unconstrained.
    pub valid_after: u64,
    /// End of the validity window, zero meaning unconstrained.
    pub valid_until: u64,
    /// Opaque context forwarded to `postPaymasterTransaction`.
    pub context: Bytes,
}

/// Widens the 192-bit nonce key into the `uint256` the ABI carries.
fn nonce_key_u256(key: U192) -> U256 {
    U256::from_limbs_slice(key.as_limbs())
}

/// ABI-encodes the transaction tuple passed to validation callbacks.
///
/// Absent paymaster and deployer are encoded as the zero address, matching
/// what contracts observe on chain.
pub fn abi_encode_tx_tuple(tx: &TxRip7560) -> Bytes {
    let tuple = Rip7560Transaction {
        sender: tx.sender,
        nonceKey: nonce_key_u256(tx.nonce_key),
        nonce: U256::from(tx.nonce),
        validationGasLimit: U256::from(tx.validation_gas_limit),
        paymasterValidationGasLimit: U256::from(tx.paymaster_validation_gas_limit),
        postOpGasLimit: U256::from(tx.post_op_gas),
        callGasLimit: U256::from(tx.gas),
        maxFeePerGas: tx.gas_fee_cap,
        maxPriorityFeePerGas: tx.gas_tip_cap,
        builderFee: tx.builder_fee,
        paymaster: tx.paymaster().unwrap_or(Address::ZERO),
        paymasterData: tx.paymaster_data.clone(),
        deployer: tx.deployer().unwrap_or(Address::ZERO),
        deployerData: tx.deployer_data.clone(),
        executionData: tx.execution_data.clone(),
        authorizationData: tx.authorization_data.clone(),
    };
    tuple.abi_encode().into()
}

/// Calldata of the account validation frame:
/// `validateTransaction(0, signingHash, abi(tx))`.
pub fn encode_validate_transaction(tx: &TxRip7560, signing_hash: B256) -> Bytes {
    validateTransactionCall {
        version: U256::from(ABI_VERSION),
        txHash: signing_hash,
        transaction: abi_encode_tx_tuple(tx),
    }
    .abi_encode()
    .into()
}

/// Calldata of the paymaster validation frame:
/// `validatePaymasterTransaction(0, signingHash, abi(tx))`.
pub fn encode_validate_paymaster_transaction(tx: &TxRip7560, signing_hash: B256) -> Bytes {
    validatePaymasterTransactionCall {
        version: U256::from(ABI_VERSION),
        txHash: signing_hash,
        transaction: abi_encode_tx_tuple(tx),
    }
    .abi_encode()
    .into()
}

/// Calldata of the paymaster post-op frame.
pub fn encode_post_paymaster_transaction(
    success: bool,
    actual_gas_cost: U256,
    context: Bytes,
) -> Bytes {
    postPaymasterTransactionCall {
        success,
        actualGasCost: actual_gas_cost,
        context,
    }
    .abi_encode()
    .into()
}

fn selector(input: &[u8]) -> Result<[u8; 4], EntryPointCodecError> {
    input
        .get(..4)
        .and_then(|sel| <[u8; 4]>::try_from(sel).ok())
        .ok_or(EntryPointCodecError::InputTooShort)
}

/// Decodes the callback captured during the account validation frame.
///
/// `allow_sig_fail` is set only on the tracer path; the consensus path
/// rejects `sigFailAccount` outright.
pub fn decode_accept_account(
    input: &[u8],
    allow_sig_fail: bool,
) -> Result<AcceptAccountData, EntryPointCodecError> {
    let (valid_after, valid_until) = match selector(input)? {
        acceptAccountCall::SELECTOR => {
            let call = acceptAccountCall::abi_decode(input)?;
            (call.validAfter, call.validUntil)
        }
        sigFailAccountCall::SELECTOR => {
            if !allow_sig_fail {
                return Err(EntryPointCodecError::SignatureFailure("account"));
            }
            let call = sigFailAccountCall::abi_decode(input)?;
            (call.validAfter, call.validUntil)
        }
        acceptPaymasterCall::SELECTOR | sigFailPaymasterCall::SELECTOR => {
            return Err(EntryPointCodecError::UnexpectedMethod {
                got: "acceptPaymaster",
                expected: "acceptAccount",
            })
        }
        other => return Err(EntryPointCodecError::UnknownSelector(other)),
    };
    Ok(AcceptAccountData {
        valid_after: valid_after.saturating_to(),
        valid_until: valid_until.saturating_to(),
    })
}

/// Decodes the callback captured during the paymaster validation frame,
/// enforcing the context size cap.
pub fn decode_accept_paymaster(
    input: &[u8],
    allow_sig_fail: bool,
) -> Result<AcceptPaymasterData, EntryPointCodecError> {
    let (valid_after, valid_until, context) = match selector(input)? {
        acceptPaymasterCall::SELECTOR => {
            let call = acceptPaymasterCall::abi_decode(input)?;
            (call.validAfter, call.validUntil, call.context)
        }
        sigFailPaymasterCall::SELECTOR => {
            if !allow_sig_fail {
                return Err(EntryPointCodecError::SignatureFailure("paymaster"));
            }
            let call = sigFailPaymasterCall::abi_decode(input)?;
            (call.validAfter, call.validUntil, call.context)
        }
        acceptAccountCall::SELECTOR | sigFailAccountCall::SELECTOR => {
            return Err(EntryPointCodecError::UnexpectedMethod {
                got: "acceptAccount",
                expected: "acceptPaymaster",
            })
        }
        other => return Err(EntryPointCodecError::UnknownSelector(other)),
    };
    if context.len() > PAYMASTER_MAX_CONTEXT_SIZE {
        return Err(EntryPointCodecError::ContextTooLarge(context.len()));
    }
    Ok(AcceptPaymasterData {
        valid_after: valid_after.saturating_to(),
        valid_until: valid_until.saturating_to(),
        context,
    })
}

/// Calldata of the RIP-7712 nonce manager frame:
/// `sender(20) ∥ nonce_key(24, big-endian) ∥ nonce(8, big-endian)`.
pub fn nonce_manager_calldata(sender: Address, nonce_key: U192, nonce: u64) -> Bytes {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(sender.as_slice());
    data.extend_from_slice(&nonce_key.to_be_bytes::<24>());
    data.extend_from_slice(&nonce.to_be_bytes());
    data.into()
}

/// The `RIP7560TransactionEvent` log, emitted for every included transaction.
pub fn transaction_event_log(tx: &TxRip7560, execution_status: u64) -> Log {
    let event = RIP7560TransactionEvent {
        sender: tx.sender,
        paymaster: tx.paymaster().unwrap_or(Address::ZERO),
        nonceKey: nonce_key_u256(tx.nonce_key),
        nonceSequence: U256::from(tx.nonce),
        executionStatus: U256::from(execution_status),
    };
    Log {
        address: ENTRY_POINT,
        data: event.encode_log_data(),
    }
}

/// The `RIP7560AccountDeployed` log, emitted when the deployer frame ran.
pub fn account_deployed_log(tx: &TxRip7560) -> Log {
    let event = RIP7560AccountDeployed {
        sender: tx.sender,
        paymaster: tx.paymaster().unwrap_or(Address::ZERO),
        deployer: tx.deployer().unwrap_or(Address::ZERO),
    };
    Log {
        address: ENTRY_POINT,
        data: event.encode_log_data(),
    }
}

/// The `RIP7560TransactionRevertReason` log, emitted when the execution frame
/// reverted.
pub fn transaction_revert_reason_log(tx: &TxRip7560, revert_data: Bytes) -> Log {
    let event = RIP7560TransactionRevertReason {
        sender: tx.sender,
        nonceKey: nonce_key_u256(tx.nonce_key),
        nonceSequence: U256::from(tx.nonce),
        revertReason: revert_data,
    };
    Log {
        address: ENTRY_POINT,
        data: event.encode_log_data(),
    }
}

/// The `RIP7560TransactionPostOpRevertReason` log, emitted when the post-op
/// frame reverted.
pub fn post_op_revert_reason_log(tx: &TxRip7560, revert_data: Bytes) -> Log {
    let event = RIP7560TransactionPostOpRevertReason {
        sender: tx.sender,
        paymaster: tx.paymaster().unwrap_or(Address::ZERO),
        nonceKey: nonce_key_u256(tx.nonce_key),
        nonceSequence: U256::from(tx.nonce),
        revertReason: revert_data,
    };
    Log {
        address: ENTRY_POINT,
        data: event.encode_log_data(),
    }
}

/// Best-effort decode of `Error(string)` / `Panic(uint256)` revert data for
/// human readable error messages.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    alloy_sol_types::decode_revert_reason(data)
}
