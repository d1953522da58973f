//! The RPC transaction argument object and its defaults.

use alloy_eips::eip2930::AccessList;
use alloy_primitives::{aliases::U192, Address, Bytes, ChainId, U256};
use rip7560_primitives::TxRip7560;

/// Errors turning [`TransactionArgs`] into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    /// The `sender` field is mandatory.
    #[error("missing required field 'sender'")]
    MissingSender,
}

/// The user-supplied transaction fields of the RIP-7560 RPC methods, named
/// as contracts see them (`callGasLimit`, `postOpGasLimit`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionArgs {
    /// EIP-155 chain id.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub chain_id: Option<ChainId>,
    /// The smart contract account.
    pub sender: Option<Address>,
    /// Nonce sequence value.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub nonce: Option<u64>,
    /// RIP-7712 nonce key.
    pub nonce_key: Option<U192>,
    /// Max fee per gas.
    pub max_fee_per_gas: Option<U256>,
    /// Max priority fee per gas.
    pub max_priority_fee_per_gas: Option<U256>,
    /// Gas limit of the execution frame.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub call_gas_limit: Option<u64>,
    /// Gas limit of the validation frames.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub validation_gas_limit: Option<u64>,
    /// Gas limit of the paymaster validation frame.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub paymaster_validation_gas_limit: Option<u64>,
    /// Gas limit of the paymaster post-op frame.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub post_op_gas_limit: Option<u64>,
    /// Access list.
    pub access_list: Option<AccessList>,
    /// Account authorization input.
    pub authorization_data: Option<Bytes>,
    /// Execution frame calldata.
    pub execution_data: Option<Bytes>,
    /// Gas sponsor.
    pub paymaster: Option<Address>,
    /// Paymaster input.
    pub paymaster_data: Option<Bytes>,
    /// Account factory.
    pub deployer: Option<Address>,
    /// Factory input.
    pub deployer_data: Option<Bytes>,
    /// Builder side payment.
    pub builder_fee: Option<U256>,
}

impl TransactionArgs {
    /// Fills the fields a simulation can default, the way `eth_call` does:
    /// fees from the head base fee, gas limits from the RPC gas cap.
    pub fn call_defaults(&mut self, gas_cap: u64, base_fee: Option<U256>, chain_id: ChainId) {
        if self.chain_id.is_none() {
            self.chain_id = Some(chain_id);
        }
        if self.validation_gas_limit.is_none() {
            self.validation_gas_limit = Some(gas_cap / 2);
        }
        if self.call_gas_limit.is_none() {
            self.call_gas_limit = Some(gas_cap / 2);
        }
        if self.max_priority_fee_per_gas.is_none() {
            self.max_priority_fee_per_gas = Some(U256::ZERO);
        }
        if self.max_fee_per_gas.is_none() {
            let tip = self.max_priority_fee_per_gas.unwrap_or_default();
            self.max_fee_per_gas =
                Some(base_fee.map_or(tip, |base_fee| U256::from(2) * base_fee + tip));
        }
    }

    /// Builds the consensus transaction. Only `sender` is mandatory.
    pub fn into_tx(self) -> Result<TxRip7560, ArgsError> {
        let sender = self.sender.ok_or(ArgsError::MissingSender)?;
        Ok(TxRip7560 {
            chain_id: self.chain_id.unwrap_or_default(),
            nonce_key: self.nonce_key.unwrap_or_default(),
            nonce: self.nonce.unwrap_or_default(),
            gas_tip_cap: self.max_priority_fee_per_gas.unwrap_or_default(),
            gas_fee_cap: self.max_fee_per_gas.unwrap_or_default(),
            gas: self.call_gas_limit.unwrap_or_default(),
            access_list: self.access_list.unwrap_or_default(),
            sender,
            authorization_data: self.authorization_data.unwrap_or_default(),
            execution_data: self.execution_data.unwrap_or_default(),
            paymaster: self.paymaster,
            paymaster_data: self.paymaster_data.unwrap_or_default(),
            paymaster_validation_gas_limit: self.paymaster_validation_gas_limit.unwrap_or_default(),
            deployer: self.deployer,
            deployer_data: self.deployer_data.unwrap_or_default(),
            builder_fee: self.builder_fee.unwrap_or_default(),
            validation_gas_limit: self.validation_gas_limit.unwrap_or_default(),
            post_op_gas: self.post_op_gas_limit.unwrap_or_default(),
        })
    }
}
