//! The node-side capabilities the RPC handlers are built on.

use alloy_primitives::{Address, Bytes, B256, U256};
use rip7560_chainspec::Rip7560ChainSpec;
use rip7560_evm::{BlockEnv, Evm, StateAccess};
use std::{collections::HashMap, sync::Arc, time::Duration};

/// Reference to the block whose state a simulation runs on. `None` in an
/// RPC parameter position means "latest".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum BlockRef {
    /// A block number.
    Number(#[serde(with = "alloy_serde::quantity")] u64),
    /// A block hash.
    Hash(B256),
}

/// Per-account state overrides applied before a simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountOverride {
    /// Replacement balance.
    pub balance: Option<U256>,
    /// Replacement nonce.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub nonce: Option<u64>,
    /// Replacement code.
    pub code: Option<Bytes>,
}

/// State overrides keyed by account.
pub type StateOverride = HashMap<Address, AccountOverride>;

/// Block header overrides applied before a simulation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockOverrides {
    /// Replacement block number.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub number: Option<u64>,
    /// Replacement timestamp.
    #[serde(with = "alloy_serde::quantity::opt")]
    pub time: Option<u64>,
    /// Replacement base fee.
    pub base_fee: Option<U256>,
    /// Replacement coinbase.
    pub coinbase: Option<Address>,
}

impl BlockOverrides {
    /// Applies the overrides to a block environment.
    pub fn apply(&self, block: &mut BlockEnv) {
        if let Some(number) = self.number {
            block.number = number;
        }
        if let Some(time) = self.time {
            block.timestamp = time;
        }
        if let Some(base_fee) = self.base_fee {
            block.base_fee = Some(base_fee);
        }
        if let Some(coinbase) = self.coinbase {
            block.coinbase = coinbase;
        }
    }
}

/// Applies account overrides to a state.
pub(crate) fn apply_state_overrides<S: StateAccess>(state: &mut S, overrides: &StateOverride) {
    for (address, account) in overrides {
        if let Some(balance) = account.balance {
            state.set_balance(*address, balance);
        }
        if let Some(nonce) = account.nonce {
            state.set_nonce(*address, nonce);
        }
        if let Some(code) = &account.code {
            state.set_code(*address, code.clone());
        }
    }
}

/// Errors from the backend itself, independent of transaction validity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The requested block is unknown.
    #[error("block not found")]
    BlockNotFound,
    /// Anything else the node failed on.
    #[error("{0}")]
    Other(String),
}

/// Handle onto a debug tracer installed in an EVM.
pub trait TracerHandle: Send + Sync {
    /// The tracer's JSON result.
    fn result(&self) -> Result<serde_json::Value, BackendError>;
    /// Stops the tracer with an error message (deadline exceeded).
    fn stop(&self, reason: String);
}

/// What the RPC layer needs from the node.
///
/// Every call hands out a *fresh* EVM over a disposable copy of the state at
/// the requested block; simulations never touch canonical state.
pub trait Rip7560Backend: Send + Sync + 'static {
    /// The EVM type driven by the handlers.
    type Evm: Evm + Send;

    /// Chain configuration.
    fn chain_spec(&self) -> &Rip7560ChainSpec;

    /// A fresh EVM and block environment at `block`.
    fn evm_at(&self, block: Option<BlockRef>) -> Result<(Self::Evm, BlockEnv), BackendError>;

    /// Like [`Self::evm_at`], with a debug tracer installed as the EVM's
    /// enter hook. The validation pipeline chains its interceptor on top, so
    /// the tracer keeps observing every frame.
    fn trace_evm_at(
        &self,
        block: Option<BlockRef>,
        config: &crate::api::TraceConfig,
    ) -> Result<(Self::Evm, Arc<dyn TracerHandle>, BlockEnv), BackendError>;

    /// Gas cap applied to simulations and estimation.
    fn rpc_gas_cap(&self) -> u64;

    /// Wall-clock budget of one simulated validation.
    fn rpc_evm_timeout(&self) -> Duration;
}
