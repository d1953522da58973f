//! JSON-RPC surface for RIP-7560 account abstraction.
//!
//! `eth_` methods cover bundle submission and status, validation simulation
//! and gas estimation; `debug_` exposes tracing of the validation phase.
//! All handlers run against a [`Rip7560Backend`], which supplies a fresh EVM
//! over a copy of the state at a requested block.

mod api;
mod args;
mod backend;
mod call;
mod error;
mod estimate;

pub use api::{
    Rip7560ApiServer, Rip7560DebugApiServer, Rip7560DebugRpc, Rip7560Rpc, Rip7560UsedGas,
    TraceConfig,
};
pub use args::{ArgsError, TransactionArgs};
pub use backend::{
    AccountOverride, BackendError, BlockOverrides, BlockRef, Rip7560Backend, StateOverride,
    TracerHandle,
};
pub use error::Rip7560EthApiError;
pub use estimate::ESTIMATE_GAS_ERROR_RATIO;
