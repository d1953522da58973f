//! The `eth_` and `debug_` RPC methods for RIP-7560.

use alloy_primitives::{B256, U64};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use rip7560_pool::Rip7560PoolApi;
use rip7560_primitives::{
    calculate_bundle_hash, BundleReceipt, ExternallyReceivedBundle, Rip7560TransactionDebugInfo,
    ValidationPhaseResult,
};
use std::sync::Arc;
use tracing::debug;

use crate::{
    args::TransactionArgs,
    backend::{BlockOverrides, BlockRef, Rip7560Backend, StateOverride},
    call, estimate,
    error::Rip7560EthApiError,
};

/// Result of `eth_estimateRip7560TransactionGas`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rip7560UsedGas {
    /// Smallest validation gas limit that does not run out of gas.
    #[serde(with = "alloy_serde::quantity")]
    pub verification_gas_limit: u64,
    /// Smallest execution gas limit that does not run out of gas.
    #[serde(with = "alloy_serde::quantity")]
    pub call_gas_limit: u64,
}

/// Configuration of `debug_traceRip7560Validation`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceConfig {
    /// Name of the tracer to run.
    pub tracer: Option<String>,
    /// Trace deadline, e.g. `"5s"` or `"500ms"`.
    pub timeout: Option<String>,
    /// Tracer-specific configuration, passed through opaquely.
    pub tracer_config: Option<serde_json::Value>,
}

/// RIP-7560 `eth_` namespace.
#[rpc(server, namespace = "eth")]
pub trait Rip7560Api {
    /// Accepts an ordered bundle of RIP-7560 transactions from a trusted
    /// submitter and returns the canonical bundle hash.
    #[method(name = "sendRip7560TransactionsBundle")]
    async fn send_rip7560_transactions_bundle(
        &self,
        args: Vec<TransactionArgs>,
        creation_block: U64,
        bundler_id: String,
    ) -> RpcResult<B256>;

    /// The status receipt of a previously submitted bundle.
    #[method(name = "getRip7560BundleStatus")]
    async fn get_rip7560_bundle_status(&self, hash: B256) -> RpcResult<Option<BundleReceipt>>;

    /// Why a transaction was dropped during block building.
    #[method(name = "getRip7560TransactionDebugInfo")]
    async fn get_rip7560_transaction_debug_info(
        &self,
        hash: B256,
    ) -> RpcResult<Option<Rip7560TransactionDebugInfo>>;

    /// Simulates the validation phase of a transaction without executing it.
    #[method(name = "callRip7560Validation")]
    async fn call_rip7560_validation(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        state_override: Option<StateOverride>,
        block_overrides: Option<BlockOverrides>,
    ) -> RpcResult<ValidationPhaseResult>;

    /// Binary-searches the smallest validation and execution gas limits
    /// under which the transaction does not run out of gas.
    #[method(name = "estimateRip7560TransactionGas")]
    async fn estimate_rip7560_transaction_gas(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        state_override: Option<StateOverride>,
    ) -> RpcResult<Rip7560UsedGas>;
}

/// RIP-7560 `debug_` namespace.
#[rpc(server, namespace = "debug")]
pub trait Rip7560DebugApi {
    /// Runs the validation phase under a debug tracer and returns the
    /// tracer's result. A zero `sender` serves as a capability probe and
    /// returns immediately.
    #[method(name = "traceRip7560Validation")]
    async fn trace_rip7560_validation(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        config: Option<TraceConfig>,
    ) -> RpcResult<serde_json::Value>;
}

/// Handler of the `eth_` RIP-7560 methods.
pub struct Rip7560Rpc<B> {
    backend: Arc<B>,
    pool: Arc<dyn Rip7560PoolApi>,
}

impl<B> Rip7560Rpc<B> {
    /// Creates the handler.
    pub fn new(backend: Arc<B>, pool: Arc<dyn Rip7560PoolApi>) -> Self {
        Self { backend, pool }
    }
}

impl<B> std::fmt::Debug for Rip7560Rpc<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rip7560Rpc").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<B: Rip7560Backend> Rip7560ApiServer for Rip7560Rpc<B> {
    async fn send_rip7560_transactions_bundle(
        &self,
        args: Vec<TransactionArgs>,
        creation_block: U64,
        bundler_id: String,
    ) -> RpcResult<B256> {
        if args.is_empty() {
            return Err(Rip7560EthApiError::InvalidParams(
                "submitted bundle has zero length".to_string(),
            )
            .into());
        }

        let transactions = args
            .into_iter()
            .map(TransactionArgs::into_tx)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Rip7560EthApiError::from)?;

        let bundle_hash = calculate_bundle_hash(transactions.iter().map(|tx| tx.tx_hash()));
        debug!(
            target: "rip7560::rpc",
            %bundle_hash,
            %bundler_id,
            txs = transactions.len(),
            "received transaction bundle"
        );

        let bundle = ExternallyReceivedBundle {
            bundler_id,
            valid_for_block: creation_block.to::<u64>(),
            bundle_hash,
            transactions,
        };
        self.pool
            .submit_bundle(bundle)
            .map_err(Rip7560EthApiError::from)?;
        Ok(bundle_hash)
    }

    async fn get_rip7560_bundle_status(&self, hash: B256) -> RpcResult<Option<BundleReceipt>> {
        Ok(self.pool.bundle_status(hash))
    }

    async fn get_rip7560_transaction_debug_info(
        &self,
        hash: B256,
    ) -> RpcResult<Option<Rip7560TransactionDebugInfo>> {
        Ok(self.pool.transaction_debug_info(hash))
    }

    async fn call_rip7560_validation(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        state_override: Option<StateOverride>,
        block_overrides: Option<BlockOverrides>,
    ) -> RpcResult<ValidationPhaseResult> {
        call::do_call_validation(
            self.backend.as_ref(),
            args,
            block,
            state_override,
            block_overrides,
        )
        .map_err(Into::into)
    }

    async fn estimate_rip7560_transaction_gas(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        state_override: Option<StateOverride>,
    ) -> RpcResult<Rip7560UsedGas> {
        estimate::estimate_transaction_gas(self.backend.as_ref(), args, block, state_override)
            .map_err(Into::into)
    }
}

/// Handler of the `debug_` RIP-7560 methods.
pub struct Rip7560DebugRpc<B> {
    backend: Arc<B>,
}

impl<B> Rip7560DebugRpc<B> {
    /// Creates the handler.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

impl<B> std::fmt::Debug for Rip7560DebugRpc<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rip7560DebugRpc").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<B: Rip7560Backend> Rip7560DebugApiServer for Rip7560DebugRpc<B> {
    async fn trace_rip7560_validation(
        &self,
        args: TransactionArgs,
        block: Option<BlockRef>,
        config: Option<TraceConfig>,
    ) -> RpcResult<serde_json::Value> {
        call::do_trace_validation(
            self.backend.as_ref(),
            args,
            block,
            config.unwrap_or_default(),
        )
        .map_err(Into::into)
    }
}
