//! Validation simulation and tracing, with RPC-timeout cancellation.

use alloy_primitives::Address;
use rip7560_evm::{Evm, GasPool, Rip7560Processor};
use rip7560_primitives::ValidationPhaseResult;
use std::time::Duration;
use tracing::debug;

use crate::{
    api::TraceConfig,
    args::TransactionArgs,
    backend::{apply_state_overrides, BlockOverrides, BlockRef, Rip7560Backend, StateOverride},
    error::Rip7560EthApiError,
};

/// Runs the validation phase of `args` against a disposable state and
/// returns the phase result.
///
/// A watcher task cancels the EVM when the backend's RPC timeout elapses;
/// nothing is committed either way because the whole EVM is discarded.
pub(crate) fn do_call_validation<B: Rip7560Backend>(
    backend: &B,
    mut args: TransactionArgs,
    block: Option<BlockRef>,
    state_override: Option<StateOverride>,
    block_overrides: Option<BlockOverrides>,
) -> Result<ValidationPhaseResult, Rip7560EthApiError> {
    let (mut evm, mut block_env) = backend.evm_at(block)?;
    if let Some(overrides) = &state_override {
        apply_state_overrides(evm.state_mut(), overrides);
    }
    if let Some(overrides) = &block_overrides {
        overrides.apply(&mut block_env);
    }

    args.call_defaults(
        backend.rpc_gas_cap(),
        block_env.base_fee,
        backend.chain_spec().chain_id,
    );
    let tx = args.into_tx()?;

    let timeout = backend.rpc_evm_timeout();
    let token = evm.cancel_token();
    let watcher = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        token.cancel();
    });

    // The simulation is not bounded by a real block's gas.
    let mut gas_pool = GasPool::new(u64::MAX);
    let result = Rip7560Processor::new(&mut evm, backend.chain_spec(), &block_env)
        .apply_validation_phases(&tx, &mut gas_pool);
    watcher.abort();

    if evm.cancelled() {
        return Err(Rip7560EthApiError::Timeout(timeout));
    }
    debug!(target: "rip7560::rpc", ok = result.is_ok(), "validation simulation finished");
    result.map_err(Into::into)
}

/// Runs the validation phase under the backend's debug tracer and returns
/// the tracer result.
///
/// A zero `sender` is a capability probe: bundlers use it to detect tracer
/// support, so the tracer result is returned without running anything.
/// Unlike consensus validation this path tolerates `sigFail*` callbacks.
pub(crate) fn do_trace_validation<B: Rip7560Backend>(
    backend: &B,
    mut args: TransactionArgs,
    block: Option<BlockRef>,
    config: TraceConfig,
) -> Result<serde_json::Value, Rip7560EthApiError> {
    let (mut evm, tracer, block_env) = backend.trace_evm_at(block, &config)?;

    if args.sender.unwrap_or(Address::ZERO) == Address::ZERO {
        return tracer.result().map_err(Into::into);
    }

    args.call_defaults(
        backend.rpc_gas_cap(),
        block_env.base_fee,
        backend.chain_spec().chain_id,
    );
    let tx = args.into_tx()?;

    let timeout =
        parse_trace_timeout(config.timeout.as_deref()).unwrap_or(backend.rpc_evm_timeout());
    let token = evm.cancel_token();
    let tracer_watch = tracer.clone();
    let watcher = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        tracer_watch.stop("execution timeout".to_string());
        token.cancel();
    });

    let mut gas_pool = GasPool::new(u64::MAX);
    let result = Rip7560Processor::new(&mut evm, backend.chain_spec(), &block_env)
        .with_sig_fail_allowed()
        .apply_validation_phases(&tx, &mut gas_pool);
    watcher.abort();

    if evm.cancelled() {
        return Err(Rip7560EthApiError::Timeout(timeout));
    }
    result?;
    tracer.result().map_err(Into::into)
}

/// Parses a Go-style duration string (`"500ms"`, `"5s"`, `"2m"`).
fn parse_trace_timeout(timeout: Option<&str>) -> Option<Duration> {
    let timeout = timeout?;
    if let Some(millis) = timeout.strip_suffix("ms") {
        return millis.parse().ok().map(Duration::from_millis);
    }
    if let Some(secs) = timeout.strip_suffix('s') {
        return secs.parse().ok().map(Duration::from_secs);
    }
    if let Some(mins) = timeout.strip_suffix('m') {
        return mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        assert_eq!(
            parse_trace_timeout(Some("500ms")),
            Some(Duration::from_millis(500))
        );
        assert_eq!(parse_trace_timeout(Some("5s")), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_trace_timeout(Some("2m")),
            Some(Duration::from_secs(120))
        );
        assert_eq!(parse_trace_timeout(Some("bogus")), None);
        assert_eq!(parse_trace_timeout(None), None);
    }
}
