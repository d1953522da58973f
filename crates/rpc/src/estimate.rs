//! Gas estimation for RIP-7560 transactions.
//!
//! Two binary searches: the smallest `validationGasLimit` under which the
//! validation phase does not run out of gas, then the smallest
//! `callGasLimit` for the execution phase. Both are bounded by the block gas
//! limit, the payer's balance divided by the fee cap, and the RPC gas cap,
//! and stop early once the search window shrinks below an error ratio.

use alloy_primitives::U256;
use rip7560_evm::{
    EntityName, Evm, ExecutionPhaseOutput, GasPool, Rip7560Processor, StateAccess,
    ValidationPhaseError,
};
use rip7560_primitives::TxRip7560;
use tracing::debug;

use crate::{
    api::Rip7560UsedGas,
    args::TransactionArgs,
    backend::{apply_state_overrides, BlockRef, Rip7560Backend, StateOverride},
    error::Rip7560EthApiError,
};

/// Allowed upward approximation error. Wallets bump estimates by 20-25%
/// anyway, so a perfect bisection is wasted work.
pub const ESTIMATE_GAS_ERROR_RATIO: f64 = 0.015;

const CALL_STIPEND: u64 = 2_300;
const MIN_TX_GAS: u64 = 21_000;

pub(crate) fn estimate_transaction_gas<B: Rip7560Backend>(
    backend: &B,
    mut args: TransactionArgs,
    block: Option<BlockRef>,
    state_override: Option<StateOverride>,
) -> Result<Rip7560UsedGas, Rip7560EthApiError> {
    let (mut probe_evm, block_env) = backend.evm_at(block)?;
    if let Some(overrides) = &state_override {
        apply_state_overrides(probe_evm.state_mut(), overrides);
    }

    args.call_defaults(
        backend.rpc_gas_cap(),
        block_env.base_fee,
        backend.chain_spec().chain_id,
    );
    let template = args.into_tx()?;
    let payer_balance = probe_evm.state().balance(template.gas_payer());
    drop(probe_evm);

    let search = SearchBounds {
        block_gas_limit: block_env.gas_limit,
        payer_balance,
        gas_cap: backend.rpc_gas_cap(),
    };

    let verification_gas_limit =
        estimate_validation_gas(backend, block, state_override.as_ref(), &template, &search)?;
    let call_gas_limit = estimate_execution_gas(
        backend,
        block,
        state_override.as_ref(),
        &template,
        verification_gas_limit,
        &search,
    )?;

    Ok(Rip7560UsedGas {
        verification_gas_limit,
        call_gas_limit,
    })
}

struct SearchBounds {
    block_gas_limit: u64,
    payer_balance: U256,
    gas_cap: u64,
}

impl SearchBounds {
    /// The highest gas limit worth probing, given the requested limit and
    /// all external caps.
    fn initial_hi(&self, requested: u64, fee_cap: U256) -> u64 {
        let mut hi = self.block_gas_limit;
        if requested >= MIN_TX_GAS {
            hi = requested;
        }
        // Recap against what the payer can actually afford.
        if !fee_cap.is_zero() {
            let allowance = self.payer_balance / fee_cap;
            if allowance < U256::from(hi) {
                debug!(
                    target: "rip7560::rpc",
                    original = hi,
                    fundable = %allowance,
                    "gas estimation capped by limited funds"
                );
                hi = allowance.saturating_to();
            }
        }
        if self.gas_cap != 0 && hi > self.gas_cap {
            debug!(
                target: "rip7560::rpc",
                requested = hi,
                cap = self.gas_cap,
                "caller gas above allowance, capping"
            );
            hi = self.gas_cap;
        }
        hi
    }
}

/// Runs one validation probe. `Ok(None)` means "raise the limit".
fn run_validation_probe<B: Rip7560Backend>(
    backend: &B,
    block: Option<BlockRef>,
    state_override: Option<&StateOverride>,
    template: &TxRip7560,
    validation_gas_limit: u64,
) -> Result<Option<u64>, Rip7560EthApiError> {
    let (mut evm, block_env) = backend.evm_at(block)?;
    if let Some(overrides) = state_override {
        apply_state_overrides(evm.state_mut(), overrides);
    }
    let mut tx = template.clone();
    tx.validation_gas_limit = validation_gas_limit;

    // Half the maximum to keep the pool arithmetic clear of overflow.
    let mut gas_pool = GasPool::new(u64::MAX / 2);
    match Rip7560Processor::new(&mut evm, backend.chain_spec(), &block_env)
        .apply_validation_phases(&tx, &mut gas_pool)
    {
        Ok(vpr) => Ok(Some(vpr.validation_phase_used_gas())),
        Err(err) if err.out_of_gas => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn estimate_validation_gas<B: Rip7560Backend>(
    backend: &B,
    block: Option<BlockRef>,
    state_override: Option<&StateOverride>,
    template: &TxRip7560,
    search: &SearchBounds,
) -> Result<u64, Rip7560EthApiError> {
    let total = template
        .total_gas_limit()
        .ok_or_else(|| Rip7560EthApiError::InvalidParams("invalid gas values".to_string()))?;
    let requested = total - template.post_op_gas;
    let mut hi = search.initial_hi(requested, template.gas_fee_cap);

    // Probe the ceiling first: if even that fails, bail out immediately.
    let Some(used) = run_validation_probe(backend, block, state_override, template, hi)? else {
        return Err(Rip7560EthApiError::GasRequiredExceedsAllowance(hi));
    };
    let mut lo = used.saturating_sub(1);

    // The unconstrained run's gas usage is a fairly tight lower bound; probe
    // slightly above it before bisecting.
    let optimistic = (used + CALL_STIPEND) * 64 / 63;
    if optimistic < hi {
        match run_validation_probe(backend, block, state_override, template, optimistic)? {
            Some(_) => hi = optimistic,
            None => lo = optimistic,
        }
    }

    while lo + 1 < hi {
        if (hi - lo) as f64 / (hi as f64) < ESTIMATE_GAS_ERROR_RATIO {
            break;
        }
        let mid = bisect(lo, hi);
        match run_validation_probe(backend, block, state_override, template, mid)? {
            Some(_) => hi = mid,
            None => lo = mid,
        }
    }
    Ok(hi)
}

enum ExecutionProbe {
    Success(ExecutionPhaseOutput),
    OutOfGas,
}

/// Runs validation at the already-established limit, then one execution
/// probe at `gas`.
fn run_execution_probe<B: Rip7560Backend>(
    backend: &B,
    block: Option<BlockRef>,
    state_override: Option<&StateOverride>,
    template: &TxRip7560,
    verification_gas_limit: u64,
    gas: u64,
) -> Result<ExecutionProbe, Rip7560EthApiError> {
    let (mut evm, block_env) = backend.evm_at(block)?;
    if let Some(overrides) = state_override {
        apply_state_overrides(evm.state_mut(), overrides);
    }
    let mut tx = template.clone();
    tx.validation_gas_limit = verification_gas_limit;
    tx.gas = gas;

    let mut gas_pool = GasPool::new(u64::MAX / 2);
    let mut processor = Rip7560Processor::new(&mut evm, backend.chain_spec(), &block_env);
    let vpr = processor.apply_validation_phases(&tx, &mut gas_pool)?;

    let mut cumulative = 0;
    let out = processor.apply_execution_phase(&tx, &vpr, &mut gas_pool, &mut cumulative, 0);

    let post_op_failed = out.post_op.as_ref().is_some_and(|p| p.failed());
    if out.execution.failed() || post_op_failed {
        let out_of_gas = out.execution.is_out_of_gas()
            || out.post_op.as_ref().is_some_and(|p| p.is_out_of_gas());
        if out_of_gas {
            return Ok(ExecutionProbe::OutOfGas);
        }
        // A genuine revert: raising gas will not help, surface the reason.
        let err = match out.post_op.as_ref().filter(|p| p.failed()) {
            Some(post_op) if !out.execution.failed() => {
                ValidationPhaseError::frame(EntityName::Paymaster, post_op)
            }
            _ => ValidationPhaseError::frame(EntityName::Account, &out.execution),
        };
        return Err(err.into());
    }
    Ok(ExecutionProbe::Success(out))
}

fn estimate_execution_gas<B: Rip7560Backend>(
    backend: &B,
    block: Option<BlockRef>,
    state_override: Option<&StateOverride>,
    template: &TxRip7560,
    verification_gas_limit: u64,
    search: &SearchBounds,
) -> Result<u64, Rip7560EthApiError> {
    let requested = template.gas.saturating_add(template.post_op_gas);
    let mut hi = search.initial_hi(requested, template.gas_fee_cap);

    let probe = run_execution_probe(
        backend,
        block,
        state_override,
        template,
        verification_gas_limit,
        hi,
    )?;
    let ExecutionProbe::Success(out) = probe else {
        return Err(Rip7560EthApiError::GasRequiredExceedsAllowance(hi));
    };
    let used =
        out.execution.gas_used + out.post_op.as_ref().map(|p| p.gas_used).unwrap_or_default();
    let mut lo = used.saturating_sub(1);

    let optimistic = (used + CALL_STIPEND) * 64 / 63;
    if optimistic < hi {
        match run_execution_probe(
            backend,
            block,
            state_override,
            template,
            verification_gas_limit,
            optimistic,
        )? {
            ExecutionProbe::Success(_) => hi = optimistic,
            ExecutionProbe::OutOfGas => lo = optimistic,
        }
    }

    while lo + 1 < hi {
        if (hi - lo) as f64 / (hi as f64) < ESTIMATE_GAS_ERROR_RATIO {
            break;
        }
        let mid = bisect(lo, hi);
        match run_execution_probe(
            backend,
            block,
            state_override,
            template,
            verification_gas_limit,
            mid,
        )? {
            ExecutionProbe::Success(_) => hi = mid,
            ExecutionProbe::OutOfGas => lo = mid,
        }
    }
    Ok(hi)
}

/// Bisection skewed toward the low side: most transactions need little more
/// than their measured usage, so doubling `lo` converges faster than a
/// plain midpoint.
fn bisect(lo: u64, hi: u64) -> u64 {
    let mut mid = (hi + lo) / 2;
    if mid > lo * 2 {
        mid = lo * 2;
    }
    mid.max(lo + 1)
}
