//! The gas ledger: pre-charge, penalties, capped refunds and settlement.

use alloy_primitives::{Address, U256};
use rip7560_primitives::TxRip7560;
use tracing::trace;

use crate::{ctx::StateAccess, error::Rip7560InvalidTransaction};

/// Percent of unused execution and post-op gas charged to the payer.
pub const GAS_PENALTY_PCT: u64 = 10;

/// EIP-3529: refunds are capped at `gas_used / MAX_REFUND_QUOTIENT`.
pub const MAX_REFUND_QUOTIENT: u64 = 5;

/// Tracks the gas still available to transactions of the block being
/// processed.
#[derive(Clone, Debug)]
pub struct GasPool {
    gas: u64,
}

impl GasPool {
    /// A pool holding `gas` units.
    pub fn new(gas: u64) -> Self {
        Self { gas }
    }

    /// Gas remaining in the pool.
    pub fn gas(&self) -> u64 {
        self.gas
    }

    /// Reserves `amount` from the pool.
    pub fn sub_gas(&mut self, amount: u64) -> Result<(), Rip7560InvalidTransaction> {
        if self.gas < amount {
            return Err(Rip7560InvalidTransaction::BlockGasLimitReached {
                have: self.gas,
                want: amount,
            });
        }
        self.gas -= amount;
        Ok(())
    }

    /// Returns `amount` to the pool.
    pub fn add_gas(&mut self, amount: u64) {
        self.gas = self.gas.saturating_add(amount);
    }
}

/// Charges the gas payer for the whole gas envelope of the transaction and
/// reserves it from the block gas pool.
///
/// Returns the reserved total gas limit and the wei pre-charge.
pub fn buy_gas<S: StateAccess>(
    state: &mut S,
    tx: &TxRip7560,
    effective_gas_price: U256,
    gas_pool: &mut GasPool,
) -> Result<(u64, U256), Rip7560InvalidTransaction> {
    let total_gas_limit = tx
        .total_gas_limit()
        .ok_or(Rip7560InvalidTransaction::GasFieldOverflow)?;

    let pre_charge = U256::from(total_gas_limit)
        .checked_mul(effective_gas_price)
        .ok_or(Rip7560InvalidTransaction::GasFieldOverflow)?;

    let payer = tx.gas_payer();
    let balance = state.balance(payer);
    if balance < pre_charge {
        return Err(Rip7560InvalidTransaction::InsufficientFunds {
            address: payer,
            have: balance,
            want: pre_charge,
        });
    }

    state.sub_balance(payer, pre_charge);
    gas_pool.sub_gas(total_gas_limit)?;

    trace!(
        target: "rip7560::evm",
        %payer,
        %pre_charge,
        total_gas_limit,
        "pre-charged gas payer"
    );
    Ok((total_gas_limit, pre_charge))
}

/// Returns the unspent part of the pre-charge to the gas payer.
pub fn refund_payer<S: StateAccess>(
    state: &mut S,
    payer: Address,
    pre_charge: U256,
    gas_used: u64,
    effective_gas_price: U256,
) {
    let actual_cost = effective_gas_price.saturating_mul(U256::from(gas_used));
    let refund = pre_charge.saturating_sub(actual_cost);
    state.add_balance(payer, refund);
}

/// Pays the block coinbase its priority fee.
pub fn pay_coinbase<S: StateAccess>(
    state: &mut S,
    coinbase: Address,
    gas_used: u64,
    effective_gas_tip: U256,
) {
    let tip = effective_gas_tip.saturating_mul(U256::from(gas_used));
    if !tip.is_zero() {
        state.add_balance(coinbase, tip);
    }
}

/// 10% of any gas left unused by a frame, charged to deter over-estimation.
pub fn unused_gas_penalty(limit: u64, used: u64) -> u64 {
    limit.saturating_sub(used) * GAS_PENALTY_PCT / 100
}

/// Caps the accumulated refund counter at the EIP-3529 quotient.
pub fn capped_refund(gas_used: u64, refund: u64) -> u64 {
    refund.min(gas_used / MAX_REFUND_QUOTIENT)
}
