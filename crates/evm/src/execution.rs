//! The execution pipeline: the account execution frame, the paymaster
//! post-op frame, final gas settlement and event emission.

use alloy_primitives::U256;
use rip7560_contracts::{
    account_deployed_log, encode_post_paymaster_transaction, post_op_revert_reason_log,
    transaction_event_log, transaction_revert_reason_log, ENTRY_POINT,
};
use rip7560_primitives::{ExecutionStatus, Rip7560Receipt, TxRip7560, ValidationPhaseResult};
use tracing::{debug, error};

use crate::{
    ctx::{Evm, FrameResult, StateAccess},
    gas::{capped_refund, pay_coinbase, refund_payer, unused_gas_penalty, GasPool},
    validation::Rip7560Processor,
};

/// What the execution phase produced, frame results included so that gas
/// estimation can distinguish out-of-gas from genuine reverts.
#[derive(Clone, Debug)]
pub struct ExecutionPhaseOutput {
    /// The receipt of the transaction.
    pub receipt: Rip7560Receipt,
    /// Result of the account execution frame.
    pub execution: FrameResult,
    /// Result of the paymaster post-op frame, if one ran.
    pub post_op: Option<FrameResult>,
}

impl<E: Evm> Rip7560Processor<'_, E> {
    /// Runs the execution phase of a validated transaction.
    ///
    /// The execution frame's state changes survive an execution revert (the
    /// receipt just reads `failed`), but a post-op failure rolls the whole
    /// execution sub-range back to the snapshot taken here. Validation-phase
    /// state is never touched.
    pub fn apply_execution_phase(
        &mut self,
        tx: &TxRip7560,
        vpr: &ValidationPhaseResult,
        gas_pool: &mut GasPool,
        cumulative_gas_used: &mut u64,
        tx_index: u64,
    ) -> ExecutionPhaseOutput {
        let snapshot = self.evm.state_mut().snapshot();

        let execution = self
            .evm
            .call(ENTRY_POINT, tx.sender, &tx.execution_data, tx.gas);
        let mut status = if execution.failed() {
            ExecutionStatus::ExecutionFailure
        } else {
            ExecutionStatus::Success
        };

        let execution_penalty = unused_gas_penalty(tx.gas, execution.gas_used);
        let mut gas_used =
            vpr.validation_phase_used_gas() + execution.gas_used + execution_penalty;

        let mut post_op = None;
        if let Some(paymaster) = tx.paymaster() {
            if !vpr.paymaster_context.is_empty() {
                let refund_so_far = capped_refund(gas_used, self.evm.gas_refund());
                let post_op_call = encode_post_paymaster_transaction(
                    !execution.failed(),
                    U256::from(gas_used.saturating_sub(refund_so_far)),
                    vpr.paymaster_context.clone(),
                );
                let result = self
                    .evm
                    .call(ENTRY_POINT, paymaster, &post_op_call, tx.post_op_gas);
                if result.failed() {
                    // The paymaster rejected the outcome: drop every state
                    // change made since the execution frame started.
                    self.evm.state_mut().revert_to(snapshot);
                    status = status.with_post_op_failure();
                }
                gas_used += result.gas_used + unused_gas_penalty(tx.post_op_gas, result.gas_used);
                post_op = Some(result);
            }
        }

        let refund = capped_refund(gas_used, self.evm.gas_refund());
        gas_used -= refund;

        self.emit_events(tx, status, &execution, post_op.as_ref());

        refund_payer(
            self.evm.state_mut(),
            tx.gas_payer(),
            vpr.pre_charge,
            gas_used,
            vpr.effective_gas_price,
        );
        pay_coinbase(
            self.evm.state_mut(),
            self.block.coinbase,
            gas_used,
            tx.effective_gas_tip(self.block.base_fee),
        );

        // Unreserve what the transaction did not consume so the rest of the
        // block can use it.
        let total_gas_limit = tx.total_gas_limit().unwrap_or_default();
        if gas_used > total_gas_limit {
            error!(
                target: "rip7560::evm",
                tx_hash = %vpr.tx_hash,
                gas_used,
                total_gas_limit,
                "gas accounting exceeded the transaction's total limit"
            );
            debug_assert!(gas_used <= total_gas_limit);
        }
        gas_pool.add_gas(total_gas_limit.saturating_sub(gas_used));

        *cumulative_gas_used += gas_used;

        debug!(
            target: "rip7560::evm",
            tx_hash = %vpr.tx_hash,
            ?status,
            gas_used,
            refund,
            "execution phase complete"
        );

        let logs = self.evm.state().tx_logs();
        let receipt = Rip7560Receipt::new(
            vpr.tx_hash,
            status,
            gas_used,
            *cumulative_gas_used,
            logs,
            tx_index,
        );
        ExecutionPhaseOutput {
            receipt,
            execution,
            post_op,
        }
    }

    fn emit_events(
        &mut self,
        tx: &TxRip7560,
        status: ExecutionStatus,
        execution: &FrameResult,
        post_op: Option<&FrameResult>,
    ) {
        let state = self.evm.state_mut();
        state.add_log(transaction_event_log(tx, status.into()));
        if tx.deployer().is_some() {
            state.add_log(account_deployed_log(tx));
        }
        if execution.failed() {
            state.add_log(transaction_revert_reason_log(tx, execution.revert_data()));
        }
        if let Some(post_op) = post_op {
            if post_op.failed() {
                state.add_log(post_op_revert_reason_log(tx, post_op.revert_data()));
            }
        }
    }
}
