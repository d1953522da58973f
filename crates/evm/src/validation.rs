//! The validation pipeline: static checks, gas pre-charge, nonce, deployer,
//! account validation and paymaster validation, in that order.
//!
//! Any failure aborts the transaction; the caller (the batch driver or an
//! RPC handler) owns the snapshot taken before validation started and
//! reverts it.

use alloy_primitives::{Address, Bytes, U256};
use rip7560_chainspec::Rip7560ChainSpec;
use rip7560_contracts::{
    decode_accept_account, decode_accept_paymaster, encode_validate_paymaster_transaction,
    encode_validate_transaction, nonce_manager_calldata, AcceptAccountData, AcceptPaymasterData,
    ENTRY_POINT, SENDER_CREATOR,
};
use rip7560_primitives::{TxRip7560, ValidationPhaseResult};
use tracing::{debug, trace};

use crate::{
    ctx::{BlockEnv, Evm, FrameResult, Hook, StateAccess},
    entry_point_call::EntryPointCall,
    error::{EntityName, Rip7560InvalidTransaction, ValidationPhaseError},
    gas::{buy_gas, GasPool},
};

/// Drives the validation and execution phases of RIP-7560 transactions
/// against one block's EVM and state.
#[derive(Debug)]
pub struct Rip7560Processor<'a, E: Evm> {
    pub(crate) evm: &'a mut E,
    pub(crate) spec: &'a Rip7560ChainSpec,
    pub(crate) block: &'a BlockEnv,
    allow_sig_fail: bool,
}

impl<'a, E: Evm> Rip7560Processor<'a, E> {
    /// A processor for the consensus path.
    pub fn new(evm: &'a mut E, spec: &'a Rip7560ChainSpec, block: &'a BlockEnv) -> Self {
        Self {
            evm,
            spec,
            block,
            allow_sig_fail: false,
        }
    }

    /// Tolerates `sigFail*` callbacks. Only the off-chain tracing path may
    /// use this; consensus rejects signature failures.
    pub fn with_sig_fail_allowed(mut self) -> Self {
        self.allow_sig_fail = true;
        self
    }

    /// Runs the complete validation phase of `tx`.
    ///
    /// On success the state is finalised and the returned
    /// [`ValidationPhaseResult`] feeds the execution phase. On failure the
    /// state carries partial writes; the caller reverts to its snapshot.
    pub fn apply_validation_phases(
        &mut self,
        tx: &TxRip7560,
        gas_pool: &mut GasPool,
    ) -> Result<ValidationPhaseResult, ValidationPhaseError> {
        self.static_validation(tx)?;

        let effective_gas_price = tx.effective_gas_price(self.block.base_fee);
        let (total_gas_limit, pre_charge) =
            buy_gas(self.evm.state_mut(), tx, effective_gas_price, gas_pool)?;

        // Intercept EntryPoint callbacks for the duration of this phase,
        // keeping any tracer that was already installed.
        let epc = EntryPointCall::new();
        let prev = self.evm.take_enter_hook();
        self.evm.set_enter_hook(Some(epc.hook(prev)));

        let result =
            self.run_validation_frames(tx, &epc, total_gas_limit, effective_gas_price, pre_charge);

        let hook = self.evm.take_enter_hook();
        self.evm.set_enter_hook(hook.and_then(Hook::into_prev));

        match &result {
            Ok(_) => self.evm.state_mut().finalise(),
            // The caller reverts the state; the pool reservation is not
            // covered by snapshots and is returned here.
            Err(_) => gas_pool.add_gas(total_gas_limit),
        }
        result
    }

    /// All checks that run before any wei moves.
    fn static_validation(&self, tx: &TxRip7560) -> Result<(), Rip7560InvalidTransaction> {
        if !self.spec.is_rip7560(self.block.number) {
            return Err(Rip7560InvalidTransaction::TxTypeNotEnabled);
        }

        if tx.deployer().is_none() && !tx.deployer_data.is_empty() {
            return Err(Rip7560InvalidTransaction::DeployerDataWithoutDeployer);
        }
        match tx.paymaster() {
            None => {
                if !tx.paymaster_data.is_empty() {
                    return Err(Rip7560InvalidTransaction::PaymasterDataWithoutPaymaster);
                }
                if tx.paymaster_validation_gas_limit != 0 {
                    return Err(Rip7560InvalidTransaction::PaymasterGasWithoutPaymaster);
                }
            }
            Some(paymaster) => {
                if self.evm.state().code_size(paymaster) == 0 {
                    return Err(Rip7560InvalidTransaction::PaymasterNotDeployed(paymaster));
                }
                if tx.paymaster_validation_gas_limit == 0 {
                    return Err(Rip7560InvalidTransaction::ZeroPaymasterValidationGas);
                }
            }
        }

        let sender_code_size = self.evm.state().code_size(tx.sender);
        match tx.deployer() {
            Some(deployer) => {
                if sender_code_size != 0 {
                    return Err(Rip7560InvalidTransaction::SenderAlreadyDeployed(tx.sender));
                }
                if self.evm.state().code_size(deployer) == 0 {
                    return Err(Rip7560InvalidTransaction::DeployerNotDeployed(deployer));
                }
            }
            None => {
                if sender_code_size == 0 {
                    return Err(Rip7560InvalidTransaction::SenderNotDeployed(tx.sender));
                }
            }
        }

        let intrinsic = tx
            .intrinsic_gas()
            .ok_or(Rip7560InvalidTransaction::GasFieldOverflow)?;
        if intrinsic > tx.validation_gas_limit {
            return Err(Rip7560InvalidTransaction::InsufficientValidationGas {
                limit: tx.validation_gas_limit,
                intrinsic,
            });
        }

        if tx.is_rip7712_nonce() && !self.spec.is_rip7712(self.block.number) {
            return Err(Rip7560InvalidTransaction::Rip7712NonceDisabled);
        }

        if let Some(base_fee) = self.block.base_fee {
            if tx.gas_fee_cap < base_fee {
                return Err(Rip7560InvalidTransaction::FeeCapBelowBaseFee {
                    fee_cap: tx.gas_fee_cap,
                    base_fee,
                });
            }
        }

        Ok(())
    }

    fn run_validation_frames(
        &mut self,
        tx: &TxRip7560,
        epc: &EntryPointCall,
        total_gas_limit: u64,
        effective_gas_price: U256,
        pre_charge: U256,
    ) -> Result<ValidationPhaseResult, ValidationPhaseError> {
        // Static validation has established intrinsic <= validation_gas_limit.
        let intrinsic = tx
            .intrinsic_gas()
            .ok_or(Rip7560InvalidTransaction::GasFieldOverflow)?;
        // The nonce manager runs on everything still reserved; the intrinsic
        // cost is carved out of the deployer and account budgets only.
        let mut gas_remaining = total_gas_limit;

        let nonce_manager_used_gas = self.check_nonce(tx, &mut gas_remaining)?;

        let mut deployment_used_gas = 0;
        if let Some(deployer) = tx.deployer() {
            let deployer_gas_limit = tx.validation_gas_limit - intrinsic;
            let result = self.call_frame(
                &mut gas_remaining,
                SENDER_CREATOR,
                deployer,
                &tx.deployer_data,
                deployer_gas_limit,
            );
            if result.failed() {
                return Err(self.frame_error(EntityName::Deployer, &result));
            }
            if self.evm.state().code_size(tx.sender) == 0 {
                return Err(Rip7560InvalidTransaction::SenderNotDeployedByFactory {
                    sender: tx.sender,
                    deployer,
                }
                .into());
            }
            deployment_used_gas = result.gas_used;
        } else if !tx.is_rip7712_nonce() {
            // Chain rule: the account nonce is bumped here, not when a
            // deployer is present (deployment is the replay protection) and
            // not for two-dimensional nonces (the nonce manager owns those).
            let nonce = self.evm.state().nonce(tx.sender);
            self.evm.state_mut().set_nonce(tx.sender, nonce + 1);
        }

        let signing_hash = tx.signing_hash();
        let account_gas_limit = tx
            .validation_gas_limit
            .saturating_sub(intrinsic)
            .saturating_sub(deployment_used_gas);
        let validate_call = encode_validate_transaction(tx, signing_hash);
        let result = self.call_frame(
            &mut gas_remaining,
            ENTRY_POINT,
            tx.sender,
            &validate_call,
            account_gas_limit,
        );
        if result.failed() {
            return Err(self.frame_error(EntityName::Account, &result));
        }
        let validation_used_gas = result.gas_used;

        let aad = self.accept_account(tx, epc)?;
        validate_validity_time_range(self.block.timestamp, aad.valid_after, aad.valid_until)?;

        let mut pm = AcceptPaymasterData::default();
        let mut pm_validation_used_gas = 0;
        if let Some(paymaster) = tx.paymaster() {
            let pm_call = encode_validate_paymaster_transaction(tx, signing_hash);
            let result = self.call_frame(
                &mut gas_remaining,
                ENTRY_POINT,
                paymaster,
                &pm_call,
                tx.paymaster_validation_gas_limit,
            );
            if result.failed() {
                return Err(self.frame_error(EntityName::Paymaster, &result));
            }
            pm_validation_used_gas = result.gas_used;

            pm = self.accept_paymaster(paymaster, epc)?;
            validate_validity_time_range(self.block.timestamp, pm.valid_after, pm.valid_until)?;
            if !pm.context.is_empty() && tx.post_op_gas == 0 {
                return Err(Rip7560InvalidTransaction::ContextWithoutPostOpGas.into());
            }
        }

        debug!(
            target: "rip7560::evm",
            tx_hash = %signing_hash,
            sender = %tx.sender,
            validation_used_gas,
            pm_validation_used_gas,
            deployment_used_gas,
            "validation phase complete"
        );

        Ok(ValidationPhaseResult {
            tx_hash: signing_hash,
            pre_charge,
            effective_gas_price,
            paymaster_context: pm.context,
            pre_transaction_gas: intrinsic,
            nonce_manager_used_gas,
            deployment_used_gas,
            validation_used_gas,
            pm_validation_used_gas,
            validation_refund: self.evm.gas_refund(),
            sender_valid_after: aad.valid_after,
            sender_valid_until: aad.valid_until,
            pm_valid_after: pm.valid_after,
            pm_valid_until: pm.valid_until,
        })
    }

    /// 1-D nonces are checked (and later bumped) against the account; 2-D
    /// nonces run an extra frame against the nonce manager contract.
    fn check_nonce(
        &mut self,
        tx: &TxRip7560,
        gas_remaining: &mut u64,
    ) -> Result<u64, ValidationPhaseError> {
        if tx.is_rip7712_nonce() {
            let calldata = nonce_manager_calldata(tx.sender, tx.nonce_key, tx.nonce);
            let gas_limit = *gas_remaining;
            let result = self.call_frame(
                gas_remaining,
                ENTRY_POINT,
                self.spec.nonce_manager,
                &calldata,
                gas_limit,
            );
            if result.failed() {
                return Err(self.frame_error(EntityName::NonceManager, &result));
            }
            return Ok(result.gas_used);
        }

        let state_nonce = self.evm.state().nonce(tx.sender);
        if state_nonce < tx.nonce {
            return Err(Rip7560InvalidTransaction::NonceTooHigh {
                address: tx.sender,
                tx: tx.nonce,
                state: state_nonce,
            }
            .into());
        }
        if state_nonce > tx.nonce {
            return Err(Rip7560InvalidTransaction::NonceTooLow {
                address: tx.sender,
                tx: tx.nonce,
                state: state_nonce,
            }
            .into());
        }
        if state_nonce == u64::MAX {
            return Err(Rip7560InvalidTransaction::NonceMax {
                address: tx.sender,
                nonce: state_nonce,
            }
            .into());
        }
        Ok(0)
    }

    fn accept_account(
        &mut self,
        tx: &TxRip7560,
        epc: &EntryPointCall,
    ) -> Result<AcceptAccountData, ValidationPhaseError> {
        let captured = epc
            .take()?
            .ok_or(Rip7560InvalidTransaction::MissingCallback(EntityName::Account))?;
        if captured.from != tx.sender {
            return Err(Rip7560InvalidTransaction::WrongCallbackSender {
                expected: tx.sender,
                got: captured.from,
            }
            .into());
        }
        let aad = decode_accept_account(&captured.input, self.allow_sig_fail)
            .map_err(Rip7560InvalidTransaction::from)?;
        Ok(aad)
    }

    fn accept_paymaster(
        &mut self,
        paymaster: Address,
        epc: &EntryPointCall,
    ) -> Result<AcceptPaymasterData, ValidationPhaseError> {
        let captured = epc.take()?.ok_or(Rip7560InvalidTransaction::MissingCallback(
            EntityName::Paymaster,
        ))?;
        if captured.from != paymaster {
            return Err(Rip7560InvalidTransaction::WrongCallbackSender {
                expected: paymaster,
                got: captured.from,
            }
            .into());
        }
        let apd = decode_accept_paymaster(&captured.input, self.allow_sig_fail)
            .map_err(Rip7560InvalidTransaction::from)?;
        Ok(apd)
    }

    pub(crate) fn call_frame(
        &mut self,
        gas_remaining: &mut u64,
        from: Address,
        to: Address,
        input: &Bytes,
        gas_limit: u64,
    ) -> FrameResult {
        trace!(target: "rip7560::evm", %from, %to, gas_limit, "entering frame");
        let result = self.evm.call(from, to, input, gas_limit);
        *gas_remaining = gas_remaining.saturating_sub(result.gas_used);
        result
    }

    pub(crate) fn frame_error(
        &self,
        entity: EntityName,
        result: &FrameResult,
    ) -> ValidationPhaseError {
        if result.is_cancelled() {
            Rip7560InvalidTransaction::Cancelled.into()
        } else {
            ValidationPhaseError::frame(entity, result)
        }
    }
}

/// Enforces `validAfter <= block.time <= validUntil`; a fully zero window is
/// unconstrained.
pub fn validate_validity_time_range(
    time: u64,
    valid_after: u64,
    valid_until: u64,
) -> Result<(), Rip7560InvalidTransaction> {
    if valid_until == 0 && valid_after == 0 {
        return Ok(());
    }
    if valid_until < valid_after {
        return Err(Rip7560InvalidTransaction::ValidityRangeInvalid {
            valid_after,
            valid_until,
        });
    }
    if time > valid_until {
        return Err(Rip7560InvalidTransaction::ValidityExpired { time, valid_until });
    }
    if time < valid_after {
        return Err(Rip7560InvalidTransaction::ValidityNotReached { time, valid_after });
    }
    Ok(())
}
