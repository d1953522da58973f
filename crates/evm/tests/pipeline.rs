//! End-to-end pipeline scenarios against the programmable mock EVM.

use alloy_primitives::{address, aliases::U192, Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolEvent};
use rip7560_chainspec::Rip7560ChainSpec;
use rip7560_contracts::{
    acceptAccountCall, acceptPaymasterCall, sigFailAccountCall, RIP7560AccountDeployed,
    RIP7560TransactionEvent, RIP7560TransactionPostOpRevertReason, RIP7560TransactionRevertReason,
    ENTRY_POINT, SENDER_CREATOR,
};
use rip7560_evm::{
    handle_rip7560_transactions,
    test_utils::{MockCall, MockEvm},
    AsRip7560, BlockEnv, Evm, GasPool, ProcessMode, Rip7560Processor, StateAccess,
};
use rip7560_primitives::{ExecutionStatus, TxRip7560};

const SENDER: Address = address!("1111111111222222222233333333334444444444");
const PAYMASTER: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const DEPLOYER: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
const COINBASE: Address = address!("cccccccccccccccccccccccccccccccccccccccc");

const BLOCK_TIME: u64 = 1_700_000_000;
const BASE_FEE: u64 = 1_000_000_000;

fn one_ether() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

fn spec() -> Rip7560ChainSpec {
    Rip7560ChainSpec::default()
}

fn block_env() -> BlockEnv {
    BlockEnv {
        number: 1,
        timestamp: BLOCK_TIME,
        base_fee: Some(U256::from(BASE_FEE)),
        coinbase: COINBASE,
        gas_limit: 30_000_000,
    }
}

fn base_tx() -> TxRip7560 {
    TxRip7560 {
        chain_id: 1,
        sender: SENDER,
        gas: 100_000,
        validation_gas_limit: 200_000,
        gas_tip_cap: U256::from(1_000_000_000u64),
        gas_fee_cap: U256::from(20_000_000_000u64),
        authorization_data: Bytes::from(vec![0xab; 65]),
        execution_data: Bytes::from(vec![0x01, 0x02]),
        ..Default::default()
    }
}

fn accept_account_input(valid_after: u64, valid_until: u64) -> Bytes {
    acceptAccountCall {
        validAfter: U256::from(valid_after),
        validUntil: U256::from(valid_until),
    }
    .abi_encode()
    .into()
}

fn accept_paymaster_input(valid_after: u64, valid_until: u64, context: Bytes) -> Bytes {
    acceptPaymasterCall {
        validAfter: U256::from(valid_after),
        validUntil: U256::from(valid_until),
        context,
    }
    .abi_encode()
    .into()
}

/// An EVM with a deployed, funded sender account.
fn funded_evm() -> MockEvm {
    let mut evm = MockEvm::new();
    evm.state.give_balance(SENDER, one_ether());
    evm.state.deploy_code(SENDER, Bytes::from(vec![0x60]));
    evm
}

fn with_paymaster(evm: &mut MockEvm) {
    evm.state.give_balance(PAYMASTER, one_ether());
    evm.state.deploy_code(PAYMASTER, Bytes::from(vec![0x60]));
}

#[test]
fn happy_path_settlement_is_exact() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    let tx = base_tx();

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(SENDER, MockCall::success(70_000));

    let mut pool = GasPool::new(30_000_000);
    let pool_before = pool.gas();
    let mut cumulative = 0;

    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor
        .apply_validation_phases(&tx, &mut pool)
        .expect("validation succeeds");
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    let intrinsic = tx.intrinsic_gas().unwrap();
    let penalty = (tx.gas - 70_000) / 10;
    let expected_gas_used = intrinsic + 50_000 + 70_000 + penalty;
    assert_eq!(out.receipt.gas_used, expected_gas_used);
    assert_eq!(cumulative, expected_gas_used);
    assert!(out.receipt.success);
    assert_eq!(out.receipt.execution_status, ExecutionStatus::Success);

    // The 1-D nonce was bumped during validation.
    assert_eq!(evm.state.nonce(SENDER), 1);

    // pre_charge - refund - gas_used*price = 0, in 256-bit arithmetic.
    let price = tx.effective_gas_price(block.base_fee);
    let spent = one_ether() - evm.state.balance(SENDER);
    assert_eq!(spent, U256::from(expected_gas_used) * price);
    assert_eq!(price, U256::from(BASE_FEE) + tx.gas_tip_cap);

    // The coinbase got exactly the priority fee.
    let tip = tx.effective_gas_tip(block.base_fee);
    assert_eq!(evm.state.balance(COINBASE), U256::from(expected_gas_used) * tip);

    // Unused reservation went back to the pool.
    assert_eq!(pool_before - pool.gas(), expected_gas_used);

    // Exactly one log: the transaction event, addressed to the EntryPoint.
    assert_eq!(out.receipt.logs.len(), 1);
    let log = &out.receipt.logs[0];
    assert_eq!(log.address, ENTRY_POINT);
    assert_eq!(log.topics()[0], RIP7560TransactionEvent::SIGNATURE_HASH);
}

#[test]
fn deployer_happy_path_deploys_without_nonce_bump() {
    let (spec, block) = (spec(), block_env());
    let mut evm = MockEvm::new();
    evm.state.give_balance(SENDER, one_ether());
    evm.state.deploy_code(DEPLOYER, Bytes::from(vec![0x60]));

    let tx = TxRip7560 {
        deployer: Some(DEPLOYER),
        deployer_data: Bytes::from(vec![0x11]),
        ..base_tx()
    };

    // The deployer frame installs the account code; the account then
    // validates as usual.
    evm.program(
        DEPLOYER,
        MockCall::success(30_000).with_deploy(SENDER, Bytes::from(vec![0x60, 0x60])),
    );
    evm.program(
        SENDER,
        MockCall::success(40_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(SENDER, MockCall::success(10_000));

    let mut pool = GasPool::new(30_000_000);
    let mut cumulative = 0;
    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor
        .apply_validation_phases(&tx, &mut pool)
        .expect("validation succeeds");
    assert_eq!(vpr.deployment_used_gas, 30_000);
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    // Code landed at the sender, nonce untouched on the deployer path.
    assert!(evm.state.code_size(SENDER) > 0);
    assert_eq!(evm.state.nonce(SENDER), 0);

    // The deployer frame ran from the sender-creator with the right budget.
    let intrinsic = tx.intrinsic_gas().unwrap();
    let deployer_frame = &evm.recorded_calls[0];
    assert_eq!(deployer_frame.from, SENDER_CREATOR);
    assert_eq!(deployer_frame.to, DEPLOYER);
    assert_eq!(deployer_frame.gas_limit, tx.validation_gas_limit - intrinsic);

    // The account frame budget had the deployment gas carved out.
    let account_frame = &evm.recorded_calls[1];
    assert_eq!(account_frame.from, ENTRY_POINT);
    assert_eq!(
        account_frame.gas_limit,
        tx.validation_gas_limit - intrinsic - 30_000
    );

    // TransactionEvent + AccountDeployed, status success.
    assert_eq!(out.receipt.execution_status, ExecutionStatus::Success);
    assert_eq!(out.receipt.logs.len(), 2);
    assert_eq!(
        out.receipt.logs[1].topics()[0],
        RIP7560AccountDeployed::SIGNATURE_HASH
    );
    assert_eq!(out.receipt.logs[1].topics().len(), 4);
}

#[test]
fn paymaster_pays_for_reverted_execution() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    with_paymaster(&mut evm);
    // Sender balance is irrelevant when the paymaster pays.
    evm.state.give_balance(SENDER, U256::ZERO);

    let tx = TxRip7560 {
        paymaster: Some(PAYMASTER),
        paymaster_validation_gas_limit: 60_000,
        ..base_tx()
    };

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(
        PAYMASTER,
        MockCall::success(40_000)
            .with_entry_point_call(PAYMASTER, accept_paymaster_input(0, 0, Bytes::new())),
    );
    evm.program(SENDER, MockCall::revert(60_000, Bytes::from(vec![0xde, 0xad])));

    let mut pool = GasPool::new(30_000_000);
    let mut cumulative = 0;
    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor
        .apply_validation_phases(&tx, &mut pool)
        .expect("validation succeeds");
    assert!(vpr.paymaster_context.is_empty());
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    assert!(!out.receipt.success);
    assert_eq!(out.receipt.execution_status, ExecutionStatus::ExecutionFailure);

    // Empty context: the post-op frame never ran. Frames: account
    // validation, paymaster validation, execution.
    assert_eq!(evm.recorded_calls.len(), 3);
    assert!(out.post_op.is_none());

    // Two logs: TransactionEvent + TransactionRevertReason.
    assert_eq!(out.receipt.logs.len(), 2);
    assert_eq!(
        out.receipt.logs[1].topics()[0],
        RIP7560TransactionRevertReason::SIGNATURE_HASH
    );

    // The paymaster footed the bill; the sender paid nothing.
    let price = tx.effective_gas_price(block.base_fee);
    let paid = one_ether() - evm.state.balance(PAYMASTER);
    assert_eq!(paid, U256::from(out.receipt.gas_used) * price);
    assert_eq!(evm.state.balance(SENDER), U256::ZERO);
}

#[test]
fn post_op_failure_reverts_execution_but_keeps_validation() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    with_paymaster(&mut evm);

    let marker = address!("00000000000000000000000000000000000000fe");
    let context = Bytes::from(vec![0xcc; 4]);

    let tx = TxRip7560 {
        paymaster: Some(PAYMASTER),
        paymaster_validation_gas_limit: 60_000,
        post_op_gas: 20_000,
        ..base_tx()
    };

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(
        PAYMASTER,
        MockCall::success(40_000)
            .with_entry_point_call(PAYMASTER, accept_paymaster_input(0, 0, context.clone())),
    );
    // Execution succeeds and leaves an observable state change.
    evm.program(
        SENDER,
        MockCall::success(70_000).with_deploy(marker, Bytes::from(vec![0x01])),
    );
    // The post-op rejects the outcome.
    evm.program(PAYMASTER, MockCall::revert(5_000, Bytes::from(vec![0x99])));

    let mut pool = GasPool::new(30_000_000);
    let mut cumulative = 0;
    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor
        .apply_validation_phases(&tx, &mut pool)
        .expect("validation succeeds");
    assert_eq!(vpr.paymaster_context, context);
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    assert!(!out.receipt.success);
    assert_eq!(out.receipt.execution_status, ExecutionStatus::PostOpFailure);

    // The execution sub-range was rolled back, the validation state kept.
    assert_eq!(evm.state.code_size(marker), 0);
    assert_eq!(evm.state.nonce(SENDER), 1);

    // TransactionEvent + PostOpRevertReason.
    assert_eq!(out.receipt.logs.len(), 2);
    assert_eq!(
        out.receipt.logs[1].topics()[0],
        RIP7560TransactionPostOpRevertReason::SIGNATURE_HASH
    );

    // Gas still accounts for the reverted frames and their penalties.
    let intrinsic = tx.intrinsic_gas().unwrap();
    let expected = intrinsic
        + 50_000
        + 40_000
        + 70_000
        + (tx.gas - 70_000) / 10
        + 5_000
        + (tx.post_op_gas - 5_000) / 10;
    assert_eq!(out.receipt.gas_used, expected);
}

#[test]
fn failed_execution_and_post_op_combine_statuses() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    with_paymaster(&mut evm);

    let tx = TxRip7560 {
        paymaster: Some(PAYMASTER),
        paymaster_validation_gas_limit: 60_000,
        post_op_gas: 20_000,
        ..base_tx()
    };

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(
        PAYMASTER,
        MockCall::success(40_000).with_entry_point_call(
            PAYMASTER,
            accept_paymaster_input(0, 0, Bytes::from(vec![0x01])),
        ),
    );
    evm.program(SENDER, MockCall::revert(10_000, Bytes::new()));
    evm.program(PAYMASTER, MockCall::revert(2_000, Bytes::new()));

    let mut pool = GasPool::new(30_000_000);
    let mut cumulative = 0;
    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor.apply_validation_phases(&tx, &mut pool).unwrap();
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    assert_eq!(
        out.receipt.execution_status,
        ExecutionStatus::ExecutionAndPostOpFailure
    );
    // Both revert reason logs are present alongside the transaction event.
    assert_eq!(out.receipt.logs.len(), 3);
}

#[test]
fn two_dimensional_nonce_runs_the_nonce_manager() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();

    let tx = TxRip7560 {
        nonce_key: U192::from(7u64),
        nonce: 3,
        ..base_tx()
    };

    // The nonce manager rejects the key.
    evm.program(spec.nonce_manager, MockCall::revert(1_000, Bytes::new()));

    let mut pool = GasPool::new(30_000_000);
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut pool)
        .unwrap_err();

    assert!(err.frame_reverted);
    assert_eq!(err.entity_name(), "NonceManager");

    // The frame came from the EntryPoint with the fixed calldata layout,
    // budgeted with the full remaining reservation.
    let frame = &evm.recorded_calls[0];
    assert_eq!(frame.from, ENTRY_POINT);
    assert_eq!(frame.to, spec.nonce_manager);
    assert_eq!(frame.gas_limit, tx.total_gas_limit().unwrap());
    assert_eq!(frame.input.len(), 52);
    assert_eq!(&frame.input[..20], SENDER.as_slice());
    let mut key = [0u8; 24];
    key[23] = 7;
    assert_eq!(&frame.input[20..44], &key);
    assert_eq!(&frame.input[44..], &3u64.to_be_bytes());
}

#[test]
fn two_dimensional_nonce_requires_the_fork() {
    let mut spec = spec();
    spec.rip7712_block = None;
    let block = block_env();
    let mut evm = funded_evm();

    let tx = TxRip7560 {
        nonce_key: U192::from(1u64),
        ..base_tx()
    };

    let mut pool = GasPool::new(30_000_000);
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut pool)
        .unwrap_err();
    assert!(err.to_string().contains("two-dimensional nonce is disabled"));
    // Rejected before any frame ran or any wei moved.
    assert!(evm.recorded_calls.is_empty());
    assert_eq!(evm.state.balance(SENDER), one_ether());
}

#[test]
fn sig_fail_selector_is_rejected_on_consensus_path() {
    let (spec, block) = (spec(), block_env());

    let sig_fail: Bytes = sigFailAccountCall {
        validAfter: U256::ZERO,
        validUntil: U256::ZERO,
    }
    .abi_encode()
    .into();

    let tx = base_tx();
    let mut pool = GasPool::new(30_000_000);

    let mut evm = funded_evm();
    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, sig_fail.clone()),
    );
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut pool)
        .unwrap_err();
    assert!(err.to_string().contains("account signature error"));

    // The tracing path decodes the same callback without complaint.
    let mut evm = funded_evm();
    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, sig_fail),
    );
    let mut pool = GasPool::new(30_000_000);
    let vpr = Rip7560Processor::new(&mut evm, &spec, &block)
        .with_sig_fail_allowed()
        .apply_validation_phases(&tx, &mut pool)
        .expect("tracing path tolerates sigFail");
    assert_eq!(vpr.validation_used_gas, 50_000);
}

#[test]
fn missing_and_repeated_callbacks_are_violations() {
    let (spec, block) = (spec(), block_env());
    let tx = base_tx();

    // No callback at all.
    let mut evm = funded_evm();
    evm.program(SENDER, MockCall::success(50_000));
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("did not call the EntryPoint callback"));
    assert!(!err.frame_reverted);

    // Two callbacks in one frame.
    let mut evm = funded_evm();
    evm.program(
        SENDER,
        MockCall::success(50_000)
            .with_entry_point_call(SENDER, accept_account_input(0, 0))
            .with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err.to_string().contains("repeated call"));

    // Callback from the wrong contract.
    let mut evm = funded_evm();
    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(DEPLOYER, accept_account_input(0, 0)),
    );
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err.to_string().contains("invalid call to the EntryPoint"));
}

#[test]
fn validation_gas_limit_boundary() {
    let (spec, block) = (spec(), block_env());

    // Exactly intrinsic: accepted, the account frame just gets a zero
    // budget.
    let mut tx = base_tx();
    tx.validation_gas_limit = tx.intrinsic_gas().unwrap();
    let mut evm = funded_evm();
    evm.program(
        SENDER,
        MockCall::success(0).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    assert!(Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .is_ok());

    // One below intrinsic: rejected before the EVM is touched.
    let mut tx = base_tx();
    tx.validation_gas_limit = tx.intrinsic_gas().unwrap() - 1;
    let mut evm = funded_evm();
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err.to_string().contains("insufficient validation gas limit"));
    assert!(evm.recorded_calls.is_empty());
}

#[test]
fn fee_cap_below_base_fee_fails_pre_evm() {
    let (spec, block) = (spec(), block_env());
    let tx = TxRip7560 {
        gas_fee_cap: U256::from(BASE_FEE - 1),
        gas_tip_cap: U256::ZERO,
        ..base_tx()
    };
    let mut evm = funded_evm();
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err.to_string().contains("below block base fee"));
    assert!(evm.recorded_calls.is_empty());
}

#[test]
fn validity_windows_are_enforced() {
    let (spec, block) = (spec(), block_env());
    let tx = base_tx();

    let run = |input: Bytes| {
        let mut evm = funded_evm();
        evm.program(
            SENDER,
            MockCall::success(50_000).with_entry_point_call(SENDER, input),
        );
        Rip7560Processor::new(&mut evm, &spec, &block)
            .apply_validation_phases(&tx, &mut GasPool::new(30_000_000))
    };

    // A point window at the block timestamp is accepted.
    assert!(run(accept_account_input(BLOCK_TIME, BLOCK_TIME)).is_ok());

    let err = run(accept_account_input(BLOCK_TIME + 1, BLOCK_TIME + 10)).unwrap_err();
    assert!(err.to_string().contains("not reached"));

    let err = run(accept_account_input(1, BLOCK_TIME - 1)).unwrap_err();
    assert!(err.to_string().contains("expired"));

    let err = run(accept_account_input(BLOCK_TIME, BLOCK_TIME - 1)).unwrap_err();
    assert!(err.to_string().contains("validity range invalid"));
}

#[test]
fn gas_accounting_worked_example() {
    // validation_gas_limit=200000, gas=100000, post_op_gas=20000, frames
    // using 50000/70000/5000, penalty 4500, refund 2000.
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    with_paymaster(&mut evm);

    let tx = TxRip7560 {
        paymaster: Some(PAYMASTER),
        paymaster_validation_gas_limit: 60_000,
        post_op_gas: 20_000,
        ..base_tx()
    };

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(
        PAYMASTER,
        MockCall::success(0).with_entry_point_call(
            PAYMASTER,
            accept_paymaster_input(0, 0, Bytes::from(vec![0x01])),
        ),
    );
    evm.program(SENDER, MockCall::success(70_000).with_refund(2_000));
    evm.program(PAYMASTER, MockCall::success(5_000));

    let mut pool = GasPool::new(30_000_000);
    let pool_before = pool.gas();
    let mut cumulative = 0;
    let mut processor = Rip7560Processor::new(&mut evm, &spec, &block);
    let vpr = processor.apply_validation_phases(&tx, &mut pool).unwrap();
    let out = processor.apply_execution_phase(&tx, &vpr, &mut pool, &mut cumulative, 0);

    let intrinsic = tx.intrinsic_gas().unwrap();
    let penalty = (100_000 - 70_000) / 10 + (20_000 - 5_000) / 10;
    assert_eq!(penalty, 4_500);
    let expected = intrinsic + 50_000 + 70_000 + 5_000 + penalty - 2_000;
    assert_eq!(out.receipt.gas_used, expected);

    // Settlement identity and pool conservation, refund included.
    let price = tx.effective_gas_price(block.base_fee);
    let paid = one_ether() - evm.state.balance(PAYMASTER);
    assert_eq!(paid, U256::from(expected) * price);
    assert_eq!(pool_before - pool.gas(), expected);
    assert_eq!(
        evm.state.balance(COINBASE),
        U256::from(expected) * tx.effective_gas_tip(block.base_fee)
    );
}

#[test]
fn insufficient_funds_fail_validation() {
    let (spec, block) = (spec(), block_env());
    let mut evm = MockEvm::new();
    evm.state.deploy_code(SENDER, Bytes::from(vec![0x60]));
    evm.state.give_balance(SENDER, U256::from(1u64));

    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&base_tx(), &mut GasPool::new(30_000_000))
        .unwrap_err();
    assert!(err.to_string().contains("insufficient funds"));
}

#[test]
fn block_gas_pool_is_a_hard_limit() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    let tx = base_tx();

    let mut pool = GasPool::new(tx.total_gas_limit().unwrap() - 1);
    let err = Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut pool)
        .unwrap_err();
    assert!(err.to_string().contains("gas limit reached"));
}

// Batch driver coverage.

enum TestItem {
    Aa(TxRip7560),
    Other,
}

impl AsRip7560 for TestItem {
    fn as_rip7560(&self) -> Option<&TxRip7560> {
        match self {
            Self::Aa(tx) => Some(tx),
            Self::Other => None,
        }
    }
}

fn programmed_valid_tx(evm: &mut MockEvm, nonce: u64) -> TxRip7560 {
    let tx = TxRip7560 {
        nonce,
        ..base_tx()
    };
    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );
    evm.program(SENDER, MockCall::success(10_000));
    tx
}

#[test]
fn build_mode_skips_invalid_and_records_debug_info() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();

    let tx1 = programmed_valid_tx(&mut evm, 0);
    // Wrong nonce: fails the static nonce check.
    let bad = TxRip7560 {
        nonce: 99,
        ..base_tx()
    };
    let tx3 = programmed_valid_tx(&mut evm, 1);

    let balance_before = evm.state.balance(SENDER);
    let items = vec![
        TestItem::Aa(tx1.clone()),
        TestItem::Aa(bad.clone()),
        TestItem::Aa(tx3.clone()),
        TestItem::Other,
        TestItem::Aa(base_tx()),
    ];

    let mut pool = GasPool::new(30_000_000);
    let pool_before = pool.gas();
    let mut cumulative = 0;
    let out = handle_rip7560_transactions(
        &mut evm,
        &spec,
        &block,
        &mut pool,
        &items,
        0,
        ProcessMode::Build,
        &mut cumulative,
    )
    .expect("build mode never aborts the block");

    // Stopped at the first non-RIP-7560 item; the invalid one was skipped.
    assert_eq!(out.processed, 3);
    assert_eq!(out.included, vec![tx1.tx_hash(), tx3.tx_hash()]);
    assert_eq!(out.receipts.len(), 2);
    assert_eq!(out.receipts[0].transaction_index, 0);
    assert_eq!(out.receipts[1].transaction_index, 2);
    assert_eq!(
        out.receipts[1].cumulative_gas_used,
        out.receipts[0].gas_used + out.receipts[1].gas_used
    );
    assert_eq!(cumulative, out.receipts[1].cumulative_gas_used);

    // The skipped transaction left a debug record and no state changes
    // (its pre-charge was reverted with the snapshot).
    assert_eq!(out.debug_info.len(), 1);
    assert_eq!(out.debug_info[0].transaction_hash, bad.tx_hash());
    assert_eq!(out.debug_info[0].revert_entity_name, "n/a");
    assert!(!out.debug_info[0].frame_reverted);
    assert!(out.debug_info[0].revert_data.contains("nonce too high"));

    // Both valid transactions bumped the nonce; the bad one did not.
    assert_eq!(evm.state.nonce(SENDER), 2);
    // No partial pre-charge survived the revert.
    let price = tx1.effective_gas_price(block.base_fee);
    let expected_spend =
        U256::from(out.receipts[0].gas_used + out.receipts[1].gas_used) * price;
    assert_eq!(balance_before - evm.state.balance(SENDER), expected_spend);
    // The skipped transaction's pool reservation was returned too.
    assert_eq!(
        pool_before - pool.gas(),
        out.receipts[0].gas_used + out.receipts[1].gas_used
    );
}

#[test]
fn apply_mode_aborts_on_invalid_transaction() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();

    let bad = TxRip7560 {
        nonce: 99,
        ..base_tx()
    };
    let items = vec![TestItem::Aa(bad)];

    let mut pool = GasPool::new(30_000_000);
    let mut cumulative = 0;
    let err = handle_rip7560_transactions(
        &mut evm,
        &spec,
        &block,
        &mut pool,
        &items,
        0,
        ProcessMode::Apply,
        &mut cumulative,
    )
    .unwrap_err();
    assert!(err.to_string().contains("nonce too high"));
}

#[test]
fn interceptor_is_removed_after_validation() {
    let (spec, block) = (spec(), block_env());
    let mut evm = funded_evm();
    let tx = base_tx();

    evm.program(
        SENDER,
        MockCall::success(50_000).with_entry_point_call(SENDER, accept_account_input(0, 0)),
    );

    let mut pool = GasPool::new(30_000_000);
    Rip7560Processor::new(&mut evm, &spec, &block)
        .apply_validation_phases(&tx, &mut pool)
        .unwrap();

    // Whatever hook the EVM had before validation is back (here: none).
    assert!(evm.take_enter_hook().is_none());
}
