//! Programmable EVM and state doubles for exercising the pipeline without a
//! real EVM.

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use rip7560_contracts::ENTRY_POINT;
use std::collections::{HashMap, VecDeque};

use crate::ctx::{
    CallEnter, CancelToken, Evm, FrameOutcome, FrameResult, Hook, SnapshotId, StateAccess,
};

/// A single account in the test world.
#[derive(Clone, Debug, Default)]
pub struct TestAccount {
    /// Balance in wei.
    pub balance: U256,
    /// Account nonce.
    pub nonce: u64,
    /// Deployed code.
    pub code: Bytes,
}

#[derive(Clone, Debug, Default)]
struct World {
    accounts: HashMap<Address, TestAccount>,
    logs: Vec<Log>,
    refund: u64,
}

/// An in-memory state with stack-like snapshots.
#[derive(Debug, Default)]
pub struct TestState {
    world: World,
    snapshots: Vec<World>,
    tx_hash: B256,
    tx_index: u64,
    tx_log_start: usize,
}

impl TestState {
    /// Credits `address` with `amount` wei, creating the account if needed.
    pub fn give_balance(&mut self, address: Address, amount: U256) {
        self.world.accounts.entry(address).or_default().balance = amount;
    }

    /// Installs `code` at `address`.
    pub fn deploy_code(&mut self, address: Address, code: Bytes) {
        self.world.accounts.entry(address).or_default().code = code;
    }

    /// The hash set by the last [`StateAccess::set_tx_context`] call.
    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// The index set by the last [`StateAccess::set_tx_context`] call.
    pub fn tx_index(&self) -> u64 {
        self.tx_index
    }

    fn account(&self, address: Address) -> Option<&TestAccount> {
        self.world.accounts.get(&address)
    }
}

impl StateAccess for TestState {
    fn balance(&self, address: Address) -> U256 {
        self.account(address).map(|a| a.balance).unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.account(address).map(|a| a.nonce).unwrap_or_default()
    }

    fn code_size(&self, address: Address) -> usize {
        self.account(address).map(|a| a.code.len()).unwrap_or_default()
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.world.accounts.entry(address).or_default().nonce = nonce;
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.world.accounts.entry(address).or_default().balance = balance;
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.world.accounts.entry(address).or_default().code = code;
    }

    fn sub_balance(&mut self, address: Address, amount: U256) {
        let account = self.world.accounts.entry(address).or_default();
        account.balance = account.balance.saturating_sub(amount);
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        let account = self.world.accounts.entry(address).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    fn snapshot(&mut self) -> SnapshotId {
        self.snapshots.push(self.world.clone());
        self.snapshots.len() - 1
    }

    fn revert_to(&mut self, snapshot: SnapshotId) {
        let world = self.snapshots[snapshot].clone();
        self.snapshots.truncate(snapshot);
        self.world = world;
    }

    fn finalise(&mut self) {
        self.snapshots.clear();
    }

    fn set_tx_context(&mut self, tx_hash: B256, tx_index: u64) {
        self.tx_hash = tx_hash;
        self.tx_index = tx_index;
        self.tx_log_start = self.world.logs.len();
    }

    fn add_log(&mut self, log: Log) {
        self.world.logs.push(log);
    }

    fn tx_logs(&self) -> Vec<Log> {
        self.world
            .logs
            .get(self.tx_log_start.min(self.world.logs.len())..)
            .unwrap_or_default()
            .to_vec()
    }
}

/// How a programmed frame ends.
#[derive(Clone, Debug)]
pub enum MockOutcome {
    /// Frame returns normally with the given output.
    Success(Bytes),
    /// Frame reverts with the given data.
    Revert(Bytes),
    /// Frame consumes its whole budget and halts.
    OutOfGas,
}

/// One programmed response of the mock EVM, consumed in FIFO order per
/// callee address.
#[derive(Clone, Debug)]
pub struct MockCall {
    /// Gas the frame needs. A successful frame that is budgeted less than
    /// this runs out of gas instead.
    pub gas_used: u64,
    /// Refund counter increment granted by the frame.
    pub refund: u64,
    /// Calls into the EntryPoint the frame performs, as `(from, input)`.
    pub entry_point_calls: Vec<(Address, Bytes)>,
    /// Code installed while the frame runs, as `(address, code)`.
    pub deploys: Vec<(Address, Bytes)>,
    /// Terminal state of the frame.
    pub outcome: MockOutcome,
}

impl MockCall {
    /// A successful frame using `gas_used` gas.
    pub fn success(gas_used: u64) -> Self {
        Self {
            gas_used,
            refund: 0,
            entry_point_calls: Vec::new(),
            deploys: Vec::new(),
            outcome: MockOutcome::Success(Bytes::new()),
        }
    }

    /// A reverting frame.
    pub fn revert(gas_used: u64, data: Bytes) -> Self {
        Self {
            outcome: MockOutcome::Revert(data),
            ..Self::success(gas_used)
        }
    }

    /// A frame that exhausts its gas budget.
    pub fn out_of_gas() -> Self {
        Self {
            outcome: MockOutcome::OutOfGas,
            ..Self::success(0)
        }
    }

    /// Adds a call from `from` into the EntryPoint during this frame.
    pub fn with_entry_point_call(mut self, from: Address, input: Bytes) -> Self {
        self.entry_point_calls.push((from, input));
        self
    }

    /// Deploys `code` at `address` during this frame.
    pub fn with_deploy(mut self, address: Address, code: Bytes) -> Self {
        self.deploys.push((address, code));
        self
    }

    /// Grants an EIP-3529 refund during this frame.
    pub fn with_refund(mut self, refund: u64) -> Self {
        self.refund = refund;
        self
    }
}

/// A call observed by the mock, for asserting frame order and payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    /// Frame caller.
    pub from: Address,
    /// Frame callee.
    pub to: Address,
    /// Frame calldata.
    pub input: Bytes,
    /// Frame gas budget.
    pub gas_limit: u64,
}

/// A scriptable [`Evm`]: responses are programmed per callee address and
/// consumed in order; simulated EntryPoint callbacks fire the installed
/// enter hook exactly like a real inner call would.
#[derive(Debug, Default)]
pub struct MockEvm {
    /// The backing state.
    pub state: TestState,
    /// Every frame the processor started, in order.
    pub recorded_calls: Vec<RecordedCall>,
    handlers: HashMap<Address, VecDeque<MockCall>>,
    hook: Option<Hook>,
    cancel: CancelToken,
}

impl MockEvm {
    /// An empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `call` as the next response for frames targeting `to`.
    pub fn program(&mut self, to: Address, call: MockCall) {
        self.handlers.entry(to).or_default().push_back(call);
    }

    fn fire_hook(&mut self, frame: &CallEnter<'_>) {
        if let Some(mut hook) = self.hook.take() {
            hook.invoke(frame);
            self.hook = Some(hook);
        }
    }
}

impl Evm for MockEvm {
    type State = TestState;

    fn state(&self) -> &TestState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut TestState {
        &mut self.state
    }

    fn call(&mut self, from: Address, to: Address, input: &[u8], gas_limit: u64) -> FrameResult {
        self.recorded_calls.push(RecordedCall {
            from,
            to,
            input: Bytes::copy_from_slice(input),
            gas_limit,
        });

        if self.cancel.is_cancelled() {
            return FrameResult {
                output: Bytes::new(),
                gas_used: 0,
                outcome: FrameOutcome::Cancelled,
            };
        }

        self.fire_hook(&CallEnter {
            depth: 0,
            from,
            to,
            input,
            gas: gas_limit,
            value: U256::ZERO,
        });

        let call = self
            .handlers
            .get_mut(&to)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| MockCall::success(0));

        for (address, code) in call.deploys {
            self.state.set_code(address, code);
        }
        for (cb_from, cb_input) in &call.entry_point_calls {
            self.fire_hook(&CallEnter {
                depth: 1,
                from: *cb_from,
                to: ENTRY_POINT,
                input: cb_input.as_ref(),
                gas: 0,
                value: U256::ZERO,
            });
        }

        match call.outcome {
            MockOutcome::Success(output) => {
                // A frame that needs more gas than its budget runs out of
                // gas, like it would on a real EVM.
                if call.gas_used > gas_limit {
                    return FrameResult {
                        output: Bytes::new(),
                        gas_used: gas_limit,
                        outcome: FrameOutcome::OutOfGas,
                    };
                }
                self.state.world.refund += call.refund;
                FrameResult {
                    output,
                    gas_used: call.gas_used,
                    outcome: FrameOutcome::Success,
                }
            }
            MockOutcome::Revert(data) => FrameResult {
                output: data,
                gas_used: call.gas_used.min(gas_limit),
                outcome: FrameOutcome::Revert,
            },
            MockOutcome::OutOfGas => FrameResult {
                output: Bytes::new(),
                gas_used: gas_limit,
                outcome: FrameOutcome::OutOfGas,
            },
        }
    }

    fn gas_refund(&self) -> u64 {
        self.state.world.refund
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn take_enter_hook(&mut self) -> Option<Hook> {
        self.hook.take()
    }

    fn set_enter_hook(&mut self, hook: Option<Hook>) {
        self.hook = hook;
    }
}
