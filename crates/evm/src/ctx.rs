//! External collaborator interfaces of the state processor.
//!
//! The pipeline never talks to a concrete EVM or state database; it drives
//! whatever implements [`Evm`] and [`StateAccess`]. Snapshots are opaque,
//! stack-like identifiers handed out by the state.

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Opaque identifier of a state snapshot.
pub type SnapshotId = usize;

/// A call-frame entry as observed by an enter hook.
#[derive(Debug)]
pub struct CallEnter<'a> {
    /// Call depth, zero for the frame the processor itself started.
    pub depth: usize,
    /// Caller of the frame.
    pub from: Address,
    /// Callee of the frame.
    pub to: Address,
    /// Frame calldata.
    pub input: &'a [u8],
    /// Gas available to the frame.
    pub gas: u64,
    /// Value transferred with the call.
    pub value: U256,
}

/// A single enter-hook function.
pub type EnterFn = Box<dyn FnMut(&CallEnter<'_>) + Send>;

/// A call-entry hook, possibly chained onto a previously installed one.
///
/// Chaining composes observers without subtyping: the previous hook keeps
/// firing on every frame, and the new layer can be peeled off again once the
/// transaction is done.
pub enum Hook {
    /// A single hook.
    Basic(EnterFn),
    /// A hook layered on top of an earlier one; the earlier hook fires first.
    Chained(EnterFn, Box<Hook>),
}

impl Hook {
    /// Layers `f` on top of `prev`.
    pub fn chain(prev: Option<Hook>, f: EnterFn) -> Self {
        match prev {
            None => Self::Basic(f),
            Some(prev) => Self::Chained(f, Box::new(prev)),
        }
    }

    /// Invokes the whole chain, oldest hook first.
    pub fn invoke(&mut self, frame: &CallEnter<'_>) {
        match self {
            Self::Basic(f) => f(frame),
            Self::Chained(f, prev) => {
                prev.invoke(frame);
                f(frame);
            }
        }
    }

    /// Peels off the topmost layer, returning what was installed below it.
    pub fn into_prev(self) -> Option<Hook> {
        match self {
            Self::Basic(_) => None,
            Self::Chained(_, prev) => Some(*prev),
        }
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic(_) => f.write_str("Hook::Basic"),
            Self::Chained(_, prev) => write!(f, "Hook::Chained({prev:?})"),
        }
    }
}

/// Cooperative cancellation flag observed by the EVM between operations.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Terminal state of a call frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame ran to completion.
    Success,
    /// The frame executed a `REVERT`; the output holds the revert data.
    Revert,
    /// The frame ran out of gas.
    OutOfGas,
    /// The EVM was cancelled while the frame was running.
    Cancelled,
}

impl std::fmt::Display for FrameOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Revert => f.write_str("execution reverted"),
            Self::OutOfGas => f.write_str("out of gas"),
            Self::Cancelled => f.write_str("execution cancelled"),
        }
    }
}

/// Result of one EVM call frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameResult {
    /// Return or revert data.
    pub output: Bytes,
    /// Gas consumed by the frame.
    pub gas_used: u64,
    /// How the frame ended.
    pub outcome: FrameOutcome,
}

impl FrameResult {
    /// Whether the frame ended in anything but success.
    pub fn failed(&self) -> bool {
        self.outcome != FrameOutcome::Success
    }

    /// Whether the frame was aborted by cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.outcome == FrameOutcome::Cancelled
    }

    /// Whether the frame ran out of gas.
    pub fn is_out_of_gas(&self) -> bool {
        self.outcome == FrameOutcome::OutOfGas
    }

    /// The revert data of a reverted frame, empty otherwise.
    pub fn revert_data(&self) -> Bytes {
        if self.outcome == FrameOutcome::Revert {
            self.output.clone()
        } else {
            Bytes::new()
        }
    }
}

/// Mutable access to the world state, including the snapshot capability.
///
/// Snapshots behave like a stack: reverting to an id discards every change
/// made after the snapshot was taken, including logs and refund counters.
pub trait StateAccess {
    /// Balance of `address` in wei.
    fn balance(&self, address: Address) -> U256;
    /// Current nonce of `address`.
    fn nonce(&self, address: Address) -> u64;
    /// Size of the code deployed at `address`, zero for empty accounts.
    fn code_size(&self, address: Address) -> usize;

    /// Overwrites the nonce of `address`.
    fn set_nonce(&mut self, address: Address, nonce: u64);
    /// Overwrites the balance of `address`.
    fn set_balance(&mut self, address: Address, balance: U256);
    /// Overwrites the code of `address`.
    fn set_code(&mut self, address: Address, code: Bytes);
    /// Subtracts `amount` from the balance of `address`.
    fn sub_balance(&mut self, address: Address, amount: U256);
    /// Adds `amount` to the balance of `address`.
    fn add_balance(&mut self, address: Address, amount: U256);

    /// Takes a snapshot of the current state.
    fn snapshot(&mut self) -> SnapshotId;
    /// Discards all changes made after `snapshot` was taken.
    fn revert_to(&mut self, snapshot: SnapshotId);
    /// Commits pending changes; snapshots taken before this point are spent.
    fn finalise(&mut self);

    /// Associates subsequent logs with a transaction.
    fn set_tx_context(&mut self, tx_hash: B256, tx_index: u64);
    /// Appends a log to the current transaction.
    fn add_log(&mut self, log: Log);
    /// Logs emitted by the current transaction, in emission order.
    fn tx_logs(&self) -> Vec<Log>;
}

/// The EVM as the pipeline sees it: zero-value call frames against a shared
/// state, a refund counter, a cancellation flag and a call-entry hook slot.
pub trait Evm {
    /// The state database this EVM mutates.
    type State: StateAccess;

    /// Read access to the state.
    fn state(&self) -> &Self::State;
    /// Write access to the state.
    fn state_mut(&mut self) -> &mut Self::State;

    /// Runs a zero-value call frame and returns its result. Gas accounting
    /// for the transaction stays with the caller; the EVM only meters the
    /// frame itself.
    fn call(&mut self, from: Address, to: Address, input: &[u8], gas_limit: u64) -> FrameResult;

    /// The EIP-3529 refund counter accumulated so far in this transaction.
    fn gas_refund(&self) -> u64;

    /// Token used by RPC timeouts to abort long-running calls.
    fn cancel_token(&self) -> CancelToken;

    /// Whether the EVM has been cancelled.
    fn cancelled(&self) -> bool {
        self.cancel_token().is_cancelled()
    }

    /// Removes and returns the installed call-entry hook.
    fn take_enter_hook(&mut self) -> Option<Hook>;

    /// Installs a call-entry hook.
    fn set_enter_hook(&mut self, hook: Option<Hook>);
}

/// The parts of the enclosing block header the pipeline reads.
#[derive(Clone, Debug, Default)]
pub struct BlockEnv {
    /// Block number.
    pub number: u64,
    /// Block timestamp, seconds.
    pub timestamp: u64,
    /// EIP-1559 base fee, `None` before London.
    pub base_fee: Option<U256>,
    /// Fee recipient of the block.
    pub coinbase: Address,
    /// Block gas limit.
    pub gas_limit: u64,
}
