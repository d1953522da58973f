//! The RIP-7560 state processor.
//!
//! Drives the multi-phase validation and execution of account abstraction
//! transactions against an EVM. The EVM itself, the state database and the
//! block header are external collaborators reached through the traits in
//! [`ctx`]; snapshots are the sole recovery primitive and are owned by the
//! state database.

pub mod block;
pub mod ctx;
pub mod entry_point_call;
pub mod error;
pub mod execution;
pub mod gas;
pub mod test_utils;
pub mod validation;

pub use block::{handle_rip7560_transactions, AsRip7560, BatchOutput, ProcessMode};
pub use ctx::{BlockEnv, CallEnter, CancelToken, EnterFn, Evm, FrameResult, Hook, StateAccess};
pub use entry_point_call::EntryPointCall;
pub use error::{EntityName, Rip7560InvalidTransaction, ValidationPhaseError};
pub use execution::ExecutionPhaseOutput;
pub use gas::{GasPool, GAS_PENALTY_PCT};
pub use validation::Rip7560Processor;
