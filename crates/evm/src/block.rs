//! The batch driver: processes the maximal run of consecutive RIP-7560
//! transactions inside a block.

use alloy_primitives::{Log, B256};
use rip7560_chainspec::Rip7560ChainSpec;
use rip7560_primitives::{Rip7560Receipt, Rip7560TransactionDebugInfo, TxRip7560};
use tracing::error;

use crate::{
    ctx::{BlockEnv, Evm, StateAccess},
    error::ValidationPhaseError,
    gas::GasPool,
    validation::Rip7560Processor,
};

/// Whether the driver is assembling a new block or re-applying an existing
/// one. The fork is only at the error site: building skips invalid
/// transactions, applying treats them as a consensus failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessMode {
    /// Block building: invalid transactions are dropped and recorded.
    Build,
    /// Block application: invalid transactions abort the block.
    Apply,
}

/// A block item that may be an RIP-7560 transaction.
///
/// The driver stops at the first item of any other type.
pub trait AsRip7560 {
    /// The RIP-7560 payload, or `None` for other transaction types.
    fn as_rip7560(&self) -> Option<&TxRip7560>;
}

impl AsRip7560 for TxRip7560 {
    fn as_rip7560(&self) -> Option<&TxRip7560> {
        Some(self)
    }
}

/// What the batch driver produced.
#[derive(Clone, Debug, Default)]
pub struct BatchOutput {
    /// Receipts of included transactions, in block order.
    pub receipts: Vec<Rip7560Receipt>,
    /// All logs of the included transactions.
    pub logs: Vec<Log>,
    /// Hashes of the included transactions.
    pub included: Vec<B256>,
    /// Debug records for transactions dropped in build mode.
    pub debug_info: Vec<Rip7560TransactionDebugInfo>,
    /// Number of consecutive RIP-7560 items consumed from the input.
    pub processed: usize,
}

/// Applies the state changes of all consecutive RIP-7560 transactions
/// starting at `index`.
///
/// Each transaction is validated under a fresh snapshot; validation failures
/// revert to it. In [`ProcessMode::Build`] such transactions are skipped and
/// recorded, in [`ProcessMode::Apply`] they are fatal for the block.
#[allow(clippy::too_many_arguments)]
pub fn handle_rip7560_transactions<E: Evm, T: AsRip7560>(
    evm: &mut E,
    spec: &Rip7560ChainSpec,
    block: &BlockEnv,
    gas_pool: &mut GasPool,
    txs: &[T],
    index: usize,
    mode: ProcessMode,
    cumulative_gas_used: &mut u64,
) -> Result<BatchOutput, ValidationPhaseError> {
    let mut out = BatchOutput::default();

    for (offset, item) in txs[index..].iter().enumerate() {
        let Some(tx) = item.as_rip7560() else {
            break;
        };
        let tx_index = (index + offset) as u64;
        let tx_hash = tx.tx_hash();

        evm.state_mut().set_tx_context(tx_hash, tx_index);
        let snapshot = evm.state_mut().snapshot();

        let validation =
            Rip7560Processor::new(&mut *evm, spec, block).apply_validation_phases(tx, gas_pool);
        let vpr = match validation {
            Ok(vpr) => vpr,
            Err(err) => match mode {
                ProcessMode::Build => {
                    error!(
                        target: "rip7560::block",
                        %tx_hash,
                        %err,
                        "validation failed during block building, skipping transaction"
                    );
                    out.debug_info.push(Rip7560TransactionDebugInfo {
                        transaction_hash: tx_hash,
                        revert_entity_name: err.entity_name(),
                        revert_data: err.error_data().unwrap_or_else(|| err.to_string()),
                        frame_reverted: err.frame_reverted,
                    });
                    evm.state_mut().revert_to(snapshot);
                    out.processed += 1;
                    continue;
                }
                ProcessMode::Apply => return Err(err),
            },
        };

        let output = Rip7560Processor::new(&mut *evm, spec, block).apply_execution_phase(
            tx,
            &vpr,
            gas_pool,
            cumulative_gas_used,
            tx_index,
        );
        evm.state_mut().finalise();

        out.logs.extend(output.receipt.logs.iter().cloned());
        out.included.push(tx_hash);
        out.receipts.push(output.receipt);
        out.processed += 1;
    }

    Ok(out)
}
