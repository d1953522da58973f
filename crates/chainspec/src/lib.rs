//! Chain configuration consumed by the RIP-7560 state processor.
//!
//! Activation is block-number based: `is_rip7560` gates the transaction type
//! itself, `is_rip7712` gates two-dimensional nonces, and `is_london` gates
//! base-fee tipping. The nonce manager is a real deployed contract whose
//! address is part of the chain configuration.

use alloy_primitives::{address, Address, ChainId};

/// Default deployment address of the RIP-7712 nonce manager.
pub const DEFAULT_NONCE_MANAGER: Address = address!("4200000000000000000000000000000000000024");

/// Chain parameters relevant to RIP-7560 processing.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rip7560ChainSpec {
    /// EIP-155 chain id.
    pub chain_id: ChainId,
    /// Block at which EIP-1559 base fees activate, `None` for never.
    pub london_block: Option<u64>,
    /// Block at which the RIP-7560 transaction type activates.
    pub rip7560_block: Option<u64>,
    /// Block at which RIP-7712 two-dimensional nonces activate.
    pub rip7712_block: Option<u64>,
    /// Address of the RIP-7712 nonce manager contract.
    #[serde(default = "default_nonce_manager")]
    pub nonce_manager: Address,
}

fn default_nonce_manager() -> Address {
    DEFAULT_NONCE_MANAGER
}

impl Default for Rip7560ChainSpec {
    fn default() -> Self {
        Self {
            chain_id: 1,
            london_block: Some(0),
            rip7560_block: Some(0),
            rip7712_block: Some(0),
            nonce_manager: DEFAULT_NONCE_MANAGER,
        }
    }
}

impl Rip7560ChainSpec {
    fn active(activation: Option<u64>, block_number: u64) -> bool {
        activation.is_some_and(|at| at <= block_number)
    }

    /// Whether base-fee tipping is active at `block_number`.
    pub fn is_london(&self, block_number: u64) -> bool {
        Self::active(self.london_block, block_number)
    }

    /// Whether the RIP-7560 transaction type is valid at `block_number`.
    pub fn is_rip7560(&self, block_number: u64) -> bool {
        Self::active(self.rip7560_block, block_number)
    }

    /// Whether two-dimensional nonces are valid at `block_number`.
    pub fn is_rip7712(&self, block_number: u64) -> bool {
        Self::active(self.rip7712_block, block_number)
    }
}
