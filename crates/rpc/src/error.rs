//! RPC error mapping.

use jsonrpsee::types::ErrorObjectOwned;
use rip7560_evm::ValidationPhaseError;
use rip7560_pool::PoolError;
use std::time::Duration;

use crate::{args::ArgsError, backend::BackendError};

/// JSON-RPC error code for execution/validation failures carrying revert
/// data, as used by `eth_call`.
const EXECUTION_ERROR_CODE: i32 = 3;
const INVALID_PARAMS_CODE: i32 = -32602;
const SERVER_ERROR_CODE: i32 = -32000;

/// Errors surfaced by the RIP-7560 RPC handlers.
#[derive(Debug, thiserror::Error)]
pub enum Rip7560EthApiError {
    /// The simulated validation phase failed; carries revert data.
    #[error(transparent)]
    Validation(#[from] ValidationPhaseError),

    /// The bundle pool rejected the request.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The node could not serve the request.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Malformed transaction arguments.
    #[error(transparent)]
    Args(#[from] ArgsError),

    /// An explicitly invalid parameter.
    #[error("{0}")]
    InvalidParams(String),

    /// The simulation hit the RPC timeout and was cancelled.
    #[error("validation aborted (timeout = {0:?})")]
    Timeout(Duration),

    /// Gas estimation could not fit the transaction under the allowance.
    #[error("gas required exceeds allowance ({0})")]
    GasRequiredExceedsAllowance(u64),
}

impl From<Rip7560EthApiError> for ErrorObjectOwned {
    fn from(err: Rip7560EthApiError) -> Self {
        match &err {
            Rip7560EthApiError::Validation(validation) => ErrorObjectOwned::owned(
                EXECUTION_ERROR_CODE,
                validation.to_string(),
                validation.error_data(),
            ),
            Rip7560EthApiError::InvalidParams(message) => {
                ErrorObjectOwned::owned(INVALID_PARAMS_CODE, message.clone(), None::<String>)
            }
            Rip7560EthApiError::Args(args) => {
                ErrorObjectOwned::owned(INVALID_PARAMS_CODE, args.to_string(), None::<String>)
            }
            _ => ErrorObjectOwned::owned(SERVER_ERROR_CODE, err.to_string(), None::<String>),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rip7560_evm::{ctx::FrameOutcome, EntityName, FrameResult};

    #[test]
    fn validation_errors_carry_revert_data() {
        let result = FrameResult {
            output: alloy_primitives::Bytes::from(vec![0xde, 0xad]),
            gas_used: 1,
            outcome: FrameOutcome::Revert,
        };
        let err: Rip7560EthApiError =
            ValidationPhaseError::frame(EntityName::Account, &result).into();
        let object = ErrorObjectOwned::from(err);
        assert_eq!(object.code(), 3);
        assert!(object.data().is_some());
        assert!(object.data().unwrap().get().contains("0xdead"));
    }

    #[test]
    fn pool_errors_are_server_errors() {
        let err: Rip7560EthApiError = PoolError::PushDisabled.into();
        let object = ErrorObjectOwned::from(err);
        assert_eq!(object.code(), -32000);
    }

    #[test]
    fn invalid_params_code() {
        let err = Rip7560EthApiError::InvalidParams("submitted bundle has zero length".into());
        let object = ErrorObjectOwned::from(err);
        assert_eq!(object.code(), -32602);
    }
}
