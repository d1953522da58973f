//! Captures the single EntryPoint callback of a validation sub-frame.

use alloy_primitives::{Address, Bytes};
use parking_lot::Mutex;
use rip7560_contracts::ENTRY_POINT;
use std::sync::Arc;

use crate::{
    ctx::{EnterFn, Hook},
    error::Rip7560InvalidTransaction,
};

/// A captured call from a contract into the EntryPoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedCall {
    /// The contract that made the call; must match the entity under
    /// validation.
    pub from: Address,
    /// The callback calldata.
    pub input: Bytes,
}

#[derive(Debug, Default)]
struct Inner {
    captured: Option<CapturedCall>,
    repeated: bool,
}

/// The EntryPoint callback interceptor.
///
/// Installed as a call-entry hook for the duration of one transaction's
/// validation phase. Within one sub-frame exactly one call whose callee is
/// [`ENTRY_POINT`] may occur; a second one poisons the frame. The capture is
/// drained with [`EntryPointCall::take`] between sub-frames.
#[derive(Clone, Debug, Default)]
pub struct EntryPointCall {
    inner: Arc<Mutex<Inner>>,
}

impl EntryPointCall {
    /// Creates an empty interceptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// The enter-hook half of the interceptor, to be chained onto whatever
    /// hook the EVM already carries so observability is preserved.
    pub fn enter_fn(&self) -> EnterFn {
        let inner = self.inner.clone();
        Box::new(move |frame| {
            if frame.to != ENTRY_POINT {
                return;
            }
            let mut state = inner.lock();
            if state.captured.is_some() {
                state.repeated = true;
                return;
            }
            state.captured = Some(CapturedCall {
                from: frame.from,
                input: Bytes::copy_from_slice(frame.input),
            });
        })
    }

    /// Convenience: this interceptor layered on top of `prev`.
    pub fn hook(&self, prev: Option<Hook>) -> Hook {
        Hook::chain(prev, self.enter_fn())
    }

    /// Drains the capture at the end of a sub-frame.
    ///
    /// Errors if the frame made more than one EntryPoint call; returns
    /// `None` if it made none.
    pub fn take(&self) -> Result<Option<CapturedCall>, Rip7560InvalidTransaction> {
        let mut state = self.inner.lock();
        let repeated = std::mem::take(&mut state.repeated);
        let captured = state.captured.take();
        if repeated {
            return Err(Rip7560InvalidTransaction::RepeatedCallback);
        }
        Ok(captured)
    }
}
