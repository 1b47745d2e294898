//! Transfer error types

use thiserror::Error;

/// Errors surfaced by the async transfer layer
///
/// Native status codes are passed through for caller inspection and are not
/// interpreted further here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The native engine returned no descriptor (e.g. out of memory)
    #[error("Native transfer allocation failed")]
    AllocationFailed,

    /// Operation attempted on a transfer that is not in the registry
    ///
    /// Indicates a state-machine misuse: the transfer was never allocated
    /// through the manager, or was already cancelled or freed.
    #[error("Transfer is not registered; allocate it before filling")]
    NotRegistered,

    /// A handle was registered twice
    ///
    /// Defensive invariant check in the registry; should never surface under
    /// a correct allocation path.
    #[error("Transfer handle is already registered")]
    DuplicateHandle,

    /// The native engine rejected the submission
    #[error("Transfer submission failed with native code {0}")]
    SubmissionFailed(i32),

    /// The native engine rejected the cancel request
    ///
    /// The transfer is de-registered regardless: the registry state, not the
    /// native call outcome, is what the completion race depends on.
    #[error("Transfer cancellation failed with native code {0}")]
    CancelFailed(i32),
}

/// Type alias for transfer results
pub type Result<T> = std::result::Result<T, TransferError>;
