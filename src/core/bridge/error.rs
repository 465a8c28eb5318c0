use thiserror::Error;

use crate::core::call::TrackerError;
use crate::core::realtime::RealtimeError;

/// Errors raised while creating or steering a bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend session could not be opened
    #[error("Backend error: {0}")]
    Backend(#[from] RealtimeError),

    /// A status change was rejected by the tracker
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// The telephony `start` frame has not arrived yet
    #[error("Call has not started")]
    NotStarted,

    /// Resume requested for a call that is not on hold
    #[error("Call is not on hold")]
    NotOnHold,

    /// The bridge reactor has already finished
    #[error("Bridge is no longer running")]
    Closed,

    /// No bridge is registered under the given id
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A dial string contains characters outside the keypad set
    #[error("Invalid DTMF digits: {0}")]
    InvalidDigits(String),

    /// The concurrent call limit is reached
    #[error("Call capacity reached ({0} calls)")]
    AtCapacity(usize),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
