//! Per-call bridge between the telephony media stream and the realtime backend.

mod connection;
mod error;
mod protocol;

pub use connection::ConnectionHandle;
pub use error::{BridgeError, BridgeResult};
pub use protocol::{
    BridgeCommand, BridgeOutcome, BridgeSettings, DEFAULT_PAUSE_MS, DEFAULT_TONE_MS, Flow,
    ProtocolBridge,
};
