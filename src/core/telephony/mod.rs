//! Carrier media stream protocol.

pub mod messages;

pub use messages::{
    MAX_TELEPHONY_FRAME_SIZE, MarkPayload, MediaPayload, StartPayload, TelephonyCommand,
    TelephonyMessage,
};
