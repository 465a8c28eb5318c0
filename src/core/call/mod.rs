//! Call-level data: per-call state, the external call tracker, the event
//! stream and inline agent commands.

pub mod commands;
pub mod events;
pub mod state;
pub mod tracker;

pub use commands::{AgentCommand, detect_command};
pub use events::{CallEvent, CallEventBus, TranscriptTag};
pub use state::{
    CallOptions, CallState, CallType, ConversationMessage, DiagnosticEntry, LogSide, Role,
};
pub use tracker::{ActiveCall, CallStatus, CallTracker, TrackerError, TrackerResult};
