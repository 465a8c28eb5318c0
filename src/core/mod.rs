pub mod audio;
pub mod bridge;
pub mod call;
pub mod realtime;
pub mod session;
pub mod telephony;

// Re-export commonly used types for convenience
pub use bridge::{BridgeCommand, BridgeError, BridgeOutcome, BridgeResult, BridgeSettings};
pub use call::{CallEvent, CallEventBus, CallOptions, CallStatus, CallTracker, CallType};
pub use realtime::{BackendConnector, OpenAIRealtimeConnector, RealtimeConfig, RealtimeError};
pub use session::{BridgeHandle, SessionKey, SessionRegistry, TelephonyLink};
