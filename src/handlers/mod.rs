//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `calls` - Operator REST API for live calls
//! - `events` - Per-call event stream WebSocket
//! - `media_stream` - Telephony media-stream WebSocket

pub mod api;
pub mod calls;
pub mod events;
pub mod media_stream;

// Re-export commonly used handlers for convenient access
pub use events::call_events_handler;
pub use media_stream::media_stream_handler;
