//! Telephony media-stream WebSocket endpoint
//!
//! A carrier connects to `/media-stream`, optionally passing call options
//! as query parameters, and streams `connected`/`start`/`media`/`mark`/
//! `dtmf`/`stop` frames. Each connection gets its own bridge.

mod handler;
mod query;

pub use handler::media_stream_handler;
pub use query::MediaStreamQuery;
