//! Telephony media-stream route
//!
//! `GET /media-stream` upgrades to the carrier's media-streaming protocol:
//! JSON frames tagged by `event`, carrying base64 µ-law audio at 8 kHz.
//!
//! # Example
//!
//! ```json
//! // Carrier sends
//! {"event": "start", "start": {"streamSid": "MZ...", "callSid": "CA...", "customParameters": {"voice": "coral"}}}
//! {"event": "media", "media": {"payload": "//7+/w==", "timestamp": "20"}}
//!
//! // Server sends agent audio and playback marks
//! {"event": "media", "streamSid": "MZ...", "media": {"payload": "..."}}
//! {"event": "mark", "streamSid": "MZ...", "mark": {"name": "response-part-1"}}
//! ```

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::media_stream::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream router
///
/// The call limit middleware is applied in [`super::create_app`] once state is available.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/media-stream", get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
