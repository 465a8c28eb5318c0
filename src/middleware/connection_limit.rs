//! Concurrent call limit for media-stream connections
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use callbridge::middleware::call_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         call_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::errors::app_error::AppError;
use crate::state::AppState;

/// Rejects WebSocket upgrades with 503 once `max_concurrent_calls` bridges are live.
///
/// Only requests carrying an `Upgrade: websocket` header are counted; plain
/// HTTP requests pass through. This is an early rejection only; the
/// registry claims a slot atomically when the bridge is created.
pub async fn call_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade || state.registry.has_capacity() {
        return next.run(request).await;
    }

    let max = state.config.max_concurrent_calls.unwrap_or_default();
    tracing::warn!(
        live = state.registry.session_count(),
        max,
        "Rejecting media stream: call limit reached"
    );
    AppError::AtCapacity(max).into_response()
}
