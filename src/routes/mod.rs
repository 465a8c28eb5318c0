//! Route configuration
//!
//! - `api` - operator REST API and call event streams
//! - `media` - telephony media-stream WebSocket

pub mod api;
pub mod media;

use axum::{Router, middleware, routing::get};
use std::sync::Arc;

use crate::handlers::api::health_check;
use crate::middleware::call_limit_middleware;
use crate::state::AppState;

/// Assemble every route with its middleware and bind the state.
pub fn create_app(state: Arc<AppState>) -> Router {
    let media_routes = media::create_media_router().layer(middleware::from_fn_with_state(
        state.clone(),
        call_limit_middleware,
    ));

    Router::new()
        .route("/", get(health_check))
        .merge(api::create_api_router())
        .merge(media_routes)
        .with_state(state)
}
