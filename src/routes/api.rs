use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{calls, events};
use crate::state::AppState;
use std::sync::Arc;

/// Create the operator API router
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls", get(calls::list_calls))
        .route("/calls/{call_sid}", get(calls::get_call))
        .route("/calls/{call_sid}/context", post(calls::inject_context))
        .route("/calls/{call_sid}/message", post(calls::add_message))
        .route("/calls/{call_sid}/dtmf", post(calls::send_dtmf))
        .route("/calls/{call_sid}/hold", post(calls::hold_call))
        .route("/calls/{call_sid}/resume", post(calls::resume_call))
        .route("/calls/{call_sid}/end", post(calls::end_call))
        .route("/calls/{call_sid}/events", get(events::call_events_handler))
        .layer(TraceLayer::new_for_http())
}
