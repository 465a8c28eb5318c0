//! Error types returned by the HTTP layer.

pub mod app_error;
