//! HTTP surface: axum router and request handlers

pub mod handlers;
pub mod routes;

pub use routes::{AppState, create_router};
