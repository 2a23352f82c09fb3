//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::query;
use crate::state::AppState;
use axum::{routing::post, Router};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/query", post(query::query_handler))
        .route("/invoke", post(query::invoke_handler))
}
