//! Request counting middleware
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Count every request except the health endpoints
pub async fn count_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !is_health_route(request.uri().path()) {
        state.increment_requests();
    }
    next.run(request).await
}

fn is_health_route(path: &str) -> bool {
    matches!(path, "/health" | "/ready" | "/metrics")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_health_route() {
        assert!(is_health_route("/health"));
        assert!(is_health_route("/metrics"));
        assert!(!is_health_route("/api/v1/query"));
    }
}
