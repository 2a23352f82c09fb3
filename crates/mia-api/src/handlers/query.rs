//! Query handlers
//!
//! Both endpoints feed the same pipeline. `/query` takes the request object
//! as the raw body; `/invoke` takes a function-style event and answers with
//! the envelope itself.
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mia_core::{MiaError, RawRequest, ResponseEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

/// Query request body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryBody {
    /// Text to search for
    #[schema(example = "ice cream")]
    pub query_text: Option<String>,

    /// Legacy alias for `query_text`
    pub input_text: Option<String>,

    /// Metadata filter, passed to the index unchanged
    #[schema(value_type = Option<Object>, example = json!({"source": "recording"}))]
    pub query_filter: Option<Value>,

    /// Number of matches, as an integer or a numeric string
    #[schema(value_type = Option<u64>, example = 3)]
    pub query_top_k: Option<Value>,

    /// Log each match server-side ("true" in any case)
    #[schema(value_type = Option<String>, example = "true")]
    pub show_log: Option<Value>,
}

/// Decoded success or error body carried by the envelope
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    /// "Processing complete" on success
    pub message: Option<String>,
    /// Matches (retrieval only)
    #[schema(value_type = Option<Vec<Object>>)]
    pub output: Option<Value>,
    /// Synthesized answer
    pub gpt_output: Option<String>,
    /// Error message on failure
    pub error: Option<String>,
}

/// Function-style event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvokeEvent {
    /// JSON string or object holding a `QueryBody`
    #[schema(value_type = Object)]
    pub body: Value,
}

/// Response envelope
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    #[serde(rename = "statusCode")]
    #[schema(example = 200)]
    pub status_code: u16,
    /// JSON-encoded `QueryResult`
    pub body: String,
}

fn status_of(envelope: &ResponseEnvelope) -> StatusCode {
    StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::BAD_REQUEST)
}

/// Run a query; the response body is the envelope's body
#[utoipa::path(
    post,
    path = "/api/v1/query",
    tag = "query",
    request_body = QueryBody,
    responses(
        (status = 200, description = "Query processed", body = QueryResult),
        (status = 400, description = "Malformed request or provider failure", body = QueryResult)
    )
)]
pub async fn query_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let envelope = match decode_body(body) {
        Ok(raw) => state.pipeline.handle(raw).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected query body");
            ResponseEnvelope::failure(e.to_string())
        }
    };

    (
        status_of(&envelope),
        [(header::CONTENT_TYPE, "application/json")],
        envelope.body,
    )
        .into_response()
}

/// Run a query from an event; the response body is the envelope itself
#[utoipa::path(
    post,
    path = "/api/v1/invoke",
    tag = "query",
    request_body = InvokeEvent,
    responses(
        (status = 200, description = "Query processed", body = Envelope),
        (status = 400, description = "Malformed event or provider failure", body = Envelope)
    )
)]
pub async fn invoke_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let envelope = match parse_event(&body) {
        Ok(raw) => state.pipeline.handle(raw).await,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected event");
            ResponseEnvelope::failure(e.to_string())
        }
    };

    (status_of(&envelope), Json(envelope)).into_response()
}

fn decode_body(body: Bytes) -> mia_core::Result<RawRequest> {
    String::from_utf8(body.to_vec())
        .map(RawRequest::Text)
        .map_err(|e| MiaError::MalformedRequest(format!("body is not UTF-8: {e}")))
}

fn parse_event(body: &[u8]) -> mia_core::Result<RawRequest> {
    let event: Value = serde_json::from_slice(body)
        .map_err(|e| MiaError::MalformedRequest(format!("invalid event JSON: {e}")))?;
    RawRequest::from_event(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_shapes() {
        assert_eq!(
            parse_event(br#"{"body": "{\"query_text\": \"x\"}"}"#).unwrap(),
            RawRequest::Text(r#"{"query_text": "x"}"#.to_string())
        );
        assert!(matches!(
            parse_event(br#"{"query_text": "x"}"#).unwrap(),
            RawRequest::Object(_)
        ));
        assert!(matches!(
            parse_event(b"not json"),
            Err(MiaError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_decode_body_rejects_invalid_utf8() {
        assert_eq!(
            decode_body(Bytes::from_static(b"{}")).unwrap(),
            RawRequest::Text("{}".to_string())
        );

        let err = decode_body(Bytes::from_static(&[0xff, 0xfe])).unwrap_err();
        assert!(matches!(err, MiaError::MalformedRequest(_)));
        assert!(err.to_string().starts_with("Malformed request: body is not UTF-8"));
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of(&ResponseEnvelope::failure("x")), StatusCode::BAD_REQUEST);
    }
}
