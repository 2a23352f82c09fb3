//! Request normalization
//!
//! Every entry point (HTTP body, Lambda-style event, CLI) funnels into
//! [`normalize`], which turns a loosely shaped payload into a
//! [`QueryRequest`] with defaults applied and types coerced.

use crate::config::RagConfig;
use crate::{MiaError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Field carrying the query text
pub const QUERY_TEXT_FIELD: &str = "query_text";
/// Legacy alias for the query text
pub const INPUT_TEXT_FIELD: &str = "input_text";
/// Field carrying the metadata filter
pub const QUERY_FILTER_FIELD: &str = "query_filter";
/// Field carrying the result count
pub const QUERY_TOP_K_FIELD: &str = "query_top_k";
/// Field toggling per-match logging
pub const SHOW_LOG_FIELD: &str = "show_log";

/// Inbound payload before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawRequest {
    /// JSON-encoded body
    Text(String),
    /// Already decoded body
    Object(Map<String, Value>),
}

impl RawRequest {
    /// Extract the request body from a Lambda / API Gateway style event
    ///
    /// Objects carrying a `body` key are unwrapped; anything else is
    /// treated as the body itself.
    pub fn from_event(event: Value) -> Result<Self> {
        match event {
            Value::Object(mut map) => match map.remove("body") {
                Some(Value::String(body)) => Ok(Self::Text(body)),
                Some(Value::Object(body)) => Ok(Self::Object(body)),
                Some(Value::Null) => Ok(Self::Object(Map::new())),
                Some(other) => Err(MiaError::MalformedRequest(format!(
                    "event body must be a string or an object, got {}",
                    json_type(&other)
                ))),
                None => Ok(Self::Object(map)),
            },
            Value::String(body) => Ok(Self::Text(body)),
            other => Err(MiaError::MalformedRequest(format!(
                "event must be an object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Decode into a JSON object
    pub fn into_object(self) -> Result<Map<String, Value>> {
        match self {
            Self::Object(map) => Ok(map),
            Self::Text(text) => {
                let value: Value = serde_json::from_str(&text)
                    .map_err(|e| MiaError::MalformedRequest(format!("invalid JSON body: {e}")))?;
                match value {
                    Value::Object(map) => Ok(map),
                    other => Err(MiaError::MalformedRequest(format!(
                        "request body must be a JSON object, got {}",
                        json_type(&other)
                    ))),
                }
            }
        }
    }
}

impl From<String> for RawRequest {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawRequest {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Map<String, Value>> for RawRequest {
    fn from(map: Map<String, Value>) -> Self {
        Self::Object(map)
    }
}

/// Validated query request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    /// Text to embed (may be empty)
    pub text: String,

    /// Number of matches to request (always >= 1)
    pub top_k: usize,

    /// Provider-defined metadata filter; empty means no filtering
    pub filter: Map<String, Value>,

    /// Log each match when set
    pub show_log: bool,
}

impl QueryRequest {
    /// Create a request with default top-k, no filter and logging off
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: RagConfig::default().default_top_k,
            filter: Map::new(),
            show_log: false,
        }
    }

    /// Set top-k
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the metadata filter
    pub fn with_filter(mut self, filter: Map<String, Value>) -> Self {
        self.filter = filter;
        self
    }

    /// Filter expression to hand to the index, `None` when empty
    pub fn filter_expression(&self) -> Option<Value> {
        if self.filter.is_empty() {
            None
        } else {
            Some(Value::Object(self.filter.clone()))
        }
    }
}

/// Normalize a raw payload into a [`QueryRequest`]
pub fn normalize(raw: RawRequest, defaults: &RagConfig) -> Result<QueryRequest> {
    let body = raw.into_object()?;

    let text = extract_text(&body, &defaults.default_query_text)?;
    let filter = extract_filter(&body)?;
    let top_k = match body.get(QUERY_TOP_K_FIELD) {
        None | Some(Value::Null) => defaults.default_top_k,
        Some(value) => coerce_top_k(value)?,
    };
    let show_log = body.get(SHOW_LOG_FIELD).map(parse_flag).unwrap_or(false);

    Ok(QueryRequest {
        text,
        top_k,
        filter,
        show_log,
    })
}

fn extract_text(body: &Map<String, Value>, default: &str) -> Result<String> {
    for field in [QUERY_TEXT_FIELD, INPUT_TEXT_FIELD] {
        match body.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) => return Ok(text.clone()),
            Some(other) => {
                return Err(MiaError::MalformedRequest(format!(
                    "{field} must be a string, got {}",
                    json_type(other)
                )))
            }
        }
    }
    Ok(default.to_string())
}

fn extract_filter(body: &Map<String, Value>) -> Result<Map<String, Value>> {
    match body.get(QUERY_FILTER_FIELD) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(filter)) => Ok(filter.clone()),
        Some(other) => Err(MiaError::MalformedRequest(format!(
            "{QUERY_FILTER_FIELD} must be an object, got {}",
            json_type(other)
        ))),
    }
}

/// Coerce a JSON value into a positive result count
///
/// Integers pass through, floats truncate toward zero and strings are
/// parsed as base-10 integers. There is no upper bound.
pub fn coerce_top_k(value: &Value) -> Result<usize> {
    let parsed: i128 = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i as i128
            } else if let Some(u) = n.as_u64() {
                u as i128
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() => f.trunc() as i128,
                    _ => return Err(invalid_top_k(value)),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i128>().map_err(|_| invalid_top_k(value))?,
        _ => return Err(invalid_top_k(value)),
    };

    if parsed < 1 {
        return Err(MiaError::MalformedRequest(format!(
            "{QUERY_TOP_K_FIELD} must be at least 1, got {parsed}"
        )));
    }

    usize::try_from(parsed).map_err(|_| invalid_top_k(value))
}

fn invalid_top_k(value: &Value) -> MiaError {
    MiaError::MalformedRequest(format!(
        "{QUERY_TOP_K_FIELD} must be an integer, got {value}"
    ))
}

/// Interpret a loosely typed flag
///
/// Only the string form `"true"` (any case) or a JSON `true` enables it.
pub fn parse_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
