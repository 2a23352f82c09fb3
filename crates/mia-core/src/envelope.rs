//! Uniform HTTP-style response envelope
//!
//! `{ "statusCode": 200 | 400, "body": "<JSON string>" }`

use crate::Match;
use serde::{Deserialize, Serialize};

/// Message attached to every successful response
pub const SUCCESS_MESSAGE: &str = "Processing complete";

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Result of a successful pipeline run
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Serialized matches (retrieval-only configuration)
    Matches(Vec<Match>),
    /// Synthesized answer (answer-synthesis configuration)
    Answer(String),
}

impl QueryOutput {
    /// Matches, when this is a retrieval-only output
    pub fn matches(&self) -> Option<&[Match]> {
        match self {
            Self::Matches(matches) => Some(matches.as_slice()),
            Self::Answer(_) => None,
        }
    }
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a [Match]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gpt_output: Option<&'a str>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Response envelope with a JSON-encoded body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl ResponseEnvelope {
    /// 200 envelope carrying `output` or `gpt_output`
    pub fn success(output: &QueryOutput) -> Self {
        let body = match output {
            QueryOutput::Matches(matches) => SuccessBody {
                message: SUCCESS_MESSAGE,
                output: Some(matches.as_slice()),
                gpt_output: None,
            },
            QueryOutput::Answer(answer) => SuccessBody {
                message: SUCCESS_MESSAGE,
                output: None,
                gpt_output: Some(answer.as_str()),
            },
        };

        match serde_json::to_string(&body) {
            Ok(body) => Self {
                status_code: STATUS_OK,
                body,
            },
            Err(e) => Self::failure(format!("Failed to serialize output: {e}")),
        }
    }

    /// 400 envelope carrying `{"error": message}`
    pub fn failure(message: impl AsRef<str>) -> Self {
        let body = serde_json::to_string(&ErrorBody {
            error: message.as_ref(),
        })
        .unwrap_or_else(|_| r#"{"error":"unknown error"}"#.to_string());

        Self {
            status_code: STATUS_BAD_REQUEST,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }

    /// Decode the body back into JSON
    pub fn body_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}
