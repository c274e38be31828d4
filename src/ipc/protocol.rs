//! Request/reply frames
//!
//! Structured requests and every reply travel as one JSON object per line. Legacy
//! command lines are recognised by not starting with `{`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRequest {
    /// Command word, e.g. "CODE"
    #[serde(rename = "DO")]
    pub command: String,

    /// Flag string using the legacy option grammar
    #[serde(rename = "OPTIONS", default, skip_serializing_if = "Option::is_none")]
    pub options: Option<String>,

    /// Caller-chosen request id
    #[serde(rename = "RID", default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,

    /// Literal command text
    #[serde(rename = "BODY", default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl StructuredRequest {
    /// Try to read a structured frame from a raw inbound line.
    ///
    /// Returns `None` for legacy command lines.
    pub fn from_line(line: &str) -> Option<Result<Self, serde_json::Error>> {
        if line.trim_start().starts_with('{') {
            Some(serde_json::from_str(line))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Final successful result
    Ok,
    /// Background command accepted; result follows under the same RID
    Accepted,
    /// Final failure
    Error,
}

/// Reply frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "STATUS")]
    pub status: ReplyStatus,

    #[serde(rename = "RID", default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,

    #[serde(rename = "RESULT", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(rename = "CODE", default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(rename = "MESSAGE", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Reply {
    /// Immediate successful reply
    pub fn success(result: Value) -> Self {
        Self {
            status: ReplyStatus::Ok,
            rid: None,
            result: Some(result),
            code: None,
            message: None,
        }
    }

    /// First reply of a background command
    pub fn accepted(rid: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Accepted,
            rid: Some(rid.into()),
            result: None,
            code: None,
            message: None,
        }
    }

    /// Error reply
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            rid: None,
            result: None,
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }

    /// Tag a reply with the request id it answers
    pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
        self.rid = Some(rid.into());
        self
    }

    pub fn is_final(&self) -> bool {
        self.status != ReplyStatus::Accepted
    }

    pub fn to_line(&self) -> String {
        // A Reply only holds strings and JSON values, so serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"STATUS":"error","CODE":"{}","MESSAGE":"{}"}}"#,
                error_codes::INTERNAL_ERROR,
                e
            )
        })
    }
}

/// Error code constants
pub mod error_codes {
    /// Command line could not be parsed
    pub const PARSE_ERROR: &str = "PARSE_ERROR";

    /// Command word not recognised
    pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

    /// Missing or malformed option
    pub const INVALID_OPTIONS: &str = "INVALID_OPTIONS";

    /// Caller-supplied RID already outstanding
    pub const DUPLICATE_RID: &str = "DUPLICATE_RID";

    /// Backend rejected the request
    pub const BACKEND_ERROR: &str = "BACKEND_ERROR";

    /// Backend did not answer in time
    pub const TIMEOUT: &str = "TIMEOUT";

    /// Transport failure talking to a collaborator
    pub const IO_ERROR: &str = "IO_ERROR";

    /// Work was interrupted
    pub const INTERRUPTED: &str = "INTERRUPTED";

    /// Anything else
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}
