//! Reply formatting
//!
//! Turns command outcomes and front-end failures into reply frames.

use crate::cli::parser::ParseError;
use crate::engine::CommandResult;
use crate::ipc::protocol::{error_codes, Reply};
use serde_json::Value;

/// Reply for a finished command instance
pub fn format_result(result: &CommandResult) -> Reply {
    match result {
        CommandResult::Success(value) => Reply::success(value.clone()),
        CommandResult::Failure(error) => Reply::error(error.code(), error.to_string()),
    }
}

pub fn format_pong() -> Reply {
    Reply::success(Value::String("PONG".to_string()))
}

pub fn format_parse_error(error: &ParseError) -> Reply {
    Reply::error(error_codes::PARSE_ERROR, error.to_string())
}

pub fn format_malformed_frame(error: &serde_json::Error) -> Reply {
    Reply::error(
        error_codes::PARSE_ERROR,
        format!("Malformed request frame: {}", error),
    )
}

pub fn format_unknown_command(word: &str) -> Reply {
    Reply::error(
        error_codes::UNKNOWN_COMMAND,
        format!("Unknown command: {}", word),
    )
}

pub fn format_invalid_options(message: impl Into<String>) -> Reply {
    Reply::error(error_codes::INVALID_OPTIONS, message)
}

pub fn format_duplicate_rid(rid: &str) -> Reply {
    Reply::error(
        error_codes::DUPLICATE_RID,
        format!("Request id {} is already outstanding", rid),
    )
}

pub fn format_internal_error(message: impl Into<String>) -> Reply {
    Reply::error(error_codes::INTERNAL_ERROR, message)
}
