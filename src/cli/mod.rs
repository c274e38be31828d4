//! Command front-end
//!
//! Parses protocol lines into command specs, runs the per-command work and formats
//! the outcome as reply frames.

pub mod handler;
pub mod output;
pub mod parser;

pub use handler::execute;
pub use output::format_result;
pub use parser::{parse_command_line, parse_request, ParseError};
