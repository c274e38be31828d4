//! Command line parsing
//!
//! Turns one protocol line into a [`CommandSpec`]:
//!
//! ```text
//! <COMMAND> [-key[=value]]... [-b] [<terminator>] [-- <first body line>]
//! ```
//!
//! The scan is a small state machine (START → OPTIONS → COMMITTED) that consumes one
//! whitespace-delimited token per transition.

use crate::ipc::protocol::StructuredRequest;
use crate::models::{CommandKind, CommandSpec};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no command word in line")]
    MissingCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Waiting for the command word.
    Start,
    /// Reading options until a terminator word or `--`.
    Options,
    /// Terminator chosen; remaining text belongs to the first body line.
    Committed,
}

/// Whitespace tokenizer that remembers byte offsets so the rest of the line can be
/// taken verbatim.
struct Tokens<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn next_token(&mut self) -> Option<(usize, &'a str)> {
        let rest = &self.line[self.pos..];
        let skipped = rest.len() - rest.trim_start().len();
        let start = self.pos + skipped;
        if start >= self.line.len() {
            self.pos = self.line.len();
            return None;
        }

        let tail = &self.line[start..];
        let len = tail.find(char::is_whitespace).unwrap_or(tail.len());
        self.pos = start + len;
        Some((start, &self.line[start..start + len]))
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }
}

fn literal_line(text: &str) -> Option<String> {
    let text = text.trim_start();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Parse one command line.
///
/// Returns `ParseError::MissingCommand` when the line holds no command word.
pub fn parse_command_line(line: &str) -> Result<CommandSpec, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut tokens = Tokens::new(line);
    let mut spec = CommandSpec::new(CommandKind::Unknown(String::new()));
    let mut explicit_terminator = false;
    let mut state = ScanState::Start;

    while let Some((start, token)) = tokens.next_token() {
        state = match (state, token) {
            (ScanState::Start, word) => {
                spec.kind = CommandKind::from_word(word);
                ScanState::Options
            }
            (current, "-b") => {
                spec.blank_line_terminates = true;
                current
            }
            (_, "--") => {
                spec.first_line = literal_line(tokens.rest());
                if !explicit_terminator {
                    // Nothing else could end the body.
                    spec.blank_line_terminates = true;
                }
                break;
            }
            (ScanState::Options, option) if option.starts_with('-') => {
                let (key, value) = split_option(option);
                spec.options.insert(key, value);
                ScanState::Options
            }
            (ScanState::Options, word) => {
                spec.terminator = word.to_string();
                explicit_terminator = true;
                ScanState::Committed
            }
            (ScanState::Committed, _) => {
                spec.first_line = literal_line(&line[start..]);
                break;
            }
        };
    }

    if state == ScanState::Start {
        return Err(ParseError::MissingCommand);
    }
    Ok(spec)
}

/// Split `-key=value` into its parts; `-flag` yields an empty value.
fn split_option(token: &str) -> (String, String) {
    let body = token.trim_start_matches('-');
    match body.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (body.to_string(), String::new()),
    }
}

/// Build a spec from a structured request frame.
///
/// `OPTIONS` follows the same token grammar as the legacy line; the body travels
/// separately so no terminator is involved.
pub fn parse_request(request: &StructuredRequest) -> Result<CommandSpec, ParseError> {
    if request.command.trim().is_empty() {
        return Err(ParseError::MissingCommand);
    }

    let line = match request.options.as_deref() {
        Some(options) if !options.trim().is_empty() => {
            format!("{} {}", request.command.trim(), options.trim())
        }
        _ => request.command.trim().to_string(),
    };
    parse_command_line(&line)
}
