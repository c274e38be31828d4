use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Terminator word used when the command line does not name one.
pub const DEFAULT_TERMINATOR: &str = "END";

/// How the dispatcher schedules a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Answered on the spot, no command instance involved.
    Immediate,
    /// Runs to completion on the listener before the reply is sent.
    Sync,
    /// Runs on its own task; the reply is correlated by request id.
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    Ping,
    Models,
    Model,
    Sessions,
    Forget,
    Generate,
    Code,
    Doc,
    Ask,
    Debug,
    Unknown(String),
}

impl CommandKind {
    /// Case-folds a command word to its kind.
    pub fn from_word(word: &str) -> Self {
        match word.to_ascii_uppercase().as_str() {
            "PING" => Self::Ping,
            "MODELS" => Self::Models,
            "MODEL" => Self::Model,
            "SESSIONS" => Self::Sessions,
            "FORGET" => Self::Forget,
            "GENERATE" => Self::Generate,
            "CODE" => Self::Code,
            "DOC" => Self::Doc,
            "ASK" => Self::Ask,
            "DEBUG" => Self::Debug,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn word(&self) -> &str {
        match self {
            Self::Ping => "PING",
            Self::Models => "MODELS",
            Self::Model => "MODEL",
            Self::Sessions => "SESSIONS",
            Self::Forget => "FORGET",
            Self::Generate => "GENERATE",
            Self::Code => "CODE",
            Self::Doc => "DOC",
            Self::Ask => "ASK",
            Self::Debug => "DEBUG",
            Self::Unknown(word) => word,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Ping | Self::Unknown(_) => ExecutionMode::Immediate,
            Self::Models | Self::Model | Self::Sessions | Self::Forget => ExecutionMode::Sync,
            Self::Generate | Self::Code | Self::Doc | Self::Ask | Self::Debug => {
                ExecutionMode::Background
            }
        }
    }

    /// Whether the command reads a multi-line body after its command line.
    pub fn takes_body(&self) -> bool {
        matches!(self.mode(), ExecutionMode::Background)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.word())
    }
}

/// Parsed form of one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub kind: CommandKind,
    pub options: BTreeMap<String, String>,
    pub terminator: String,
    pub blank_line_terminates: bool,
    pub first_line: Option<String>,
}

impl CommandSpec {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            options: BTreeMap::new(),
            terminator: DEFAULT_TERMINATOR.to_string(),
            blank_line_terminates: false,
            first_line: None,
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Flag-style options (`-raw`) are present with an empty value.
    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.option(key), Some(v) if v.is_empty() || v.eq_ignore_ascii_case("true"))
    }

    /// Whether `line` ends body collection for this spec.
    ///
    /// The terminator word and the blank-line flag are independent: either one ends
    /// collection, regardless of their order on the command line.
    pub fn is_terminator(&self, line: &str) -> bool {
        line == self.terminator || (self.blank_line_terminates && line.is_empty())
    }

    /// Canonical command line that parses back to an equal spec.
    pub fn to_command_line(&self) -> String {
        let mut parts = vec![self.kind.word().to_string()];
        for (key, value) in &self.options {
            // `-b` alone is the blank-line flag, so an empty `b` option keeps its `=`.
            if value.is_empty() && key != "b" {
                parts.push(format!("-{}", key));
            } else {
                parts.push(format!("-{}={}", key, value));
            }
        }
        if self.blank_line_terminates {
            parts.push("-b".to_string());
        }
        parts.push(self.terminator.clone());
        if let Some(first) = &self.first_line {
            parts.push("--".to_string());
            parts.push(first.clone());
        }
        parts.join(" ")
    }
}
