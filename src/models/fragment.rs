use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FragmentKind {
    Code,
    Plain,
    Doc,
}

/// A piece of model output selected by the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFragment {
    pub kind: FragmentKind,
    /// Position of the piece among the version-split pieces of its fence.
    pub version: usize,
    pub text: String,
}

impl ExtractedFragment {
    pub fn new(kind: FragmentKind, version: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            version,
            text: text.into(),
        }
    }
}
