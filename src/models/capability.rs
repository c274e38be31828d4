use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool integration enabled for a conversational session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Plain conversation with the model, no tools.
    Chat,
    /// Project context from the knowledge-retrieval backend.
    Project,
    /// Declaration lookups through the code-structure service.
    Structure,
    /// Interactive debugger state; needs a debug session id.
    Debug,
}

impl Capability {
    pub fn tag(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Project => "project",
            Capability::Structure => "structure",
            Capability::Debug => "debug",
        }
    }

    /// Whether sessions with this capability must be scoped by a context id.
    pub fn needs_context(&self) -> bool {
        matches!(self, Capability::Debug)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
