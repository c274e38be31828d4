//! Collaborator traits
//!
//! The assistant never computes completions, ranks documents or walks syntax trees
//! itself. It reaches those through the traits below, which keeps the command engine
//! testable with in-memory fakes.

use super::error::BackendError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Streaming callback invoked with each partial chunk of generated text.
pub type ChunkCallback = dyn Fn(&str) + Send + Sync;

/// One completion request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Skip the backend's prompt template
    pub raw: bool,
    /// Backend generation options (temperature, seed, ...)
    pub options: Map<String, Value>,
    pub system: Option<String>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// Generative model backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a completion, forwarding partial chunks to `on_chunk` when given.
    ///
    /// Returns the full generated text.
    async fn generate(
        &self,
        request: &GenerateRequest,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError>;

    /// Names of the models the backend can serve.
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;
}

/// Knowledge retrieval over the current project.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, BackendError>;
}

/// Structural code lookups.
#[async_trait]
pub trait CodeStructureService: Send + Sync {
    /// Source text of the declaration named `qualified_name`, if known.
    async fn find_declaration(&self, qualified_name: &str)
        -> Result<Option<String>, BackendError>;
}

/// Debugger bridge, addressed by debug session id.
#[async_trait]
pub trait DebugInfoService: Send + Sync {
    async fn query(
        &self,
        session_id: &str,
        command: &str,
        args: &[String],
    ) -> Result<Option<Value>, BackendError>;
}
