//! Model backend integration
//!
//! This module provides:
//! - `ModelBackend` and the tool service traits the sessions call through
//! - `OllamaClient`: HTTP client for an Ollama-compatible server
//! - `extract_code` / `extract_doc`: fragment extraction from raw model output
//! - `BackendError`: error types for backend operations

pub mod backend;
pub mod error;
pub mod extractor;
pub mod ollama;

pub use backend::{
    ChunkCallback, CodeStructureService, DebugInfoService, GenerateRequest, ModelBackend,
    RetrievalBackend,
};
pub use error::BackendError;
pub use extractor::{extract_code, extract_doc};
pub use ollama::OllamaClient;
