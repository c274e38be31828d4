//! Conversational sessions
//!
//! - `AssistantSession`: backend handle, model id, tool bindings and bounded history
//! - `SessionCache`: sessions keyed by `SessionKey`, invalidated on model change or
//!   when a debug context ends
//! - `ToolBinding`: per-capability prompt enrichment

pub mod assistant;
pub mod cache;
pub mod tools;

pub use assistant::{AssistantSession, Prompt, SessionInfo};
pub use cache::SessionCache;
pub use tools::ToolBinding;
