//! Tool bindings
//!
//! A session carries one binding per capability that has a service behind it. Before
//! each question, every binding contributes a context section to the prompt.

use crate::llm::{BackendError, CodeStructureService, DebugInfoService, RetrievalBackend};
use crate::models::Capability;
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Most declarations looked up per question.
const MAX_DECLARATIONS: usize = 4;

/// Debugger queries run for every question in a debug session.
const DEBUG_QUERIES: [&str; 2] = ["stack", "locals"];

fn qualified_name_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*(?:(?:\.|::)[A-Za-z_][A-Za-z0-9_]*)+\b")
            .expect("qualified name regex must compile")
    })
}

/// Dotted or path-separated identifiers mentioned in `text`, deduplicated in order.
pub fn qualified_names(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for m in qualified_name_regex().find_iter(text) {
        if !names.contains(&m.as_str()) {
            names.push(m.as_str());
        }
    }
    names
}

#[derive(Clone)]
pub enum ToolBinding {
    ProjectRetrieval(Arc<dyn RetrievalBackend>),
    StructureLookup(Arc<dyn CodeStructureService>),
    DebugQuery {
        service: Arc<dyn DebugInfoService>,
        session_id: String,
    },
}

impl std::fmt::Debug for ToolBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolBinding::ProjectRetrieval(_) => f.write_str("ProjectRetrieval"),
            ToolBinding::StructureLookup(_) => f.write_str("StructureLookup"),
            ToolBinding::DebugQuery { session_id, .. } => {
                write!(f, "DebugQuery({})", session_id)
            }
        }
    }
}

impl ToolBinding {
    pub fn capability(&self) -> Capability {
        match self {
            ToolBinding::ProjectRetrieval(_) => Capability::Project,
            ToolBinding::StructureLookup(_) => Capability::Structure,
            ToolBinding::DebugQuery { .. } => Capability::Debug,
        }
    }

    /// Context section for `question`, or `None` when the tool found nothing.
    pub async fn context_for(&self, question: &str) -> Result<Option<String>, BackendError> {
        match self {
            ToolBinding::ProjectRetrieval(retrieval) => {
                let documents = retrieval.retrieve(question).await?;
                if documents.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "Relevant project excerpts:\n{}",
                    documents.join("\n---\n")
                )))
            }
            ToolBinding::StructureLookup(structure) => {
                let mut found = Vec::new();
                for name in qualified_names(question).into_iter().take(MAX_DECLARATIONS) {
                    if let Some(declaration) = structure.find_declaration(name).await? {
                        found.push(format!("// {}\n{}", name, declaration));
                    }
                }
                if found.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!("Declarations:\n{}", found.join("\n\n"))))
            }
            ToolBinding::DebugQuery {
                service,
                session_id,
            } => {
                let mut sections = Vec::new();
                for command in DEBUG_QUERIES {
                    if let Some(value) = service.query(session_id, command, &[]).await? {
                        sections.push(format!("{}: {}", command, value));
                    }
                }
                if sections.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "Debugger state ({}):\n{}",
                    session_id,
                    sections.join("\n")
                )))
            }
        }
    }
}
