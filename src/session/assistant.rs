//! Conversational session
//!
//! A session pins the backend handle and model id that were current when it was
//! built, the tool bindings its capability set asked for, and a bounded history of
//! previous question/answer turns.

use super::tools::ToolBinding;
use crate::llm::{BackendError, ChunkCallback, GenerateRequest, ModelBackend};
use crate::models::SessionKey;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    question: String,
    answer: String,
}

/// One question put to a session
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub text: String,
    /// Send `text` untouched: no tool context, no history, no template
    pub raw: bool,
    pub system: Option<String>,
    pub options: Map<String, Value>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Summary of a cached session for `SESSIONS` replies
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub key: String,
    pub model: String,
    pub tools: Vec<String>,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
}

pub struct AssistantSession {
    key: SessionKey,
    backend: Arc<dyn ModelBackend>,
    model: String,
    tools: Vec<ToolBinding>,
    history: Mutex<VecDeque<Turn>>,
    history_turns: usize,
    created_at: DateTime<Utc>,
}

impl AssistantSession {
    pub fn new(
        key: SessionKey,
        backend: Arc<dyn ModelBackend>,
        model: impl Into<String>,
        tools: Vec<ToolBinding>,
        history_turns: usize,
    ) -> Self {
        Self {
            key,
            backend,
            model: model.into(),
            tools,
            history: Mutex::new(VecDeque::new()),
            history_turns,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &[ToolBinding] {
        &self.tools
    }

    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            key: self.key.to_string(),
            model: self.model.clone(),
            tools: self
                .tools
                .iter()
                .map(|t| t.capability().tag().to_string())
                .collect(),
            turns: self.history.lock().await.len(),
            created_at: self.created_at,
        }
    }

    /// Ask the backend and return the raw answer text.
    ///
    /// Tool failures only drop that tool's context section.
    pub async fn ask(
        &self,
        prompt: &Prompt,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError> {
        let text = if prompt.raw {
            prompt.text.clone()
        } else {
            self.compose(&prompt.text).await
        };

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: text,
            raw: prompt.raw,
            options: prompt.options.clone(),
            system: prompt.system.clone(),
        };

        log::debug!(
            "Session {} asking {} ({} chars)",
            self.key,
            self.model,
            request.prompt.len()
        );
        let answer = self.backend.generate(&request, on_chunk).await?;

        if !prompt.raw && self.history_turns > 0 {
            let mut history = self.history.lock().await;
            history.push_back(Turn {
                question: prompt.text.clone(),
                answer: answer.clone(),
            });
            while history.len() > self.history_turns {
                history.pop_front();
            }
        }

        Ok(answer)
    }

    async fn compose(&self, question: &str) -> String {
        let mut sections = Vec::new();

        for tool in &self.tools {
            match tool.context_for(question).await {
                Ok(Some(section)) => sections.push(section),
                Ok(None) => {}
                Err(e) => log::warn!("{:?} tool failed for session {}: {}", tool, self.key, e),
            }
        }

        let history = self.history.lock().await;
        for turn in history.iter() {
            sections.push(format!("Q: {}\nA: {}", turn.question, turn.answer));
        }
        drop(history);

        sections.push(format!("Q: {}\nA:", question));
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::RetrievalBackend;
    use crate::models::Capability;
    use async_trait::async_trait;

    /// Echoes the prompt it was given and records every request.
    #[derive(Default)]
    struct EchoBackend {
        seen: std::sync::Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl ModelBackend for EchoBackend {
        async fn generate(
            &self,
            request: &GenerateRequest,
            _on_chunk: Option<&ChunkCallback>,
        ) -> Result<String, BackendError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(format!("echo:{}", request.prompt.len()))
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec![])
        }
    }

    struct FailingRetrieval;

    #[async_trait]
    impl RetrievalBackend for FailingRetrieval {
        async fn retrieve(&self, _query: &str) -> Result<Vec<String>, BackendError> {
            Err(BackendError::Network("index offline".into()))
        }
    }

    fn chat_key() -> SessionKey {
        SessionKey::new([Capability::Chat], None).unwrap()
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_replayed() {
        let backend = Arc::new(EchoBackend::default());
        let session = AssistantSession::new(chat_key(), backend.clone(), "llama3", vec![], 2);

        for question in ["one", "two", "three"] {
            session.ask(&Prompt::new(question), None).await.unwrap();
        }

        assert_eq!(session.info().await.turns, 2);
        let seen = backend.seen.lock().unwrap();
        let last = &seen[2].prompt;
        assert!(last.contains("Q: one\nA: echo:"));
        assert!(last.ends_with("Q: three\nA:"));
        assert_eq!(seen[2].model, "llama3");
    }

    #[tokio::test]
    async fn test_raw_prompt_bypasses_history() {
        let backend = Arc::new(EchoBackend::default());
        let session = AssistantSession::new(chat_key(), backend.clone(), "llama3", vec![], 4);

        let mut prompt = Prompt::new("<s>[INST] hi [/INST]");
        prompt.raw = true;
        session.ask(&prompt, None).await.unwrap();

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].prompt, "<s>[INST] hi [/INST]");
        assert!(seen[0].raw);
        drop(seen);
        assert_eq!(session.info().await.turns, 0);
    }

    #[tokio::test]
    async fn test_failing_tool_is_skipped() {
        let backend = Arc::new(EchoBackend::default());
        let key = SessionKey::new([Capability::Chat, Capability::Project], None).unwrap();
        let tools = vec![ToolBinding::ProjectRetrieval(Arc::new(FailingRetrieval))];
        let session = AssistantSession::new(key, backend.clone(), "llama3", tools, 0);

        let answer = session.ask(&Prompt::new("where is main"), None).await.unwrap();
        assert!(answer.starts_with("echo:"));
        assert_eq!(
            backend.seen.lock().unwrap()[0].prompt,
            "Q: where is main\nA:"
        );
        assert_eq!(session.info().await.tools, vec!["project"]);
    }
}
