//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use assistd_lib::config::GlobalConfig;
use assistd_lib::engine::{Dispatcher, RetryPolicy};
use assistd_lib::ipc::protocol::Reply;
use assistd_lib::llm::{
    BackendError, ChunkCallback, CodeStructureService, DebugInfoService, GenerateRequest,
    ModelBackend, RetrievalBackend,
};
use assistd_lib::state::AppState;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Backend that plays back queued outcomes, then repeats a fallback answer.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    fallback: Mutex<String>,
    pub requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn answering(answer: &str) -> Arc<Self> {
        let backend = Self::default();
        *backend.fallback.lock().unwrap() = answer.to_string();
        Arc::new(backend)
    }

    pub fn push(&self, outcome: Result<String, BackendError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> GenerateRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(
        &self,
        request: &GenerateRequest,
        on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        let answer = match next {
            Some(outcome) => outcome?,
            None => self.fallback.lock().unwrap().clone(),
        };
        if let Some(callback) = on_chunk {
            callback(&answer);
        }
        Ok(answer)
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["llama3".to_string(), "codellama".to_string()])
    }
}

/// Backend whose every call panics.
pub struct PanickingBackend;

#[async_trait]
impl ModelBackend for PanickingBackend {
    async fn generate(
        &self,
        _request: &GenerateRequest,
        _on_chunk: Option<&ChunkCallback>,
    ) -> Result<String, BackendError> {
        panic!("backend exploded")
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        panic!("backend exploded")
    }
}

pub struct FakeRetrieval;

#[async_trait]
impl RetrievalBackend for FakeRetrieval {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>, BackendError> {
        Ok(vec!["src/Main.java: class Main {}".to_string()])
    }
}

pub struct FakeStructure;

#[async_trait]
impl CodeStructureService for FakeStructure {
    async fn find_declaration(&self, name: &str) -> Result<Option<String>, BackendError> {
        Ok(Some(format!("declaration of {}", name)))
    }
}

pub struct FakeDebugger;

#[async_trait]
impl DebugInfoService for FakeDebugger {
    async fn query(
        &self,
        session_id: &str,
        command: &str,
        _args: &[String],
    ) -> Result<Option<Value>, BackendError> {
        Ok(Some(json!({ "session": session_id, "command": command })))
    }
}

pub fn test_state(backend: Arc<ScriptedBackend>) -> Arc<AppState> {
    let state = AppState::new(GlobalConfig::default(), backend)
        .with_retrieval(Arc::new(FakeRetrieval))
        .with_structure(Arc::new(FakeStructure))
        .with_debug(Arc::new(FakeDebugger))
        .with_retry_policy(RetryPolicy::immediate());
    Arc::new(state)
}

pub fn test_dispatcher(backend: Arc<ScriptedBackend>) -> Dispatcher {
    Dispatcher::new(test_state(backend))
}

/// Next reply on a channel, failing the test after a few seconds.
pub async fn next_reply(rx: &mut mpsc::UnboundedReceiver<Reply>) -> Reply {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("reply channel closed")
}
