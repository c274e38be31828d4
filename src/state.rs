use crate::config::GlobalConfig;
use crate::engine::RetryPolicy;
use crate::ipc::registry::PendingRegistry;
use crate::llm::{CodeStructureService, DebugInfoService, ModelBackend, RetrievalBackend};
use crate::models::{Capability, SessionKey};
use crate::session::{AssistantSession, SessionCache, ToolBinding};
use std::sync::{Arc, RwLock};

/// Application state shared by every connection and background task.
///
/// The session cache and the pending-request registry are the only state that
/// changes while serving; the rest is fixed at startup apart from the active model.
pub struct AppState {
    pub config: GlobalConfig,

    backend: Arc<dyn ModelBackend>,

    /// Model id new sessions are built with
    model: RwLock<String>,

    pub sessions: SessionCache,

    pub pending: PendingRegistry,

    retrieval: Option<Arc<dyn RetrievalBackend>>,
    structure: Option<Arc<dyn CodeStructureService>>,
    debug: Option<Arc<dyn DebugInfoService>>,

    retry_policy: RetryPolicy,
}

impl AppState {
    pub fn new(config: GlobalConfig, backend: Arc<dyn ModelBackend>) -> Self {
        let model = RwLock::new(config.model.clone());
        let retry_policy = RetryPolicy::new(config.retry_backoff());

        Self {
            config,
            backend,
            model,
            sessions: SessionCache::new(),
            pending: PendingRegistry::new(),
            retrieval: None,
            structure: None,
            debug: None,
            retry_policy,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalBackend>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_structure(mut self, structure: Arc<dyn CodeStructureService>) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn with_debug(mut self, debug: Arc<dyn DebugInfoService>) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn backend(&self) -> &Arc<dyn ModelBackend> {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Switch the active model.
    ///
    /// Every cached session was built for the previous model, so all of them are
    /// dropped. Returns how many were removed.
    pub fn set_model(&self, model: &str) -> usize {
        {
            let mut current = self
                .model
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *current == model {
                return 0;
            }
            log::info!("Switching model from {} to {}", current, model);
            *current = model.to_string();
        }
        self.sessions.invalidate_all()
    }

    /// Tool bindings for every capability in `key` that has a service behind it
    pub fn tools_for(&self, key: &SessionKey) -> Vec<ToolBinding> {
        key.capabilities()
            .iter()
            .filter_map(|capability| match capability {
                Capability::Chat => None,
                Capability::Project => self.retrieval.clone().map(ToolBinding::ProjectRetrieval),
                Capability::Structure => self.structure.clone().map(ToolBinding::StructureLookup),
                Capability::Debug => match (&self.debug, key.context()) {
                    (Some(service), Some(id)) => Some(ToolBinding::DebugQuery {
                        service: service.clone(),
                        session_id: id.to_string(),
                    }),
                    _ => None,
                },
            })
            .collect()
    }

    /// Cached session for `key`, built against the current backend and model.
    ///
    /// A session built while the model was being switched may land in the cache after
    /// `set_model` cleared it; such a session is evicted and rebuilt here.
    pub fn session_for(&self, key: &SessionKey) -> Arc<AssistantSession> {
        loop {
            let session = self.sessions.get_or_create(key, |key| {
                log::debug!("Building session {}", key);
                AssistantSession::new(
                    key.clone(),
                    self.backend.clone(),
                    self.model(),
                    self.tools_for(key),
                    self.config.history_turns,
                )
            });

            let current = self.model();
            if session.model() == current {
                return session;
            }
            log::debug!(
                "Evicting session {} built for {} (active model {})",
                key,
                session.model(),
                current
            );
            self.sessions.evict(key, &session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, ChunkCallback, GenerateRequest};
    use async_trait::async_trait;

    struct NullBackend;

    #[async_trait]
    impl ModelBackend for NullBackend {
        async fn generate(
            &self,
            _request: &GenerateRequest,
            _on_chunk: Option<&ChunkCallback>,
        ) -> Result<String, BackendError> {
            Ok(String::new())
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec![])
        }
    }

    fn state() -> AppState {
        AppState::new(GlobalConfig::default(), Arc::new(NullBackend))
    }

    fn chat_key() -> SessionKey {
        SessionKey::new([Capability::Chat], None).unwrap()
    }

    #[test]
    fn test_set_model_invalidates_sessions() {
        let state = state();
        state.session_for(&chat_key());

        assert_eq!(state.set_model("codellama"), 1);
        assert_eq!(state.set_model("codellama"), 0);
        assert_eq!(state.session_for(&chat_key()).model(), "codellama");
    }

    #[test]
    fn test_session_built_before_switch_is_not_served() {
        let state = state();
        let key = chat_key();

        // A build that read the old model finishes after the switch cleared the cache
        let stale = state.sessions.get_or_create(&key, |key| {
            let session = AssistantSession::new(
                key.clone(),
                state.backend().clone(),
                state.model(),
                vec![],
                0,
            );
            assert_eq!(state.set_model("codellama"), 0);
            session
        });
        assert_eq!(stale.model(), "llama3");

        let session = state.session_for(&key);
        assert_eq!(session.model(), "codellama");
        assert!(!Arc::ptr_eq(&session, &stale));
        assert_eq!(state.sessions.len(), 1);
        assert_eq!(state.sessions.get(&key).unwrap().model(), "codellama");
    }
}
