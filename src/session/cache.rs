use super::assistant::AssistantSession;
use crate::models::SessionKey;
use dashmap::DashMap;
use std::sync::Arc;

/// Conversational sessions keyed by capability set and context id.
///
/// Entries live until explicitly invalidated. Reads, inserts and invalidations are
/// safe from any task without further locking.
#[derive(Default)]
pub struct SessionCache {
    sessions: DashMap<SessionKey, Arc<AssistantSession>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session for `key`, building it with `build` when absent.
    ///
    /// `build` runs outside the map lock. When two tasks race on the same key, the
    /// first insert wins and the other freshly built session is dropped unused.
    pub fn get_or_create<F>(&self, key: &SessionKey, build: F) -> Arc<AssistantSession>
    where
        F: FnOnce(&SessionKey) -> AssistantSession,
    {
        if let Some(existing) = self.sessions.get(key) {
            return existing.value().clone();
        }

        let candidate = Arc::new(build(key));
        let session = self
            .sessions
            .entry(key.clone())
            .or_insert(candidate)
            .value()
            .clone();
        log::debug!("Session cache holds {} entries after {}", self.len(), key);
        session
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<AssistantSession>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Remove `session` from `key`, unless another session has replaced it since.
    pub fn evict(&self, key: &SessionKey, session: &Arc<AssistantSession>) -> bool {
        self.sessions
            .remove_if(key, |_, cached| Arc::ptr_eq(cached, session))
            .is_some()
    }

    /// Drop every session (the active model changed). Returns how many were removed.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.sessions.len();
        self.sessions.clear();
        if removed > 0 {
            log::info!("Invalidated all {} cached session(s)", removed);
        }
        removed
    }

    /// Drop the sessions scoped to context `id`. Returns how many were removed.
    pub fn invalidate_by_context(&self, id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, _| key.context() != Some(id));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            log::info!("Invalidated {} session(s) for context {}", removed, id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cached keys in display order
    pub fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.sessions.iter().map(|e| e.key().clone()).collect();
        keys.sort_by_key(|k| k.to_string());
        keys
    }

    pub fn sessions(&self) -> Vec<Arc<AssistantSession>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, ChunkCallback, GenerateRequest, ModelBackend};
    use crate::models::Capability;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

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

    fn build(key: &SessionKey) -> AssistantSession {
        AssistantSession::new(key.clone(), Arc::new(NullBackend), "llama3", vec![], 0)
    }

    fn debug_key(context: &str) -> SessionKey {
        SessionKey::new([Capability::Chat, Capability::Debug], Some(context.to_string())).unwrap()
    }

    #[test]
    fn test_same_key_shares_session() {
        let cache = SessionCache::new();
        let key = SessionKey::new([Capability::Chat, Capability::Project], None).unwrap();

        let a = cache.get_or_create(&key, build);
        let b = cache.get_or_create(&key, |_| panic!("must not rebuild"));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_all_forces_rebuild() {
        let cache = SessionCache::new();
        let key = SessionKey::new([Capability::Chat], None).unwrap();

        let before = cache.get_or_create(&key, build);
        assert_eq!(cache.invalidate_all(), 1);
        assert!(cache.is_empty());

        let after = cache.get_or_create(&key, build);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_invalidate_by_context_only_touches_matching_keys() {
        let cache = SessionCache::new();
        let chat = SessionKey::new([Capability::Chat], None).unwrap();
        cache.get_or_create(&chat, build);
        cache.get_or_create(&debug_key("C"), build);
        cache.get_or_create(&debug_key("D"), build);

        assert_eq!(cache.invalidate_by_context("C"), 1);

        assert!(cache.get(&debug_key("C")).is_none());
        assert!(cache.get(&debug_key("D")).is_some());
        assert!(cache.get(&chat).is_some());
        assert_eq!(cache.invalidate_by_context("missing"), 0);
    }

    #[test]
    fn test_evict_leaves_replacement_alone() {
        let cache = SessionCache::new();
        let key = SessionKey::new([Capability::Chat], None).unwrap();

        let first = cache.get_or_create(&key, build);
        assert!(cache.evict(&key, &first));
        assert!(!cache.evict(&key, &first));

        let second = cache.get_or_create(&key, build);
        assert!(!cache.evict(&key, &first));
        assert!(Arc::ptr_eq(&cache.get(&key).unwrap(), &second));
    }

    #[test]
    fn test_keys_sorted() {
        let cache = SessionCache::new();
        cache.get_or_create(&debug_key("z"), build);
        cache.get_or_create(&SessionKey::new([Capability::Chat], None).unwrap(), build);

        let keys: Vec<String> = cache.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["chat", "chat+debug@z"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_keeps_one_session() {
        let cache = Arc::new(SessionCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let key = SessionKey::new([Capability::Chat, Capability::Structure], None).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let builds = builds.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_create(&key, |k| {
                    builds.fetch_add(1, Ordering::SeqCst);
                    build(k)
                })
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert!(builds.load(Ordering::SeqCst) >= 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(cache.len(), 1);
    }
}
