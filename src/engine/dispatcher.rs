//! Request dispatch
//!
//! Decides how each assembled command runs and delivers its replies:
//!
//! - immediate (`PING`, unknown words): answered on the spot
//! - sync (`MODELS`, `MODEL`, `SESSIONS`, `FORGET`): run to completion, then replied
//! - background (everything else): registered under a request id, acknowledged with
//!   an `accepted` reply, then run on its own task which sends exactly one reply
//!   carrying the same id
//!
//! Replies go into the channel's sink; a single writer per channel drains it, so the
//! immediate reply of a command always precedes its correlated reply.

use super::instance::{CommandInstance, InstanceState};
use crate::cli::{handler, output};
use crate::ipc::protocol::{Reply, StructuredRequest};
use crate::ipc::registry::RegistryError;
use crate::models::{CommandKind, ExecutionMode};
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Per-channel reply queue
pub type ReplySink = mpsc::UnboundedSender<Reply>;

#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Dispatch a structured request frame.
    pub async fn handle_request(&self, request: StructuredRequest, channel: &str, sink: &ReplySink) {
        let spec = match crate::cli::parse_request(&request) {
            Ok(spec) => spec,
            Err(e) => {
                send(sink, tag(output::format_parse_error(&e), request.rid.as_deref()));
                return;
            }
        };

        let instance = CommandInstance::with_body(spec, request.body.as_deref().unwrap_or(""));
        self.handle(instance, request.rid, channel, sink).await;
    }

    /// Dispatch a command whose body has been fully collected.
    ///
    /// `rid` is the caller's request id, if it chose one. Synchronous replies carry it
    /// back; background commands use it as their correlation id.
    pub async fn handle(
        &self,
        instance: CommandInstance,
        rid: Option<String>,
        channel: &str,
        sink: &ReplySink,
    ) {
        let kind = instance.spec().kind.clone();

        if instance.state() != InstanceState::Ready {
            send(
                sink,
                tag(
                    output::format_internal_error(format!(
                        "{} dispatched in state {:?}",
                        kind,
                        instance.state()
                    )),
                    rid.as_deref(),
                ),
            );
            return;
        }

        match kind.mode() {
            ExecutionMode::Immediate => {
                let reply = match &kind {
                    CommandKind::Ping => output::format_pong(),
                    other => output::format_unknown_command(other.word()),
                };
                send(sink, tag(reply, rid.as_deref()));
            }
            ExecutionMode::Sync => {
                if let Err(message) = handler::validate(instance.spec(), &instance.body()) {
                    send(sink, tag(output::format_invalid_options(message), rid.as_deref()));
                    return;
                }

                let reply = run_guarded(self.state.clone(), instance).await;
                send(sink, tag(reply, rid.as_deref()));
            }
            ExecutionMode::Background => {
                if let Err(message) = handler::validate(instance.spec(), &instance.body()) {
                    send(sink, tag(output::format_invalid_options(message), rid.as_deref()));
                    return;
                }

                let rid = match self.state.pending.register(rid, channel, &kind) {
                    Ok(rid) => rid,
                    Err(RegistryError::DuplicateRid(rid)) => {
                        send(sink, tag(output::format_duplicate_rid(&rid), Some(&rid)));
                        return;
                    }
                };

                log::info!("{} accepted as {} on {}", kind, rid, channel);
                send(sink, Reply::accepted(rid.clone()));

                let state = self.state.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    let reply = run_guarded(state.clone(), instance).await.with_rid(rid.clone());

                    // Free the id before the reply so the caller may reuse it at once.
                    state.pending.complete(&rid);
                    if sink.send(reply).is_err() {
                        log::warn!("Channel closed before reply for {} could be sent", rid);
                    }
                });
            }
        }
    }
}

/// Run an instance on its own task so a panicking collaborator still yields a reply.
async fn run_guarded(state: Arc<AppState>, instance: CommandInstance) -> Reply {
    let kind = instance.spec().kind.clone();
    let worker = tokio::spawn(async move {
        let mut instance = instance;
        run_instance(&state, &mut instance).await
    });

    match worker.await {
        Ok(reply) => reply,
        Err(e) => {
            log::error!("{} worker aborted: {}", kind, e);
            output::format_internal_error(format!("{} aborted: {}", kind, e))
        }
    }
}

/// Run a ready instance to a terminal state and format its reply.
async fn run_instance(state: &AppState, instance: &mut CommandInstance) -> Reply {
    let spec = instance.spec().clone();
    let body = instance.body();

    if let Err(e) = instance
        .run(state.retry_policy(), |_| handler::execute(state, &spec, &body))
        .await
    {
        log::error!("{} could not run: {}", spec.kind, e);
        return output::format_internal_error(e.to_string());
    }

    match instance.result() {
        Some(result) => output::format_result(result),
        None => output::format_internal_error(format!("{} finished without a result", spec.kind)),
    }
}

fn tag(reply: Reply, rid: Option<&str>) -> Reply {
    match rid {
        Some(rid) => reply.with_rid(rid),
        None => reply,
    }
}

/// Queue a reply; a closed sink means the connection is gone.
pub fn send(sink: &ReplySink, reply: Reply) {
    if sink.send(reply).is_err() {
        log::debug!("Dropping reply for a closed channel");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::parser::parse_command_line;
    use crate::config::GlobalConfig;
    use crate::engine::RetryPolicy;
    use crate::ipc::protocol::ReplyStatus;
    use crate::llm::{BackendError, ChunkCallback, GenerateRequest, ModelBackend};
    use async_trait::async_trait;

    struct StaticBackend(&'static str);

    #[async_trait]
    impl ModelBackend for StaticBackend {
        async fn generate(
            &self,
            _request: &GenerateRequest,
            _on_chunk: Option<&ChunkCallback>,
        ) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["llama3".to_string()])
        }
    }

    fn dispatcher(answer: &'static str) -> Dispatcher {
        let state = AppState::new(GlobalConfig::default(), Arc::new(StaticBackend(answer)))
            .with_retry_policy(RetryPolicy::immediate());
        Dispatcher::new(Arc::new(state))
    }

    fn ready(line: &str, body: &str) -> CommandInstance {
        CommandInstance::with_body(parse_command_line(line).unwrap(), body)
    }

    #[tokio::test]
    async fn test_ping_is_immediate() {
        let d = dispatcher("");
        let (tx, mut rx) = mpsc::unbounded_channel();

        d.handle(ready("PING", ""), None, "c1", &tx).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.result, Some(serde_json::json!("PONG")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let d = dispatcher("");
        let (tx, mut rx) = mpsc::unbounded_channel();

        d.handle(ready("FROB", ""), Some("r1".into()), "c1", &tx).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.code.as_deref(), Some("UNKNOWN_COMMAND"));
        assert_eq!(reply.rid.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_background_accepted_then_result() {
        let d = dispatcher("42");
        let (tx, mut rx) = mpsc::unbounded_channel();

        d.handle(ready("ASK", "meaning of life"), None, "c1", &tx).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Reply::accepted("req-1"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.status, ReplyStatus::Ok);
        assert_eq!(second.rid.as_deref(), Some("req-1"));
        assert_eq!(second.result.unwrap()["text"], "42");
        assert!(d.state().pending.is_empty());
    }

    #[tokio::test]
    async fn test_debug_without_context_is_invalid() {
        let d = dispatcher("");
        let (tx, mut rx) = mpsc::unbounded_channel();

        d.handle(ready("DEBUG", "why"), None, "c1", &tx).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.code.as_deref(), Some("INVALID_OPTIONS"));
        assert!(d.state().pending.is_empty());
    }

    #[tokio::test]
    async fn test_structured_parse_error() {
        let d = dispatcher("");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = StructuredRequest {
            command: "".to_string(),
            options: None,
            rid: Some("r9".to_string()),
            body: None,
        };

        d.handle_request(request, "c1", &tx).await;

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.code.as_deref(), Some("PARSE_ERROR"));
        assert_eq!(reply.rid.as_deref(), Some("r9"));
    }
}
