//! Line-protocol server
//!
//! Every connection (a TCP client, or stdin/stdout) gets one listener task that reads
//! lines in order and one writer task that drains the connection's reply sink.
//!
//! ```text
//! PING                                  -> {"STATUS":"ok","RESULT":"PONG"}
//! CODE -lang=rust                       (body lines follow until END)
//! {"DO":"ASK","RID":"a1","BODY":"..."}  -> {"STATUS":"accepted","RID":"a1"} ...
//! ```

use crate::cli::output;
use crate::cli::parser::parse_command_line;
use crate::engine::{send, CommandInstance, Dispatcher, InstanceState, ReplySink};
use crate::ipc::protocol::{Reply, StructuredRequest};
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Default TCP port
pub const DEFAULT_PORT: u16 = 47300;

/// Legacy-line option carrying a caller-chosen request id
const RID_OPTION: &str = "rid";

// ============================================================================
// Transports
// ============================================================================

/// Bind the TCP listener on the loopback interface.
pub async fn bind(port: u16) -> Result<TcpListener, String> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to port {}: {}", port, e))
}

/// Serve the line protocol over TCP until `shutdown` is cancelled.
pub async fn serve_tcp(
    state: Arc<AppState>,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let listener = bind(port).await?;
    serve_listener(state, listener, shutdown).await
}

/// Accept loop over an already bound listener.
pub async fn serve_listener(
    state: Arc<AppState>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let dispatcher = Dispatcher::new(state);
    let local = listener
        .local_addr()
        .map_err(|e| format!("Failed to read listener address: {}", e))?;
    log::info!("Line protocol listening on {}", local);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("Listener on {} shutting down", local);
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let channel = format!("tcp-{}", uuid::Uuid::new_v4());
                log::info!("Connection {} from {}", channel, peer);

                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let (reader, writer) = stream.into_split();
                    serve_connection(dispatcher, reader, writer, channel).await;
                });
            }
        }
    }
}

/// Serve the line protocol over stdin/stdout.
pub async fn serve_stdio(state: Arc<AppState>) {
    let dispatcher = Dispatcher::new(state);
    serve_connection(
        dispatcher,
        tokio::io::stdin(),
        tokio::io::stdout(),
        "stdio".to_string(),
    )
    .await;
}

// ============================================================================
// Connection loop
// ============================================================================

/// Run one connection until its input ends.
///
/// Returns once every reply queued for the connection, including those of
/// background commands still running at end of input, has been written.
pub async fn serve_connection<R, W>(dispatcher: Dispatcher, reader: R, writer: W, channel: String)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sink, replies) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_replies(writer, replies, channel.clone()));

    let mut lines = BufReader::new(reader).lines();
    let mut assembler = LineAssembler::default();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => assembler.feed(&dispatcher, &line, &channel, &sink).await,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Read error on {}: {}", channel, e);
                break;
            }
        }
    }

    if let Some(instance) = assembler.collecting.take() {
        log::warn!(
            "{} closed while collecting the body of {}",
            channel,
            instance.spec().kind
        );
    }

    drop(sink);
    if let Err(e) = writer_task.await {
        log::error!("Writer task for {} failed: {}", channel, e);
    }
    log::info!("Connection {} closed", channel);
}

async fn write_replies<W>(mut writer: W, mut replies: mpsc::UnboundedReceiver<Reply>, channel: String)
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let mut line = reply.to_line();
        line.push('\n');

        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            log::warn!("Write error on {}: {}", channel, e);
            break;
        }
    }
}

/// Turns the lines of one connection into dispatchable commands.
#[derive(Default)]
struct LineAssembler {
    /// Legacy command still reading its body
    collecting: Option<CommandInstance>,
}

impl LineAssembler {
    async fn feed(&mut self, dispatcher: &Dispatcher, line: &str, channel: &str, sink: &ReplySink) {
        if let Some(instance) = self.collecting.as_mut() {
            match instance.collect(line) {
                Ok(false) => {}
                Ok(true) => {
                    if let Some(ready) = self.collecting.take() {
                        let rid = caller_rid(&ready);
                        dispatcher.handle(ready, rid, channel, sink).await;
                    }
                }
                Err(e) => {
                    self.collecting = None;
                    send(sink, output::format_internal_error(e.to_string()));
                }
            }
            return;
        }

        if let Some(frame) = StructuredRequest::from_line(line) {
            match frame {
                Ok(request) => dispatcher.handle_request(request, channel, sink).await,
                Err(e) => send(sink, output::format_malformed_frame(&e)),
            }
            return;
        }

        // Blank lines between commands carry nothing.
        if line.trim().is_empty() {
            return;
        }

        match parse_command_line(line) {
            Ok(spec) => {
                let instance = CommandInstance::new(spec);
                if instance.state() == InstanceState::Collecting {
                    self.collecting = Some(instance);
                } else {
                    let rid = caller_rid(&instance);
                    dispatcher.handle(instance, rid, channel, sink).await;
                }
            }
            Err(e) => send(sink, output::format_parse_error(&e)),
        }
    }
}

fn caller_rid(instance: &CommandInstance) -> Option<String> {
    instance
        .spec()
        .option(RID_OPTION)
        .filter(|rid| !rid.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::engine::RetryPolicy;
    use crate::llm::{BackendError, ChunkCallback, GenerateRequest, ModelBackend};
    use async_trait::async_trait;
    use tokio::io::{duplex, AsyncReadExt};

    struct UpperBackend;

    #[async_trait]
    impl ModelBackend for UpperBackend {
        async fn generate(
            &self,
            request: &GenerateRequest,
            _on_chunk: Option<&ChunkCallback>,
        ) -> Result<String, BackendError> {
            Ok(request.prompt.to_uppercase())
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["llama3".to_string()])
        }
    }

    async fn run_script(script: &str) -> Vec<Reply> {
        let state = AppState::new(GlobalConfig::default(), Arc::new(UpperBackend))
            .with_retry_policy(RetryPolicy::immediate());
        let dispatcher = Dispatcher::new(Arc::new(state));

        let (mut out_read, out_write) = duplex(64 * 1024);
        serve_connection(dispatcher, script.as_bytes(), out_write, "test".to_string()).await;

        let mut output = String::new();
        out_read.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ping_and_models_in_order() {
        let replies = run_script("PING\nMODELS\n").await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].result, Some(serde_json::json!("PONG")));
        assert_eq!(replies[1].result.as_ref().unwrap()["models"][0], "llama3");
    }

    #[tokio::test]
    async fn test_legacy_body_collection() {
        let replies = run_script("GENERATE -raw -rid=g1\nhello\nworld\nEND\n").await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], Reply::accepted("g1"));
        assert_eq!(replies[1].rid.as_deref(), Some("g1"));
        assert_eq!(replies[1].result.as_ref().unwrap()["text"], "HELLO\nWORLD");
    }

    #[tokio::test]
    async fn test_malformed_frame_and_empty_lines() {
        let replies = run_script("\n{\"DO\":\n   \nPING\n").await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].code.as_deref(), Some("PARSE_ERROR"));
        assert_eq!(replies[1].result, Some(serde_json::json!("PONG")));
    }
}
