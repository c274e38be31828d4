pub mod cli;
pub mod config;
pub mod engine;
pub mod ipc;
pub mod llm;
pub mod models;
pub mod session;
pub mod state;

use config::GlobalConfig;
use llm::OllamaClient;
use state::AppState;
use std::sync::Arc;

/// Initialize logging to stderr, honoring `RUST_LOG` (default `info`).
///
/// Stdout stays free for the stdio transport and streamed output.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}

/// Build the shared state against the configured Ollama endpoint.
pub fn build_state(config: GlobalConfig) -> Result<AppState, String> {
    let backend = OllamaClient::new(config.endpoint.clone(), config.request_timeout())
        .map_err(|e| format!("Failed to create backend client: {}", e))?;

    log::info!(
        "Using backend {} with model {}",
        backend.base_url(),
        config.model
    );
    Ok(AppState::new(config, Arc::new(backend)))
}
