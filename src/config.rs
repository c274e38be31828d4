/// Global configuration management for assistd
///
/// Configuration is stored at: `$USER_HOME/.assistd/config.json`
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that points the config file somewhere else.
pub const CONFIG_PATH_ENV: &str = "ASSISTD_CONFIG_PATH";

/// Global configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Root URL of the Ollama-compatible model server
    pub endpoint: String,

    /// Model used until a `MODEL -set=<id>` switches it
    pub model: String,

    /// TCP port the line-protocol server listens on
    pub port: u16,

    /// Upper bound for one backend HTTP request
    pub request_timeout_secs: u64,

    /// Linear pause between retry attempts
    pub retry_backoff_ms: u64,

    /// Fence tag `CODE` extracts when `-lang` is not given
    pub default_language: String,

    /// Prior question/answer pairs replayed to the model per session
    pub history_turns: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            port: 47300,
            request_timeout_secs: 120,
            retry_backoff_ms: 500,
            default_language: "java".to_string(),
            history_turns: 6,
        }
    }
}

impl GlobalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Get the path to the global config file
///
/// Returns: `$USER_HOME/.assistd/config.json`
/// Respects the `ASSISTD_CONFIG_PATH` environment variable.
fn get_config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let home_dir = dirs::home_dir().ok_or("Failed to get user home directory")?;
    Ok(home_dir.join(".assistd").join("config.json"))
}

/// Load global configuration from disk
///
/// If the config file doesn't exist, creates a new one with default values.
/// Missing fields in an existing file fall back to their defaults.
pub fn load_config() -> Result<GlobalConfig, String> {
    let config_path = get_config_path()?;

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    } else {
        let config = GlobalConfig::default();
        save_config(&config)?;
        log::info!("Created default config at {}", config_path.display());
        Ok(config)
    }
}

/// Save global configuration to disk
///
/// Creates the `.assistd` directory if it doesn't exist.
pub fn save_config(config: &GlobalConfig) -> Result<(), String> {
    let config_path = get_config_path()?;

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(&config_path, content).map_err(|e| format!("Failed to write config file: {}", e))?;

    Ok(())
}
