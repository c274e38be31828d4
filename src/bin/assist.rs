//! assist - one-shot assistant commands from the terminal
//!
//! Talks to the model server directly, or to a running `assistd` with `send`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use assistd_lib::cli::handler::code_prompt;
use assistd_lib::config::{self, GlobalConfig};
use assistd_lib::ipc::protocol::{Reply, ReplyStatus, StructuredRequest};
use assistd_lib::llm::{extract_code, extract_doc, GenerateRequest, ModelBackend, OllamaClient};

#[derive(Parser)]
#[command(name = "assist")]
#[command(author, version)]
#[command(about = "One-shot assistant commands")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model server root URL (defaults to the configured endpoint)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Model to use (defaults to the configured model)
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the models the server can serve
    Models,

    /// Stream a completion for a prompt
    Generate {
        /// Skip the server's prompt template
        #[arg(long)]
        raw: bool,

        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Ask for code and print the extracted fragments
    Code {
        /// Fence tag to extract
        #[arg(short, long)]
        lang: Option<String>,

        #[arg(required = true)]
        prompt: Vec<String>,
    },

    /// Run the fragment extractor over a saved model answer
    Extract {
        /// Fence tag to extract
        #[arg(short, long)]
        lang: Option<String>,

        /// Print the first documentation comment instead of code fragments
        #[arg(long)]
        doc: bool,

        file: PathBuf,
    },

    /// Send one command to a running assistd and print its replies
    Send {
        /// Server address, e.g. 127.0.0.1:47300
        addr: String,

        /// Command word and options, e.g. CODE -lang=rust
        #[arg(required = true)]
        line: Vec<String>,

        /// Request body
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    assistd_lib::init_logging();
    let cli = Cli::parse();

    let mut config = config::load_config().map_err(anyhow::Error::msg)?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    let result = match cli.command {
        Commands::Models => handle_models(&config).await,
        Commands::Generate { raw, prompt } => handle_generate(&config, raw, &prompt.join(" ")).await,
        Commands::Code { lang, prompt } => handle_code(&config, lang, &prompt.join(" ")).await,
        Commands::Extract { lang, doc, file } => handle_extract(&config, lang, doc, &file),
        Commands::Send { addr, line, body } => handle_send(&addr, &line, body).await,
    };

    match result {
        Ok(Some(output)) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Direct backend commands
// ============================================================================

fn backend(config: &GlobalConfig) -> Result<OllamaClient> {
    OllamaClient::new(config.endpoint.clone(), config.request_timeout())
        .context("Failed to create backend client")
}

async fn handle_models(config: &GlobalConfig) -> Result<Option<Value>> {
    let models = backend(config)?
        .list_models()
        .await
        .with_context(|| format!("Failed to list models at {}", config.endpoint))?;
    Ok(Some(json!({ "models": models, "current": config.model })))
}

async fn handle_generate(config: &GlobalConfig, raw: bool, prompt: &str) -> Result<Option<Value>> {
    let mut request = GenerateRequest::new(config.model.clone(), prompt);
    request.raw = raw;

    let print_chunk = |chunk: &str| {
        let mut stdout = std::io::stdout().lock();
        // Broken pipes surface when the stream ends; nothing to do per chunk.
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    };

    backend(config)?
        .generate(&request, Some(&print_chunk))
        .await
        .context("Generation failed")?;
    println!();
    Ok(None)
}

async fn handle_code(
    config: &GlobalConfig,
    lang: Option<String>,
    prompt: &str,
) -> Result<Option<Value>> {
    let language = lang.unwrap_or_else(|| config.default_language.clone());
    let request = GenerateRequest::new(config.model.clone(), code_prompt(&language, prompt));

    let answer = backend(config)?
        .generate(&request, None)
        .await
        .context("Generation failed")?;

    let fragments = extract_code(&answer, &language);
    Ok(Some(json!({ "language": language, "fragments": fragments })))
}

fn handle_extract(
    config: &GlobalConfig,
    lang: Option<String>,
    doc: bool,
    file: &Path,
) -> Result<Option<Value>> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if doc {
        return Ok(Some(json!({ "doc": extract_doc(&text) })));
    }

    let language = lang.unwrap_or_else(|| config.default_language.clone());
    let fragments = extract_code(&text, &language);
    Ok(Some(json!({ "language": language, "fragments": fragments })))
}

// ============================================================================
// Remote command
// ============================================================================

async fn handle_send(addr: &str, line: &[String], body: Option<String>) -> Result<Option<Value>> {
    let (command, options) = match line.split_first() {
        Some((command, rest)) => (command.clone(), rest.join(" ")),
        None => bail!("Missing command word"),
    };

    let request = StructuredRequest {
        command,
        options: (!options.is_empty()).then_some(options),
        rid: None,
        body,
    };

    let stream = tokio::time::timeout(Duration::from_secs(10), TcpStream::connect(addr))
        .await
        .with_context(|| format!("Timed out connecting to {}", addr))?
        .with_context(|| format!("Failed to connect to {}", addr))?;
    let (reader, mut writer) = stream.into_split();

    let mut frame = serde_json::to_string(&request)?;
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(reply_line) = lines.next_line().await? {
        let reply: Reply = serde_json::from_str(&reply_line)
            .with_context(|| format!("Malformed reply: {}", reply_line))?;
        println!("{}", reply_line);

        if reply.is_final() {
            if reply.status == ReplyStatus::Error {
                bail!(
                    "{}: {}",
                    reply.code.unwrap_or_default(),
                    reply.message.unwrap_or_default()
                );
            }
            return Ok(None);
        }
    }

    bail!("Connection closed before a final reply")
}
