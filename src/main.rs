//! assistd - line-protocol front-end for a local model server

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use assistd_lib::config;
use assistd_lib::ipc::server;

#[derive(Parser, Debug)]
#[command(name = "assistd")]
#[command(author, version)]
#[command(about = "Serve assistant commands over TCP or stdin/stdout")]
struct Args {
    /// TCP port (defaults to the configured port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve a single session over stdin/stdout instead of TCP
    #[arg(long, conflicts_with = "port")]
    stdio: bool,

    /// Model server root URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Model to start with
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() {
    assistd_lib::init_logging();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let mut config = config::load_config()?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    let port = args.port.unwrap_or(config.port);

    let state = Arc::new(assistd_lib::build_state(config)?);

    if args.stdio {
        server::serve_stdio(state).await;
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupt received");
            on_signal.cancel();
        }
    });

    server::serve_tcp(state, port, shutdown).await
}
