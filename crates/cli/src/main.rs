use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "inlet")]
#[command(about = "Inlet CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: INLET_CONFIG_PATH or ~/.inlet/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (WhatsApp webhook + event stream). Channels come from the config's `channels` list.
    Gateway {
        /// Config file path (default: INLET_CONFIG_PATH or ~/.inlet/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run a saved webhook body through the callback pipeline and print each event as a JSON line.
    Replay {
        /// Config file path (default: INLET_CONFIG_PATH or ~/.inlet/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// File holding the webhook JSON body.
        #[arg(value_name = "FILE")]
        file: std::path::PathBuf,
    },

    /// Print events emitted by a running gateway.
    Tail {
        /// Config file path (default: INLET_CONFIG_PATH or ~/.inlet/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("inlet {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Replay { config, file }) => {
            if let Err(e) = run_replay(config, file).await {
                log::error!("replay failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Tail { config }) => {
            if let Err(e) = run_tail(config).await {
                log::error!("tail failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(inlet::config::default_config_path);
    let dir = inlet::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = inlet::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    inlet::gateway::run_gateway(config, path).await
}

async fn run_replay(
    config_path: Option<std::path::PathBuf>,
    file: std::path::PathBuf,
) -> anyhow::Result<()> {
    use anyhow::Context;

    let (config, _) = inlet::config::load_config(config_path)?;
    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading webhook body from {}", file.display()))?;
    let envelope: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing webhook body from {}", file.display()))?;

    let store = Arc::new(inlet::memory::MemoryStore::from_seeds(&config.channels).await);
    let handler = inlet::CallbackHandler::from_config(store.clone(), &config.ingest);
    let context = serde_json::json!({ "source": file.display().to_string() });
    let events = handler.handle_callback(&envelope, &HashMap::new(), &context)?;
    futures_util::pin_mut!(events);
    let mut emitted = 0;
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
        emitted += 1;
    }
    log::info!(
        "replay emitted {} event(s); store holds {} user(s), {} turn(s)",
        emitted,
        store.user_count().await,
        store.turn_count().await
    );
    Ok(())
}

/// Event frame as broadcast by the gateway's `/events` stream.
#[derive(Debug, Deserialize)]
struct TailFrame {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

async fn run_tail(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = inlet::config::load_config(config_path)?;
    let bind = config.gateway.bind.trim();
    let ws_url = format!("ws://{}:{}/events", bind, config.gateway.port);

    let mut request = ws_url.as_str().into_client_request()?;
    if let Some(token) = inlet::config::resolve_gateway_token(&config) {
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {}", token).parse()?);
    }
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await?;
    log::info!("tailing events from {}", ws_url);

    while let Some(msg) = ws.next().await {
        let Message::Text(text) = msg? else { continue };
        let frame: TailFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("ignoring unparseable frame: {}", e);
                continue;
            }
        };
        if frame.event == inlet::gateway::SHUTDOWN_EVENT {
            println!("gateway shut down");
            break;
        }
        println!("{} {}", frame.event, frame.payload);
    }
    Ok(())
}
