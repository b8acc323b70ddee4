//! # relay
//!
//! Relay hub binary: `relay serve` accepts connections, `relay connect`
//! dials a server and joins.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use relay_client::{ClientConfig, RelayClient};
use relay_core::logging::{LogFormat, init_subscriber};
use relay_hub::HubBuilder;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::RelaySettings;

/// Bidirectional WebSocket message hub.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Bidirectional WebSocket message hub")]
struct Cli {
    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept connections.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Dial a server, join, and stay connected.
    Connect {
        /// Server endpoint, e.g. `ws://127.0.0.1:9850/ws`.
        #[arg(long)]
        url: Option<String>,
        /// Connection id to announce.
        #[arg(long)]
        id: Option<String>,
    },
}

impl Cli {
    /// Fold command-line overrides into `settings`.
    fn apply(&self, settings: &mut RelaySettings) {
        match &self.command {
            Command::Serve { host, port } => {
                if let Some(host) = host {
                    settings.server.host.clone_from(host);
                }
                if let Some(port) = port {
                    settings.server.port = *port;
                }
            }
            Command::Connect { url, id } => {
                if let Some(url) = url {
                    settings.client.url.clone_from(url);
                }
                if id.is_some() {
                    settings.client.id.clone_from(id);
                }
            }
        }
    }
}

fn load(path: &Path) -> Result<RelaySettings> {
    relay_settings::load_settings_from_path(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.config.clone().unwrap_or_else(relay_settings::settings_path);
    let mut settings = load(&path)?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let Some(format) = LogFormat::parse(&settings.logging.format) else {
        bail!("unknown log format {:?}", settings.logging.format);
    };
    init_subscriber(&settings.logging.level, format);
    tracing::debug!(path = %path.display(), "settings loaded");

    match args.command {
        Command::Serve { .. } => serve(&settings).await,
        Command::Connect { .. } => connect(&settings).await,
    }
}

async fn serve(settings: &RelaySettings) -> Result<()> {
    let mut builder = HubBuilder::new(settings.hub.queue_capacity);
    relay_server::handlers::register_all(&mut builder);
    let hub = builder.build().context("Failed to start handler hub")?;

    let config = ServerConfig::from_settings(settings);
    let shutdown_timeout = config.shutdown_timeout;
    let metrics = relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;
    let server = RelayServer::new(config, hub, relay_server::handlers::default_policy()).with_metrics(metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("relay listening on ws://{addr}{}", server.config().path);

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    let clean = server.shutdown(shutdown_timeout).await;
    let _ = handle.await;

    tracing::info!(clean, "Shutdown complete");
    Ok(())
}

async fn connect(settings: &RelaySettings) -> Result<()> {
    let mut builder = HubBuilder::new(settings.hub.queue_capacity);
    relay_client::handlers::register_all(&mut builder);
    let hub = builder.build().context("Failed to start handler hub")?;

    let config = ClientConfig::from_settings(settings);
    let join_id = config.id.clone();
    let secret = config.secret_key.clone();
    let client = RelayClient::connect(config, hub, relay_client::handlers::default_policy())
        .await
        .context("Failed to connect")?;

    if let Some(id) = join_id.as_deref() {
        relay_client::handlers::send_join(client.connection(), id, secret.as_deref())
            .await
            .context("Failed to send join")?;
    }

    let conn = std::sync::Arc::clone(client.connection());
    let run = client.run_until_closed();
    tokio::pin!(run);

    tokio::select! {
        () = &mut run => tracing::info!("server closed the connection"),
        signalled = shutdown_signal() => {
            signalled?;
            tracing::info!("Disconnecting...");
            conn.finish();
            run.await;
        }
    }
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}
