// src/main.rs
//
// `inboxctl` CLI entry point. A `clap`-derived command tree (mirroring this
// pack's `r2e-cli` style) wiring the two in-scope subsystems; the rest of
// the tool's surface (REST verb subcommands, MIME builders, audit log,
// installer) is out of scope, but the `Subcommand` enum is the natural
// place those would slot into alongside `webhook` and `mcp`.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use inboxctl::config::{ProxyConfig, ReceiverConfig};
use inboxctl::grant::{GrantLookup, InMemoryGrantStore};
use inboxctl::{mcp, webhook};

#[derive(Parser)]
#[command(name = "inboxctl", version, about = "Webhook receiver and MCP stdio proxy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Webhook Receiver Subsystem
    Webhook {
        #[command(subcommand)]
        action: WebhookCommand,
    },
    /// Model-Context Proxy Subsystem
    Mcp {
        #[command(subcommand)]
        action: McpCommand,
    },
}

#[derive(Subcommand)]
enum WebhookCommand {
    /// Start the receiver and block until SIGINT/SIGTERM
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        secret: Option<String>,
        #[arg(long)]
        tunnel: Option<String>,
    },
}

#[derive(Subcommand)]
enum McpCommand {
    /// Start the stdio↔HTTPS bridge and block until stdin closes
    Proxy {
        #[arg(long, value_parser = ["eu", "us"])]
        region: Option<String>,
        #[arg(long = "default-grant")]
        default_grant: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let log_level = std::env::var("INBOXCTL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        // Never mix protocol and log output: the proxy owns stdout, so all
        // logging goes to stderr regardless of which subcommand runs.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Webhook {
            action: WebhookCommand::Serve { port, path, secret, tunnel },
        } => {
            let mut config = ReceiverConfig::from_env();
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(path) = path {
                config.endpoint_path = path;
            }
            if let Some(secret) = secret {
                config.secret = secret.into_bytes();
            }
            if let Some(tunnel) = tunnel {
                config.tunnel_provider = Some(tunnel);
            }
            webhook::run(config).await
        }
        Commands::Mcp {
            action: McpCommand::Proxy { region, default_grant },
        } => {
            let mut config = ProxyConfig::from_env();
            if let Some(region) = region {
                config.region = region;
            }
            if let Some(default_grant) = default_grant {
                config.default_grant = Some(default_grant);
            }

            // Grant storage itself is out of scope (spec §1); a real build
            // would wire the persisted grant store here.
            let grant_store: Option<Arc<dyn GrantLookup>> =
                Some(Arc::new(InMemoryGrantStore::new()));

            mcp::run(config, grant_store).await
        }
    }
}
