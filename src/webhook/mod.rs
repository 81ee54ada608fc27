// src/webhook/mod.rs — Webhook Receiver Subsystem (spec §4.1–4.2).

pub mod event;
pub mod hmac;
pub mod server;
pub mod stats;
pub mod tunnel;

pub use event::{EventChannel, WebhookEvent};
pub use server::{Handler, Receiver, SIGNATURE_HEADER};
pub use stats::{ReceiverStats, ReceiverStatsSnapshot, TunnelStatus};
pub use tunnel::{CloudflaredTunnel, FakeTunnel, Tunnel};

use std::sync::Arc;

use crate::config::ReceiverConfig;

/// Entry point wired from the CLI (`inboxctl webhook serve`). Starts the
/// receiver, optionally supervising a tunnel per `config.tunnel_provider`,
/// and blocks until SIGINT/SIGTERM (SPEC_FULL §B graceful shutdown).
pub async fn run(config: ReceiverConfig) -> anyhow::Result<()> {
    let tunnel: Option<Arc<dyn Tunnel>> = match config.tunnel_provider.as_deref() {
        Some("cloudflare") => Some(Arc::new(CloudflaredTunnel::new())),
        Some(other) => {
            tracing::warn!("unknown tunnel provider '{other}', starting without a tunnel");
            None
        }
        None => None,
    };

    let (receiver, mut events) = Receiver::start(config, tunnel).await?;

    // Drain the observer channel so it never fills during normal operation;
    // a real deployment would forward these to whatever consumes `events()`.
    let drain = tokio::spawn(async move { while events.recv().await.is_some() {} });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping webhook receiver");
    receiver.stop().await?;
    drain.abort();

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
