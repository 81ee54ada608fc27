// src/config.rs
//
// Configuration for the two core subsystems, loaded from environment
// variables in the same shape as this codebase's original `Config::from_env`:
// small `env_*` helpers, sensible local-dev defaults, and a `log_summary()`
// emitted once at startup via `tracing::info!`.

use tracing::info;

// ---------------------------------------------------------------------------
// Webhook receiver configuration
// ---------------------------------------------------------------------------

/// Configuration for the Webhook Receiver Subsystem (spec §3, §4.1).
///
/// Constructed once before `Receiver::start` and immutable after.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// URL path the ingest/challenge endpoint is served on.
    pub endpoint_path: String,
    /// Shared secret used for HMAC-SHA256 signature verification. May be
    /// empty, in which case no delivery is ever marked `verified`.
    pub secret: Vec<u8>,
    /// Optional tunnel provider tag (only `"cloudflare"` is implemented).
    pub tunnel_provider: Option<String>,
}

impl ReceiverConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let port = env_or("INBOXCTL_WEBHOOK_PORT", "8080")
            .parse::<u16>()
            .unwrap_or(8080);
        let endpoint_path = env_or("INBOXCTL_WEBHOOK_PATH", "/webhook");
        let secret = std::env::var("INBOXCTL_WEBHOOK_SECRET")
            .unwrap_or_default()
            .into_bytes();
        let tunnel_provider = std::env::var("INBOXCTL_TUNNEL_PROVIDER")
            .ok()
            .filter(|s| !s.is_empty());

        let config = Self {
            port,
            endpoint_path,
            secret,
            tunnel_provider,
        };
        config.log_summary();
        config
    }

    fn log_summary(&self) {
        info!("──── Webhook Receiver Configuration ────");
        info!("  port               : {}", self.port);
        info!("  endpoint_path      : {}", self.endpoint_path);
        info!("  signature_verify   : {}", !self.secret.is_empty());
        info!(
            "  tunnel_provider    : {}",
            self.tunnel_provider.as_deref().unwrap_or("(none)")
        );
        info!("──────────────────────────────────────");
    }
}

// ---------------------------------------------------------------------------
// MCP proxy configuration
// ---------------------------------------------------------------------------

/// Configuration for the MCP Proxy Subsystem (spec §3, §4.3).
///
/// `default_grant` and the grant store may be set later, atomically, via
/// [`crate::mcp::session::SessionState`] — everything else is fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Region tag used to select the upstream endpoint (spec §6.4).
    pub region: String,
    /// Bearer credential sent as `Authorization: Bearer <credential>`.
    /// Never logged.
    pub bearer_token: String,
    /// Default grant identifier injected into protected tool calls.
    pub default_grant: Option<String>,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let region = env_or("INBOXCTL_REGION", "us");
        let bearer_token = env_or("INBOXCTL_BEARER_TOKEN", "");
        let default_grant = std::env::var("INBOXCTL_DEFAULT_GRANT")
            .ok()
            .filter(|s| !s.is_empty());

        let config = Self {
            region,
            bearer_token,
            default_grant,
        };
        config.log_summary();
        config
    }

    fn log_summary(&self) {
        info!("──── MCP Proxy Configuration ────");
        info!("  region             : {}", self.region);
        info!(
            "  bearer_token       : {}",
            if self.bearer_token.is_empty() { "(not set)" } else { "(set)" }
        );
        info!(
            "  default_grant      : {}",
            self.default_grant.as_deref().unwrap_or("(none)")
        );
        info!("─────────────────────────────────");
    }
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn receiver_config_defaults() {
        std::env::remove_var("INBOXCTL_WEBHOOK_PORT");
        std::env::remove_var("INBOXCTL_WEBHOOK_PATH");
        std::env::remove_var("INBOXCTL_WEBHOOK_SECRET");
        std::env::remove_var("INBOXCTL_TUNNEL_PROVIDER");

        let cfg = ReceiverConfig::from_env();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.endpoint_path, "/webhook");
        assert!(cfg.secret.is_empty());
        assert!(cfg.tunnel_provider.is_none());
    }

    #[test]
    #[serial]
    fn proxy_config_region_default_is_us() {
        std::env::remove_var("INBOXCTL_REGION");
        let cfg = ProxyConfig::from_env();
        assert_eq!(cfg.region, "us");
    }
}
