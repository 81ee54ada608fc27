// src/webhook/tunnel.rs
//
// Tunnel supervisor capability (spec §4.2, §6.1): expose the local listener
// to the public internet by supervising an external child process and
// scraping its log stream for the dynamically assigned public URL.
//
// Grounded in this codebase's own external-process patterns — `recording.rs`
// spawns and owns an `ffmpeg` child with piped stdio — generalized here to an
// async child (`tokio::process::Command`) whose combined output is scanned
// line by line, the way `turbomcp-stdio`'s transport reads framed lines off
// a child's stdio.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::webhook::stats::TunnelStatus;

/// Capability the receiver's supervisor requires of any tunnel provider
/// (spec §4.2, §6.1).
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Start the tunnel against `local_port`, returning the discovered
    /// public URL (without the endpoint path) or an error if none is
    /// observed before `deadline`.
    async fn start(&self, local_port: u16, deadline: Duration) -> anyhow::Result<String>;

    /// Idempotent termination of the underlying child process.
    async fn stop(&self) -> anyhow::Result<()>;

    async fn status(&self) -> TunnelStatus;
}

const URL_MARKER: &str = "https://";
const EXPECTED_SUFFIX: &str = "trycloudflare.com";

/// Scan a single log line for the first syntactically valid tunnel URL.
/// Tolerates ANSI escapes and surrounding log noise (spec §9: "implementations
/// MUST tolerate additional log lines... and lines interleaved before the URL
/// line; they SHOULD treat the first syntactically valid `https://...` match
/// as authoritative").
fn extract_url(line: &str) -> Option<String> {
    let stripped = strip_ansi(line);
    let start = stripped.find(URL_MARKER)?;
    let candidate = &stripped[start..];
    let end = candidate
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .unwrap_or(candidate.len());
    let url = &candidate[..end];
    if url.contains(EXPECTED_SUFFIX) || url.len() > URL_MARKER.len() {
        Some(url.to_string())
    } else {
        None
    }
}

/// Strip the common subset of ANSI CSI escape sequences (`\x1b[...<letter>`)
/// that terminal-oriented CLIs like `cloudflared` emit in their logs.
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Cloudflare-style HTTP tunnel, the only provider the core must support
/// (spec §4.2). Spawns `cloudflared tunnel --url http://localhost:<port>`
/// and scans its combined stdout/stderr for the assigned `*.trycloudflare.com`
/// URL.
pub struct CloudflaredTunnel {
    binary: String,
    status: Arc<RwLock<TunnelStatus>>,
    child: Mutex<Option<Child>>,
}

impl CloudflaredTunnel {
    pub fn new() -> Self {
        Self {
            binary: "cloudflared".to_string(),
            status: Arc::new(RwLock::new(TunnelStatus::Stopped)),
            child: Mutex::new(None),
        }
    }

    fn binary_available(&self) -> bool {
        which(&self.binary)
    }
}

impl Default for CloudflaredTunnel {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal `PATH` search, avoiding a dependency on the `which` crate for one
/// call site.
fn which(binary: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(binary).is_file())
}

#[async_trait]
impl Tunnel for CloudflaredTunnel {
    async fn start(&self, local_port: u16, deadline: Duration) -> anyhow::Result<String> {
        if !self.binary_available() {
            anyhow::bail!(
                "cloudflared binary not found on PATH; install it from \
                 https://github.com/cloudflare/cloudflared and retry"
            );
        }

        *self.status.write().await = TunnelStatus::Starting;

        let mut child = Command::new(&self.binary)
            .args([
                "tunnel",
                "--url",
                &format!("http://localhost:{local_port}"),
                "--no-autoupdate",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to spawn cloudflared: {e}"))?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let result = tokio::time::timeout(deadline, scan_for_url(stdout, stderr)).await;

        match result {
            Ok(Some(url)) => {
                *self.status.write().await = TunnelStatus::Running;
                *self.child.lock().await = Some(child);
                info!(public_url = %url, "tunnel established");
                Ok(url)
            }
            Ok(None) => {
                *self.status.write().await = TunnelStatus::Failed;
                let _ = child.id();
                anyhow::bail!("cloudflared exited before a public URL was observed")
            }
            Err(_) => {
                *self.status.write().await = TunnelStatus::Failed;
                let _ = child.start_kill();
                anyhow::bail!("timed out waiting for cloudflared to report a public URL")
            }
        }
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            // Give the child a bounded grace period to exit on its own
            // before force-killing (spec §4.2 step 5).
            let _ = child.start_kill();
            let grace = tokio::time::timeout(Duration::from_secs(3), child.wait()).await;
            if grace.is_err() {
                warn!("cloudflared did not exit within the grace period");
            }
        }
        *self.status.write().await = TunnelStatus::Stopped;
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        *self.status.read().await
    }
}

async fn scan_for_url(
    stdout: tokio::process::ChildStdout,
    stderr: tokio::process::ChildStderr,
) -> Option<String> {
    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            line = out_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(url) = extract_url(&line) {
                            return Some(url);
                        }
                    }
                    Ok(None) | Err(_) => return None,
                }
            }
            line = err_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(url) = extract_url(&line) {
                            return Some(url);
                        }
                    }
                    Ok(None) | Err(_) => return None,
                }
            }
        }
    }
}

/// In-memory test double for `Tunnel`, used by receiver integration tests
/// that don't want to shell out to a real `cloudflared` binary (SPEC_FULL §B).
pub struct FakeTunnel {
    pub url: String,
    status: RwLock<TunnelStatus>,
}

impl FakeTunnel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: RwLock::new(TunnelStatus::Stopped),
        }
    }
}

#[async_trait]
impl Tunnel for FakeTunnel {
    async fn start(&self, _local_port: u16, _deadline: Duration) -> anyhow::Result<String> {
        *self.status.write().await = TunnelStatus::Running;
        Ok(self.url.clone())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        *self.status.write().await = TunnelStatus::Stopped;
        Ok(())
    }

    async fn status(&self) -> TunnelStatus {
        *self.status.read().await
    }
}
