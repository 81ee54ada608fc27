// src/util.rs
//
// Small primitives shared by the webhook receiver and the MCP proxy.
// Nothing here is domain-specific; it exists so both subsystems use the
// same constant-time comparison and the same bounded-line-reading policy
// instead of each rolling its own.

use subtle::ConstantTimeEq;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Constant-time byte-string equality. Used for HMAC signature comparison
/// so that a mismatching prefix doesn't return early and leak timing
/// information about how many leading bytes matched.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Maximum size of a single stdio line or HTTP body the core will read into
/// memory before giving up. Chosen generously for JSON-RPC tool payloads and
/// webhook bodies; pathological input beyond this is rejected rather than
/// buffered without bound.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Read one line (without the trailing newline) from `reader`, bounded to
/// [`MAX_LINE_BYTES`]. Returns `Ok(None)` on clean EOF with nothing read.
pub async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    let mut limited = reader.take(MAX_LINE_BYTES as u64);
    let n = limited.read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
