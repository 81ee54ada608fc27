use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

// ─── ProxyError ─────────────────────────────────────────────────────────────
//
// Proxy-internal errors need `?`-propagation through a single-threaded loop
// rather than an HTTP response, so they use a `thiserror`-derived enum with
// an `anyhow` catch-all leaf — the same combination this codebase's sibling
// microservice (`broz-shared::errors::AppError`) uses for its internal error
// type: `#[derive(thiserror::Error)] ... Internal(#[from] anyhow::Error)`.

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body_prefix}")]
    UpstreamStatus { status: u16, body_prefix: String },

    #[error("failed to serialize response")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ─── JSON envelope ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    status: u16,
}

// ─── ApiError ───────────────────────────────────────────────────────────────

/// Structured API error that serializes to JSON.
///
/// ```json
/// {
///   "error": {
///     "code": "room_not_found",
///     "message": "Room 'abc123' does not exist.",
///     "status": 404
///   }
/// }
/// ```
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub status: StatusCode,
}

// ─── IntoResponse ───────────────────────────────────────────────────────────

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Log according to severity.
        if self.status.is_server_error() {
            tracing::error!(
                code = self.code,
                status = self.status.as_u16(),
                "{}",
                self.message
            );
        } else if self.status.is_client_error() {
            tracing::warn!(
                code = self.code,
                status = self.status.as_u16(),
                "{}",
                self.message
            );
        }

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code,
                message: self.message,
                status: self.status.as_u16(),
            },
        };

        (self.status, Json(envelope)).into_response()
    }
}

// ─── From<StatusCode> (retro-compatibility) ─────────────────────────────────

impl From<StatusCode> for ApiError {
    fn from(status: StatusCode) -> Self {
        let code: &'static str = match status {
            StatusCode::BAD_REQUEST => "bad_request",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::CONFLICT => "conflict",
            StatusCode::INTERNAL_SERVER_ERROR => "internal_server_error",
            _ => "unknown_error",
        };

        let message = status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string();

        Self {
            code,
            message,
            status,
        }
    }
}

// ─── Generic constructors ───────────────────────────────────────────────────

impl ApiError {
    /// 401 Unauthorized with a custom message.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            code: "unauthorized",
            message: msg.into(),
            status: StatusCode::UNAUTHORIZED,
        }
    }

    /// 403 Forbidden with a custom message.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            code: "forbidden",
            message: msg.into(),
            status: StatusCode::FORBIDDEN,
        }
    }

    /// 404 Not Found with a custom message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            code: "not_found",
            message: msg.into(),
            status: StatusCode::NOT_FOUND,
        }
    }

    /// 409 Conflict with a custom message.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            code: "conflict",
            message: msg.into(),
            status: StatusCode::CONFLICT,
        }
    }

    /// 400 Bad Request with a custom message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: "bad_request",
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }

    /// 500 Internal Server Error with a custom message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: "internal_server_error",
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // ─── Domain-specific constructors ───────────────────────────────────

    /// 405 — a method other than GET/POST was used against the webhook
    /// ingest endpoint.
    pub fn method_not_allowed(method: &str) -> Self {
        Self {
            code: "method_not_allowed",
            message: format!("Method '{method}' is not allowed on this endpoint."),
            status: StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// 404 — no route matches the request path.
    pub fn route_not_found(path: &str) -> Self {
        Self {
            code: "not_found",
            message: format!("No route for '{path}'."),
            status: StatusCode::NOT_FOUND,
        }
    }

    /// 400 — the tunnel binary required by the configured provider is not
    /// installed or not on `PATH`.
    pub fn tunnel_binary_missing(hint: &str) -> Self {
        Self {
            code: "tunnel_binary_missing",
            message: hint.to_string(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
