use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input to a public operation. Raised before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing or empty credential.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Transport, status or decode failure on the single-request path.
    #[error(transparent)]
    Response(#[from] ResponseError),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Http(#[source] reqwest::Error),

    /// [`crate::SessionRegistry::get`] was called before any session was opened.
    #[error("no database session is open; call init first")]
    NoSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid URL {0:?}: both scheme and host are required")]
    InvalidUrl(String),

    #[error("invalid method {0:?}: expected GET or POST")]
    InvalidMethod(String),

    #[error("invalid campaign id {0}: must be a positive integer")]
    InvalidId(i64),

    #[error("invalid site id {0}: must be a positive integer")]
    InvalidSiteId(i64),

    #[error("no campaign ids given")]
    EmptyIds,

    #[error("invalid {field} {value:?}: expected a YYYY-MM-DD date")]
    InvalidDate { field: &'static str, value: String },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseErrorKind {
    /// Connection failure, timeout or other error before a status was received.
    Transport,
    /// A non-2xx status.
    Status(u16),
    /// A 2xx response whose body is not valid JSON.
    Decode,
}

#[derive(Debug, Clone, Error)]
#[error("API request failed: {}{} {} ({})", status_prefix(.kind), .method, .url, .reason)]
pub struct ResponseError {
    pub method: String,
    pub url: String,
    pub kind: ResponseErrorKind,
    pub reason: String,
}

impl ResponseError {
    pub(crate) fn transport(method: &str, url: &str, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("timed out: {err}")
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self {
            method: method.to_string(),
            url: url.to_string(),
            kind: ResponseErrorKind::Transport,
            reason,
        }
    }

    pub(crate) fn status(method: &str, url: &str, status: StatusCode, body: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            kind: ResponseErrorKind::Status(status.as_u16()),
            reason: summarize_body(status, body),
        }
    }

    pub(crate) fn decode(method: &str, url: &str, err: &serde_json::Error) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            kind: ResponseErrorKind::Decode,
            reason: format!("failed to parse API JSON: {err}"),
        }
    }

    /// HTTP status when the server answered, `None` for transport and decode failures.
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            ResponseErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }
}

fn status_prefix(kind: &ResponseErrorKind) -> String {
    match kind {
        ResponseErrorKind::Status(code) => format!("HTTP {code} for "),
        _ => String::new(),
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

const BODY_EXCERPT_LEN: usize = 200;

/// Turns an error response into a one-line reason.
///
/// ESP error payloads are not uniform: some carry `message`, some `error`, and
/// proxies in front of the API answer with HTML. Prefer a JSON message and fall
/// back to a truncated excerpt of the raw body.
pub(crate) fn summarize_body(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(msg) = parsed.message.or(parsed.error).or(parsed.detail) {
            return msg;
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("empty response body")
            .to_string();
    }

    let mut excerpt: String = trimmed.chars().take(BODY_EXCERPT_LEN).collect();
    if trimmed.chars().count() > BODY_EXCERPT_LEN {
        excerpt.push_str("...");
    }
    excerpt
}
