//! HTTP error types and handling

use mimic_common::CodecError;
use thiserror::Error;

/// Errors surfaced by every mimic backend
#[derive(Error, Debug)]
pub enum HttpError {
    /// Connection failure or timeout at the engine level
    #[error("Transport error: {0}")]
    Transport(String),

    /// Requested capability is unavailable, or the session config is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller used the API out of order
    #[error("Usage error: {0}")]
    Usage(String),

    /// URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(String),

    /// Engine error that is neither a connection failure nor a timeout
    #[error("HTTP error: {0}")]
    Engine(reqwest::Error),
}

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Error category for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    /// Connection failures and timeouts
    Transport,
    /// Environment or session configuration
    Configuration,
    /// API misuse by the caller
    Usage,
    /// Invalid request construction
    Request,
    /// Response parsing errors
    Response,
    /// Redirect errors
    Redirect,
    /// Unknown/other errors
    Unknown,
}

impl HttpError {
    /// Map an engine error onto the unified kinds.
    ///
    /// Connect, timeout, send and body-read failures become `Transport`; every
    /// other reqwest error passes through as `Engine`.
    pub fn from_engine(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
            HttpError::Transport(err.to_string())
        } else {
            HttpError::Engine(err)
        }
    }

    /// Categorize the error for reporting
    pub fn category(&self) -> HttpErrorCategory {
        match self {
            HttpError::Transport(_) => HttpErrorCategory::Transport,
            HttpError::Configuration(_) => HttpErrorCategory::Configuration,
            HttpError::Usage(_) => HttpErrorCategory::Usage,
            HttpError::InvalidUrl(_) => HttpErrorCategory::Request,
            HttpError::Json(_) => HttpErrorCategory::Response,
            HttpError::Engine(e) => {
                if e.is_redirect() {
                    HttpErrorCategory::Redirect
                } else if e.is_builder() {
                    HttpErrorCategory::Request
                } else if e.is_decode() {
                    HttpErrorCategory::Response
                } else {
                    HttpErrorCategory::Unknown
                }
            }
        }
    }

    /// True for errors a caller might reasonably retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport(_))
    }

    /// Sanitize error message (remove sensitive info like credentials, internal IPs)
    pub fn sanitized_message(&self) -> String {
        sanitize(&self.to_string())
    }
}

impl From<url::ParseError> for HttpError {
    fn from(err: url::ParseError) -> Self {
        HttpError::InvalidUrl(err.to_string())
    }
}

impl From<CodecError> for HttpError {
    fn from(err: CodecError) -> Self {
        HttpError::Json(err.to_string())
    }
}

/// Redact credentials, internal addresses and tokens from a message or URL.
///
/// Proxy URLs routinely embed `user:pass@`, so this is applied before any
/// proxy URL reaches a log line.
pub fn sanitize(msg: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static URL_CREDS_RE: OnceLock<Regex> = OnceLock::new();
    static INTERNAL_IP_RE: OnceLock<Regex> = OnceLock::new();
    static AUTH_HEADER_RE: OnceLock<Regex> = OnceLock::new();

    let url_creds_re = URL_CREDS_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(https?|socks[45]h?)://[^@/\s:]+:[^@/\s]+@").expect("valid regex")
    });
    let internal_ip_re = INTERNAL_IP_RE.get_or_init(|| {
        Regex::new(r"\b(10\.|172\.(1[6-9]|2[0-9]|3[01])\.|192\.168\.)\d+\.\d+\b")
            .expect("valid regex")
    });
    let auth_header_re = AUTH_HEADER_RE.get_or_init(|| {
        Regex::new(r"(?i)(authorization:\s*bearer|bearer|api[_-]?key|token)\s*[:=]?\s*\S+")
            .expect("valid regex")
    });

    let sanitized = url_creds_re.replace_all(msg, "$1://[REDACTED]@");
    let sanitized = internal_ip_re.replace_all(&sanitized, "[INTERNAL_IP]");
    let sanitized = auth_header_re.replace_all(&sanitized, "$1: [REDACTED]");

    sanitized.to_string()
}
