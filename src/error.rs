use http::Method;
use thiserror::Error;

use crate::response::ResponseBody;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a failed or interrupted exchange. This is what
/// the retry predicate sees when deciding whether another attempt is worth it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Read,
    Timeout,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Read => "read",
            Self::Timeout => "timeout",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUrl,
    InvalidHeaderName,
    InvalidHeaderValue,
    SerializeJson,
    RequestBuild,
    ProxySetup,
    TlsInit,
    Transport,
    Timeout,
    HttpStatus,
    Deserialize,
    MissingRedirectLocation,
    InvalidRedirectLocation,
    RedirectLoop,
    RedirectBodyNotReplayable,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::SerializeJson => "serialize_json",
            Self::RequestBuild => "request_build",
            Self::ProxySetup => "proxy_setup",
            Self::TlsInit => "tls_init",
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Deserialize => "deserialize",
            Self::MissingRedirectLocation => "missing_redirect_location",
            Self::InvalidRedirectLocation => "invalid_redirect_location",
            Self::RedirectLoop => "redirect_loop",
            Self::RedirectBodyNotReplayable => "redirect_body_not_replayable",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request url: {url}")]
    InvalidUrl { url: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to set up proxy transport: {message}")]
    ProxySetup { message: String },
    #[error("failed to initialize tls transport: {message}")]
    TlsInit { message: String },
    #[error("transport error ({kind}) for {method} {url}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("request timed out after {timeout_ms}ms for {method} {url}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        url: String,
    },
    /// Non-2xx, non-redirect response. `summary` is the display line derived
    /// from the parsed body; `body` keeps the structured value for callers.
    #[error("HTTP Error {status} for {method} {url}\n{summary}")]
    HttpStatus {
        status: u16,
        method: Method,
        url: String,
        summary: String,
        body: ResponseBody,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    Deserialize {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("redirect response {status} missing location header for {method} {url}")]
    MissingRedirectLocation {
        status: u16,
        method: Method,
        url: String,
    },
    #[error("invalid redirect location {location} for {method} {url}")]
    InvalidRedirectLocation {
        location: String,
        method: Method,
        url: String,
    },
    #[error("redirect loop at {url} after {hops} hops for {method}")]
    RedirectLoop {
        hops: usize,
        method: Method,
        url: String,
    },
    #[error("cannot follow redirect for non-replayable request body: {method} {url}")]
    RedirectBodyNotReplayable { method: Method, url: String },
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::Serialize { .. } => ErrorCode::SerializeJson,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::ProxySetup { .. } => ErrorCode::ProxySetup,
            Self::TlsInit { .. } => ErrorCode::TlsInit,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::MissingRedirectLocation { .. } => ErrorCode::MissingRedirectLocation,
            Self::InvalidRedirectLocation { .. } => ErrorCode::InvalidRedirectLocation,
            Self::RedirectLoop { .. } => ErrorCode::RedirectLoop,
            Self::RedirectBodyNotReplayable { .. } => ErrorCode::RedirectBodyNotReplayable,
        }
    }

    /// HTTP status behind this error, or 0 when no response was ever
    /// received (transport failures, timeouts, construction errors).
    pub const fn status(&self) -> u16 {
        match self {
            Self::HttpStatus { status, .. } => *status,
            _ => 0,
        }
    }

    /// Parsed (or raw-text) response body for status errors.
    pub const fn response_body(&self) -> Option<&ResponseBody> {
        match self {
            Self::HttpStatus { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Kind used for retry classification, present only on errors that can
    /// ever be retried.
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(TransportErrorKind::Timeout),
            _ => None,
        }
    }
}
