//! Error types for the SceneBot client.

use std::fmt;

use thiserror::Error;

/// Stable error codes surfaced to UI layers.
///
/// Every [`SceneBotError`] maps to exactly one code. The `Display` form is
/// the SCREAMING_SNAKE wire spelling callers match on when picking a
/// user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidInput,
    NoBackend,
    ClientRateLimit,
    Unauthorized,
    Timeout,
    DnsFail,
    BadResponse,
    ServiceUnavailable,
}

impl ErrorCode {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NoBackend => "NO_BACKEND",
            ErrorCode::ClientRateLimit => "CLIENT_RATE_LIMIT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::DnsFail => "DNS_FAIL",
            ErrorCode::BadResponse => "BAD_RESPONSE",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by SceneBot calls.
///
/// Every failure is terminal for that call; there are no retries beyond the
/// single demo fallback the client performs internally.
#[derive(Debug, Error)]
pub enum SceneBotError {
    /// Message rejected before any network call was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backend base URL is missing or not an https URL.
    #[error("no usable backend: {0}")]
    NoBackend(String),

    /// Called again inside the minimum inter-call interval. No network call
    /// was made.
    #[error("rate limited on the client: retry in {retry_in_ms}ms")]
    ClientRateLimit { retry_in_ms: u64 },

    /// Backend rejected the credentials (401/403).
    #[error("unauthorized: backend returned {status}")]
    Unauthorized { status: u16 },

    /// Request exceeded its deadline, or the caller cancelled it.
    #[error("timed out: {0}")]
    Timeout(String),

    /// DNS resolution of the backend host failed.
    #[error("dns lookup failed: {0}")]
    DnsFail(String),

    /// 2xx body in no recognized shape, or an unexpected non-2xx status.
    #[error("unusable backend response: {0}")]
    BadResponse(String),

    /// Backend 5xx, a generic transport failure, or a failed demo fallback
    /// carrying the error that triggered it.
    #[error("scene-bot unavailable: {reason}")]
    ServiceUnavailable {
        reason: String,
        #[source]
        source: Option<Box<SceneBotError>>,
    },
}

impl SceneBotError {
    /// The stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SceneBotError::InvalidInput(_) => ErrorCode::InvalidInput,
            SceneBotError::NoBackend(_) => ErrorCode::NoBackend,
            SceneBotError::ClientRateLimit { .. } => ErrorCode::ClientRateLimit,
            SceneBotError::Unauthorized { .. } => ErrorCode::Unauthorized,
            SceneBotError::Timeout(_) => ErrorCode::Timeout,
            SceneBotError::DnsFail(_) => ErrorCode::DnsFail,
            SceneBotError::BadResponse(_) => ErrorCode::BadResponse,
            SceneBotError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Whether the demo fallback may run after this failure.
    ///
    /// Timeouts are raised directly and auth rejections never fall back;
    /// input, backend-URL, and rate-gate failures happen before any request
    /// exists.
    pub fn fallback_eligible(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::DnsFail | ErrorCode::BadResponse | ErrorCode::ServiceUnavailable
        )
    }

    /// A `SERVICE_UNAVAILABLE` with no underlying classified error.
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        SceneBotError::ServiceUnavailable {
            reason: reason.into(),
            source: None,
        }
    }

    /// A `SERVICE_UNAVAILABLE` wrapping the error that sent us to the demo
    /// endpoint in the first place.
    pub(crate) fn fallback_failed(original: SceneBotError) -> Self {
        SceneBotError::ServiceUnavailable {
            reason: "demo fallback failed".to_string(),
            source: Some(Box::new(original)),
        }
    }
}

/// Result type alias for SceneBot calls.
pub type Result<T> = std::result::Result<T, SceneBotError>;
