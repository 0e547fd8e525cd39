//! Error Taxonomy
//!
//! Every fallible operation in the crate returns [`Error`]. The variants share
//! a common base (`http_status`, `code`, `message`, `request`) exposed through
//! accessor methods so callers can inspect failures without matching on each
//! variant.
//!
//! | Variant | Raised by |
//! |---------|-----------|
//! | `Config` | resolver, TimeFrame construction |
//! | `Validation` | public surface arguments (prices, patterns, dates) |
//! | `Api` | non-2xx response whose body carries a vendor `code` |
//! | `Transport` | any other non-2xx or I/O failure |
//! | `Auth` | streaming authentication rejection |
//! | `ConnectionExhausted` | streaming reconnect budget spent |

use std::fmt;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Handle to the request that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRef {
    /// HTTP method.
    pub method: String,
    /// Fully resolved URL (without query string).
    pub url: String,
}

impl RequestRef {
    /// Create a new request reference.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Streaming authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The server answered the auth frame with a non-success status.
    #[error("authentication rejected ({status}): {message}")]
    Rejected {
        /// Status field of the reply (e.g. "unauthorized", "auth_failed").
        status: String,
        /// Human readable message from the server, if any.
        message: String,
    },

    /// The reply could not be interpreted as an authentication answer.
    #[error("unexpected authentication reply: {0}")]
    UnexpectedReply(String),
}

/// Errors produced by the REST and streaming engines.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials, malformed URL, misconfigured TimeFrame.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad argument at the public surface.
    #[error("validation error: {0}")]
    Validation(String),

    /// Well-formed non-2xx response carrying a vendor error code.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        /// Vendor error code from the response body.
        code: i64,
        /// HTTP status of the response.
        status: u16,
        /// Human readable message.
        message: String,
        /// Request that produced the response.
        request: RequestRef,
    },

    /// Non-2xx without a vendor code, or an I/O failure.
    #[error("transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },

    /// Streaming authentication was rejected. Never retried.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The streaming reconnect budget was spent.
    #[error("connection exhausted after {attempts} reconnect attempts")]
    ConnectionExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
    },
}

impl Error {
    /// Build a transport error without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Vendor error code, if any.
    #[must_use]
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Request that produced the error, if any.
    #[must_use]
    pub const fn request(&self) -> Option<&RequestRef> {
        match self {
            Self::Api { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Whether the REST engine would retry this failure.
    ///
    /// Only rate limiting (HTTP 429) is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.http_status(), Some(429))
    }

    /// Whether the streaming engine should stop instead of reconnecting.
    #[must_use]
    pub const fn is_fatal_for_stream(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::ConnectionExhausted { .. } | Self::Validation(_) | Self::Config(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        let status = match &err {
            tokio_tungstenite::tungstenite::Error::Http(response) => {
                Some(response.status().as_u16())
            }
            _ => None,
        };
        Self::Transport {
            status,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::transport(format!("undecodable JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_exposes_common_base() {
        let err = Error::Api {
            code: 40_310_000,
            status: 403,
            message: "insufficient buying power".to_string(),
            request: RequestRef::new("POST", "https://api.alpaca.markets/v2/orders"),
        };
        assert_eq!(err.code(), Some(40_310_000));
        assert_eq!(err.http_status(), Some(403));
        assert_eq!(err.request().map(|r| r.method.as_str()), Some("POST"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn transport_error_display_includes_status() {
        let err = Error::Transport {
            status: Some(429),
            message: "too many requests".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transport error (HTTP 429): too many requests"
        );
        assert!(err.is_retryable());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn transport_error_without_status() {
        let err = Error::transport("connection reset");
        assert_eq!(err.to_string(), "transport error: connection reset");
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn auth_errors_are_fatal_for_streams() {
        let err: Error = AuthError::Rejected {
            status: "unauthorized".to_string(),
            message: String::new(),
        }
        .into();
        assert!(err.is_fatal_for_stream());
        assert!(!Error::transport("eof").is_fatal_for_stream());
    }
}
