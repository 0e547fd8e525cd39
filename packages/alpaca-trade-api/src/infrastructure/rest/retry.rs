//! Retry Budget & Response Classification
//!
//! Shared by the async and blocking engines.
//!
//! | Status | Outcome |
//! |--------|---------|
//! | 2xx, empty body | no value |
//! | 2xx, JSON body | decoded value |
//! | 429 | retried while budget remains |
//! | non-2xx, body has `code` | [`Error::Api`] |
//! | other non-2xx | [`Error::Transport`] with status |
//!
//! 5xx is not retried.

use std::time::Duration;

use serde_json::Value;

use crate::error::{Error, RequestRef, Result};
use crate::infrastructure::config::RetryPolicy;

/// Status the engines retry on.
pub const RATE_LIMITED: u16 = 429;

/// Category of a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited; retry after the configured wait.
    RateLimited,
    /// Surface to the caller.
    NonRetryable,
}

impl ErrorCategory {
    /// Categorize an HTTP status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            RATE_LIMITED => Self::RateLimited,
            _ => Self::NonRetryable,
        }
    }
}

/// Per-call retry counter.
#[derive(Debug, Clone)]
pub struct RetryBudget {
    remaining: u32,
    wait: Duration,
    attempt: u32,
}

impl RetryBudget {
    /// Fresh budget for one call.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            remaining: policy.max_attempts,
            wait: policy.wait,
            attempt: 1,
        }
    }

    /// Consume one retry, returning the wait before it.
    pub const fn next_wait(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.attempt += 1;
        Some(self.wait)
    }

    /// Attempt number about to be made (1-based).
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Decide the outcome of one attempt.
pub fn classify(status: u16, body: &str, request: RequestRef) -> Result<Option<Value>> {
    if (200..300).contains(&status) {
        if body.trim().is_empty() {
            return Ok(None);
        }
        return serde_json::from_str(body).map(Some).map_err(Error::from);
    }

    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(Value::Object(fields)) = &parsed
        && let Some(code) = fields.get("code").and_then(parse_code)
    {
        let message = fields
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| body.to_string(), str::to_string);
        return Err(Error::Api {
            code,
            status,
            message,
            request,
        });
    }

    let message = if body.trim().is_empty() {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    };
    Err(Error::Transport {
        status: Some(status),
        message,
    })
}

fn parse_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn request() -> RequestRef {
        RequestRef::new("GET", "https://api.alpaca.markets/v2/account")
    }

    #[test]
    fn success_bodies() {
        assert_eq!(classify(204, "", request()).unwrap(), None);
        assert_eq!(
            classify(200, r#"{"status":"ACTIVE"}"#, request()).unwrap(),
            Some(serde_json::json!({"status": "ACTIVE"}))
        );
        assert!(matches!(
            classify(200, "not json", request()),
            Err(Error::Transport { status: None, .. })
        ));
    }

    #[test_case(r#"{"code": 40010001, "message": "invalid qty"}"# ; "numeric code")]
    #[test_case(r#"{"code": "40010001", "message": "invalid qty"}"# ; "string code")]
    fn vendor_code_is_api_error(body: &str) {
        let err = classify(422, body, request()).unwrap_err();
        assert_eq!(err.code(), Some(40_010_001));
        assert_eq!(err.http_status(), Some(422));
        assert!(err.to_string().contains("invalid qty"));
        assert_eq!(err.request(), Some(&request()));
    }

    #[test_case(500, "Internal Server Error" ; "server error")]
    #[test_case(429, "" ; "rate limited")]
    #[test_case(404, r#"{"message": "not found"}"# ; "no code")]
    fn everything_else_is_transport(status: u16, body: &str) {
        let err = classify(status, body, request()).unwrap_err();
        assert!(matches!(err, Error::Transport { status: Some(s), .. } if s == status));
    }

    #[test]
    fn budget_counts_down() {
        let mut budget = RetryBudget::new(RetryPolicy {
            max_attempts: 2,
            wait: Duration::from_millis(5),
        });
        assert_eq!(budget.next_wait(), Some(Duration::from_millis(5)));
        assert_eq!(budget.next_wait(), Some(Duration::from_millis(5)));
        assert_eq!(budget.attempt(), 3);
        assert_eq!(budget.next_wait(), None);
    }

    #[test]
    fn zero_budget_never_retries() {
        let mut budget = RetryBudget::new(RetryPolicy {
            max_attempts: 0,
            wait: Duration::ZERO,
        });
        assert_eq!(budget.next_wait(), None);
    }

    #[test]
    fn only_rate_limit_is_retryable() {
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimited);
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::NonRetryable);
    }
}
