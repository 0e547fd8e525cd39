//! Argument validation shared by the resolver and the endpoint builders.

use chrono::NaiveDate;

use crate::error::{Error, Result};

/// URL schemes the client accepts.
pub const ALLOWED_SCHEMES: &[&str] = &["http://", "https://", "ws://", "wss://"];

/// Check the scheme and strip trailing slashes.
pub fn normalize_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if !ALLOWED_SCHEMES.iter().any(|scheme| trimmed.starts_with(scheme)) {
        return Err(Error::Config(format!(
            "URL must start with http://, https://, ws:// or wss://, got {trimmed:?}"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn validate_date(date: &str) -> Result<NaiveDate> {
    let bytes = date.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return Err(Error::Validation(format!(
            "date must be YYYY-MM-DD, got {date:?}"
        )));
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("{date} is not a calendar date")))
}
