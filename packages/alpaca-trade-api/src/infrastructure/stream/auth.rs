//! Stream Authentication
//!
//! Interprets the server's answer to the auth frame.
//!
//! # Replies
//!
//! ## `Alpaca`
//! ```json
//! {"stream": "authorization", "data": {"action": "authenticate", "status": "authorized"}}
//! ```
//!
//! ## `Polygon`
//! ```json
//! [{"ev": "status", "status": "connected", "message": "Connected Successfully"}]
//! [{"ev": "status", "status": "auth_success", "message": "authenticated"}]
//! ```
//!
//! The `connected` greeting may arrive before or after the auth frame is sent
//! and is skipped. Any other reply is a rejection and is never retried.

use serde_json::Value;

use super::codec::{Frame, STATUS_CHANNEL};
use super::messages::Dialect;
use crate::error::AuthError;

/// Channel the `Alpaca` dialect answers on.
pub const AUTHORIZATION_CHANNEL: &str = "authorization";

/// Result of inspecting one frame while authenticating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthReply {
    /// Not an answer yet; keep reading.
    Pending,
    /// Authenticated.
    Accepted,
    /// Authentication failed.
    Rejected(AuthError),
}

const ACCEPTED: &[&str] = &["authorized", "authenticated", "auth_success"];

/// Classify `frame` as an answer to the auth frame.
#[must_use]
pub fn evaluate(dialect: Dialect, frame: &Frame) -> AuthReply {
    let status = frame.status();

    match dialect {
        Dialect::Alpaca if frame.channel == AUTHORIZATION_CHANNEL => classify(frame, status),
        Dialect::Polygon if frame.channel == STATUS_CHANNEL => match status {
            Some("connected") => AuthReply::Pending,
            _ => classify(frame, status),
        },
        _ => AuthReply::Rejected(AuthError::UnexpectedReply(format!(
            "{} frame on channel {:?}",
            describe(dialect),
            frame.channel
        ))),
    }
}

fn classify(frame: &Frame, status: Option<&str>) -> AuthReply {
    match status {
        Some(status) if ACCEPTED.contains(&status) => AuthReply::Accepted,
        Some(status) => AuthReply::Rejected(AuthError::Rejected {
            status: status.to_string(),
            message: message_of(&frame.payload),
        }),
        None => AuthReply::Rejected(AuthError::UnexpectedReply(frame.payload.to_string())),
    }
}

fn message_of(payload: &Value) -> String {
    ["message", "error", "msg"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

const fn describe(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Alpaca => "alpaca",
        Dialect::Polygon => "polygon",
    }
}
