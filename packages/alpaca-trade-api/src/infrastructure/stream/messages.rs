//! Outbound Frames
//!
//! The two servers this crate talks to disagree on every control frame.
//!
//! | Frame | `Alpaca` | `Polygon` |
//! |-------|----------|-----------|
//! | auth | `{"action":"authenticate","data":{"key_id":..,"secret_key":..}}` | `{"action":"auth","params":"KEY"}` |
//! | subscribe | `{"action":"listen","data":{"streams":[..]}}` | `{"action":"subscribe","params":"T.AAPL,Q.AAPL"}` |
//! | unsubscribe | `{"action":"unlisten","data":{"streams":[..]}}` | `{"action":"unsubscribe","params":".."}` |

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::infrastructure::config::Credentials;

/// Frame dialect spoken by a streaming server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Trading and market data streams: `{stream, data}` objects.
    Alpaca,
    /// Cluster stream: lists of objects tagged with `ev`.
    Polygon,
}

impl Dialect {
    /// Build the authentication frame.
    pub fn auth_frame(self, credentials: &Credentials) -> Result<Value> {
        match self {
            Self::Alpaca => {
                if let Some(token) = credentials.oauth_token() {
                    return Ok(json!({
                        "action": "authenticate",
                        "data": {"oauth_token": token},
                    }));
                }
                match (credentials.key_id(), credentials.secret_key()) {
                    (Some(key_id), Some(secret_key)) => Ok(json!({
                        "action": "authenticate",
                        "data": {"key_id": key_id, "secret_key": secret_key},
                    })),
                    _ => Err(Error::Config(
                        "stream authentication requires a key pair or OAuth token".to_string(),
                    )),
                }
            }
            Self::Polygon => {
                let key = credentials.key_id().ok_or_else(|| {
                    Error::Config("Polygon stream authentication requires a key id".to_string())
                })?;
                Ok(json!({"action": "auth", "params": key}))
            }
        }
    }

    /// Build a subscribe frame for `channels`.
    #[must_use]
    pub fn subscribe_frame(self, channels: &[String]) -> Value {
        match self {
            Self::Alpaca => json!({"action": "listen", "data": {"streams": channels}}),
            Self::Polygon => json!({"action": "subscribe", "params": channels.join(",")}),
        }
    }

    /// Build an unsubscribe frame for `channels`.
    #[must_use]
    pub fn unsubscribe_frame(self, channels: &[String]) -> Value {
        match self {
            Self::Alpaca => json!({"action": "unlisten", "data": {"streams": channels}}),
            Self::Polygon => json!({"action": "unsubscribe", "params": channels.join(",")}),
        }
    }
}

/// Channels carried by a subscribe or unsubscribe frame.
///
/// Inverse of the frame builders; used to inspect captured traffic.
#[must_use]
pub fn frame_channels(frame: &Value) -> Vec<String> {
    if let Some(streams) = frame.pointer("/data/streams").and_then(Value::as_array) {
        return streams
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect();
    }
    frame
        .get("params")
        .and_then(Value::as_str)
        .map(|params| {
            params
                .split(',')
                .filter(|c| !c.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
