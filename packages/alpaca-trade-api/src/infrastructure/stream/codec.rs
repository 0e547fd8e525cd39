//! Inbound Frame Codec
//!
//! Normalizes every text frame into `(channel, payload)` pairs regardless of
//! dialect, then casts payloads into entities by channel.
//!
//! # Frame Shapes
//!
//! ```json
//! {"stream": "trade_updates", "data": {"event": "fill", "order": {...}}}
//! [{"ev": "T", "sym": "AAPL", "p": 134.7, "s": 20}, {"ev": "Q", ...}]
//! ```
//!
//! A frame without a channel tag is treated as a control frame on the
//! synthetic `status` channel.

use serde_json::{Map, Value};

use crate::domain::entity::{Entity, EntityKind};
use crate::domain::records::RecordKind;
use crate::error::{Error, Result};

/// Channel used for control frames and synthetic connection events.
pub const STATUS_CHANNEL: &str = "status";

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel identifier (`ev` or `stream`).
    pub channel: String,
    /// Message body.
    pub payload: Value,
}

impl Frame {
    /// Build a frame.
    #[must_use]
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
        }
    }

    /// `status` field of a control frame, if any.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Whether the server is announcing the connection is going away.
    #[must_use]
    pub fn is_disconnect_notice(&self) -> bool {
        self.channel == STATUS_CHANNEL && matches!(self.status(), Some("disconnected" | "error"))
    }

    /// Cast the payload into an entity typed by channel.
    #[must_use]
    pub fn into_entity(self) -> Entity {
        cast(&self.channel, self.payload)
    }
}

/// Decode a text frame into messages.
pub fn decode(text: &str) -> Result<Vec<Frame>> {
    let value: Value = serde_json::from_str(text.trim())?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(split_message).collect()),
        Value::Object(_) => Ok(vec![split_message(value)]),
        other => Err(Error::transport(format!(
            "expected JSON array or object frame, got {other}"
        ))),
    }
}

fn split_message(mut message: Value) -> Frame {
    if let Some(channel) = message
        .get("ev")
        .and_then(Value::as_str)
        .map(ToString::to_string)
    {
        return Frame::new(channel, message);
    }
    if let Some(channel) = message
        .get("stream")
        .and_then(Value::as_str)
        .map(ToString::to_string)
    {
        let data = message.get_mut("data").map(Value::take);
        let payload = match data {
            Some(data) if !data.is_null() => data,
            _ => message,
        };
        return Frame::new(channel, payload);
    }
    Frame::new(STATUS_CHANNEL, message)
}

/// Entity kind for a channel.
#[must_use]
pub fn entity_kind_for(channel: &str) -> EntityKind {
    if let Some(record) = RecordKind::from_channel(channel) {
        return record.entity_kind();
    }
    match channel {
        "account_updates" => EntityKind::Account,
        "trade_updates" => EntityKind::TradeUpdate,
        _ => EntityKind::Generic,
    }
}

/// Wrap a payload as an entity for `channel`.
///
/// Non-object payloads are kept under a `data` key.
#[must_use]
pub fn cast(channel: &str, payload: Value) -> Entity {
    let kind = entity_kind_for(channel);
    match payload {
        Value::Object(map) => Entity::new(kind, map),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            Entity::new(kind, map)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn polygon_list_frames_keep_the_tag() {
        let frames = decode(r#"[{"ev":"T","sym":"AAPL","p":134.7},{"ev":"Q","sym":"MSFT"}]"#)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].channel, "T");
        assert_eq!(frames[0].payload["p"], json!(134.7));
        assert_eq!(frames[0].payload["ev"], "T");
        assert_eq!(frames[1].channel, "Q");
    }

    #[test]
    fn alpaca_object_frames_unwrap_data() {
        let frames =
            decode(r#"{"stream":"trade_updates","data":{"event":"fill","order":{"symbol":"AAPL"}}}"#)
                .unwrap();
        assert_eq!(frames, vec![Frame::new(
            "trade_updates",
            json!({"event": "fill", "order": {"symbol": "AAPL"}})
        )]);
    }

    #[test]
    fn untagged_frames_are_status() {
        let frames = decode(r#"{"status":"disconnected"}"#).unwrap();
        assert_eq!(frames[0].channel, STATUS_CHANNEL);
        assert!(frames[0].is_disconnect_notice());

        let frames = decode(r#"[{"ev":"status","status":"connected"}]"#).unwrap();
        assert!(!frames[0].is_disconnect_notice());
    }

    #[test]
    fn scalar_frames_are_rejected() {
        assert!(decode("42").is_err());
        assert!(decode("not json").is_err());
    }

    #[test_case("T", EntityKind::Trade)]
    #[test_case("T.AAPL", EntityKind::Trade)]
    #[test_case("Q.AAPL", EntityKind::Quote)]
    #[test_case("AM.AAPL", EntityKind::Bar)]
    #[test_case("A", EntityKind::Bar)]
    #[test_case("account_updates", EntityKind::Account)]
    #[test_case("trade_updates", EntityKind::TradeUpdate)]
    #[test_case("status", EntityKind::Generic)]
    fn channel_kinds(channel: &str, kind: EntityKind) {
        assert_eq!(entity_kind_for(channel), kind);
    }

    #[test]
    fn cast_trade_resolves_long_names() {
        let entity = cast("T", json!({"ev": "T", "sym": "AAPL", "p": 134.7, "s": 20}));
        assert_eq!(entity.get_f64("price"), Some(134.7));
        assert_eq!(entity.get_i64("size"), Some(20));
        assert_eq!(entity.symbol(), Some("AAPL"));
    }
}
