//! Entity Field Bag
//!
//! An [`Entity`] is a read-only view over the raw JSON object returned by the
//! API or pushed by a stream. Accessors coerce values on the way out and never
//! touch the underlying map.
//!
//! # Instant Coercion
//!
//! Each [`EntityKind`] lists the fields that carry instants. Strings in those
//! fields that look like `YYYY-MM-DDT...` parse as RFC-3339; numbers are
//! epoch milliseconds. Both are exposed in the market time zone
//! (`America/New_York`). [`EntityKind::Generic`] has no schema and falls back
//! to the key suffix rule (`_at`, `_timestamp`, `_time`).

use chrono::{DateTime, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::records::RecordKind;

/// Time zone instants are exposed in.
pub const MARKET_TZ: Tz = chrono_tz::America::New_York;

/// Key suffixes that mark instant fields on generic entities.
const INSTANT_SUFFIXES: &[&str] = &["_at", "_timestamp", "_time"];

// =============================================================================
// Entity Kind
// =============================================================================

/// Schema tag selecting the instant-typed fields and short-key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityKind {
    /// Unknown shape; instants follow the key suffix rule.
    #[default]
    Generic,
    /// Trading account.
    Account,
    /// Account configuration flags.
    AccountConfigurations,
    /// Account activity (fills, dividends, fees).
    Activity,
    /// Order.
    Order,
    /// Open position.
    Position,
    /// Tradable asset.
    Asset,
    /// Market clock.
    Clock,
    /// Trading calendar day.
    Calendar,
    /// Watchlist.
    Watchlist,
    /// Portfolio equity history.
    PortfolioHistory,
    /// News article.
    News,
    /// Symbol snapshot (latest trade, quote, bars).
    Snapshot,
    /// Trade record (short keys).
    Trade,
    /// Quote record (short keys).
    Quote,
    /// Bar / aggregate record (short keys).
    Bar,
    /// Order lifecycle event from the trading stream.
    TradeUpdate,
}

impl EntityKind {
    /// Fields holding instants for this kind.
    ///
    /// Record kinds name their long field names; lookups resolve them
    /// through the short-key table.
    #[must_use]
    pub const fn instant_fields(self) -> &'static [&'static str] {
        match self {
            Self::Generic
            | Self::AccountConfigurations
            | Self::Position
            | Self::Asset
            | Self::Calendar
            | Self::PortfolioHistory
            | Self::Snapshot => &[],
            Self::Account => &["created_at"],
            Self::Activity => &["transaction_time"],
            Self::Order => &[
                "created_at",
                "updated_at",
                "submitted_at",
                "filled_at",
                "expired_at",
                "canceled_at",
                "failed_at",
                "replaced_at",
            ],
            Self::Clock => &["timestamp", "next_open", "next_close"],
            Self::Watchlist | Self::News => &["created_at", "updated_at"],
            Self::Trade | Self::Quote => &["timestamp"],
            Self::Bar => &["timestamp", "start", "end"],
            Self::TradeUpdate => &["timestamp"],
        }
    }

    /// Short-key table for record kinds.
    #[must_use]
    pub const fn record_kind(self) -> Option<RecordKind> {
        match self {
            Self::Trade => Some(RecordKind::Trade),
            Self::Quote => Some(RecordKind::Quote),
            Self::Bar => Some(RecordKind::Bar),
            _ => None,
        }
    }

    /// Whether `field` carries an instant for this kind.
    #[must_use]
    pub fn is_instant_field(self, field: &str) -> bool {
        match self {
            Self::Generic => INSTANT_SUFFIXES.iter().any(|s| field.ends_with(s)),
            kind => kind.instant_fields().contains(&field),
        }
    }
}

// =============================================================================
// Entity
// =============================================================================

/// Typed view over a raw JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entity {
    kind: EntityKind,
    raw: Map<String, Value>,
}

impl Entity {
    /// Wrap a raw map.
    #[must_use]
    pub const fn new(kind: EntityKind, raw: Map<String, Value>) -> Self {
        Self { kind, raw }
    }

    /// Wrap a JSON value if it is an object.
    #[must_use]
    pub fn from_value(kind: EntityKind, value: Value) -> Option<Self> {
        match value {
            Value::Object(raw) => Some(Self::new(kind, raw)),
            _ => None,
        }
    }

    /// Schema tag of this entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Underlying raw map.
    #[must_use]
    pub const fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Consume the entity, returning the raw map untouched.
    #[must_use]
    pub fn into_raw(self) -> Map<String, Value> {
        self.raw
    }

    /// Consume the entity, returning the raw map as a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.raw)
    }

    /// Look up a field by raw key, or by long name for record kinds.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        if let Some(value) = self.raw.get(field) {
            return Some(value);
        }
        let record = self.kind.record_kind()?;
        record
            .short_keys(field)
            .find_map(|short| self.raw.get(short))
    }

    /// String field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Numeric field; numeric strings (e.g. `"4000.32"`) are accepted.
    #[must_use]
    pub fn get_f64(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Integer field; integral strings are accepted.
    #[must_use]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.get(field)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean field.
    #[must_use]
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Exact decimal field (money values are transmitted as strings).
    #[must_use]
    pub fn get_decimal(&self, field: &str) -> Option<Decimal> {
        match self.get(field)? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    }

    /// Instant field, coerced per the kind's schema.
    ///
    /// Returns `None` for fields that are not instant-typed for this kind,
    /// even when the value would parse.
    #[must_use]
    pub fn get_instant(&self, field: &str) -> Option<DateTime<Tz>> {
        if !self.kind.is_instant_field(field) {
            return None;
        }
        match self.get(field)? {
            Value::String(s) => parse_instant_str(s),
            Value::Number(n) => n.as_i64().and_then(epoch_millis_to_instant),
            _ => None,
        }
    }

    /// Nested object as an entity of the given kind.
    #[must_use]
    pub fn get_entity(&self, field: &str, kind: EntityKind) -> Option<Self> {
        self.get(field)
            .cloned()
            .and_then(|value| Self::from_value(kind, value))
    }

    /// Symbol the entity refers to, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        self.get_str("symbol")
            .or_else(|| self.raw.get("sym").and_then(Value::as_str))
            .or_else(|| self.raw.get("S").and_then(Value::as_str))
            .or_else(|| {
                self.raw
                    .get("order")
                    .and_then(|order| order.get("symbol"))
                    .and_then(Value::as_str)
            })
    }

    /// Copy of the raw map with short keys rewritten to long names.
    ///
    /// Non-record kinds return an unchanged copy.
    #[must_use]
    pub fn to_long_map(&self) -> Map<String, Value> {
        let Some(record) = self.kind.record_kind() else {
            return self.raw.clone();
        };
        self.raw
            .iter()
            .map(|(key, value)| {
                let name = record.long_name(key).unwrap_or(key);
                (name.to_string(), value.clone())
            })
            .collect()
    }
}

/// Parse an ISO-8601 instant string (`YYYY-MM-DDT...`).
///
/// Strings without an offset are taken as market-local time.
#[must_use]
pub fn parse_instant_str(s: &str) -> Option<DateTime<Tz>> {
    if !looks_like_instant(s) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&MARKET_TZ));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| MARKET_TZ.from_local_datetime(&naive).earliest())
}

/// Convert epoch milliseconds to a market-time instant.
#[must_use]
pub fn epoch_millis_to_instant(millis: i64) -> Option<DateTime<Tz>> {
    MARKET_TZ.timestamp_millis_opt(millis).single()
}

fn looks_like_instant(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 11
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
        && bytes[10] == b'T'
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;

    fn entity(kind: EntityKind, value: Value) -> Entity {
        Entity::from_value(kind, value).unwrap()
    }

    #[test]
    fn account_fields_are_exposed() {
        let account = entity(
            EntityKind::Account,
            json!({
                "id": "904837e3-3b76-47ec-b432-046db621571b",
                "status": "ACTIVE",
                "cash": "4000.32",
                "created_at": "2018-10-01T13:35:25.813Z"
            }),
        );
        assert_eq!(account.get_str("status"), Some("ACTIVE"));
        assert_eq!(account.get_str("cash"), Some("4000.32"));
        assert_eq!(account.get_decimal("cash"), Some(Decimal::new(400_032, 2)));
        assert!((account.get_f64("cash").unwrap() - 4000.32).abs() < 1e-9);

        let created = account.get_instant("created_at").unwrap();
        assert_eq!(created.timezone(), MARKET_TZ);
        assert_eq!(created.year(), 2018);
        // 13:35 UTC is 09:35 in New York (EDT)
        assert_eq!(created.hour(), 9);
    }

    #[test]
    fn instant_requires_schema_membership() {
        let account = entity(
            EntityKind::Account,
            json!({"trade_suspended_at": "2018-10-01T13:35:25Z"}),
        );
        assert!(account.get_instant("trade_suspended_at").is_none());

        let generic = entity(
            EntityKind::Generic,
            json!({"trade_suspended_at": "2018-10-01T13:35:25Z", "note_time": "soon"}),
        );
        assert!(generic.get_instant("trade_suspended_at").is_some());
        assert!(generic.get_instant("note_time").is_none());
    }

    #[test]
    fn record_long_names_resolve_without_mutation() {
        let trade = entity(
            EntityKind::Trade,
            json!({"ev": "T", "sym": "AAPL", "p": 134.7, "s": 20, "t": 1_611_159_870_000_i64}),
        );
        assert!((trade.get_f64("price").unwrap() - 134.7).abs() < f64::EPSILON);
        assert_eq!(trade.get_i64("size"), Some(20));
        assert_eq!(trade.symbol(), Some("AAPL"));
        assert!(trade.raw().contains_key("p"));
        assert!(!trade.raw().contains_key("price"));

        let ts = trade.get_instant("timestamp").unwrap();
        assert_eq!(ts.timestamp_millis(), 1_611_159_870_000);
        assert_eq!(ts.timezone(), MARKET_TZ);
    }

    #[test]
    fn long_map_rewrites_known_keys_only() {
        let quote = entity(
            EntityKind::Quote,
            json!({"ap": 10.5, "bp": 10.4, "extra": true}),
        );
        let long = quote.to_long_map();
        assert_eq!(long.get("ask_price"), Some(&json!(10.5)));
        assert_eq!(long.get("bid_price"), Some(&json!(10.4)));
        assert_eq!(long.get("extra"), Some(&json!(true)));
        assert_eq!(quote.raw().len(), 3);
    }

    #[test]
    fn nested_symbol_from_trade_update() {
        let update = entity(
            EntityKind::TradeUpdate,
            json!({"event": "fill", "order": {"symbol": "MSFT", "qty": "1"}}),
        );
        assert_eq!(update.symbol(), Some("MSFT"));
        let order = update.get_entity("order", EntityKind::Order).unwrap();
        assert_eq!(order.get_i64("qty"), Some(1));
    }

    #[test]
    fn instant_strings_must_look_like_iso() {
        assert!(parse_instant_str("2021-02-22").is_none());
        assert!(parse_instant_str("yesterday at noon").is_none());
        assert!(parse_instant_str("2021-02-22T09:30:00").is_some());
        assert!(parse_instant_str("2021-02-22T15:51:45.335689322Z").is_some());
    }
}
