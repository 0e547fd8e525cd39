//! Order Requests
//!
//! Typed builders for the order submit (`POST /orders`) and replace
//! (`PATCH /orders/{id}`) bodies. Numeric fields accept an integer, a float,
//! or a numeric string through [`Numeric`]; every value is checked when the
//! body is built, so a malformed price fails with a validation error before
//! any request leaves the process.
//!
//! # Wire Format
//!
//! Numbers are sent as decimal strings:
//!
//! ```json
//! {"symbol": "AAPL", "qty": "15", "side": "buy", "type": "limit",
//!  "time_in_force": "day", "limit_price": "107.00"}
//! ```

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// =============================================================================
// Numeric
// =============================================================================

/// Numeric order field as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Numeric {
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Textual value; must parse as a decimal.
    Text(String),
}

impl Numeric {
    /// Validate and render as the decimal string sent on the wire.
    pub fn to_wire(&self, field: &str) -> Result<String> {
        match self {
            Self::Int(n) => Ok(n.to_string()),
            Self::Float(f) if f.is_finite() => Ok(f.to_string()),
            Self::Float(f) => Err(Error::Validation(format!(
                "{field} must be a finite number, got {f}"
            ))),
            Self::Text(s) => s
                .trim()
                .parse::<Decimal>()
                .map(|d| d.to_string())
                .map_err(|_| Error::Validation(format!("{field} must be numeric, got {s:?}"))),
        }
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Numeric {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Numeric {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Numeric {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Numeric {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Decimal> for Numeric {
    fn from(value: Decimal) -> Self {
        Self::Text(value.to_string())
    }
}

// =============================================================================
// Enums
// =============================================================================

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Wire string.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_lowercase().as_str() {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(Error::Validation(format!(
                        concat!("invalid ", stringify!($name), ": {}"),
                        s
                    ))),
                }
            }
        }
    };
}

wire_enum! {
    /// Order side.
    OrderSide {
        /// Buy.
        Buy => "buy",
        /// Sell.
        Sell => "sell",
    }
}

wire_enum! {
    /// Order type.
    OrderType {
        /// Market order.
        Market => "market",
        /// Limit order.
        Limit => "limit",
        /// Stop order.
        Stop => "stop",
        /// Stop-limit order.
        StopLimit => "stop_limit",
        /// Trailing stop order.
        TrailingStop => "trailing_stop",
    }
}

wire_enum! {
    /// Time in force.
    TimeInForce {
        /// Current trading day.
        Day => "day",
        /// Good until canceled.
        Gtc => "gtc",
        /// Market on open.
        Opg => "opg",
        /// Market on close.
        Cls => "cls",
        /// Immediate or cancel.
        Ioc => "ioc",
        /// Fill or kill.
        Fok => "fok",
    }
}

wire_enum! {
    /// Order class for advanced orders.
    OrderClass {
        /// Single order.
        Simple => "simple",
        /// Entry with take-profit and stop-loss legs.
        Bracket => "bracket",
        /// One cancels other.
        Oco => "oco",
        /// One triggers other.
        Oto => "oto",
    }
}

// =============================================================================
// Legs
// =============================================================================

/// Take-profit leg of an advanced order.
#[derive(Debug, Clone, PartialEq)]
pub struct TakeProfit {
    /// Limit price of the exit.
    pub limit_price: Numeric,
}

impl TakeProfit {
    fn to_body(&self) -> Result<Value> {
        let mut body = Map::new();
        body.insert(
            "limit_price".to_string(),
            Value::String(self.limit_price.to_wire("take_profit.limit_price")?),
        );
        Ok(Value::Object(body))
    }
}

/// Stop-loss leg of an advanced order.
#[derive(Debug, Clone, PartialEq)]
pub struct StopLoss {
    /// Stop trigger price.
    pub stop_price: Numeric,
    /// Optional limit price once triggered.
    pub limit_price: Option<Numeric>,
}

impl StopLoss {
    fn to_body(&self) -> Result<Value> {
        let mut body = Map::new();
        body.insert(
            "stop_price".to_string(),
            Value::String(self.stop_price.to_wire("stop_loss.stop_price")?),
        );
        if let Some(limit) = &self.limit_price {
            body.insert(
                "limit_price".to_string(),
                Value::String(limit.to_wire("stop_loss.limit_price")?),
            );
        }
        Ok(Value::Object(body))
    }
}

// =============================================================================
// Order Request
// =============================================================================

/// New order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    /// Symbol or asset id.
    pub symbol: String,
    /// Share quantity.
    pub qty: Option<Numeric>,
    /// Dollar amount (fractional orders).
    pub notional: Option<Numeric>,
    /// Side.
    pub side: OrderSide,
    /// Type.
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Limit price.
    pub limit_price: Option<Numeric>,
    /// Stop price.
    pub stop_price: Option<Numeric>,
    /// Caller-assigned order id.
    pub client_order_id: Option<String>,
    /// Trailing stop percent.
    pub trail_percent: Option<Numeric>,
    /// Trailing stop dollar offset.
    pub trail_price: Option<Numeric>,
    /// Allow pre/post-market execution.
    pub extended_hours: Option<bool>,
    /// Advanced order class.
    pub order_class: Option<OrderClass>,
    /// Take-profit leg.
    pub take_profit: Option<TakeProfit>,
    /// Stop-loss leg.
    pub stop_loss: Option<StopLoss>,
}

impl OrderRequest {
    /// Start a new order with the required fields.
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            qty: None,
            notional: None,
            side,
            order_type,
            time_in_force,
            limit_price: None,
            stop_price: None,
            client_order_id: None,
            trail_percent: None,
            trail_price: None,
            extended_hours: None,
            order_class: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    /// Set the share quantity.
    #[must_use]
    pub fn qty(mut self, qty: impl Into<Numeric>) -> Self {
        self.qty = Some(qty.into());
        self
    }

    /// Set the dollar amount.
    #[must_use]
    pub fn notional(mut self, notional: impl Into<Numeric>) -> Self {
        self.notional = Some(notional.into());
        self
    }

    /// Set the limit price.
    #[must_use]
    pub fn limit_price(mut self, price: impl Into<Numeric>) -> Self {
        self.limit_price = Some(price.into());
        self
    }

    /// Set the stop price.
    #[must_use]
    pub fn stop_price(mut self, price: impl Into<Numeric>) -> Self {
        self.stop_price = Some(price.into());
        self
    }

    /// Set the client order id.
    #[must_use]
    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Set the trailing percent.
    #[must_use]
    pub fn trail_percent(mut self, percent: impl Into<Numeric>) -> Self {
        self.trail_percent = Some(percent.into());
        self
    }

    /// Set the trailing dollar offset.
    #[must_use]
    pub fn trail_price(mut self, price: impl Into<Numeric>) -> Self {
        self.trail_price = Some(price.into());
        self
    }

    /// Allow extended hours execution.
    #[must_use]
    pub const fn extended_hours(mut self, enabled: bool) -> Self {
        self.extended_hours = Some(enabled);
        self
    }

    /// Make this a bracket order.
    #[must_use]
    pub fn bracket(mut self, take_profit: TakeProfit, stop_loss: StopLoss) -> Self {
        self.order_class = Some(OrderClass::Bracket);
        self.take_profit = Some(take_profit);
        self.stop_loss = Some(stop_loss);
        self
    }

    /// Validate and render the JSON body.
    pub fn to_body(&self) -> Result<Value> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Validation("symbol must not be empty".to_string()));
        }

        let mut body = Map::new();
        body.insert("symbol".to_string(), Value::String(self.symbol.clone()));
        insert_numeric(&mut body, "qty", self.qty.as_ref())?;
        insert_numeric(&mut body, "notional", self.notional.as_ref())?;
        body.insert("side".to_string(), Value::from(self.side.as_str()));
        body.insert("type".to_string(), Value::from(self.order_type.as_str()));
        body.insert(
            "time_in_force".to_string(),
            Value::from(self.time_in_force.as_str()),
        );
        insert_numeric(&mut body, "limit_price", self.limit_price.as_ref())?;
        insert_numeric(&mut body, "stop_price", self.stop_price.as_ref())?;
        insert_numeric(&mut body, "trail_percent", self.trail_percent.as_ref())?;
        insert_numeric(&mut body, "trail_price", self.trail_price.as_ref())?;
        if let Some(id) = &self.client_order_id {
            body.insert("client_order_id".to_string(), Value::String(id.clone()));
        }
        if let Some(extended) = self.extended_hours {
            body.insert("extended_hours".to_string(), Value::Bool(extended));
        }
        if let Some(class) = self.order_class {
            body.insert("order_class".to_string(), Value::from(class.as_str()));
        }
        if let Some(leg) = &self.take_profit {
            body.insert("take_profit".to_string(), leg.to_body()?);
        }
        if let Some(leg) = &self.stop_loss {
            body.insert("stop_loss".to_string(), leg.to_body()?);
        }
        Ok(Value::Object(body))
    }
}

/// Changes to an open order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceOrderRequest {
    /// New quantity.
    pub qty: Option<Numeric>,
    /// New time in force.
    pub time_in_force: Option<TimeInForce>,
    /// New limit price.
    pub limit_price: Option<Numeric>,
    /// New stop price.
    pub stop_price: Option<Numeric>,
    /// New trailing offset (percent or price, per the order).
    pub trail: Option<Numeric>,
    /// New client order id.
    pub client_order_id: Option<String>,
}

impl ReplaceOrderRequest {
    /// Validate and render the JSON body. At least one field must be set.
    pub fn to_body(&self) -> Result<Value> {
        let mut body = Map::new();
        insert_numeric(&mut body, "qty", self.qty.as_ref())?;
        if let Some(tif) = self.time_in_force {
            body.insert("time_in_force".to_string(), Value::from(tif.as_str()));
        }
        insert_numeric(&mut body, "limit_price", self.limit_price.as_ref())?;
        insert_numeric(&mut body, "stop_price", self.stop_price.as_ref())?;
        insert_numeric(&mut body, "trail", self.trail.as_ref())?;
        if let Some(id) = &self.client_order_id {
            body.insert("client_order_id".to_string(), Value::String(id.clone()));
        }
        if body.is_empty() {
            return Err(Error::Validation(
                "replace order requires at least one field".to_string(),
            ));
        }
        Ok(Value::Object(body))
    }
}

fn insert_numeric(body: &mut Map<String, Value>, field: &str, value: Option<&Numeric>) -> Result<()> {
    if let Some(value) = value {
        body.insert(field.to_string(), Value::String(value.to_wire(field)?));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case(Numeric::Int(15), "15")]
    #[test_case(Numeric::Float(107.5), "107.5")]
    #[test_case(Numeric::from("107.00"), "107.00")]
    #[test_case(Numeric::from(" 3 "), "3")]
    fn numeric_wire_values(value: Numeric, expected: &str) {
        assert_eq!(value.to_wire("limit_price").unwrap(), expected);
    }

    #[test_case(Numeric::from("a") ; "letters")]
    #[test_case(Numeric::from("") ; "empty")]
    #[test_case(Numeric::Float(f64::NAN) ; "nan")]
    #[test_case(Numeric::Float(f64::INFINITY) ; "infinite")]
    fn numeric_rejects(value: Numeric) {
        assert!(matches!(value.to_wire("stop_price"), Err(Error::Validation(_))));
    }

    #[test]
    fn market_order_body() {
        let body = OrderRequest::new("AAPL", OrderSide::Buy, OrderType::Market, TimeInForce::Day)
            .qty(15)
            .client_order_id("abc")
            .to_body()
            .unwrap();
        assert_eq!(
            body,
            json!({
                "symbol": "AAPL",
                "qty": "15",
                "side": "buy",
                "type": "market",
                "time_in_force": "day",
                "client_order_id": "abc"
            })
        );
    }

    #[test]
    fn bracket_legs_are_validated() {
        let order = OrderRequest::new("SPY", OrderSide::Buy, OrderType::Limit, TimeInForce::Gtc)
            .qty(1)
            .limit_price(400.0)
            .bracket(
                TakeProfit {
                    limit_price: "410".into(),
                },
                StopLoss {
                    stop_price: "oops".into(),
                    limit_price: None,
                },
            );
        let err = order.to_body().unwrap_err();
        assert!(err.to_string().contains("stop_loss.stop_price"));
    }

    #[test]
    fn bracket_body() {
        let body = OrderRequest::new("SPY", OrderSide::Sell, OrderType::Limit, TimeInForce::Gtc)
            .qty(1)
            .limit_price(400)
            .bracket(
                TakeProfit {
                    limit_price: 380.into(),
                },
                StopLoss {
                    stop_price: "420".into(),
                    limit_price: Some("421.5".into()),
                },
            )
            .to_body()
            .unwrap();
        assert_eq!(body["order_class"], json!("bracket"));
        assert_eq!(body["take_profit"], json!({"limit_price": "380"}));
        assert_eq!(
            body["stop_loss"],
            json!({"stop_price": "420", "limit_price": "421.5"})
        );
    }

    #[test]
    fn empty_replace_is_rejected() {
        assert!(matches!(
            ReplaceOrderRequest::default().to_body(),
            Err(Error::Validation(_))
        ));
        let body = ReplaceOrderRequest {
            limit_price: Some("101.25".into()),
            ..Default::default()
        }
        .to_body()
        .unwrap();
        assert_eq!(body, json!({"limit_price": "101.25"}));
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("BUY".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("stop_limit".parse::<OrderType>().unwrap(), OrderType::StopLimit);
        assert!("weekly".parse::<TimeInForce>().is_err());
    }
}
