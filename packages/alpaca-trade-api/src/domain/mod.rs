//! Domain Layer
//!
//! Pure types with no I/O: entities and their schemas, response wrapping,
//! market data records, bar time frames, and order requests.

pub mod entity;
pub mod order;
pub mod records;
pub mod response;
pub mod timeframe;
pub mod validation;

pub use entity::{Entity, EntityKind, MARKET_TZ};
pub use order::{
    Numeric, OrderClass, OrderRequest, OrderSide, OrderType, ReplaceOrderRequest, StopLoss,
    TakeProfit, TimeInForce,
};
pub use records::{Columns, RecordKind, RecordSet};
pub use response::{Response, Shape};
pub use timeframe::{TimeFrame, TimeFrameUnit};
pub use validation::{normalize_url, validate_date};
