#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Alpaca Trade API - Trading and Market Data Client
//!
//! Two transports over one credential bundle:
//!
//! - a REST request engine ([`RestClient`], [`BlockingRestClient`]) that
//!   retries rate-limited calls, classifies failures into typed errors, wraps
//!   bodies into entities, and follows paginated market data;
//! - a WebSocket streaming engine ([`StreamConn`]) that authenticates,
//!   keeps a cumulative subscription set across reconnects, and dispatches
//!   typed entities to pattern-matched async handlers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: entities, market data records, time frames, order requests
//! - **Infrastructure**: configuration, REST engines, streaming engine,
//!   logging, metrics
//!
//! # Data Flow
//!
//! ```text
//! ClientConfig ──┬──▶ RestClient ──▶ HTTP ──▶ Response / RecordSet
//!                │
//!                └──▶ StreamConfig ──▶ StreamConn ──▶ WebSocket
//!                                          │
//!                                          └──▶ Handler(StreamHandle, channel, Entity)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use alpaca_trade_api::{ClientConfig, RestClient};
//!
//! # async fn demo() -> alpaca_trade_api::Result<()> {
//! let client = RestClient::new(ClientConfig::from_env()?)?;
//! let account = client.get_account().await?.entity()?;
//! println!("cash: {:?}", account.get_decimal("cash"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure types with no I/O.
pub mod domain;

/// Error taxonomy shared by both engines.
pub mod error;

/// Infrastructure layer - Transports and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{
    Entity, EntityKind, Numeric, OrderClass, OrderRequest, OrderSide, OrderType, RecordKind,
    RecordSet, ReplaceOrderRequest, Response, StopLoss, TakeProfit, TimeFrame, TimeFrameUnit,
    TimeInForce,
};

// Errors
pub use error::{AuthError, Error, RequestRef, Result};

// Infrastructure config
pub use infrastructure::config::{
    ClientConfig, ClientOptions, Credentials, Endpoint, ReconnectSettings, RetryPolicy,
    StreamConfig,
};

// Engines
pub use infrastructure::rest::{BlockingRestClient, DataQuery, RestClient};
pub use infrastructure::stream::{ConnectionState, Dialect, Handler, StreamConn, StreamHandle};
