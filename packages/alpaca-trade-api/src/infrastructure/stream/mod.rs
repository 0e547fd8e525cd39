//! Streaming Engine
//!
//! WebSocket client for the trading, market data, and Polygon cluster
//! streams.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | `connection` | [`StreamConn`] owner task and [`StreamHandle`] |
//! | `registry` | pattern-keyed [`Handler`] table with symbol allow-sets |
//! | `subscription` | cumulative [`SubscriptionSet`] |
//! | `messages` | outbound frames per [`Dialect`] |
//! | `auth` | auth reply evaluation |
//! | `codec` | inbound frame normalization and entity casting |
//! | `reconnect` | linear backoff [`ReconnectPolicy`] |
//! | `state` | [`ConnectionState`] machine |

pub mod auth;
pub mod codec;
mod connection;
mod messages;
mod reconnect;
mod registry;
mod state;
mod subscription;

pub use auth::{AuthReply, evaluate as evaluate_auth_reply};
pub use codec::{Frame, STATUS_CHANNEL, decode as decode_frame};
pub use connection::{StreamConn, StreamHandle, authorized_entity, disconnected_entity};
pub use messages::{Dialect, frame_channels};
pub use reconnect::ReconnectPolicy;
pub use registry::{Handler, HandlerRegistry, IntoPattern, matches_at_start, message_symbol};
pub use state::ConnectionState;
pub use subscription::SubscriptionSet;
