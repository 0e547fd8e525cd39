//! Infrastructure Layer - Transports and external integrations.
//!
//! Everything that performs I/O lives here; the domain layer stays pure.

/// Credential, endpoint, retry, and stream settings resolution.
pub mod config;

/// Counters and gauges through the `metrics` facade.
pub mod metrics;

/// REST request engines (async and blocking).
pub mod rest;

/// WebSocket streaming engine.
pub mod stream;

/// Console logging setup.
pub mod telemetry;
