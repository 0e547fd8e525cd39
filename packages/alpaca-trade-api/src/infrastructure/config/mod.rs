//! Configuration Module
//!
//! Credential, endpoint, retry, and stream settings resolution.

mod settings;

pub use settings::{
    ClientConfig, ClientOptions, Credentials, DEFAULT_API_VERSION, DEFAULT_BASE_URL,
    DEFAULT_DATA_URL, DEFAULT_POLYGON_WS_URL, Endpoint, ReconnectSettings, RetryPolicy,
    StreamConfig,
};
