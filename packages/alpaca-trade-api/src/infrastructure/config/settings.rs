//! Client Configuration
//!
//! Resolves credentials, endpoints, and retry settings. Each value comes from
//! the explicit [`ClientOptions`] field when set, else the environment, else
//! the built-in default.
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |----------|---------|
//! | `APCA_API_KEY_ID` / `APCA_API_SECRET_KEY` | none |
//! | `APCA_API_OAUTH_TOKEN` | none |
//! | `APCA_API_BASE_URL` | `https://api.alpaca.markets` |
//! | `APCA_API_DATA_URL` | `https://data.alpaca.markets` |
//! | `APCA_API_VERSION` | `v2` |
//! | `APCA_RETRY_MAX` (or `APCA_MAX_RETRY`) | 3 |
//! | `APCA_RETRY_WAIT` (seconds) | 3 |
//! | `POLYGON_WS_URL` | `wss://socket.polygon.io/stocks` |
//! | `POLYGON_KEY_ID` | `APCA_API_KEY_ID` |
//! | `ALPHAVANTAGE_API_KEY` | none |

use std::time::Duration;

use crate::domain::validation::normalize_url;
use crate::error::{Error, Result};
use crate::infrastructure::stream::Dialect;

/// Default trading API URL.
pub const DEFAULT_BASE_URL: &str = "https://api.alpaca.markets";
/// Default market data API URL.
pub const DEFAULT_DATA_URL: &str = "https://data.alpaca.markets";
/// Default API version prefix.
pub const DEFAULT_API_VERSION: &str = "v2";
/// Default Polygon cluster socket.
pub const DEFAULT_POLYGON_WS_URL: &str = "wss://socket.polygon.io/stocks";

const DEFAULT_RETRY_MAX: u32 = 3;
const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(3);
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Credentials
// =============================================================================

/// API credentials: a key pair, an OAuth token, or both.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    key_id: Option<String>,
    secret_key: Option<String>,
    oauth: Option<String>,
}

impl Credentials {
    /// Key pair credentials.
    #[must_use]
    pub fn key_pair(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
            secret_key: Some(secret_key.into()),
            oauth: None,
        }
    }

    /// OAuth token credentials.
    #[must_use]
    pub fn oauth(token: impl Into<String>) -> Self {
        Self {
            key_id: None,
            secret_key: None,
            oauth: Some(token.into()),
        }
    }

    /// Key-only credentials (Polygon cluster auth).
    #[must_use]
    pub fn key_only(key_id: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
            secret_key: None,
            oauth: None,
        }
    }

    /// API key id.
    #[must_use]
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// API secret key.
    #[must_use]
    pub fn secret_key(&self) -> Option<&str> {
        self.secret_key.as_deref()
    }

    /// OAuth token.
    #[must_use]
    pub fn oauth_token(&self) -> Option<&str> {
        self.oauth.as_deref()
    }

    /// Both key id and secret are present.
    #[must_use]
    pub const fn has_key_pair(&self) -> bool {
        self.key_id.is_some() && self.secret_key.is_some()
    }

    /// Fail unless a key pair or an OAuth token is present.
    pub fn ensure_usable(&self) -> Result<()> {
        if self.has_key_pair() || self.oauth.is_some() {
            Ok(())
        } else {
            Err(Error::Config(
                "key id and secret key, or an OAuth token, must be provided".to_string(),
            ))
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &redact(&self.secret_key))
            .field("oauth", &redact(&self.oauth))
            .finish()
    }
}

// =============================================================================
// Endpoint & Retry
// =============================================================================

/// Service endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Trading API base URL (no trailing slash).
    pub base_url: String,
    /// Market data API base URL (no trailing slash).
    pub data_url: String,
    /// Version prefix, e.g. `v2`.
    pub api_version: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_url: DEFAULT_DATA_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// Retry budget for rate-limited requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 disables retry.
    pub max_attempts: u32,
    /// Sleep between attempts.
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX,
            wait: DEFAULT_RETRY_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Build from possibly negative configured values, clamping at zero.
    #[must_use]
    pub fn clamped(max_attempts: i64, wait_secs: i64) -> Self {
        Self {
            max_attempts: u32::try_from(max_attempts.max(0)).unwrap_or(u32::MAX),
            wait: Duration::from_secs(u64::try_from(wait_secs.max(0)).unwrap_or(0)),
        }
    }
}

// =============================================================================
// Client Options & Config
// =============================================================================

/// Explicit arguments; `None` falls through to the environment.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// API key id.
    pub key_id: Option<String>,
    /// API secret key.
    pub secret_key: Option<String>,
    /// OAuth token.
    pub oauth: Option<String>,
    /// Trading API base URL.
    pub base_url: Option<String>,
    /// Market data API base URL.
    pub data_url: Option<String>,
    /// API version prefix.
    pub api_version: Option<String>,
    /// Return decoded JSON instead of entities.
    pub raw_data: bool,
    /// Retry count (negative clamps to 0).
    pub retry_max: Option<i64>,
    /// Retry wait in seconds (negative clamps to 0).
    pub retry_wait_secs: Option<i64>,
}

impl ClientOptions {
    /// Options with a key pair set.
    #[must_use]
    pub fn with_key_pair(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: Some(key_id.into()),
            secret_key: Some(secret_key.into()),
            ..Self::default()
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Credentials.
    pub credentials: Credentials,
    /// Endpoints.
    pub endpoint: Endpoint,
    /// Rate-limit retry budget.
    pub retry: RetryPolicy,
    /// Return decoded JSON instead of entities.
    pub raw_data: bool,
    /// Polygon cluster socket URL.
    pub polygon_ws_url: String,
    /// Polygon key, when it differs from the API key id.
    pub polygon_key_id: Option<String>,
    /// Alpha Vantage key, resolved for callers that use it.
    pub alphavantage_key: Option<String>,
}

impl ClientConfig {
    /// Resolve against the process environment.
    pub fn resolve(options: ClientOptions) -> Result<Self> {
        Self::resolve_with(options, |key| std::env::var(key).ok())
    }

    /// Load `.env` (if present), then resolve with default options.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::resolve(ClientOptions::default())
    }

    /// Resolve with an injected environment lookup.
    pub fn resolve_with<F>(options: ClientOptions, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = Credentials {
            key_id: options.key_id.or_else(|| env("APCA_API_KEY_ID")),
            secret_key: options.secret_key.or_else(|| env("APCA_API_SECRET_KEY")),
            oauth: options.oauth.or_else(|| env("APCA_API_OAUTH_TOKEN")),
        };
        credentials.ensure_usable()?;

        let base_url = options
            .base_url
            .or_else(|| env("APCA_API_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let data_url = options
            .data_url
            .or_else(|| env("APCA_API_DATA_URL"))
            .unwrap_or_else(|| DEFAULT_DATA_URL.to_string());
        let api_version = options
            .api_version
            .or_else(|| env("APCA_API_VERSION"))
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let endpoint = Endpoint {
            base_url: normalize_url(&base_url)?,
            data_url: normalize_url(&data_url)?,
            api_version: api_version.trim_matches('/').to_string(),
        };

        let retry_max = options.retry_max.unwrap_or_else(|| {
            parse_env_i64(
                &env,
                &["APCA_RETRY_MAX", "APCA_MAX_RETRY"],
                i64::from(DEFAULT_RETRY_MAX),
            )
        });
        let retry_wait = options.retry_wait_secs.unwrap_or_else(|| {
            #[allow(clippy::cast_possible_wrap)]
            let default = DEFAULT_RETRY_WAIT.as_secs() as i64;
            parse_env_i64(&env, &["APCA_RETRY_WAIT"], default)
        });

        let polygon_ws_url = env("POLYGON_WS_URL")
            .map(|url| normalize_url(&url))
            .transpose()?
            .unwrap_or_else(|| DEFAULT_POLYGON_WS_URL.to_string());

        Ok(Self {
            credentials,
            endpoint,
            retry: RetryPolicy::clamped(retry_max, retry_wait),
            raw_data: options.raw_data,
            polygon_ws_url,
            polygon_key_id: env("POLYGON_KEY_ID"),
            alphavantage_key: env("ALPHAVANTAGE_API_KEY"),
        })
    }
}

/// First parseable value among `keys`, else `default`.
fn parse_env_i64<F>(env: &F, keys: &[&str], default: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|key| env(key))
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// =============================================================================
// Stream Config
// =============================================================================

/// Reconnect settings for a streaming connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectSettings {
    /// Reconnect attempts before giving up.
    pub max_retries: u32,
    /// Base wait; attempt `n` sleeps `wait * n`.
    pub wait: Duration,
    /// Jitter as a fraction of the delay (0 disables).
    pub jitter_factor: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRY_MAX,
            wait: DEFAULT_RETRY_WAIT,
            jitter_factor: 0.0,
        }
    }
}

/// Configuration of one streaming connection.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket URL.
    pub url: String,
    /// Frame dialect spoken by the server.
    pub dialect: Dialect,
    /// Credentials sent in the auth frame.
    pub credentials: Credentials,
    /// Reconnect settings.
    pub reconnect: ReconnectSettings,
    /// Time allowed for the auth reply.
    pub auth_timeout: Duration,
}

impl StreamConfig {
    /// Config with default reconnect and timeout settings.
    pub fn new(url: &str, dialect: Dialect, credentials: Credentials) -> Result<Self> {
        Ok(Self {
            url: normalize_url(url)?,
            dialect,
            credentials,
            reconnect: ReconnectSettings::default(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        })
    }

    /// Trading stream (`trade_updates`, `account_updates`) at the base URL.
    pub fn trading(config: &ClientConfig) -> Result<Self> {
        let url = format!("{}/stream", to_ws_scheme(&config.endpoint.base_url));
        Self::with_retry(&url, Dialect::Alpaca, config.credentials.clone(), config)
    }

    /// Market data stream at the data URL.
    pub fn data(config: &ClientConfig) -> Result<Self> {
        let url = format!("{}/stream", to_ws_scheme(&config.endpoint.data_url));
        Self::with_retry(&url, Dialect::Alpaca, config.credentials.clone(), config)
    }

    /// Polygon cluster stream.
    pub fn polygon(config: &ClientConfig) -> Result<Self> {
        let key = config
            .polygon_key_id
            .as_deref()
            .or_else(|| config.credentials.key_id())
            .ok_or_else(|| Error::Config("Polygon stream requires a key id".to_string()))?;
        Self::with_retry(
            &config.polygon_ws_url,
            Dialect::Polygon,
            Credentials::key_only(key),
            config,
        )
    }

    fn with_retry(
        url: &str,
        dialect: Dialect,
        credentials: Credentials,
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut stream = Self::new(url, dialect, credentials)?;
        stream.reconnect.max_retries = config.retry.max_attempts;
        stream.reconnect.wait = config.retry.wait;
        Ok(stream)
    }
}

fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}
