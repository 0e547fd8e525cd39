//! Request Specs
//!
//! A [`RequestSpec`] describes one logical call independently of the HTTP
//! library: method, which API it targets, version prefix, path, and payload.
//! Both engines turn it into a URL, signed headers, and either query
//! parameters (GET) or a JSON body (everything else).

use reqwest::Method;
use serde_json::Value;

use crate::error::RequestRef;
use crate::infrastructure::config::{Credentials, Endpoint};

/// Version prefix of the market data API.
pub const DATA_API_VERSION: &str = "v2";

/// Which service a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Trading API (`base_url`).
    Trading,
    /// Market data API (`data_url`).
    Data,
}

/// Version prefix placed before the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiPrefix {
    /// The configured `api_version`.
    Configured,
    /// An explicit version, e.g. `v1beta1`.
    Version(String),
    /// No prefix.
    Bare,
}

/// One logical API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// HTTP method.
    pub method: Method,
    /// Service the call targets.
    pub target: Target,
    /// Version prefix.
    pub prefix: ApiPrefix,
    /// Path below the prefix, starting with `/`.
    pub path: String,
    /// Query parameters for GET, JSON body otherwise.
    pub data: Option<Value>,
}

impl RequestSpec {
    /// Trading API call with the configured version prefix.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            method,
            target: Target::Trading,
            prefix: ApiPrefix::Configured,
            path,
            data: None,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// PATCH request.
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// PUT request.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach parameters or a body. `None` and `null` attach nothing.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Option<Value>>) -> Self {
        self.data = data.into().filter(|v| !v.is_null());
        self
    }

    /// Target the market data API with its fixed version prefix.
    #[must_use]
    pub fn on_data_api(mut self) -> Self {
        self.target = Target::Data;
        self.prefix = ApiPrefix::Version(DATA_API_VERSION.to_string());
        self
    }

    /// Override the version prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: ApiPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    /// Full URL without query string.
    #[must_use]
    pub fn url(&self, endpoint: &Endpoint) -> String {
        let base = match self.target {
            Target::Trading => &endpoint.base_url,
            Target::Data => &endpoint.data_url,
        };
        match &self.prefix {
            ApiPrefix::Configured => format!("{base}/{}{}", endpoint.api_version, self.path),
            ApiPrefix::Version(version) => format!("{base}/{version}{}", self.path),
            ApiPrefix::Bare => format!("{base}{}", self.path),
        }
    }

    /// Whether the payload travels as query parameters.
    #[must_use]
    pub fn uses_query(&self) -> bool {
        self.method == Method::GET
    }

    /// Query parameters (GET only). Nulls are dropped and arrays are
    /// comma-joined.
    #[must_use]
    pub fn query(&self) -> Vec<(String, String)> {
        if !self.uses_query() {
            return Vec::new();
        }
        let Some(Value::Object(params)) = &self.data else {
            return Vec::new();
        };
        params
            .iter()
            .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
            .collect()
    }

    /// JSON body (non-GET only).
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        if self.uses_query() {
            None
        } else {
            self.data.as_ref()
        }
    }

    /// Handle identifying this call in errors.
    #[must_use]
    pub fn request_ref(&self, endpoint: &Endpoint) -> RequestRef {
        RequestRef::new(self.method.as_str(), self.url(endpoint))
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// Authentication headers for a request.
///
/// An OAuth token takes precedence over the key pair.
#[must_use]
pub fn auth_headers(credentials: &Credentials) -> Vec<(&'static str, String)> {
    if let Some(token) = credentials.oauth_token() {
        return vec![("Authorization", format!("Bearer {token}"))];
    }
    let mut headers = Vec::with_capacity(2);
    if let Some(key) = credentials.key_id() {
        headers.push(("APCA-API-KEY-ID", key.to_string()));
    }
    if let Some(secret) = credentials.secret_key() {
        headers.push(("APCA-API-SECRET-KEY", secret.to_string()));
    }
    headers
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            base_url: "https://paper-api.alpaca.markets".to_string(),
            data_url: "https://data.alpaca.markets".to_string(),
            api_version: "v1".to_string(),
        }
    }

    #[test]
    fn url_uses_version_prefix() {
        let spec = RequestSpec::get("account");
        assert_eq!(spec.url(&endpoint()), "https://paper-api.alpaca.markets/v1/account");

        let spec = RequestSpec::get("/stocks/AAPL/bars").on_data_api();
        assert_eq!(
            spec.url(&endpoint()),
            "https://data.alpaca.markets/v2/stocks/AAPL/bars"
        );

        let spec = RequestSpec::get("/news")
            .on_data_api()
            .with_prefix(ApiPrefix::Version("v1beta1".to_string()));
        assert_eq!(spec.url(&endpoint()), "https://data.alpaca.markets/v1beta1/news");
    }

    #[test]
    fn get_data_becomes_query() {
        let spec = RequestSpec::get("/orders").with_data(json!({
            "status": "open",
            "limit": 50,
            "nested": true,
            "symbols": ["AAPL", "MSFT"],
            "after": null
        }));
        let mut query = spec.query();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("limit".to_string(), "50".to_string()),
                ("nested".to_string(), "true".to_string()),
                ("status".to_string(), "open".to_string()),
                ("symbols".to_string(), "AAPL,MSFT".to_string()),
            ]
        );
        assert!(spec.body().is_none());
    }

    #[test]
    fn post_data_becomes_body() {
        let spec = RequestSpec::post("/orders").with_data(json!({"symbol": "AAPL"}));
        assert!(spec.query().is_empty());
        assert_eq!(spec.body(), Some(&json!({"symbol": "AAPL"})));
    }

    #[test]
    fn oauth_replaces_key_headers() {
        let headers = auth_headers(&Credentials::oauth("tok"));
        assert_eq!(headers, vec![("Authorization", "Bearer tok".to_string())]);

        let headers = auth_headers(&Credentials::key_pair("k", "s"));
        assert_eq!(
            headers,
            vec![
                ("APCA-API-KEY-ID", "k".to_string()),
                ("APCA-API-SECRET-KEY", "s".to_string())
            ]
        );
    }
}
