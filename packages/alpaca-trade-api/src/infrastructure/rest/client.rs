//! Async REST Client
//!
//! Non-blocking request engine over `reqwest`. Calls may be issued
//! concurrently from clones of one client; there is no cross-request lock.
//!
//! # Retry Loop
//!
//! Each call sends its [`RequestSpec`] once per attempt. A 429 sleeps the
//! configured wait and retries while the budget lasts; every other outcome is
//! returned as classified by [`classify`].

use std::sync::Arc;

use futures::Stream;
use reqwest::Client;
use serde_json::Value;

use crate::domain::entity::EntityKind;
use crate::domain::order::{OrderRequest, ReplaceOrderRequest};
use crate::domain::records::{RecordKind, RecordSet};
use crate::domain::response::{Response, Shape};
use crate::domain::timeframe::TimeFrame;
use crate::error::Result;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;

use super::endpoints::{
    self, ActivityQuery, ApiCall, DataQuery, OrderQuery, PortfolioHistoryQuery,
};
use super::pagination::{PageCursor, assemble, page_stream};
use super::request::{RequestSpec, auth_headers};
use super::retry::{RetryBudget, classify};

/// Async client for the trading and market data APIs.
#[derive(Debug, Clone)]
pub struct RestClient {
    config: Arc<ClientConfig>,
    http: Client,
}

impl RestClient {
    /// Build a client from resolved configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = Client::builder().build()?;
        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Build a client from the environment (and `.env`).
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Generic Requests
    // =========================================================================

    /// `GET` on the trading API; `params` become the query string.
    pub async fn get(&self, path: &str, params: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::get(path).with_data(params)).await
    }

    /// `POST` on the trading API with a JSON body.
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::post(path).with_data(body)).await
    }

    /// `PATCH` on the trading API with a JSON body.
    pub async fn patch(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::patch(path).with_data(body)).await
    }

    /// `DELETE` on the trading API.
    pub async fn delete(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::delete(path).with_data(body)).await
    }

    /// `GET` on the market data API.
    pub async fn data_get(&self, path: &str, params: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::get(path).on_data_api().with_data(params))
            .await
    }

    /// Send any request; the body is wrapped as generic entities.
    pub async fn request(&self, spec: RequestSpec) -> Result<Response> {
        self.call(ApiCall {
            spec,
            kind: EntityKind::Generic,
            shape: Shape::Single,
            pluck: None,
        })
        .await
    }

    /// Send an endpoint call and wrap its body.
    pub async fn call(&self, call: ApiCall) -> Result<Response> {
        let value = self.execute(&call.spec).await?;
        Ok(wrap(&self.config, value, &call))
    }

    /// Send a request with rate-limit retries, returning the decoded body.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Option<Value>> {
        let endpoint = &self.config.endpoint;
        let url = spec.url(endpoint);
        let mut budget = RetryBudget::new(self.config.retry);

        loop {
            let mut request = self.http.request(spec.method.clone(), &url);
            for (name, value) in auth_headers(&self.config.credentials) {
                request = request.header(name, value);
            }
            if spec.uses_query() {
                request = request.query(&spec.query());
            } else if let Some(body) = spec.body() {
                request = request.json(body);
            }

            tracing::trace!(method = %spec.method, url = %url, attempt = budget.attempt(), "Sending request");
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            metrics::record_request(spec.method.as_str(), status);

            match classify(status, &body, spec.request_ref(endpoint)) {
                Err(err) if err.is_retryable() => {
                    if let Some(wait) = budget.next_wait() {
                        tracing::warn!(
                            method = %spec.method,
                            url = %url,
                            status,
                            attempt = budget.attempt(),
                            delay_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                            "Rate limited, retrying"
                        );
                        metrics::record_retry(spec.method.as_str());
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(err);
                }
                outcome => return outcome,
            }
        }
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Account details.
    pub async fn get_account(&self) -> Result<Response> {
        self.call(endpoints::get_account()).await
    }

    /// Account configuration flags.
    pub async fn get_account_configurations(&self) -> Result<Response> {
        self.call(endpoints::get_account_configurations()).await
    }

    /// Update account configuration flags.
    pub async fn update_account_configurations(&self, changes: Value) -> Result<Response> {
        self.call(endpoints::update_account_configurations(changes))
            .await
    }

    /// Account activities of the given types (all types when empty).
    pub async fn get_activities(&self, types: &[&str], query: &ActivityQuery) -> Result<Response> {
        self.call(endpoints::get_activities(types, query)?).await
    }

    /// Equity and profit/loss history.
    pub async fn get_portfolio_history(&self, query: &PortfolioHistoryQuery) -> Result<Response> {
        self.call(endpoints::get_portfolio_history(query)?).await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Orders matching the filters.
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Response> {
        self.call(endpoints::list_orders(query)?).await
    }

    /// Order by id.
    pub async fn get_order(&self, order_id: &str) -> Result<Response> {
        self.call(endpoints::get_order(order_id)?).await
    }

    /// Order by client order id.
    pub async fn get_order_by_client_order_id(&self, client_order_id: &str) -> Result<Response> {
        self.call(endpoints::get_order_by_client_order_id(client_order_id)?)
            .await
    }

    /// Submit a new order. Malformed numeric fields fail before any I/O.
    pub async fn submit_order(&self, order: &OrderRequest) -> Result<Response> {
        self.call(endpoints::submit_order(order)?).await
    }

    /// Replace an open order.
    pub async fn replace_order(
        &self,
        order_id: &str,
        changes: &ReplaceOrderRequest,
    ) -> Result<Response> {
        self.call(endpoints::replace_order(order_id, changes)?).await
    }

    /// Cancel an order.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Response> {
        self.call(endpoints::cancel_order(order_id)?).await
    }

    /// Cancel every open order.
    pub async fn cancel_all_orders(&self) -> Result<Response> {
        self.call(endpoints::cancel_all_orders()).await
    }

    // =========================================================================
    // Positions
    // =========================================================================

    /// Open positions.
    pub async fn list_positions(&self) -> Result<Response> {
        self.call(endpoints::list_positions()).await
    }

    /// Open position in one symbol.
    pub async fn get_position(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_position(symbol)?).await
    }

    /// Liquidate one position.
    pub async fn close_position(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::close_position(symbol)?).await
    }

    /// Liquidate every position.
    pub async fn close_all_positions(&self) -> Result<Response> {
        self.call(endpoints::close_all_positions()).await
    }

    // =========================================================================
    // Assets, Watchlists, Calendar, Clock
    // =========================================================================

    /// Assets filtered by status and class.
    pub async fn list_assets(
        &self,
        status: Option<&str>,
        asset_class: Option<&str>,
    ) -> Result<Response> {
        self.call(endpoints::list_assets(status, asset_class)).await
    }

    /// Asset by symbol or id.
    pub async fn get_asset(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_asset(symbol)?).await
    }

    /// All watchlists.
    pub async fn get_watchlists(&self) -> Result<Response> {
        self.call(endpoints::get_watchlists()).await
    }

    /// Watchlist by id.
    pub async fn get_watchlist(&self, watchlist_id: &str) -> Result<Response> {
        self.call(endpoints::get_watchlist(watchlist_id)?).await
    }

    /// Create a watchlist.
    pub async fn create_watchlist(&self, name: &str, symbols: &[&str]) -> Result<Response> {
        self.call(endpoints::create_watchlist(name, symbols)?).await
    }

    /// Append a symbol to a watchlist.
    pub async fn add_to_watchlist(&self, watchlist_id: &str, symbol: &str) -> Result<Response> {
        self.call(endpoints::add_to_watchlist(watchlist_id, symbol)?)
            .await
    }

    /// Rename a watchlist or replace its symbols.
    pub async fn update_watchlist(
        &self,
        watchlist_id: &str,
        name: Option<&str>,
        symbols: Option<&[&str]>,
    ) -> Result<Response> {
        self.call(endpoints::update_watchlist(watchlist_id, name, symbols)?)
            .await
    }

    /// Delete a watchlist.
    pub async fn delete_watchlist(&self, watchlist_id: &str) -> Result<Response> {
        self.call(endpoints::delete_watchlist(watchlist_id)?).await
    }

    /// Remove a symbol from a watchlist.
    pub async fn remove_from_watchlist(&self, watchlist_id: &str, symbol: &str) -> Result<Response> {
        self.call(endpoints::remove_from_watchlist(watchlist_id, symbol)?)
            .await
    }

    /// Trading days between two `YYYY-MM-DD` dates.
    pub async fn get_calendar(&self, start: Option<&str>, end: Option<&str>) -> Result<Response> {
        self.call(endpoints::get_calendar(start, end)?).await
    }

    /// Market clock.
    pub async fn get_clock(&self) -> Result<Response> {
        self.call(endpoints::get_clock()).await
    }

    // =========================================================================
    // Market Data
    // =========================================================================

    /// Lazily page through bars.
    pub fn bars_pages(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: &DataQuery,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + use<>> {
        self.pages(RecordKind::Bar, symbol, Some(timeframe), query)
    }

    /// Lazily page through trades.
    pub fn trades_pages(
        &self,
        symbol: &str,
        query: &DataQuery,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + use<>> {
        self.pages(RecordKind::Trade, symbol, None, query)
    }

    /// Lazily page through quotes.
    pub fn quotes_pages(
        &self,
        symbol: &str,
        query: &DataQuery,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + use<>> {
        self.pages(RecordKind::Quote, symbol, None, query)
    }

    /// Bars assembled across pages, truncated to `query.limit`.
    pub async fn get_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: &DataQuery,
    ) -> Result<RecordSet> {
        self.collect(RecordKind::Bar, symbol, Some(timeframe), query)
            .await
    }

    /// Trades assembled across pages, truncated to `query.limit`.
    pub async fn get_trades(&self, symbol: &str, query: &DataQuery) -> Result<RecordSet> {
        self.collect(RecordKind::Trade, symbol, None, query).await
    }

    /// Quotes assembled across pages, truncated to `query.limit`.
    pub async fn get_quotes(&self, symbol: &str, query: &DataQuery) -> Result<RecordSet> {
        self.collect(RecordKind::Quote, symbol, None, query).await
    }

    /// Latest trade for a symbol.
    pub async fn get_latest_trade(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_trade(symbol)?).await
    }

    /// Latest quote for a symbol.
    pub async fn get_latest_quote(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_quote(symbol)?).await
    }

    /// Latest minute bar for a symbol.
    pub async fn get_latest_bar(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_bar(symbol)?).await
    }

    /// Snapshot of one symbol.
    pub async fn get_snapshot(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_snapshot(symbol)?).await
    }

    /// Snapshots keyed by symbol.
    pub async fn get_snapshots(&self, symbols: &[&str]) -> Result<Response> {
        self.call(endpoints::get_snapshots(symbols)?).await
    }

    /// News articles.
    pub async fn get_news(&self, symbols: &[&str], limit: Option<u32>) -> Result<Response> {
        self.call(endpoints::get_news(symbols, limit)).await
    }

    fn pages(
        &self,
        kind: RecordKind,
        symbol: &str,
        timeframe: Option<TimeFrame>,
        query: &DataQuery,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + use<>> {
        let spec = endpoints::records_page(kind, symbol, timeframe, query)?;
        Ok(page_stream(
            self.clone(),
            PageCursor::new(spec, kind, query.limit),
        ))
    }

    async fn collect(
        &self,
        kind: RecordKind,
        symbol: &str,
        timeframe: Option<TimeFrame>,
        query: &DataQuery,
    ) -> Result<RecordSet> {
        use futures::TryStreamExt;

        let pages: Vec<Value> = self
            .pages(kind, symbol, timeframe, query)?
            .try_collect()
            .await?;
        Ok(assemble(kind, symbol, pages, query.limit))
    }
}

/// Apply raw mode, plucking, and shape wrapping to a decoded body.
pub(crate) fn wrap(config: &ClientConfig, value: Option<Value>, call: &ApiCall) -> Response {
    let Some(value) = value else {
        return Response::Empty;
    };
    if config.raw_data {
        return Response::Raw(value);
    }
    let value = match (call.pluck, value) {
        (Some(key), Value::Object(mut map)) if map.contains_key(key) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        (_, value) => value,
    };
    Response::wrap(value, call.kind, call.shape)
}
