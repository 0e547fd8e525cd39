//! Blocking REST Client
//!
//! Same contract as [`RestClient`](super::RestClient) over
//! `reqwest::blocking`; retry waits sleep the calling thread. Do not call it
//! from inside an async runtime worker (use `spawn_blocking`).

use std::sync::Arc;

use reqwest::blocking::Client;
use serde_json::Value;

use crate::domain::entity::EntityKind;
use crate::domain::order::{OrderRequest, ReplaceOrderRequest};
use crate::domain::records::{RecordKind, RecordSet};
use crate::domain::response::{Response, Shape};
use crate::domain::timeframe::TimeFrame;
use crate::error::Result;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::metrics;

use super::client::wrap;
use super::endpoints::{
    self, ActivityQuery, ApiCall, DataQuery, OrderQuery, PortfolioHistoryQuery,
};
use super::pagination::{BlockingPages, PageCursor, assemble};
use super::request::{RequestSpec, auth_headers};
use super::retry::{RetryBudget, classify};

/// Blocking client for the trading and market data APIs.
#[derive(Debug, Clone)]
pub struct BlockingRestClient {
    config: Arc<ClientConfig>,
    http: Client,
}

impl BlockingRestClient {
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

    /// `GET` on the trading API; `params` become the query string.
    pub fn get(&self, path: &str, params: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::get(path).with_data(params))
    }

    /// `POST` on the trading API with a JSON body.
    pub fn post(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::post(path).with_data(body))
    }

    /// `PATCH` on the trading API with a JSON body.
    pub fn patch(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::patch(path).with_data(body))
    }

    /// `DELETE` on the trading API.
    pub fn delete(&self, path: &str, body: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::delete(path).with_data(body))
    }

    /// `GET` on the market data API.
    pub fn data_get(&self, path: &str, params: Option<Value>) -> Result<Response> {
        self.request(RequestSpec::get(path).on_data_api().with_data(params))
    }

    /// Send any request; the body is wrapped as generic entities.
    pub fn request(&self, spec: RequestSpec) -> Result<Response> {
        self.call(ApiCall {
            spec,
            kind: EntityKind::Generic,
            shape: Shape::Single,
            pluck: None,
        })
    }

    /// Send an endpoint call and wrap its body.
    pub fn call(&self, call: ApiCall) -> Result<Response> {
        let value = self.execute(&call.spec)?;
        Ok(wrap(&self.config, value, &call))
    }

    /// Send a request with rate-limit retries, returning the decoded body.
    pub fn execute(&self, spec: &RequestSpec) -> Result<Option<Value>> {
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

            let response = request.send()?;
            let status = response.status().as_u16();
            let body = response.text()?;
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
                        std::thread::sleep(wait);
                        continue;
                    }
                    return Err(err);
                }
                outcome => return outcome,
            }
        }
    }

    /// Account details.
    pub fn get_account(&self) -> Result<Response> {
        self.call(endpoints::get_account())
    }

    /// Account configuration flags.
    pub fn get_account_configurations(&self) -> Result<Response> {
        self.call(endpoints::get_account_configurations())
    }

    /// Update account configuration flags.
    pub fn update_account_configurations(&self, changes: Value) -> Result<Response> {
        self.call(endpoints::update_account_configurations(changes))
    }

    /// Account activities of the given types (all types when empty).
    pub fn get_activities(&self, types: &[&str], query: &ActivityQuery) -> Result<Response> {
        self.call(endpoints::get_activities(types, query)?)
    }

    /// Equity and profit/loss history.
    pub fn get_portfolio_history(&self, query: &PortfolioHistoryQuery) -> Result<Response> {
        self.call(endpoints::get_portfolio_history(query)?)
    }

    /// Orders matching the filters.
    pub fn list_orders(&self, query: &OrderQuery) -> Result<Response> {
        self.call(endpoints::list_orders(query)?)
    }

    /// Order by id.
    pub fn get_order(&self, order_id: &str) -> Result<Response> {
        self.call(endpoints::get_order(order_id)?)
    }

    /// Order by client order id.
    pub fn get_order_by_client_order_id(&self, client_order_id: &str) -> Result<Response> {
        self.call(endpoints::get_order_by_client_order_id(client_order_id)?)
    }

    /// Submit a new order. Malformed numeric fields fail before any I/O.
    pub fn submit_order(&self, order: &OrderRequest) -> Result<Response> {
        self.call(endpoints::submit_order(order)?)
    }

    /// Replace an open order.
    pub fn replace_order(&self, order_id: &str, changes: &ReplaceOrderRequest) -> Result<Response> {
        self.call(endpoints::replace_order(order_id, changes)?)
    }

    /// Cancel an order.
    pub fn cancel_order(&self, order_id: &str) -> Result<Response> {
        self.call(endpoints::cancel_order(order_id)?)
    }

    /// Cancel every open order.
    pub fn cancel_all_orders(&self) -> Result<Response> {
        self.call(endpoints::cancel_all_orders())
    }

    /// Open positions.
    pub fn list_positions(&self) -> Result<Response> {
        self.call(endpoints::list_positions())
    }

    /// Open position in one symbol.
    pub fn get_position(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_position(symbol)?)
    }

    /// Liquidate one position.
    pub fn close_position(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::close_position(symbol)?)
    }

    /// Liquidate every position.
    pub fn close_all_positions(&self) -> Result<Response> {
        self.call(endpoints::close_all_positions())
    }

    /// Assets filtered by status and class.
    pub fn list_assets(&self, status: Option<&str>, asset_class: Option<&str>) -> Result<Response> {
        self.call(endpoints::list_assets(status, asset_class))
    }

    /// Asset by symbol or id.
    pub fn get_asset(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_asset(symbol)?)
    }

    /// All watchlists.
    pub fn get_watchlists(&self) -> Result<Response> {
        self.call(endpoints::get_watchlists())
    }

    /// Watchlist by id.
    pub fn get_watchlist(&self, watchlist_id: &str) -> Result<Response> {
        self.call(endpoints::get_watchlist(watchlist_id)?)
    }

    /// Create a watchlist.
    pub fn create_watchlist(&self, name: &str, symbols: &[&str]) -> Result<Response> {
        self.call(endpoints::create_watchlist(name, symbols)?)
    }

    /// Append a symbol to a watchlist.
    pub fn add_to_watchlist(&self, watchlist_id: &str, symbol: &str) -> Result<Response> {
        self.call(endpoints::add_to_watchlist(watchlist_id, symbol)?)
    }

    /// Rename a watchlist or replace its symbols.
    pub fn update_watchlist(
        &self,
        watchlist_id: &str,
        name: Option<&str>,
        symbols: Option<&[&str]>,
    ) -> Result<Response> {
        self.call(endpoints::update_watchlist(watchlist_id, name, symbols)?)
    }

    /// Delete a watchlist.
    pub fn delete_watchlist(&self, watchlist_id: &str) -> Result<Response> {
        self.call(endpoints::delete_watchlist(watchlist_id)?)
    }

    /// Remove a symbol from a watchlist.
    pub fn remove_from_watchlist(&self, watchlist_id: &str, symbol: &str) -> Result<Response> {
        self.call(endpoints::remove_from_watchlist(watchlist_id, symbol)?)
    }

    /// Trading days between two `YYYY-MM-DD` dates.
    pub fn get_calendar(&self, start: Option<&str>, end: Option<&str>) -> Result<Response> {
        self.call(endpoints::get_calendar(start, end)?)
    }

    /// Market clock.
    pub fn get_clock(&self) -> Result<Response> {
        self.call(endpoints::get_clock())
    }

    /// Lazily page through bars.
    pub fn bars_pages(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: &DataQuery,
    ) -> Result<BlockingPages> {
        self.pages(RecordKind::Bar, symbol, Some(timeframe), query)
    }

    /// Lazily page through trades.
    pub fn trades_pages(&self, symbol: &str, query: &DataQuery) -> Result<BlockingPages> {
        self.pages(RecordKind::Trade, symbol, None, query)
    }

    /// Lazily page through quotes.
    pub fn quotes_pages(&self, symbol: &str, query: &DataQuery) -> Result<BlockingPages> {
        self.pages(RecordKind::Quote, symbol, None, query)
    }

    /// Bars assembled across pages, truncated to `query.limit`.
    pub fn get_bars(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        query: &DataQuery,
    ) -> Result<RecordSet> {
        self.collect(RecordKind::Bar, symbol, Some(timeframe), query)
    }

    /// Trades assembled across pages, truncated to `query.limit`.
    pub fn get_trades(&self, symbol: &str, query: &DataQuery) -> Result<RecordSet> {
        self.collect(RecordKind::Trade, symbol, None, query)
    }

    /// Quotes assembled across pages, truncated to `query.limit`.
    pub fn get_quotes(&self, symbol: &str, query: &DataQuery) -> Result<RecordSet> {
        self.collect(RecordKind::Quote, symbol, None, query)
    }

    /// Latest trade for a symbol.
    pub fn get_latest_trade(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_trade(symbol)?)
    }

    /// Latest quote for a symbol.
    pub fn get_latest_quote(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_quote(symbol)?)
    }

    /// Latest minute bar for a symbol.
    pub fn get_latest_bar(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_latest_bar(symbol)?)
    }

    /// Snapshot of one symbol.
    pub fn get_snapshot(&self, symbol: &str) -> Result<Response> {
        self.call(endpoints::get_snapshot(symbol)?)
    }

    /// Snapshots keyed by symbol.
    pub fn get_snapshots(&self, symbols: &[&str]) -> Result<Response> {
        self.call(endpoints::get_snapshots(symbols)?)
    }

    /// News articles.
    pub fn get_news(&self, symbols: &[&str], limit: Option<u32>) -> Result<Response> {
        self.call(endpoints::get_news(symbols, limit))
    }

    fn pages(
        &self,
        kind: RecordKind,
        symbol: &str,
        timeframe: Option<TimeFrame>,
        query: &DataQuery,
    ) -> Result<BlockingPages> {
        let spec = endpoints::records_page(kind, symbol, timeframe, query)?;
        Ok(BlockingPages::new(
            self.clone(),
            PageCursor::new(spec, kind, query.limit),
        ))
    }

    fn collect(
        &self,
        kind: RecordKind,
        symbol: &str,
        timeframe: Option<TimeFrame>,
        query: &DataQuery,
    ) -> Result<RecordSet> {
        let pages = self
            .pages(kind, symbol, timeframe, query)?
            .collect::<Result<Vec<_>>>()?;
        Ok(assemble(kind, symbol, pages, query.limit))
    }
}
