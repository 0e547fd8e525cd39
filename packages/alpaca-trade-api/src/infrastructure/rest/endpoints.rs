//! Endpoint Call Builders
//!
//! Each function returns an [`ApiCall`]: the request to send plus how to wrap
//! its body. The async and blocking clients both execute these, so the URL
//! shapes and argument validation live in one place.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::entity::EntityKind;
use crate::domain::order::{OrderRequest, ReplaceOrderRequest};
use crate::domain::records::RecordKind;
use crate::domain::response::Shape;
use crate::domain::timeframe::TimeFrame;
use crate::domain::validation::validate_date;
use crate::error::{Error, Result};

use super::request::{ApiPrefix, RequestSpec};

/// Request plus wrapping instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// Request to send.
    pub spec: RequestSpec,
    /// Entity kind for wrapped results.
    pub kind: EntityKind,
    /// Expected body shape.
    pub shape: Shape,
    /// Key to unwrap before wrapping (e.g. `trade` in a latest-trade body).
    /// Ignored in raw mode.
    pub pluck: Option<&'static str>,
}

impl ApiCall {
    fn new(spec: RequestSpec, kind: EntityKind, shape: Shape) -> Self {
        Self {
            spec,
            kind,
            shape,
            pluck: None,
        }
    }

    fn single(spec: RequestSpec, kind: EntityKind) -> Self {
        Self::new(spec, kind, Shape::Single)
    }

    fn list(spec: RequestSpec, kind: EntityKind) -> Self {
        Self::new(spec, kind, Shape::List)
    }

    fn plucking(mut self, key: &'static str) -> Self {
        self.pluck = Some(key);
        self
    }
}

fn to_params<T: Serialize>(query: &T) -> Result<Option<Value>> {
    let value = serde_json::to_value(query)
        .map_err(|e| Error::Validation(format!("unserializable query: {e}")))?;
    Ok(match value {
        Value::Object(map) if map.is_empty() => None,
        other => Some(other),
    })
}

fn non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Percent-encode a value interpolated into a URL path.
///
/// `BTC/USD` stays one segment; blank values and control characters are
/// rejected.
fn path_segment<'a>(field: &str, value: &'a str) -> Result<Cow<'a, str>> {
    non_empty(field, value)?;
    if value.chars().any(char::is_control) {
        return Err(Error::Validation(format!("{field} contains control characters")));
    }
    Ok(urlencoding::encode(value))
}

// =============================================================================
// Query Types
// =============================================================================

/// Filters for `list_orders`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderQuery {
    /// `open`, `closed` or `all`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Max orders returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only orders submitted after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Only orders submitted until this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    /// `asc` or `desc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Roll up legs under their parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<bool>,
    /// Restrict to these symbols.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
}

/// Filters for `get_activities`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivityQuery {
    /// Single day (`YYYY-MM-DD`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    /// `asc` or `desc`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Activity id to continue from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// Parameters for `get_portfolio_history`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PortfolioHistoryQuery {
    /// Window such as `1M` or `1A`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Resolution such as `1D` or `15Min`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    /// Last day of the window (`YYYY-MM-DD`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    /// Include extended hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_hours: Option<bool>,
}

/// Range and paging for bars, trades, and quotes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataQuery {
    /// Inclusive start (RFC-3339 or `YYYY-MM-DD`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Inclusive end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Total rows wanted across all pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Data feed (`iex`, `sip`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<String>,
    /// Corporate action adjustment (bars only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<String>,
}

// =============================================================================
// Account
// =============================================================================

/// `GET /account`.
#[must_use]
pub fn get_account() -> ApiCall {
    ApiCall::single(RequestSpec::get("/account"), EntityKind::Account)
}

/// `GET /account/configurations`.
#[must_use]
pub fn get_account_configurations() -> ApiCall {
    ApiCall::single(
        RequestSpec::get("/account/configurations"),
        EntityKind::AccountConfigurations,
    )
}

/// `PATCH /account/configurations`.
#[must_use]
pub fn update_account_configurations(changes: Value) -> ApiCall {
    ApiCall::single(
        RequestSpec::patch("/account/configurations").with_data(changes),
        EntityKind::AccountConfigurations,
    )
}

/// `GET /account/activities[/{type}]`.
///
/// One type goes in the path; several go in `activity_types`.
pub fn get_activities(types: &[&str], query: &ActivityQuery) -> Result<ApiCall> {
    let mut params = to_params(query)?;
    let path = match types {
        [single] => format!(
            "/account/activities/{}",
            path_segment("activity_type", single)?
        ),
        _ => {
            if !types.is_empty() {
                let map = params.get_or_insert_with(|| json!({}));
                if let Value::Object(map) = map {
                    map.insert("activity_types".to_string(), Value::from(types.join(",")));
                }
            }
            "/account/activities".to_string()
        }
    };
    Ok(ApiCall::list(
        RequestSpec::get(path).with_data(params),
        EntityKind::Activity,
    ))
}

/// `GET /account/portfolio/history`.
pub fn get_portfolio_history(query: &PortfolioHistoryQuery) -> Result<ApiCall> {
    if let Some(date) = &query.date_end {
        validate_date(date)?;
    }
    Ok(ApiCall::single(
        RequestSpec::get("/account/portfolio/history").with_data(to_params(query)?),
        EntityKind::PortfolioHistory,
    ))
}

// =============================================================================
// Orders
// =============================================================================

/// `GET /orders`.
pub fn list_orders(query: &OrderQuery) -> Result<ApiCall> {
    Ok(ApiCall::list(
        RequestSpec::get("/orders").with_data(to_params(query)?),
        EntityKind::Order,
    ))
}

/// `GET /orders/{id}`.
pub fn get_order(order_id: &str) -> Result<ApiCall> {
    let order_id = path_segment("order_id", order_id)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/orders/{order_id}")),
        EntityKind::Order,
    ))
}

/// `GET /orders:by_client_order_id`.
pub fn get_order_by_client_order_id(client_order_id: &str) -> Result<ApiCall> {
    non_empty("client_order_id", client_order_id)?;
    Ok(ApiCall::single(
        RequestSpec::get("/orders:by_client_order_id")
            .with_data(json!({"client_order_id": client_order_id})),
        EntityKind::Order,
    ))
}

/// `POST /orders`. The body is validated before anything is sent.
pub fn submit_order(order: &OrderRequest) -> Result<ApiCall> {
    Ok(ApiCall::single(
        RequestSpec::post("/orders").with_data(order.to_body()?),
        EntityKind::Order,
    ))
}

/// `PATCH /orders/{id}`.
pub fn replace_order(order_id: &str, changes: &ReplaceOrderRequest) -> Result<ApiCall> {
    let order_id = path_segment("order_id", order_id)?;
    Ok(ApiCall::single(
        RequestSpec::patch(format!("/orders/{order_id}")).with_data(changes.to_body()?),
        EntityKind::Order,
    ))
}

/// `DELETE /orders/{id}`.
pub fn cancel_order(order_id: &str) -> Result<ApiCall> {
    let order_id = path_segment("order_id", order_id)?;
    Ok(ApiCall::single(
        RequestSpec::delete(format!("/orders/{order_id}")),
        EntityKind::Generic,
    ))
}

/// `DELETE /orders`.
#[must_use]
pub fn cancel_all_orders() -> ApiCall {
    ApiCall::list(RequestSpec::delete("/orders"), EntityKind::Generic)
}

// =============================================================================
// Positions
// =============================================================================

/// `GET /positions`.
#[must_use]
pub fn list_positions() -> ApiCall {
    ApiCall::list(RequestSpec::get("/positions"), EntityKind::Position)
}

/// `GET /positions/{symbol}`.
pub fn get_position(symbol: &str) -> Result<ApiCall> {
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/positions/{symbol}")),
        EntityKind::Position,
    ))
}

/// `DELETE /positions/{symbol}`; the reply is the closing order.
pub fn close_position(symbol: &str) -> Result<ApiCall> {
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::delete(format!("/positions/{symbol}")),
        EntityKind::Order,
    ))
}

/// `DELETE /positions`.
#[must_use]
pub fn close_all_positions() -> ApiCall {
    ApiCall::list(RequestSpec::delete("/positions"), EntityKind::Generic)
}

// =============================================================================
// Assets
// =============================================================================

/// `GET /assets`.
#[must_use]
pub fn list_assets(status: Option<&str>, asset_class: Option<&str>) -> ApiCall {
    ApiCall::list(
        RequestSpec::get("/assets").with_data(json!({
            "status": status,
            "asset_class": asset_class,
        })),
        EntityKind::Asset,
    )
}

/// `GET /assets/{symbol}`.
pub fn get_asset(symbol: &str) -> Result<ApiCall> {
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/assets/{symbol}")),
        EntityKind::Asset,
    ))
}

// =============================================================================
// Watchlists
// =============================================================================

/// `GET /watchlists`.
#[must_use]
pub fn get_watchlists() -> ApiCall {
    ApiCall::list(RequestSpec::get("/watchlists"), EntityKind::Watchlist)
}

/// `GET /watchlists/{id}`.
pub fn get_watchlist(watchlist_id: &str) -> Result<ApiCall> {
    let watchlist_id = path_segment("watchlist_id", watchlist_id)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/watchlists/{watchlist_id}")),
        EntityKind::Watchlist,
    ))
}

/// `POST /watchlists`.
pub fn create_watchlist(name: &str, symbols: &[&str]) -> Result<ApiCall> {
    non_empty("name", name)?;
    Ok(ApiCall::single(
        RequestSpec::post("/watchlists").with_data(json!({"name": name, "symbols": symbols})),
        EntityKind::Watchlist,
    ))
}

/// `POST /watchlists/{id}`.
pub fn add_to_watchlist(watchlist_id: &str, symbol: &str) -> Result<ApiCall> {
    let watchlist_id = path_segment("watchlist_id", watchlist_id)?;
    non_empty("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::post(format!("/watchlists/{watchlist_id}"))
            .with_data(json!({"symbol": symbol})),
        EntityKind::Watchlist,
    ))
}

/// `PUT /watchlists/{id}`.
pub fn update_watchlist(
    watchlist_id: &str,
    name: Option<&str>,
    symbols: Option<&[&str]>,
) -> Result<ApiCall> {
    let watchlist_id = path_segment("watchlist_id", watchlist_id)?;
    Ok(ApiCall::single(
        RequestSpec::put(format!("/watchlists/{watchlist_id}"))
            .with_data(json!({"name": name, "symbols": symbols})),
        EntityKind::Watchlist,
    ))
}

/// `DELETE /watchlists/{id}`.
pub fn delete_watchlist(watchlist_id: &str) -> Result<ApiCall> {
    let watchlist_id = path_segment("watchlist_id", watchlist_id)?;
    Ok(ApiCall::single(
        RequestSpec::delete(format!("/watchlists/{watchlist_id}")),
        EntityKind::Generic,
    ))
}

/// `DELETE /watchlists/{id}/{symbol}`.
pub fn remove_from_watchlist(watchlist_id: &str, symbol: &str) -> Result<ApiCall> {
    let watchlist_id = path_segment("watchlist_id", watchlist_id)?;
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::delete(format!("/watchlists/{watchlist_id}/{symbol}")),
        EntityKind::Watchlist,
    ))
}

// =============================================================================
// Calendar & Clock
// =============================================================================

/// `GET /calendar`. Dates must be `YYYY-MM-DD`.
pub fn get_calendar(start: Option<&str>, end: Option<&str>) -> Result<ApiCall> {
    for date in [start, end].into_iter().flatten() {
        validate_date(date)?;
    }
    Ok(ApiCall::list(
        RequestSpec::get("/calendar").with_data(json!({"start": start, "end": end})),
        EntityKind::Calendar,
    ))
}

/// `GET /clock`.
#[must_use]
pub fn get_clock() -> ApiCall {
    ApiCall::single(RequestSpec::get("/clock"), EntityKind::Clock)
}

// =============================================================================
// Market Data
// =============================================================================

/// First page of `GET /v2/stocks/{symbol}/{bars|trades|quotes}`.
///
/// The pagination cursor re-issues this spec with `page_token` set.
pub fn records_page(
    kind: RecordKind,
    symbol: &str,
    timeframe: Option<TimeFrame>,
    query: &DataQuery,
) -> Result<RequestSpec> {
    let symbol = path_segment("symbol", symbol)?;
    let mut params = to_params(query)?.unwrap_or_else(|| json!({}));
    if let (RecordKind::Bar, Some(tf), Value::Object(map)) = (kind, timeframe, &mut params) {
        map.insert("timeframe".to_string(), Value::from(tf.to_string()));
    }
    Ok(RequestSpec::get(format!("/stocks/{symbol}/{}", kind.page_key()))
        .on_data_api()
        .with_data(params))
}

/// `GET /v2/stocks/{symbol}/trades/latest`.
pub fn get_latest_trade(symbol: &str) -> Result<ApiCall> {
    latest(symbol, "trades", "trade", EntityKind::Trade)
}

/// `GET /v2/stocks/{symbol}/quotes/latest`.
pub fn get_latest_quote(symbol: &str) -> Result<ApiCall> {
    latest(symbol, "quotes", "quote", EntityKind::Quote)
}

/// `GET /v2/stocks/{symbol}/bars/latest`.
pub fn get_latest_bar(symbol: &str) -> Result<ApiCall> {
    latest(symbol, "bars", "bar", EntityKind::Bar)
}

fn latest(
    symbol: &str,
    resource: &str,
    key: &'static str,
    kind: EntityKind,
) -> Result<ApiCall> {
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/stocks/{symbol}/{resource}/latest")).on_data_api(),
        kind,
    )
    .plucking(key))
}

/// `GET /v2/stocks/{symbol}/snapshot`.
pub fn get_snapshot(symbol: &str) -> Result<ApiCall> {
    let symbol = path_segment("symbol", symbol)?;
    Ok(ApiCall::single(
        RequestSpec::get(format!("/stocks/{symbol}/snapshot")).on_data_api(),
        EntityKind::Snapshot,
    ))
}

/// `GET /v2/stocks/snapshots?symbols=...`, keyed by symbol.
pub fn get_snapshots(symbols: &[&str]) -> Result<ApiCall> {
    if symbols.is_empty() {
        return Err(Error::Validation("symbols must not be empty".to_string()));
    }
    Ok(ApiCall::new(
        RequestSpec::get("/stocks/snapshots")
            .on_data_api()
            .with_data(json!({"symbols": symbols})),
        EntityKind::Snapshot,
        Shape::Keyed,
    ))
}

/// `GET /v1beta1/news`.
#[must_use]
pub fn get_news(symbols: &[&str], limit: Option<u32>) -> ApiCall {
    let symbols = (!symbols.is_empty()).then_some(symbols);
    ApiCall::list(
        RequestSpec::get("/news")
            .on_data_api()
            .with_prefix(ApiPrefix::Version("v1beta1".to_string()))
            .with_data(json!({"symbols": symbols, "limit": limit})),
        EntityKind::News,
    )
    .plucking("news")
}

#[cfg(test)]
mod tests {
    use reqwest::Method;
    use test_case::test_case;

    use super::*;
    use crate::domain::order::{OrderSide, OrderType, TimeInForce};
    use crate::infrastructure::config::Endpoint;

    fn query_of(call: &ApiCall) -> Vec<(String, String)> {
        let mut query = call.spec.query();
        query.sort();
        query
    }

    #[test]
    fn invalid_order_fails_before_a_request_exists() {
        let order = OrderRequest::new("X", OrderSide::Buy, OrderType::Market, TimeInForce::Day)
            .qty(15)
            .limit_price("107.00")
            .stop_price("a");
        assert!(matches!(submit_order(&order), Err(Error::Validation(_))));
    }

    #[test]
    fn path_values_are_encoded_as_one_segment() {
        let asset = get_asset("BTC/USD").unwrap();
        assert_eq!(asset.spec.path, "/assets/BTC%2FUSD");

        let latest = get_latest_trade("AAPL?feed=sip").unwrap();
        assert_eq!(latest.spec.path, "/stocks/AAPL%3Ffeed%3Dsip/trades/latest");

        let order = cancel_order("../account").unwrap();
        assert_eq!(order.spec.path, "/orders/..%2Faccount");

        let removed = remove_from_watchlist("w#1", "BRK B").unwrap();
        assert_eq!(removed.spec.path, "/watchlists/w%231/BRK%20B");

        let page = records_page(RecordKind::Trade, "A%B", None, &DataQuery::default()).unwrap();
        assert_eq!(page.path, "/stocks/A%25B/trades");

        let activities = get_activities(&["FILL/DIV"], &ActivityQuery::default()).unwrap();
        assert_eq!(activities.spec.path, "/account/activities/FILL%2FDIV");
    }

    #[test]
    fn plain_symbols_and_ids_are_untouched() {
        assert_eq!(get_position("BRK.B").unwrap().spec.path, "/positions/BRK.B");
        assert_eq!(
            get_order("904837e3-3b76-47ec-b432-046db621571b").unwrap().spec.path,
            "/orders/904837e3-3b76-47ec-b432-046db621571b"
        );
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "blank")]
    #[test_case("AAPL\n"; "newline")]
    #[test_case("A\u{7f}"; "delete char")]
    fn unusable_path_values_are_rejected(symbol: &str) {
        assert!(matches!(get_snapshot(symbol), Err(Error::Validation(_))));
        assert!(matches!(close_position(symbol), Err(Error::Validation(_))));
        assert!(matches!(get_watchlist(symbol), Err(Error::Validation(_))));
    }

    #[test]
    fn activity_types_in_path_or_query() {
        let one = get_activities(&["FILL"], &ActivityQuery::default()).unwrap();
        assert_eq!(one.spec.path, "/account/activities/FILL");
        assert!(one.spec.data.is_none());

        let many = get_activities(&["FILL", "DIV"], &ActivityQuery::default()).unwrap();
        assert_eq!(many.spec.path, "/account/activities");
        assert_eq!(
            query_of(&many),
            vec![("activity_types".to_string(), "FILL,DIV".to_string())]
        );
    }

    #[test]
    fn calendar_dates_are_validated() {
        assert!(matches!(
            get_calendar(Some("2021-02-30"), None),
            Err(Error::Validation(_))
        ));
        let call = get_calendar(Some("2021-02-01"), Some("2021-02-26")).unwrap();
        assert_eq!(
            query_of(&call),
            vec![
                ("end".to_string(), "2021-02-26".to_string()),
                ("start".to_string(), "2021-02-01".to_string())
            ]
        );
    }

    #[test]
    fn bars_page_carries_timeframe() {
        let spec = records_page(
            RecordKind::Bar,
            "AAPL",
            Some(TimeFrame::MINUTE),
            &DataQuery {
                limit: Some(500),
                ..DataQuery::default()
            },
        )
        .unwrap();
        let endpoint = Endpoint::default();
        assert_eq!(
            spec.url(&endpoint),
            "https://data.alpaca.markets/v2/stocks/AAPL/bars"
        );
        let mut query = spec.query();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("limit".to_string(), "500".to_string()),
                ("timeframe".to_string(), "1Min".to_string())
            ]
        );
    }

    #[test]
    fn news_uses_beta_prefix_and_plucks() {
        let call = get_news(&["AAPL"], Some(10));
        assert_eq!(
            call.spec.url(&Endpoint::default()),
            "https://data.alpaca.markets/v1beta1/news"
        );
        assert_eq!(call.pluck, Some("news"));
    }

    #[test]
    fn replace_is_a_patch() {
        let call = replace_order(
            "abc",
            &ReplaceOrderRequest {
                qty: Some(3.into()),
                ..ReplaceOrderRequest::default()
            },
        )
        .unwrap();
        assert_eq!(call.spec.method, Method::PATCH);
        assert_eq!(call.spec.body(), Some(&json!({"qty": "3"})));
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(get_order("").is_err());
        assert!(get_position(" ").is_err());
        assert!(get_snapshots(&[]).is_err());
    }
}
