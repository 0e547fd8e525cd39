//! Blocking REST engine against a mock server.
//!
//! `reqwest::blocking` must not run on an async worker, so each call is moved
//! to `spawn_blocking`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use alpaca_trade_api::{
    BlockingRestClient, ClientConfig, ClientOptions, DataQuery, EntityKind, Error, OrderRequest,
    OrderSide, OrderType, TimeFrame, TimeInForce,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, retry_max: i64) -> ClientConfig {
    let options = ClientOptions {
        base_url: Some(server.uri()),
        data_url: Some(server.uri()),
        retry_max: Some(retry_max),
        ..ClientOptions::with_key_pair("key-id", "secret-key")
    };
    let mut config = ClientConfig::resolve_with(options, |_| None).unwrap();
    config.retry.wait = Duration::from_millis(10);
    config
}

/// Build the client and run `f` on a blocking thread.
///
/// The blocking client owns a runtime of its own, so it is created and
/// dropped off the async workers.
async fn blocking<T, F>(config: ClientConfig, f: F) -> T
where
    F: FnOnce(&BlockingRestClient) -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let client = BlockingRestClient::new(config).unwrap();
        f(&client)
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn clock_is_fetched_and_wrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/clock"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timestamp": "2021-05-11T10:00:00.000-04:00",
            "is_open": true,
            "next_open": "2021-05-12T09:30:00-04:00",
            "next_close": "2021-05-11T16:00:00-04:00",
        })))
        .mount(&server)
        .await;

    let clock = blocking(config(&server, 0), BlockingRestClient::get_clock)
        .await
        .unwrap();
    let clock = clock.entity().unwrap();
    assert_eq!(clock.kind(), EntityKind::Clock);
    assert_eq!(clock.get_bool("is_open"), Some(true));
    assert!(clock.get_instant("next_open").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_is_retried_with_thread_sleep() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/positions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/positions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"symbol": "AAPL", "qty": "10"},
        ])))
        .mount(&server)
        .await;

    let positions = blocking(config(&server, 2), BlockingRestClient::list_positions)
        .await
        .unwrap();
    assert_eq!(positions.list().unwrap()[0].get_str("qty"), Some("10"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn submitted_order_body_uses_string_numbers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/orders"))
        .and(body_json(json!({
            "symbol": "AAPL",
            "qty": "15",
            "side": "buy",
            "type": "limit",
            "time_in_force": "day",
            "limit_price": "107.00",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "61e69015-8549-4bfd-b9c3-01e75843f47d",
            "symbol": "AAPL",
            "status": "accepted",
            "created_at": "2021-03-16T18:38:01.942282Z",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = blocking(config(&server, 0), |client| {
        client.submit_order(
            &OrderRequest::new("AAPL", OrderSide::Buy, OrderType::Limit, TimeInForce::Day)
                .qty(15)
                .limit_price("107.00"),
        )
    })
    .await
    .unwrap()
    .entity()
    .unwrap();
    assert_eq!(order.kind(), EntityKind::Order);
    assert_eq!(order.get_str("status"), Some("accepted"));
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_pages_follow_tokens() {
    let server = MockServer::start().await;
    let page = |n: usize, token: Value| {
        json!({
            "bars": (0..n).map(|i| json!({"o": i, "c": i})).collect::<Vec<_>>(),
            "next_page_token": token,
        })
    };
    Mock::given(method("GET"))
        .and(path("/v2/stocks/SPY/bars"))
        .and(query_param_is_missing("page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(3, json!("N1"))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/stocks/SPY/bars"))
        .and(query_param("page_token", "N1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(2, Value::Null)))
        .mount(&server)
        .await;

    let (pages, set) = blocking(config(&server, 0), |client| {
        let pages = client
            .bars_pages("SPY", TimeFrame::DAY, &DataQuery::default())
            .unwrap()
            .collect::<Result<Vec<_>, Error>>()
            .unwrap();
        let set = client
            .get_bars("SPY", TimeFrame::DAY, &DataQuery::default())
            .unwrap();
        (pages, set)
    })
    .await;

    assert_eq!(pages.len(), 2);
    assert_eq!(set.len(), 5);
    assert_eq!(set.symbol(), Some("SPY"));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_order_never_reaches_the_server() {
    let server = MockServer::start().await;
    let err = blocking(config(&server, 0), |client| {
        client.submit_order(
            &OrderRequest::new("X", OrderSide::Buy, OrderType::StopLimit, TimeInForce::Day)
                .qty(15)
                .limit_price("107.00")
                .stop_price("a"),
        )
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Validation(_)), "{err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}
