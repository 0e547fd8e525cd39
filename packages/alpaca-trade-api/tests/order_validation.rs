//! Order validation happens before any network I/O.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use alpaca_trade_api::{
    ClientConfig, ClientOptions, Error, Numeric, OrderRequest, OrderSide, OrderType,
    ReplaceOrderRequest, RestClient, StopLoss, TakeProfit, TimeInForce,
};
use serde_json::json;
use test_case::test_case;
use tokio_test::assert_err;
use wiremock::MockServer;

fn client(server: &MockServer) -> RestClient {
    let options = ClientOptions {
        base_url: Some(server.uri()),
        retry_max: Some(0),
        ..ClientOptions::with_key_pair("key-id", "secret-key")
    };
    RestClient::new(ClientConfig::resolve_with(options, |_| None).unwrap()).unwrap()
}

#[tokio::test]
async fn non_numeric_stop_price_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let order = OrderRequest::new(
        "X",
        "buy".parse::<OrderSide>().unwrap(),
        "market".parse::<OrderType>().unwrap(),
        "day".parse::<TimeInForce>().unwrap(),
    )
    .qty(15)
    .limit_price("107.00")
    .stop_price("a")
    .client_order_id("my-order");

    let err = assert_err!(client(&server).submit_order(&order).await);
    assert!(matches!(err, Error::Validation(ref m) if m.contains("stop_price")), "{err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[test_case(Numeric::from(15), "15" ; "integer")]
#[test_case(Numeric::from(12.5), "12.5" ; "float")]
#[test_case(Numeric::from("107.00"), "107.00" ; "numeric string")]
#[test_case(Numeric::from(" 3 "), "3" ; "padded string")]
fn numeric_fields_accept_all_forms(value: Numeric, wire: &str) {
    let body = OrderRequest::new("SPY", OrderSide::Buy, OrderType::Limit, TimeInForce::Gtc)
        .qty(1)
        .limit_price(value)
        .to_body()
        .unwrap();
    assert_eq!(body["limit_price"], json!(wire));
}

#[test_case("a" ; "letters")]
#[test_case("" ; "empty")]
#[test_case("1.2.3" ; "two dots")]
fn non_numeric_strings_fail(price: &str) {
    let err = OrderRequest::new("SPY", OrderSide::Sell, OrderType::Limit, TimeInForce::Day)
        .qty(1)
        .limit_price(price)
        .to_body()
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn non_finite_floats_fail() {
    let err = OrderRequest::new("SPY", OrderSide::Sell, OrderType::Limit, TimeInForce::Day)
        .qty(f64::NAN)
        .to_body()
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn bracket_legs_are_validated() {
    let order = OrderRequest::new("SPY", OrderSide::Buy, OrderType::Limit, TimeInForce::Gtc)
        .qty(10)
        .limit_price(400)
        .bracket(
            TakeProfit {
                limit_price: Numeric::from("410"),
            },
            StopLoss {
                stop_price: Numeric::from("x"),
                limit_price: None,
            },
        );
    assert!(matches!(order.to_body(), Err(Error::Validation(_))));
}

#[test_case("sideways" ; "bad side")]
#[test_case("" ; "empty side")]
fn unknown_enum_values_fail(side: &str) {
    assert!(matches!(side.parse::<OrderSide>(), Err(Error::Validation(_))));
}

#[tokio::test]
async fn empty_replace_is_rejected_before_sending() {
    let server = MockServer::start().await;
    let err = client(&server)
        .replace_order("order-id", &ReplaceOrderRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}
