use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use uuid::Uuid;
use wiremock::matchers::{method as request_method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::{GATEWAY_KEY_ID, GATEWAY_KEY_SECRET, TestApp, read_json, read_text, sign_callback};

fn order_body(product_id: Uuid, quantity: i32) -> Value {
    json!({
        "items": [{"product_id": product_id, "quantity": quantity}],
        "shipping_address": {
            "name": "Dana Lifter",
            "line1": "12 Clean Jerk Way",
            "city": "Springfield",
            "state": "OR",
            "postal_code": "97477",
            "country": "US",
        },
        "payment_method": "gateway",
    })
}

async fn create_order_http(app: &TestApp, token: &str, product_id: Uuid, quantity: i32) -> Value {
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(product_id, quantity)),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

#[tokio::test]
async fn duplicate_checkout_returns_the_existing_order() {
    let app = TestApp::new().await;
    let customer = app.seed_user("dup@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let first = create_order_http(&app, &token, bench.id, 2).await;
    assert_eq!(first["data"]["is_existing"], false);

    let second = create_order_http(&app, &token, bench.id, 2).await;
    assert_eq!(second["data"]["is_existing"], true);
    assert_eq!(second["data"]["order"]["id"], first["data"]["order"]["id"]);
}

#[tokio::test]
async fn payment_session_exposes_the_publishable_key_only() {
    let app = TestApp::new().await;
    let customer = app.seed_user("keys@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &token, bench.id, 1).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();

    app.mock_session_once("gw_http_key").await;
    let response = app
        .request(
            Method::POST,
            "/api/payments/session",
            Some(json!({"order_id": order_id})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let raw = read_text(response).await;
    assert!(
        !raw.contains(GATEWAY_KEY_SECRET),
        "key secret leaked into the session response"
    );

    let body: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(body["data"]["order"]["status"], "payment_initiated");
    assert_eq!(body["data"]["session"]["key_id"], GATEWAY_KEY_ID);
    assert_eq!(body["data"]["session"]["gateway_order_id"], "gw_http_key");
}

#[tokio::test]
async fn a_tampered_amount_field_is_ignored_at_verification() {
    let app = TestApp::new().await;
    let customer = app.seed_user("tamper@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &token, bench.id, 2).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();

    app.mock_session_once("gw_http_tamper").await;
    let response = app
        .request(
            Method::POST,
            "/api/payments/session",
            Some(json!({"order_id": order_id})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // The callback payload smuggles an `amount`; verification only trusts the
    // signed identifier pair, so the field is dropped on the floor.
    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(json!({
                "order_id": order_id,
                "gateway_order_id": "gw_http_tamper",
                "gateway_payment_id": "gw_pay_http",
                "signature": sign_callback("gw_http_tamper", "gw_pay_http"),
                "amount": 1,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["verified"], true);

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{order_id}"),
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "confirmed");
    let total: Decimal = body["data"]["order"]["total"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(total, dec!(1000));
}

#[tokio::test]
async fn a_replayed_verification_gets_a_conflict() {
    let app = TestApp::new().await;
    let customer = app.seed_user("replay@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &token, bench.id, 1).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();

    app.mock_session_once("gw_http_replay").await;
    app.request(
        Method::POST,
        "/api/payments/session",
        Some(json!({"order_id": order_id})),
        Some(&token),
    )
    .await;

    let callback = json!({
        "order_id": order_id,
        "gateway_order_id": "gw_http_replay",
        "gateway_payment_id": "gw_pay_once",
        "signature": sign_callback("gw_http_replay", "gw_pay_once"),
    });

    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(callback.clone()),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/payments/verify",
            Some(callback),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["data"]["code"], "invalid_transition");

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{order_id}"),
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "confirmed");
}

#[tokio::test]
async fn a_gateway_outage_surfaces_as_503_with_a_stable_code() {
    let app = TestApp::new().await;
    let customer = app.seed_user("outage-http@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &token, bench.id, 1).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();

    Mock::given(request_method("POST"))
        .and(path("/v1/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "internal"})))
        .mount(&app.gateway)
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/payments/session",
            Some(json!({"order_id": order_id})),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["data"]["code"], "gateway_unavailable");

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{order_id}"),
            None,
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "pending");
    assert_eq!(
        body["data"]["next_actions"],
        json!(["initiate_payment", "cancel"])
    );
}

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let app = TestApp::new().await;
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let response = app.request(Method::GET, "/api/orders", None, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(order_body(bench.id, 1)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_are_scoped_to_their_owner() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice@example.com", "user").await;
    let mallory = app.seed_user("mallory@example.com", "user").await;
    let alice_token = app.token_for(&alice);
    let mallory_token = app.token_for(&mallory);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &alice_token, bench.id, 1).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{order_id}"),
            None,
            Some(&mallory_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{order_id}/cancel"),
            None,
            Some(&mallory_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(Method::GET, "/api/orders", None, Some(&mallory_token))
        .await;
    let body = read_json(response).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn the_admin_surface_is_forbidden_for_customers() {
    let app = TestApp::new().await;
    let customer = app.seed_user("plain@example.com", "user").await;
    let admin = app.seed_user("boss@example.com", "admin").await;

    let response = app
        .request(
            Method::GET,
            "/api/admin/orders",
            None,
            Some(&app.token_for(&customer)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["data"]["code"], "forbidden");

    let response = app
        .request(
            Method::GET,
            "/api/admin/orders",
            None,
            Some(&app.token_for(&admin)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn next_actions_follow_the_state_machine() {
    let app = TestApp::new().await;
    let customer = app.seed_user("actions@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let checkout = create_order_http(&app, &token, bench.id, 1).await;
    let order_id = checkout["data"]["order"]["id"].as_str().unwrap().to_string();
    assert_eq!(
        checkout["data"]["next_actions"],
        json!(["initiate_payment", "cancel"])
    );

    app.mock_session_once("gw_http_actions").await;
    let response = app
        .request(
            Method::POST,
            "/api/payments/session",
            Some(json!({"order_id": order_id})),
            Some(&token),
        )
        .await;
    let body = read_json(response).await;
    assert_eq!(
        body["data"]["next_actions"],
        json!(["verify_payment", "retry", "cancel"])
    );

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{order_id}/cancel"),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["order"]["status"], "cancelled");
    assert_eq!(body["data"]["next_actions"], json!([]));
}

#[tokio::test]
async fn register_login_and_list_orders() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/auth/register",
            Some(json!({"email": "new@example.com", "password": "squat-heavy"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["email"], "new@example.com");
    assert_eq!(body["data"]["role"], "user");

    let response = app
        .request(
            Method::POST,
            "/api/auth/login",
            Some(json!({"email": "new@example.com", "password": "squat-heavy"})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let token = body["data"]["token"].as_str().unwrap();
    assert!(token.starts_with("Bearer "));
    let token = token.trim_start_matches("Bearer ");

    let response = app
        .request(Method::GET, "/api/orders", None, Some(token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn order_list_filters_by_status() {
    let app = TestApp::new().await;
    let customer = app.seed_user("filter@example.com", "user").await;
    let token = app.token_for(&customer);
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let kept = create_order_http(&app, &token, bench.id, 1).await;
    let dropped = create_order_http(&app, &token, bench.id, 2).await;
    let dropped_id = dropped["data"]["order"]["id"].as_str().unwrap().to_string();

    app.request(
        Method::POST,
        &format!("/api/orders/{dropped_id}/cancel"),
        None,
        Some(&token),
    )
    .await;

    let response = app
        .request(
            Method::GET,
            "/api/orders?status=cancelled",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"].as_str().unwrap(), dropped_id);
    assert_ne!(
        items[0]["id"],
        kept["data"]["order"]["id"],
        "pending order leaked into the cancelled filter"
    );

    let response = app
        .request(Method::GET, "/api/orders?status=bogus", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
