use rust_decimal_macros::dec;

mod common;
use common::{TestApp, shipping_address, sign_callback};

use fitgear_api::{
    dto::{
        cart::AddToCartRequest,
        orders::{CreateOrderRequest, OrderItemRequest},
        payments::CompletePaymentRequest,
    },
    error::AppError,
    models::{OrderStatus, PaymentMethod},
    routes::admin::{InventoryAdjustRequest, LowStockQuery},
    routes::params::{OrderListQuery, Pagination},
    services::{admin_service, cart_service, order_service, payment_service},
};

// Full storefront flow: cart -> checkout -> gateway session -> verified
// payment; then the admin side sees the confirmed order and the drained stock.
#[tokio::test]
async fn checkout_pay_and_admin_low_stock_flow() -> anyhow::Result<()> {
    let app = TestApp::new().await;

    let customer = app.seed_user("user@example.com", "user").await;
    let admin = app.seed_user("admin@example.com", "admin").await;

    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;
    let rack = app.seed_product("Power Rack", dec!(1000.00), 5).await;

    cart_service::add_to_cart(
        &app.state,
        &customer,
        AddToCartRequest {
            product_id: bench.id,
            quantity: 2,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &app.state,
        &customer,
        AddToCartRequest {
            product_id: rack.id,
            quantity: 1,
        },
    )
    .await?;

    let checkout = order_service::create_order(
        &app.state,
        &customer,
        CreateOrderRequest {
            items: vec![
                OrderItemRequest {
                    product_id: bench.id,
                    quantity: 2,
                },
                OrderItemRequest {
                    product_id: rack.id,
                    quantity: 1,
                },
            ],
            shipping_address: shipping_address(),
            payment_method: PaymentMethod::Gateway,
        },
    )
    .await?;
    let checkout = checkout.data.unwrap();
    assert_eq!(checkout.order.total, dec!(2000));
    assert_eq!(checkout.order.status, OrderStatus::Pending);
    assert!(!checkout.is_existing);
    assert_eq!(checkout.items.len(), 2);

    // Checkout consumed the server-side cart.
    let cart = cart_service::list_cart(
        &app.state,
        &customer,
        Pagination {
            page: None,
            per_page: None,
        },
    )
    .await?;
    assert!(cart.data.unwrap().items.is_empty());

    app.mock_session_once("gw_ord_flow_1").await;
    let initiation =
        payment_service::initiate_payment(&app.state, &customer, checkout.order.id).await?;
    let initiation = initiation.data.unwrap();
    assert_eq!(initiation.order.status, OrderStatus::PaymentInitiated);

    let session = initiation.session.expect("gateway session");
    assert_eq!(session.gateway_order_id, "gw_ord_flow_1");
    assert_eq!(session.amount_minor, 200_000);
    assert_eq!(session.key_id, common::GATEWAY_KEY_ID);

    let result = payment_service::complete_payment(
        &app.state,
        &customer,
        CompletePaymentRequest {
            order_id: checkout.order.id,
            gateway_order_id: "gw_ord_flow_1".to_string(),
            gateway_payment_id: "gw_pay_77".to_string(),
            signature: sign_callback("gw_ord_flow_1", "gw_pay_77"),
        },
    )
    .await?;
    let result = result.data.unwrap();
    assert!(result.verified);
    assert_eq!(result.order.status, OrderStatus::Confirmed);
    assert_eq!(result.order.gateway_payment_id.as_deref(), Some("gw_pay_77"));
    assert!(result.order.paid_at.is_some());

    // Stock drained by the purchase: 10 -> 8 and 5 -> 4.
    assert_eq!(app.product_stock(bench.id).await, 8);
    assert_eq!(app.product_stock(rack.id).await, 4);

    let all = admin_service::list_all_orders(
        &app.state,
        &admin,
        OrderListQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            status: Some("confirmed".to_string()),
            sort_order: None,
        },
    )
    .await?;
    assert!(
        all.data.unwrap().items.iter().any(|o| o.id == checkout.order.id),
        "expected the confirmed order in the admin listing"
    );

    // The rack fell to 4 units, at the restock threshold; the bench did not.
    let low = admin_service::list_low_stock(
        &app.state,
        &admin,
        LowStockQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            threshold: Some(4),
        },
    )
    .await?;
    let low = low.data.unwrap();
    assert!(low.items.iter().any(|p| p.id == rack.id));
    assert!(low.items.iter().all(|p| p.id != bench.id));

    Ok(())
}

#[tokio::test]
async fn inventory_adjustment_rejects_overflowing_delta() -> anyhow::Result<()> {
    let app = TestApp::new().await;
    let admin = app.seed_user("admin@example.com", "admin").await;
    let bench = app.seed_product("Flat Bench", dec!(500.00), 10).await;

    let err = admin_service::adjust_inventory(
        &app.state,
        &admin,
        bench.id,
        InventoryAdjustRequest { delta: i32::MAX },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(app.product_stock(bench.id).await, 10);

    let err = admin_service::adjust_inventory(
        &app.state,
        &admin,
        bench.id,
        InventoryAdjustRequest { delta: -11 },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(app.product_stock(bench.id).await, 10);

    Ok(())
}
