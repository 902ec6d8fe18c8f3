use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginResponse, UserResponse},
        cart::{CartItemDto, CartList},
        orders::{CheckoutResponse, OrderDetail, OrderItemRequest, OrderList},
        payments::{PaymentInitiation, PaymentResult},
        products,
    },
    gateway::GatewaySession,
    models::{
        CartItem, Order, OrderAction, OrderItem, OrderStatus, PaymentMethod, Product,
        ShippingAddress, User,
    },
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, payments, products as product_routes},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        cart::cart_list,
        cart::add_to_cart,
        cart::remove_from_cart,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::retry_payment,
        orders::cancel_order,
        payments::create_session,
        payments::verify_payment,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::cancel_order_admin,
        admin::sweep_expired,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            User,
            UserResponse,
            Product,
            CartItem,
            Order,
            OrderItem,
            OrderStatus,
            PaymentMethod,
            OrderAction,
            ShippingAddress,
            GatewaySession,
            OrderItemRequest,
            CheckoutResponse,
            OrderDetail,
            OrderList,
            PaymentInitiation,
            PaymentResult,
            CartItemDto,
            CartList,
            LoginResponse,
            admin::InventoryAdjustRequest,
            admin::LowStockQuery,
            admin::SweepReport,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            products::ProductList,
            Meta,
            ApiResponse<Product>,
            ApiResponse<products::ProductList>,
            ApiResponse<OrderDetail>,
            ApiResponse<OrderList>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<PaymentInitiation>,
            ApiResponse<PaymentResult>,
            ApiResponse<CartList>,
            ApiResponse<admin::SweepReport>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Payments", description = "Payment session and verification endpoints"),
        (name = "Admin", description = "Admin endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
