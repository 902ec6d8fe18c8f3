//! Shared test harness: an application instance backed by a throwaway SQLite
//! database and a mock payment gateway, plus seeding and request helpers.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
    response::Response,
    routing::get,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{Value, json};
use sha2::Sha256;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fitgear_api::{
    config::{AppConfig, GatewayConfig},
    db::{create_orm_conn, run_migrations},
    dto::auth::Claims,
    entity::{orders, products, users},
    gateway::PaymentGateway,
    middleware::auth::AuthUser,
    models::ShippingAddress,
    routes::{create_api_router, health},
    state::AppState,
};

pub const GATEWAY_KEY_ID: &str = "key_test_fitgear";
pub const GATEWAY_KEY_SECRET: &str = "gw_secret_under_test";
pub const JWT_SECRET: &str = "jwt-secret-under-test";

/// An app wired to a fresh SQLite file and a wiremock gateway. Every test
/// gets its own database and gateway, so tests run in parallel without
/// touching shared state.
pub struct TestApp {
    pub state: AppState,
    pub gateway: MockServer,
    router: Router,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let gateway = MockServer::start().await;
        let db_dir = TempDir::new().expect("create temp dir");
        let db_path = db_dir.path().join("fitgear_test.db");
        let database_url = format!("sqlite://{}?mode=rwc", db_path.display());

        let config = AppConfig {
            database_url: database_url.clone(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: JWT_SECRET.to_string(),
            gateway: GatewayConfig {
                base_url: gateway.uri(),
                key_id: GATEWAY_KEY_ID.to_string(),
                key_secret: GATEWAY_KEY_SECRET.to_string(),
                timeout_secs: 2,
            },
            store_currency: "USD".to_string(),
            order_retention_hours: 24,
            expiry_sweep_interval_secs: 3600,
        };

        let orm = create_orm_conn(&database_url)
            .await
            .expect("connect test database");
        run_migrations(&orm).await.expect("run migrations");

        let state = AppState {
            orm,
            gateway: PaymentGateway::new(config.gateway.clone()).expect("gateway client"),
            config,
        };

        let router = Router::new()
            .route("/health", get(health::health_check))
            .nest("/api", create_api_router())
            .with_state(state.clone());

        Self {
            state,
            gateway,
            router,
            _db_dir: db_dir,
        }
    }

    /// Mount a session-creation stub that answers any number of times.
    pub async fn mock_session(&self, gateway_order_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": gateway_order_id,
                "status": "created",
            })))
            .mount(&self.gateway)
            .await;
    }

    /// Mount a session-creation stub consumed by exactly one request, so a
    /// sequence of mounts yields a deterministic sequence of session ids.
    pub async fn mock_session_once(&self, gateway_order_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": gateway_order_id,
                "status": "created",
            })))
            .up_to_n_times(1)
            .mount(&self.gateway)
            .await;
    }

    pub async fn seed_user(&self, email: &str, role: &str) -> AuthUser {
        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            password_hash: Set("not-a-real-hash".to_string()),
            role: Set(role.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.state.orm)
        .await
        .expect("seed user");

        AuthUser {
            user_id: user.id,
            role: user.role,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> products::Model {
        products::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some("seeded for tests".to_string())),
            price: Set(price),
            stock: Set(stock),
            active: Set(true),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.state.orm)
        .await
        .expect("seed product")
    }

    /// Bearer token for a seeded user, signed with the test JWT secret.
    pub fn token_for(&self, user: &AuthUser) -> String {
        let claims = Claims {
            sub: user.user_id.to_string(),
            role: user.role.clone(),
            exp: (Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("mint test token")
    }

    pub async fn find_order(&self, order_id: Uuid) -> orders::Model {
        orders::Entity::find_by_id(order_id)
            .one(&self.state.orm)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        products::Entity::find_by_id(product_id)
            .one(&self.state.orm)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    /// Rewind an order's `updated_at`, as if it had sat untouched for
    /// `hours`. Used by the expiry-sweep tests.
    pub async fn backdate_order(&self, order_id: Uuid, hours: i64) {
        let past: chrono::DateTime<chrono::FixedOffset> =
            (Utc::now() - chrono::Duration::hours(hours)).into();
        orders::Entity::update_many()
            .col_expr(orders::Column::UpdatedAt, Expr::value(past))
            .filter(orders::Column::Id.eq(order_id))
            .exec(&self.state.orm)
            .await
            .expect("backdate order");
    }

    /// Send a request through the router. `token` is the raw JWT; the helper
    /// adds the `Bearer` prefix.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("route request")
    }
}

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        name: "Dana Lifter".to_string(),
        line1: "12 Clean Jerk Way".to_string(),
        line2: None,
        city: "Springfield".to_string(),
        state: "OR".to_string(),
        postal_code: "97477".to_string(),
        country: "US".to_string(),
    }
}

/// Signature the gateway would attach to a completed payment.
pub fn sign_callback(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(GATEWAY_KEY_SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{gateway_order_id}|{gateway_payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response body")
}

pub async fn read_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf8 response body")
}
