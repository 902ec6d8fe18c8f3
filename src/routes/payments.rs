use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::payments::{CompletePaymentRequest, CreateSessionRequest, PaymentInitiation, PaymentResult},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/verify", post(verify_payment))
}

#[utoipa::path(
    post,
    path = "/api/payments/session",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Open or resume a payment session for an order", body = ApiResponse<PaymentInitiation>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Order cannot start a payment"),
        (status = 502, description = "Gateway rejected the session"),
        (status = 503, description = "Gateway unreachable"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateSessionRequest>,
) -> AppResult<Json<ApiResponse<PaymentInitiation>>> {
    let resp = payment_service::initiate_payment(&state, &user, payload.order_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/verify",
    request_body = CompletePaymentRequest,
    responses(
        (status = 200, description = "Verify the gateway callback; `verified` is false when the signature does not hold", body = ApiResponse<PaymentResult>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Order is not awaiting payment"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CompletePaymentRequest>,
) -> AppResult<Json<ApiResponse<PaymentResult>>> {
    let resp = payment_service::complete_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}
