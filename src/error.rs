use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::OrderStatus;
use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("order is {current}, cannot {requested}")]
    InvalidTransition {
        current: OrderStatus,
        requested: String,
    },

    #[error("order is {0}, which is final")]
    TerminalOrder(OrderStatus),

    #[error("insufficient stock for product {0}")]
    OutOfStock(String),

    #[error("product {0} is no longer available")]
    ProductUnavailable(String),

    #[error("payment gateway is unreachable")]
    GatewayUnavailable,

    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, so clients branch on this instead of
    /// parsing the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Forbidden => "forbidden",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::TerminalOrder(_) => "terminal_order",
            AppError::OutOfStock(_) => "out_of_stock",
            AppError::ProductUnavailable(_) => "product_unavailable",
            AppError::GatewayUnavailable => "gateway_unavailable",
            AppError::GatewayRejected(_) => "gateway_rejected",
            AppError::OrmError(_) => "internal",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::ProductUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. }
            | AppError::TerminalOrder(_)
            | AppError::OutOfStock(_) => StatusCode::CONFLICT,
            AppError::GatewayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                code: self.code(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
