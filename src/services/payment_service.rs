use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::OrderDetail,
    dto::payments::{CompletePaymentRequest, PaymentInitiation, PaymentResult},
    entity::orders::{Column as OrderCol, Entity as Orders, Model as OrderModel},
    error::{AppError, AppResult},
    gateway::GatewaySession,
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentMethod},
    response::{ApiResponse, Meta},
    services::order_service::{load_items, order_from_entity, restore_stock, transition},
    state::AppState,
};

/// Start (or resume) payment collection for an order. A gateway outage
/// leaves the order exactly as it was.
pub async fn initiate_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<PaymentInitiation>> {
    let order = find_owned(state, user, order_id).await?;

    match (order.status, order.payment_method) {
        (OrderStatus::Pending, PaymentMethod::Gateway) => {
            let session = state
                .gateway
                .create_session(&order.order_number, order.total, &order.currency)
                .await?;

            let cas = transition(
                &state.orm,
                order.id,
                OrderStatus::Pending,
                OrderStatus::PaymentInitiated,
                |update| {
                    update.col_expr(
                        OrderCol::GatewayOrderId,
                        Expr::value(Some(session.gateway_order_id.clone())),
                    )
                },
            )
            .await;

            match cas {
                Ok(updated) => {
                    audit(state, user, "payment_initiate", &updated).await;
                    Ok(initiation_response("Payment initiated", updated, Some(session)))
                }
                Err(AppError::InvalidTransition {
                    current: OrderStatus::PaymentInitiated,
                    ..
                }) => {
                    // a concurrent request initiated first; reuse its session
                    tracing::debug!(
                        gateway_order_id = %session.gateway_order_id,
                        "abandoning session, concurrent initiation won"
                    );
                    let order = find_owned(state, user, order_id).await?;
                    let resumed = resume_session(state, &order)?;
                    Ok(initiation_response(
                        "Payment already initiated",
                        order,
                        Some(resumed),
                    ))
                }
                Err(err) => Err(err),
            }
        }
        (OrderStatus::Pending, PaymentMethod::Cod) => {
            let updated = transition(
                &state.orm,
                order.id,
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                |update| update,
            )
            .await?;
            audit(state, user, "order_confirm_cod", &updated).await;
            Ok(initiation_response("Order confirmed", updated, None))
        }
        (OrderStatus::PaymentInitiated, PaymentMethod::Gateway) => {
            let session = resume_session(state, &order)?;
            Ok(initiation_response(
                "Payment already initiated",
                order,
                Some(session),
            ))
        }
        (OrderStatus::PaymentInitiated, PaymentMethod::Cod)
        | (OrderStatus::Failed, _) => Err(AppError::InvalidTransition {
            current: order.status,
            requested: "initiate_payment".to_string(),
        }),
        (OrderStatus::Confirmed, _) | (OrderStatus::Cancelled, _) | (OrderStatus::Expired, _) => {
            Err(AppError::TerminalOrder(order.status))
        }
    }
}

/// Settle the gateway callback. The signature is recomputed from the stored
/// order; a bad one fails the order rather than raising an error.
pub async fn complete_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CompletePaymentRequest,
) -> AppResult<ApiResponse<PaymentResult>> {
    let order = find_owned(state, user, payload.order_id).await?;

    if order.status != OrderStatus::PaymentInitiated {
        return Err(AppError::InvalidTransition {
            current: order.status,
            requested: "complete_payment".to_string(),
        });
    }

    let stored_gateway_order_id = order
        .gateway_order_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("order {} initiated without a gateway order id", order.id))?;

    let verified = payload.gateway_order_id == stored_gateway_order_id
        && state.gateway.verify_signature(
            &stored_gateway_order_id,
            &payload.gateway_payment_id,
            &payload.signature,
        );

    if verified {
        let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
        let updated = transition(
            &state.orm,
            order.id,
            OrderStatus::PaymentInitiated,
            OrderStatus::Confirmed,
            |update| {
                update
                    .col_expr(
                        OrderCol::GatewayPaymentId,
                        Expr::value(Some(payload.gateway_payment_id.clone())),
                    )
                    .col_expr(
                        OrderCol::GatewaySignature,
                        Expr::value(Some(payload.signature.clone())),
                    )
                    .col_expr(OrderCol::PaidAt, Expr::value(Some(now)))
                    .col_expr(OrderCol::FailureReason, Expr::value(None::<String>))
            },
        )
        .await?;
        audit(state, user, "payment_complete", &updated).await;
        Ok(payment_result("Payment verified", updated, true))
    } else {
        let updated = transition(
            &state.orm,
            order.id,
            OrderStatus::PaymentInitiated,
            OrderStatus::Failed,
            |update| {
                update.col_expr(
                    OrderCol::FailureReason,
                    Expr::value(Some("signature verification failed".to_string())),
                )
            },
        )
        .await?;
        audit(state, user, "payment_failed", &updated).await;
        Ok(payment_result("Payment verification failed", updated, false))
    }
}

/// Re-enter payment with a fresh gateway session; consumed sessions are
/// never reused.
pub async fn retry_payment(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<PaymentInitiation>> {
    let order = find_owned(state, user, order_id).await?;

    if order.status.is_terminal() {
        return Err(AppError::TerminalOrder(order.status));
    }
    if order.payment_method == PaymentMethod::Cod {
        return Err(AppError::InvalidTransition {
            current: order.status,
            requested: "retry".to_string(),
        });
    }

    let session = state
        .gateway
        .create_session(&order.order_number, order.total, &order.currency)
        .await?;

    let updated = transition(
        &state.orm,
        order.id,
        order.status,
        OrderStatus::PaymentInitiated,
        |update| {
            update
                .col_expr(
                    OrderCol::GatewayOrderId,
                    Expr::value(Some(session.gateway_order_id.clone())),
                )
                .col_expr(OrderCol::GatewayPaymentId, Expr::value(None::<String>))
                .col_expr(OrderCol::GatewaySignature, Expr::value(None::<String>))
                .col_expr(OrderCol::FailureReason, Expr::value(None::<String>))
                .col_expr(
                    OrderCol::PaidAt,
                    Expr::value(None::<chrono::DateTime<chrono::FixedOffset>>),
                )
        },
    )
    .await?;

    audit(state, user, "payment_retry", &updated).await;
    Ok(initiation_response(
        "Payment session refreshed",
        updated,
        Some(session),
    ))
}

/// Cancel an order the caller owns; legal from any non-terminal status.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = find_owned(state, user, order_id).await?;
    let cancelled = do_cancel(state, order, user.user_id).await?;

    let items = load_items(&state.orm, cancelled.id).await?;
    let next_actions = cancelled.status.next_actions().to_vec();
    Ok(ApiResponse::success(
        "Order cancelled",
        OrderDetail {
            order: order_from_entity(cancelled),
            items,
            next_actions,
        },
        Some(Meta::empty()),
    ))
}

/// Shared cancel path for user and admin callers.
pub(crate) async fn do_cancel(
    state: &AppState,
    order: OrderModel,
    actor: Uuid,
) -> AppResult<OrderModel> {
    if order.status.is_terminal() {
        return Err(AppError::TerminalOrder(order.status));
    }

    let txn = state.orm.begin().await?;
    let cancelled = match transition(&txn, order.id, order.status, OrderStatus::Cancelled, |u| u)
        .await
    {
        Ok(updated) => {
            restore_stock(&txn, updated.id).await?;
            txn.commit().await?;
            updated
        }
        Err(err) => {
            txn.rollback().await?;
            return Err(err);
        }
    };

    if let Err(err) = log_audit(
        &state.orm,
        Some(actor),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": cancelled.id,
            "order_number": cancelled.order_number,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(cancelled)
}

async fn find_owned(state: &AppState, user: &AuthUser, order_id: Uuid) -> AppResult<OrderModel> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(order_id)),
        )
        .one(&state.orm)
        .await?;
    match order {
        Some(order) => Ok(order),
        None => Err(AppError::NotFound),
    }
}

fn resume_session(state: &AppState, order: &OrderModel) -> AppResult<GatewaySession> {
    let gateway_order_id = order
        .gateway_order_id
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("order {} initiated without a gateway order id", order.id))?;
    state.gateway.resumed_session(
        gateway_order_id,
        &order.order_number,
        order.total,
        &order.currency,
    )
}

fn initiation_response(
    message: &str,
    order: OrderModel,
    session: Option<GatewaySession>,
) -> ApiResponse<PaymentInitiation> {
    let next_actions = order.status.next_actions().to_vec();
    ApiResponse::success(
        message,
        PaymentInitiation {
            order: order_from_entity(order),
            next_actions,
            session,
        },
        Some(Meta::empty()),
    )
}

fn payment_result(message: &str, order: OrderModel, verified: bool) -> ApiResponse<PaymentResult> {
    let next_actions = order.status.next_actions().to_vec();
    ApiResponse::success(
        message,
        PaymentResult {
            order: order_from_entity(order),
            verified,
            next_actions,
        },
        Some(Meta::empty()),
    )
}

async fn audit(state: &AppState, user: &AuthUser, action: &str, order: &OrderModel) {
    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        action,
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "status": order.status,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
}
