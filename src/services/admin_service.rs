use chrono::Duration;
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{OrderDetail, OrderList},
    dto::products::ProductList,
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{OrderStatus, Product},
    response::{ApiResponse, Meta},
    routes::admin::{InventoryAdjustRequest, LowStockQuery, SweepReport},
    routes::params::{OrderListQuery, SortOrder},
    services::order_service::{load_items, mark_expired, order_from_entity},
    services::payment_service::do_cancel,
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse().map_err(AppError::BadRequest)?;
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);

    let order_list = OrderList { items: orders };

    Ok(ApiResponse::success("Orders", order_list, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = load_items(&state.orm, order.id).await?;
    let next_actions = order.status.next_actions().to_vec();

    let data = OrderDetail {
        order: order_from_entity(order),
        items,
        next_actions,
    };
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

/// Cancel any customer's order. Same state machine as the owner-facing
/// cancel: terminal orders stay put, reserved stock is returned.
pub async fn cancel_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id).one(&state.orm).await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

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

/// Run the expiry sweep on demand instead of waiting for the interval task.
pub async fn sweep_expired(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<SweepReport>> {
    ensure_admin(user)?;
    let retention = Duration::hours(state.config.order_retention_hours);
    let swept = mark_expired(&state.orm, retention).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_sweep",
        Some("orders"),
        Some(serde_json::json!({ "swept": swept })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Sweep complete",
        SweepReport { swept },
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(5);
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Products::find().filter(ProdCol::Stock.lte(threshold));
    finder = finder
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let data = ProductList { items };
    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", data, Some(meta)))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    let new_stock = match product.stock.checked_add(payload.delta) {
        Some(stock) if stock >= 0 => stock,
        _ => return Err(AppError::BadRequest("resulting stock out of range".into())),
    };

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({ "product_id": updated.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Inventory updated",
        product_from_entity(updated),
        Some(Meta::empty()),
    ))
}
