use chrono::{Duration, Utc};
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, UpdateMany,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutResponse, CreateOrderRequest, OrderDetail, OrderItemRequest, OrderList},
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus, ShippingAddress},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Statuses a checkout may resume instead of duplicating.
const ACTIVE_STATUSES: [OrderStatus; 3] = [
    OrderStatus::Pending,
    OrderStatus::PaymentInitiated,
    OrderStatus::Failed,
];

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status: OrderStatus = status.parse().map_err(AppError::BadRequest)?;
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    validate_items(&payload.items)?;
    validate_address(&payload.shipping_address)?;
    let fingerprint = cart_fingerprint(&payload.items);

    let txn = state.orm.begin().await?;

    // same cart still in flight: return the existing order
    let existing = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::CartFingerprint.eq(fingerprint.clone()))
                .add(OrderCol::Status.is_in(ACTIVE_STATUSES)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    if let Some(order) = existing {
        let items = load_items(&txn, order.id).await?;
        txn.commit().await?;
        return Ok(existing_order_response(order, items));
    }

    let product_ids: Vec<Uuid> = payload.items.iter().map(|i| i.product_id).collect();
    let products = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?;

    let mut total = rust_decimal::Decimal::ZERO;
    let mut priced: Vec<(&OrderItemRequest, rust_decimal::Decimal)> = Vec::new();
    for item in &payload.items {
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!("product {} does not exist", item.product_id))
            })?;
        if !product.active {
            return Err(AppError::ProductUnavailable(product.name.clone()));
        }
        if product.stock < item.quantity {
            return Err(AppError::OutOfStock(product.name.clone()));
        }
        total += product.price * rust_decimal::Decimal::from(item.quantity);
        priced.push((item, product.price));
    }

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let order = OrderActive {
        id: Set(order_id),
        order_number: Set(build_order_number(order_id)),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending),
        payment_method: Set(payload.payment_method),
        total: Set(total),
        currency: Set(state.config.store_currency.clone()),
        shipping_address: Set(payload.shipping_address),
        cart_fingerprint: Set(fingerprint.clone()),
        gateway_order_id: Set(None),
        gateway_payment_id: Set(None),
        gateway_signature: Set(None),
        failure_reason: Set(None),
        paid_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    let order = match order.insert(&txn).await {
        Ok(order) => order,
        Err(err) => {
            // unique-index race: a concurrent checkout won
            txn.rollback().await?;
            let winner = Orders::find()
                .filter(
                    Condition::all()
                        .add(OrderCol::UserId.eq(user.user_id))
                        .add(OrderCol::CartFingerprint.eq(fingerprint))
                        .add(OrderCol::Status.is_in(ACTIVE_STATUSES)),
                )
                .one(&state.orm)
                .await?;
            return match winner {
                Some(order) => {
                    let items = load_items(&state.orm, order.id).await?;
                    Ok(existing_order_response(order, items))
                }
                None => Err(err.into()),
            };
        }
    };

    let mut order_items: Vec<OrderItem> = Vec::new();
    for (item, unit_price) in priced {
        let row = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
            unit_price: Set(unit_price),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(row));

        let res = Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::col(ProdCol::Stock).sub(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .filter(ProdCol::Stock.gte(item.quantity))
            .exec(&txn)
            .await?;
        if res.rows_affected == 0 {
            return Err(AppError::OutOfStock(item.product_id.to_string()));
        }
    }

    // clear cart
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "order_number": order.order_number,
            "total": order.total,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let next_actions = order.status.next_actions().to_vec();
    Ok(ApiResponse::success(
        "Order created",
        CheckoutResponse {
            order: order_from_entity(order),
            items: order_items,
            next_actions,
            is_existing: false,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = load_items(&state.orm, order.id).await?;

    let next_actions = order.status.next_actions().to_vec();
    Ok(ApiResponse::success(
        "Ok",
        OrderDetail {
            order: order_from_entity(order),
            items,
            next_actions,
        },
        Some(Meta::empty()),
    ))
}

/// Compare-and-set on the order status; every transition goes through here.
pub(crate) async fn transition<C, F>(
    conn: &C,
    order_id: Uuid,
    from: OrderStatus,
    to: OrderStatus,
    patch: F,
) -> AppResult<OrderModel>
where
    C: ConnectionTrait,
    F: FnOnce(UpdateMany<Orders>) -> UpdateMany<Orders>,
{
    if !from.can_transition_to(to) {
        if from.is_terminal() {
            return Err(AppError::TerminalOrder(from));
        }
        return Err(AppError::InvalidTransition {
            current: from,
            requested: to.as_str().to_string(),
        });
    }

    let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
    let update = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(to))
        .col_expr(OrderCol::UpdatedAt, Expr::value(now))
        .filter(OrderCol::Id.eq(order_id))
        .filter(OrderCol::Status.eq(from));
    let res = patch(update).exec(conn).await?;

    if res.rows_affected == 0 {
        // guard miss: another writer moved the order first
        let current = Orders::find_by_id(order_id).one(conn).await?;
        return match current {
            None => Err(AppError::NotFound),
            Some(order) => Err(AppError::InvalidTransition {
                current: order.status,
                requested: to.as_str().to_string(),
            }),
        };
    }

    Orders::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

/// Expire orders stuck in `pending`/`payment_initiated` past the retention
/// window and return their reserved stock.
pub async fn mark_expired(conn: &DatabaseConnection, older_than: Duration) -> AppResult<u64> {
    let cutoff: chrono::DateTime<chrono::FixedOffset> = (Utc::now() - older_than).into();
    let stale = Orders::find()
        .filter(
            OrderCol::Status.is_in([OrderStatus::Pending, OrderStatus::PaymentInitiated]),
        )
        .filter(OrderCol::UpdatedAt.lt(cutoff))
        .all(conn)
        .await?;

    let mut swept = 0u64;
    for order in stale {
        let txn = conn.begin().await?;
        match transition(&txn, order.id, order.status, OrderStatus::Expired, |u| u).await {
            Ok(_) => {
                restore_stock(&txn, order.id).await?;
                txn.commit().await?;
                swept += 1;
            }
            // a user request advanced the order first
            Err(AppError::InvalidTransition { .. }) => {
                txn.rollback().await?;
            }
            Err(err) => {
                txn.rollback().await?;
                return Err(err);
            }
        }
    }

    if swept > 0 {
        tracing::info!(swept, "expired stale orders");
    }
    Ok(swept)
}

/// Return an order's reserved quantities to stock on cancel or expiry.
pub(crate) async fn restore_stock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;
    for item in items {
        Products::update_many()
            .col_expr(
                ProdCol::Stock,
                Expr::col(ProdCol::Stock).add(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect())
}

fn existing_order_response(order: OrderModel, items: Vec<OrderItem>) -> ApiResponse<CheckoutResponse> {
    let next_actions = order.status.next_actions().to_vec();
    ApiResponse::success(
        "Order already in progress",
        CheckoutResponse {
            order: order_from_entity(order),
            items,
            next_actions,
            is_existing: true,
        },
        Some(Meta::empty()),
    )
}

fn validate_items(items: &[OrderItemRequest]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::BadRequest("order has no items".into()));
    }
    for item in items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest(
                "quantity must be greater than 0".into(),
            ));
        }
    }
    let mut ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    ids.sort();
    ids.dedup();
    if ids.len() != items.len() {
        return Err(AppError::BadRequest(
            "order lists the same product twice".into(),
        ));
    }
    Ok(())
}

fn validate_address(address: &ShippingAddress) -> AppResult<()> {
    let required = [
        &address.name,
        &address.line1,
        &address.city,
        &address.state,
        &address.postal_code,
        &address.country,
    ];
    if required.iter().any(|field| field.trim().is_empty()) {
        return Err(AppError::BadRequest("shipping address is incomplete".into()));
    }
    Ok(())
}

/// Order-insensitive digest of the cart's `(product_id, quantity)` pairs.
pub(crate) fn cart_fingerprint(items: &[OrderItemRequest]) -> String {
    let mut lines: Vec<(Uuid, i32)> = items.iter().map(|i| (i.product_id, i.quantity)).collect();
    lines.sort();
    let mut hasher = Sha256::new();
    for (product_id, quantity) in lines {
        hasher.update(product_id.as_bytes());
        hasher.update(quantity.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

pub(crate) fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        order_number: model.order_number,
        user_id: model.user_id,
        status: model.status,
        payment_method: model.payment_method,
        total: model.total,
        currency: model.currency,
        shipping_address: model.shipping_address,
        gateway_order_id: model.gateway_order_id,
        gateway_payment_id: model.gateway_payment_id,
        gateway_signature: model.gateway_signature,
        failure_reason: model.failure_reason,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_order_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("ORD-{}-{}", date, short)
}
