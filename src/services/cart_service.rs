use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartItemDto, CartList},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn list_cart(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();

    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_desc(CartCol::CreatedAt)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let total = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .count(&state.orm)
        .await? as i64;

    let mut subtotal = Decimal::ZERO;
    let mut items = Vec::with_capacity(rows.len());
    for (cart, product) in rows {
        let product = match product {
            Some(p) => p,
            None => continue,
        };
        let line_total = product.price * Decimal::from(cart.quantity);
        subtotal += line_total;
        items.push(CartItemDto {
            id: cart.id,
            product: product_from_entity(product),
            quantity: cart.quantity,
            line_total,
        });
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        CartList { items, subtotal },
        Some(meta),
    ))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?;
    let product = match product {
        Some(p) => p,
        None => return Err(AppError::BadRequest("product not found".to_string())),
    };
    if !product.active {
        return Err(AppError::ProductUnavailable(product.name));
    }

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(payload.product_id)),
        )
        .one(&state.orm)
        .await?;

    let cart_item = if let Some(item) = existing {
        let mut active: CartActive = item.into();
        active.quantity = Set(payload.quantity);
        active.update(&state.orm).await?
    } else {
        CartActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            product_id: Set(payload.product_id),
            quantity: Set(payload.quantity),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?
    };

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(
            serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity }),
        ),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Ok",
        CartItem {
            id: cart_item.id,
            product_id: cart_item.product_id,
            user_id: cart_item.user_id,
            quantity: cart_item.quantity,
            created_at: cart_item.created_at.with_timezone(&Utc),
        },
        None,
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
