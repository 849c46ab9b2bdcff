use actix_web::{web, HttpResponse};
use rand::Rng;
use serde::Deserialize;
use utoipa::ToSchema;

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::status::OrderStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<NewOrderItem>,
    pub shipping_name: Option<String>,
    pub shipping_phone: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub status: Option<String>,
}

/// `ORD` + epoch millis + four random digits.
pub fn generate_order_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD{}{suffix:04}", chrono::Utc::now().timestamp_millis())
}

#[utoipa::path(get, path = "/api/orders", responses((status = 200, body = [OrderDetail])), tag = "orders")]
pub async fn list_orders(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let orders = data.repo.list_orders(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, body = OrderDetail),
        (status = 400, description = "Empty order or product out of stock")
    ),
    tag = "orders"
)]
pub async fn create_order(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    if body.items.is_empty() {
        return Err(ApiError::BadRequest("order items cannot be empty".into()));
    }
    if body.items.iter().any(|i| !(1..=MAX_ITEM_QUANTITY).contains(&i.quantity)) {
        return Err(ApiError::BadRequest(format!("quantity must be between 1 and {MAX_ITEM_QUANTITY}")));
    }
    let new = NewOrder {
        user_id: auth.user_id(),
        order_number: generate_order_number(),
        items: body.items,
        shipping_name: body.shipping_name,
        shipping_phone: body.shipping_phone,
        shipping_address: body.shipping_address,
    };
    let order = data.repo.create_order(new).await?;
    log::info!("order {} created by user {}", order.order.order_number, auth.user_id());
    Ok(HttpResponse::Created().json(order))
}

/// Visible to the buyer, to any seller with an item in it, and to admins.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Id, Path, description = "Order id")),
    responses((status = 200, body = OrderDetail), (status = 403), (status = 404)),
    tag = "orders"
)]
pub async fn get_order(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let order = data.repo.get_order(path.into_inner()).await?;
    let uid = auth.user_id();
    if !auth.is_admin() && order.order.user_id != uid && !order.items.iter().any(|i| i.seller_id == uid) {
        return Err(ApiError::Forbidden("not allowed to view this order".into()));
    }
    Ok(HttpResponse::Ok().json(order))
}

/// Buyers cancel or confirm receipt, sellers ship, admins may set any status.
#[utoipa::path(
    put,
    path = "/api/orders/{id}",
    params(("id" = Id, Path, description = "Order id")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, body = Order),
        (status = 400, description = "Unknown status or transition not allowed"),
        (status = 403),
        (status = 404)
    ),
    tag = "orders"
)]
pub async fn update_order(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let raw = payload.into_inner().status.ok_or_else(|| ApiError::BadRequest("status is required".into()))?;
    let next: OrderStatus = raw.parse()?;
    let order = data.repo.get_order(id).await?;
    let uid = auth.user_id();
    let is_owner = order.order.user_id == uid;
    let is_seller = order.items.iter().any(|i| i.seller_id == uid);

    let allowed = match next {
        OrderStatus::Cancelled | OrderStatus::Completed => is_owner || auth.is_admin(),
        OrderStatus::Shipped => is_seller || auth.is_admin(),
        _ => auth.is_admin(),
    };
    if !allowed {
        return Err(ApiError::Forbidden("not allowed to update this order".into()));
    }
    let updated = data.repo.update_order_status(id, next, !auth.is_admin()).await?;
    data.audit(NewLog::info("orders", uid, format!("order {} -> {}", updated.order_number, next))).await;
    Ok(HttpResponse::Ok().json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_number_shape() {
        let n = generate_order_number();
        assert!(n.starts_with("ORD"));
        assert!(n[3..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(n.len(), 3 + 13 + 4);
    }
}
