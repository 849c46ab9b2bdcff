use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddToCartRequest {
    pub product_id: Option<Id>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CartItemQuery {
    /// Cart row to drop. Without it the whole cart is emptied.
    pub id: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses((status = 200, body = CartSummary), (status = 401)),
    tag = "cart"
)]
pub async fn get_cart(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let lines = data.repo.list_cart(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(CartSummary::new(lines)))
}

/// Existing lines for the same product grow by `quantity` (200); a new line is 201.
#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Quantity added to an existing line", body = CartItem),
        (status = 201, body = CartItem),
        (status = 400),
        (status = 404, description = "Unknown product")
    ),
    tag = "cart"
)]
pub async fn add_to_cart(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<AddToCartRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let (product_id, quantity) = match (body.product_id, body.quantity) {
        (Some(p), Some(q)) => (p, q),
        _ => return Err(ApiError::BadRequest("product_id and quantity are required".into())),
    };
    if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
        return Err(ApiError::BadRequest(format!("quantity must be between 1 and {MAX_ITEM_QUANTITY}")));
    }
    let added = data.repo.add_to_cart(auth.user_id(), product_id, quantity).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("product not found".into()),
        other => other.into(),
    })?;
    if added.created {
        Ok(HttpResponse::Created().json(added.item))
    } else {
        Ok(HttpResponse::Ok().json(added.item))
    }
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    params(CartItemQuery),
    responses((status = 200), (status = 401), (status = 404)),
    tag = "cart"
)]
pub async fn remove_from_cart(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<CartItemQuery>,
) -> Result<HttpResponse, ApiError> {
    match query.id {
        Some(id) => {
            data.repo.remove_cart_item(auth.user_id(), id).await.map_err(|e| match e {
                RepoError::NotFound => ApiError::NotFound("cart item not found".into()),
                other => other.into(),
            })?;
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "cart item removed" })))
        }
        None => {
            let removed = data.repo.clear_cart(auth.user_id()).await?;
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "cart cleared", "deleted": removed })))
        }
    }
}
