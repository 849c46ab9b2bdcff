use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::auth::valid_phone;
use super::AppState;
use crate::auth::{require_seller, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::FavoriteKind;

#[derive(Debug, Serialize, ToSchema)]
pub struct ExpenseSummary {
    pub expenses: Vec<Expense>,
    pub total: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncomeSummary {
    pub incomes: Vec<Income>,
    pub total: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CommentIdQuery {
    pub id: Option<Id>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FavoriteListQuery {
    /// POST or PRODUCT.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddFavoriteRequest {
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub target_id: Option<Id>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FavoriteIdQuery {
    pub id: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses((status = 200, body = User), (status = 401), (status = 404)),
    tag = "users"
)]
pub async fn get_profile(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("user not found".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body = UpdateProfile,
    responses((status = 200, body = User), (status = 400), (status = 401)),
    tag = "users"
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    if upd.phone.as_deref().is_some_and(|p| !valid_phone(p)) {
        return Err(ApiError::BadRequest("invalid phone number".into()));
    }
    let user = data.repo.update_profile(auth.user_id(), upd).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(get, path = "/api/users/my-orders", responses((status = 200, body = [OrderDetail])), tag = "users")]
pub async fn my_orders(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let orders = data.repo.list_orders(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

#[utoipa::path(get, path = "/api/users/my-posts", responses((status = 200, body = [PostView])), tag = "users")]
pub async fn my_posts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = PostQuery { author_id: Some(auth.user_id()), ..Default::default() };
    let posts = data.repo.list_posts(q).await?;
    Ok(HttpResponse::Ok().json(posts.items))
}

#[utoipa::path(
    get,
    path = "/api/users/my-products",
    responses((status = 200, body = [ProductView]), (status = 403, description = "Not a seller")),
    tag = "users"
)]
pub async fn my_products(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let seller = require_seller(&auth, data.repo.as_ref()).await?;
    let q = ProductQuery { seller_id: Some(seller.user_id()), ..Default::default() };
    let products = data.repo.list_products(q).await?;
    Ok(HttpResponse::Ok().json(products.items))
}

#[utoipa::path(get, path = "/api/users/my-comments", responses((status = 200, body = [CommentView])), tag = "users")]
pub async fn my_comments(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let q = CommentQuery { author_id: Some(auth.user_id()), ..Default::default() };
    let comments = data.repo.list_comments(q).await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// Removes one of the caller's comments together with its replies.
#[utoipa::path(
    delete,
    path = "/api/users/my-comments",
    params(CommentIdQuery),
    responses((status = 200), (status = 400), (status = 404)),
    tag = "users"
)]
pub async fn delete_my_comment(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<CommentIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query.id.ok_or_else(|| ApiError::BadRequest("comment id is required".into()))?;
    let removed = data.repo.delete_comment_tree(id, Some(auth.user_id())).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "comment deleted", "deleted": removed })))
}

#[utoipa::path(get, path = "/api/users/expenses", responses((status = 200, body = ExpenseSummary)), tag = "users")]
pub async fn expenses(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let expenses = data.repo.list_expenses(auth.user_id()).await?;
    let total = expenses.iter().map(|e| e.amount).sum();
    Ok(HttpResponse::Ok().json(ExpenseSummary { expenses, total }))
}

#[utoipa::path(
    get,
    path = "/api/users/incomes",
    responses((status = 200, body = IncomeSummary), (status = 403, description = "Not a seller")),
    tag = "users"
)]
pub async fn incomes(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let seller = require_seller(&auth, data.repo.as_ref()).await?;
    let incomes = data.repo.list_incomes(seller.user_id()).await?;
    let total = incomes.iter().map(|i| i.amount).sum();
    Ok(HttpResponse::Ok().json(IncomeSummary { incomes, total }))
}

#[utoipa::path(
    get,
    path = "/api/users/favorites",
    params(FavoriteListQuery),
    responses((status = 200, body = [Favorite]), (status = 400, description = "Unknown type"), (status = 401)),
    tag = "users"
)]
pub async fn list_favorites(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<FavoriteListQuery>,
) -> Result<HttpResponse, ApiError> {
    let kind = query.kind.as_deref().filter(|k| !k.is_empty()).map(str::parse::<FavoriteKind>).transpose()?;
    let favorites = data.repo.list_favorites(auth.user_id(), kind).await?;
    Ok(HttpResponse::Ok().json(favorites))
}

#[utoipa::path(
    post,
    path = "/api/users/favorites",
    request_body = AddFavoriteRequest,
    responses((status = 201, body = Favorite), (status = 400, description = "Missing field or already favorited")),
    tag = "users"
)]
pub async fn add_favorite(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<AddFavoriteRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let (kind, target_id) = match (body.kind.as_deref(), body.target_id) {
        (Some(k), Some(t)) if !k.is_empty() => (k.parse::<FavoriteKind>()?, t),
        _ => return Err(ApiError::BadRequest("type and target_id are required".into())),
    };
    let favorite = data.repo.add_favorite(auth.user_id(), kind, target_id).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::BadRequest("already favorited".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Created().json(favorite))
}

#[utoipa::path(
    delete,
    path = "/api/users/favorites",
    params(FavoriteIdQuery),
    responses((status = 200), (status = 400), (status = 404)),
    tag = "users"
)]
pub async fn remove_favorite(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<FavoriteIdQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query.id.ok_or_else(|| ApiError::BadRequest("favorite id is required".into()))?;
    data.repo.remove_favorite(auth.user_id(), id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("favorite not found".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "favorite removed" })))
}
