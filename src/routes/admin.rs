//! Admin moderation, account access, category management and the audit log.
//!
//! Every handler here takes [`AdminAuth`], so non-admin callers are turned
//! away with 403 before any input is read. Status writes go through the
//! enum parsers first: an out-of-set value is a 400 and the store is never
//! touched.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{required, AppState, PageQuery};
use crate::auth::{AdminAuth, Role};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::{CommentAction, CommentStatus, LogLevel, PostStatus, ProductStatus};

const DEFAULT_LOG_LIMIT: i64 = 50;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatusFilter {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// `{id, status}` body shared by the moderation endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub id: Option<Id>,
    pub status: Option<String>,
}

impl SetStatusRequest {
    fn parts(&self) -> Result<(Id, &str), ApiError> {
        match (self.id, self.status.as_deref()) {
            (Some(id), Some(status)) if !status.is_empty() => Ok((id, status)),
            _ => Err(ApiError::BadRequest("id and status are required".into())),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminProductPage {
    pub products: Vec<ProductView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub stats: ProductStats,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserFilter {
    /// USER or ADMIN.
    pub role: Option<Role>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserPage {
    pub users: Vec<UserSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAccessRequest {
    pub id: Option<Id>,
    pub role: Option<Role>,
    pub is_seller: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostCategoryRequest {
    /// Required on update only.
    pub id: Option<Id>,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct IdQuery {
    pub id: Option<Id>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LogFilter {
    pub level: Option<String>,
    pub module: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogPage {
    pub logs: Vec<SystemLogView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn duplicate_name(e: RepoError) -> ApiError {
    match e {
        RepoError::Conflict => ApiError::BadRequest("category name already exists".into()),
        other => other.into(),
    }
}

fn not_found(what: &'static str) -> impl Fn(RepoError) -> ApiError {
    move |e| match e {
        RepoError::NotFound => ApiError::NotFound(format!("{what} not found")),
        other => other.into(),
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/posts",
    params(StatusFilter),
    responses(
        (status = 200, description = "Posts in the status, PENDING by default", body = [PostView]),
        (status = 400),
        (status = 403)
    ),
    tag = "admin"
)]
pub async fn list_posts(
    _admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<StatusFilter>,
) -> Result<HttpResponse, ApiError> {
    let status = query.status.as_deref().map(str::parse::<PostStatus>).transpose()?.unwrap_or(PostStatus::Pending);
    let posts = data.repo.list_posts(PostQuery { status: Some(status), ..Default::default() }).await?;
    Ok(HttpResponse::Ok().json(posts.items))
}

#[utoipa::path(
    put,
    path = "/api/admin/posts",
    request_body = SetStatusRequest,
    responses(
        (status = 200, body = Post),
        (status = 400, description = "Unknown status"),
        (status = 403),
        (status = 404)
    ),
    tag = "admin"
)]
pub async fn set_post_status(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<SetStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let (id, raw) = payload.parts()?;
    let status: PostStatus = raw.parse()?;
    let post = data.repo.set_post_status(id, status).await.map_err(not_found("post"))?;
    log::info!("post {id} moderated to {status}");
    data.audit(NewLog::info("moderation", admin.user_id(), format!("post {id} -> {status}"))).await;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/api/admin/comments",
    params(StatusFilter),
    responses((status = 200, body = [CommentView]), (status = 400), (status = 403)),
    tag = "admin"
)]
pub async fn list_comments(
    _admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<StatusFilter>,
) -> Result<HttpResponse, ApiError> {
    let status =
        query.status.as_deref().map(str::parse::<CommentStatus>).transpose()?.unwrap_or(CommentStatus::Pending);
    let comments = data.repo.list_comments(CommentQuery { status: Some(status), author_id: None }).await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// `DELETED` removes the comment together with every reply beneath it.
#[utoipa::path(
    put,
    path = "/api/admin/comments",
    request_body = SetStatusRequest,
    responses((status = 200), (status = 400, description = "Unknown status"), (status = 403), (status = 404)),
    tag = "admin"
)]
pub async fn set_comment_status(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<SetStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let (id, raw) = payload.parts()?;
    match raw.parse::<CommentAction>()? {
        CommentAction::Delete => {
            let removed = data.repo.delete_comment_tree(id, None).await.map_err(not_found("comment"))?;
            data.audit(NewLog::info("moderation", admin.user_id(), format!("comment {id} deleted with {removed} rows")))
                .await;
            Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "comment deleted", "deleted": removed })))
        }
        CommentAction::Set(status) => {
            let comment = data.repo.set_comment_status(id, status).await.map_err(not_found("comment"))?;
            data.audit(NewLog::info("moderation", admin.user_id(), format!("comment {id} -> {status}"))).await;
            Ok(HttpResponse::Ok().json(comment))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/products",
    params(StatusFilter),
    responses((status = 200, body = AdminProductPage), (status = 400), (status = 403)),
    tag = "admin"
)]
pub async fn list_products(
    _admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<StatusFilter>,
) -> Result<HttpResponse, ApiError> {
    let status = query.status.as_deref().map(str::parse::<ProductStatus>).transpose()?;
    let page = Pagination::new(query.page, query.limit, 10);
    let result = data.repo.list_products(ProductQuery { status, page: Some(page), ..Default::default() }).await?;
    let stats = data.repo.product_stats().await?;
    Ok(HttpResponse::Ok().json(AdminProductPage {
        products: result.items,
        total: result.total,
        page: page.page,
        limit: page.limit,
        stats,
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/products",
    request_body = SetStatusRequest,
    responses((status = 200, body = Product), (status = 400), (status = 403), (status = 404)),
    tag = "admin"
)]
pub async fn set_product_status(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<SetStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let (id, raw) = payload.parts()?;
    let status: ProductStatus = raw.parse()?;
    let product = data.repo.set_product_status(id, status).await.map_err(not_found("product"))?;
    data.audit(NewLog::info("moderation", admin.user_id(), format!("product {id} -> {status}"))).await;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, body = Category),
        (status = 400, description = "Missing name, duplicate or unknown parent"),
        (status = 403)
    ),
    tag = "admin"
)]
pub async fn create_category(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<CreateCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let name = required("name", body.name.as_deref())?;
    let category = data
        .repo
        .create_category(NewCategory { name, parent_id: body.parent_id })
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::BadRequest("parent category not found".into()),
            RepoError::Conflict => ApiError::BadRequest("category name already exists".into()),
            other => other.into(),
        })?;
    data.audit(NewLog::info("categories", admin.user_id(), format!("category {} created", category.name))).await;
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserFilter),
    responses((status = 200, body = UserPage), (status = 400), (status = 403)),
    tag = "admin"
)]
pub async fn list_users(
    _admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<UserFilter>,
) -> Result<HttpResponse, ApiError> {
    let page = Pagination::new(query.page, query.limit, 10);
    let users = data.repo.list_users(UserQuery { role: query.role, page }).await?;
    Ok(HttpResponse::Ok().json(UserPage { users: users.items, total: users.total, page: page.page, limit: page.limit }))
}

/// Grants or revokes the admin role and the seller flag.
#[utoipa::path(
    put,
    path = "/api/admin/users",
    request_body = UpdateAccessRequest,
    responses((status = 200, body = User), (status = 400), (status = 403), (status = 404)),
    tag = "admin"
)]
pub async fn update_user_access(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateAccessRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let id = body.id.ok_or_else(|| ApiError::BadRequest("user id is required".into()))?;
    let upd = UserAccessUpdate { role: body.role, is_seller: body.is_seller };
    let user = data.repo.update_access(id, upd).await.map_err(not_found("user"))?;
    log::info!("user {id} access set to {:?}, seller={}", user.role, user.is_seller);
    data.audit(NewLog::info(
        "users",
        admin.user_id(),
        format!("user {id} access: role {:?}, seller {}", user.role, user.is_seller),
    ))
    .await;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/admin/post-categories",
    request_body = PostCategoryRequest,
    responses(
        (status = 201, body = PostCategory),
        (status = 400, description = "Missing or duplicate name"),
        (status = 403)
    ),
    tag = "admin"
)]
pub async fn create_post_category(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<PostCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let name = required("name", body.name.as_deref())?;
    let description = body.description.filter(|d| !d.trim().is_empty());
    let category = data
        .repo
        .create_post_category(NewPostCategory { name, description })
        .await
        .map_err(duplicate_name)?;
    data.audit(NewLog::info("categories", admin.user_id(), format!("post category {} created", category.name))).await;
    Ok(HttpResponse::Created().json(category))
}

#[utoipa::path(
    put,
    path = "/api/admin/post-categories",
    request_body = PostCategoryRequest,
    responses((status = 200, body = PostCategory), (status = 400), (status = 403), (status = 404)),
    tag = "admin"
)]
pub async fn update_post_category(
    admin: AdminAuth,
    data: web::Data<AppState>,
    payload: web::Json<PostCategoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let id = body.id.ok_or_else(|| ApiError::BadRequest("category id is required".into()))?;
    let upd = UpdatePostCategory {
        name: body.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        description: body.description,
    };
    let category = data.repo.update_post_category(id, upd).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("post category not found".into()),
        other => duplicate_name(other),
    })?;
    data.audit(NewLog::info("categories", admin.user_id(), format!("post category {id} updated"))).await;
    Ok(HttpResponse::Ok().json(category))
}

/// Refused with 400 while posts are filed under the category.
#[utoipa::path(
    delete,
    path = "/api/admin/post-categories",
    params(IdQuery),
    responses(
        (status = 200),
        (status = 400, description = "Missing id or category in use"),
        (status = 403),
        (status = 404)
    ),
    tag = "admin"
)]
pub async fn delete_post_category(
    admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<IdQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query.id.ok_or_else(|| ApiError::BadRequest("category id is required".into()))?;
    data.repo.delete_post_category(id).await.map_err(not_found("post category"))?;
    data.audit(NewLog::info("categories", admin.user_id(), format!("post category {id} deleted"))).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "post category deleted" })))
}

#[utoipa::path(
    get,
    path = "/api/admin/logs",
    params(LogFilter),
    responses((status = 200, body = LogPage), (status = 400), (status = 403)),
    tag = "admin"
)]
pub async fn list_logs(
    _admin: AdminAuth,
    data: web::Data<AppState>,
    query: web::Query<LogFilter>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let page = PageQuery { page: q.page, limit: q.limit }.pagination(DEFAULT_LOG_LIMIT);
    let level = q.level.as_deref().map(str::parse::<LogLevel>).transpose()?;
    let logs = data
        .repo
        .list_logs(LogQuery { level, module: q.module.filter(|m| !m.is_empty()), page })
        .await?;
    Ok(HttpResponse::Ok().json(LogPage { logs: logs.items, total: logs.total, page: page.page, limit: page.limit }))
}
