use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{required, AppState};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::{ContentType, PostStatus};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PostListQuery {
    pub category_id: Option<Id>,
    #[serde(default)]
    pub is_news: bool,
    #[serde(default)]
    pub is_hot: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostPage {
    pub posts: Vec<PostView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<Id>,
    /// TEXT, HTML or MARKDOWN; anything else is stored as TEXT.
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LikeCheck {
    pub liked: bool,
}

fn content_type(raw: Option<&str>) -> ContentType {
    raw.and_then(|s| s.parse().ok()).unwrap_or(ContentType::Text)
}

/// Admin writes publish immediately; everyone else goes through review.
fn review_status(auth: &Auth) -> PostStatus {
    if auth.is_admin() {
        PostStatus::Approved
    } else {
        PostStatus::Pending
    }
}

#[utoipa::path(
    get,
    path = "/api/posts",
    params(PostListQuery),
    responses((status = 200, description = "Approved posts", body = PostPage)),
    tag = "posts"
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<PostListQuery>) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let page = Pagination::new(q.page, q.limit, 10);
    let result = data
        .repo
        .list_posts(PostQuery {
            status: Some(PostStatus::Approved),
            author_id: None,
            category_id: q.category_id,
            news_only: q.is_news,
            hot_only: q.is_hot,
            page: Some(page),
        })
        .await?;
    Ok(HttpResponse::Ok().json(PostPage {
        posts: result.items,
        total: result.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// On post writes the only lookup that can miss is the category.
fn unknown_category(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::BadRequest("post category not found".into()),
        other => other.into(),
    }
}

#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = PostPayload,
    responses(
        (status = 201, body = PostView),
        (status = 400, description = "Missing field or unknown category"),
        (status = 401)
    ),
    tag = "posts"
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let title = required("title", body.title.as_deref())?;
    let content = required("content", body.content.as_deref())?;
    let new = NewPost {
        author_id: auth.user_id(),
        category_id: body.category_id,
        title,
        content,
        content_type: content_type(body.content_type.as_deref()),
        status: review_status(&auth),
        is_news: false,
    };
    let post = data.repo.create_post(new).await.map_err(unknown_category)?;
    Ok(HttpResponse::Created().json(post))
}

/// Counts a view on every read.
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, body = PostDetail), (status = 404, description = "Missing or deleted")),
    tag = "posts"
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let detail = data.repo.view_post(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    request_body = PostPayload,
    responses((status = 200, body = Post), (status = 403), (status = 404)),
    tag = "posts"
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostPayload>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if !auth.is_admin() && post.author_id != auth.user_id() {
        return Err(ApiError::Forbidden("not allowed to edit this post".into()));
    }
    let body = payload.into_inner();
    let upd = UpdatePost {
        title: body.title.filter(|t| !t.trim().is_empty()),
        content: body.content.filter(|c| !c.trim().is_empty()),
        category_id: body.category_id,
        content_type: body.content_type.as_deref().and_then(|s| s.parse().ok()),
        status: review_status(&auth),
    };
    let updated = data.repo.update_post(id, upd).await.map_err(unknown_category)?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Soft delete by the author.
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200), (status = 403), (status = 404)),
    tag = "posts"
)]
pub async fn delete_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    if post.author_id != auth.user_id() {
        return Err(ApiError::Forbidden("not allowed to delete this post".into()));
    }
    data.repo.set_post_status(id, PostStatus::Deleted).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "post deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, body = LikeState), (status = 401), (status = 404)),
    tag = "posts"
)]
pub async fn toggle_like(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let liked = data.repo.toggle_like(id, auth.user_id()).await?;
    let likes = data.repo.count_likes(id).await?;
    Ok(HttpResponse::Ok().json(LikeState { liked, likes }))
}

/// Anonymous callers and lookup failures both read as "not liked".
#[utoipa::path(
    get,
    path = "/api/posts/{id}/check-like",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 200, body = LikeCheck)),
    tag = "posts"
)]
pub async fn check_like(auth: Option<Auth>, data: web::Data<AppState>, path: web::Path<Id>) -> HttpResponse {
    let liked = match auth {
        Some(auth) => data.repo.has_liked(path.into_inner(), auth.user_id()).await.unwrap_or_else(|e| {
            log::warn!("like lookup failed: {e}");
            false
        }),
        None => false,
    };
    HttpResponse::Ok().json(LikeCheck { liked })
}

#[utoipa::path(
    post,
    path = "/api/posts/{id}/share",
    params(("id" = Id, Path, description = "Post id")),
    responses((status = 201, body = PostShare), (status = 401), (status = 404), (status = 429)),
    tag = "posts"
)]
pub async fn share_post(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_share(auth.user_id()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let share = data.repo.record_share(path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::Created().json(share))
}
