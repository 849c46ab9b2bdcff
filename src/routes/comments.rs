use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::ToSchema;

use super::{required, AppState};
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, NewComment};
use crate::status::CommentStatus;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub content: Option<String>,
    pub post_id: Option<Id>,
    pub product_id: Option<Id>,
    pub parent_id: Option<Id>,
}

#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Stored APPROVED for admins, PENDING otherwise", body = CommentView),
        (status = 400, description = "Missing content or target"),
        (status = 404, description = "Target or parent not found"),
        (status = 429, description = "Rate limited")
    ),
    tag = "comments"
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_comment(auth.user_id()) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let body = payload.into_inner();
    let content = required("content", body.content.as_deref())?;
    let (post_id, product_id) = match (body.post_id, body.product_id) {
        (None, None) => return Err(ApiError::BadRequest("post_id or product_id is required".into())),
        (Some(_), Some(_)) => return Err(ApiError::BadRequest("comment on a post or a product, not both".into())),
        targets => targets,
    };
    let status = if auth.is_admin() { CommentStatus::Approved } else { CommentStatus::Pending };
    let new = NewComment { author_id: auth.user_id(), post_id, product_id, parent_id: body.parent_id, content, status };
    let comment = data.repo.create_comment(new).await?;
    Ok(HttpResponse::Created().json(comment))
}
