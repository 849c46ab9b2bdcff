use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{required, AppState};
use crate::auth::{AdminAuth, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::{ComplaintKind, ComplaintStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateComplaintRequest {
    /// COMPLAINT or SUGGESTION.
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub order_id: Option<Id>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ComplaintListQuery {
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateComplaintRequest {
    pub reply: Option<String>,
    pub status: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/complaints",
    request_body = CreateComplaintRequest,
    responses((status = 201, body = Complaint), (status = 400), (status = 404, description = "Unknown order")),
    tag = "complaints"
)]
pub async fn create_complaint(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateComplaintRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let kind: ComplaintKind = required("type", body.kind.as_deref())?.parse()?;
    let title = required("title", body.title.as_deref())?;
    let content = required("content", body.content.as_deref())?;
    let new = NewComplaint { user_id: auth.user_id(), order_id: body.order_id, kind, title, content };
    let complaint = data.repo.create_complaint(new).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("order not found".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Created().json(complaint))
}

#[utoipa::path(
    get,
    path = "/api/complaints",
    params(ComplaintListQuery),
    responses((status = 200, body = [ComplaintView]), (status = 400)),
    tag = "complaints"
)]
pub async fn list_complaints(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ComplaintListQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = ComplaintQuery {
        user_id: if auth.is_admin() { None } else { Some(auth.user_id()) },
        kind: query.kind.as_deref().map(str::parse::<ComplaintKind>).transpose()?,
        status: query.status.as_deref().map(str::parse::<ComplaintStatus>).transpose()?,
    };
    let complaints = data.repo.list_complaints(q).await?;
    Ok(HttpResponse::Ok().json(complaints))
}

/// A non-blank reply stamps `replied_at`.
#[utoipa::path(
    put,
    path = "/api/complaints/{id}",
    params(("id" = Id, Path, description = "Complaint id")),
    request_body = UpdateComplaintRequest,
    responses((status = 200, body = Complaint), (status = 400), (status = 403), (status = 404)),
    tag = "complaints"
)]
pub async fn update_complaint(
    admin: AdminAuth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateComplaintRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let body = payload.into_inner();
    let upd = ComplaintUpdate {
        reply: body.reply.filter(|r| !r.trim().is_empty()),
        status: body.status.as_deref().map(str::parse::<ComplaintStatus>).transpose()?,
    };
    let complaint = data.repo.update_complaint(id, upd).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("complaint not found".into()),
        other => other.into(),
    })?;
    data.audit(NewLog::info("complaints", admin.user_id(), format!("complaint {id} -> {}", complaint.status))).await;
    Ok(HttpResponse::Ok().json(complaint))
}
