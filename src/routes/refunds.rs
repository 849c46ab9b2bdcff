use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::{required, AppState};
use crate::auth::{AdminAuth, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::{RefundKind, RefundStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRefundRequest {
    pub order_id: Option<Id>,
    /// REFUND or EXCHANGE, defaults to REFUND.
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub reason: Option<String>,
    /// Defaults to the order total.
    pub amount: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RefundListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundDecisionRequest {
    pub status: Option<String>,
    pub admin_note: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/refunds",
    request_body = CreateRefundRequest,
    responses(
        (status = 201, body = Refund),
        (status = 400, description = "Invalid input or order not shipped/completed"),
        (status = 404, description = "No such order for this user")
    ),
    tag = "refunds"
)]
pub async fn create_refund(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateRefundRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let order_id = body.order_id.ok_or_else(|| ApiError::BadRequest("order_id is required".into()))?;
    let reason = required("reason", body.reason.as_deref())?;
    let kind = match body.kind.as_deref() {
        Some(k) => k.parse()?,
        None => RefundKind::Refund,
    };
    if let Some(amount) = body.amount {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ApiError::BadRequest("invalid amount".into()));
        }
    }
    let new = NewRefund { order_id, user_id: auth.user_id(), kind, reason, amount: body.amount };
    let refund = data.repo.create_refund(new).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("order not found".into()),
        other => other.into(),
    })?;
    data.audit(NewLog::info("refunds", auth.user_id(), format!("refund {} requested for order {order_id}", refund.id)))
        .await;
    Ok(HttpResponse::Created().json(refund))
}

/// Admins see every request; everyone else sees their own.
#[utoipa::path(
    get,
    path = "/api/refunds",
    params(RefundListQuery),
    responses((status = 200, body = [RefundView]), (status = 400, description = "Unknown status")),
    tag = "refunds"
)]
pub async fn list_refunds(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<RefundListQuery>,
) -> Result<HttpResponse, ApiError> {
    let status = query.status.as_deref().map(str::parse::<RefundStatus>).transpose()?;
    let owner = if auth.is_admin() { None } else { Some(auth.user_id()) };
    let refunds = data.repo.list_refunds(owner, status).await?;
    Ok(HttpResponse::Ok().json(refunds))
}

#[utoipa::path(
    put,
    path = "/api/refunds/{id}",
    params(("id" = Id, Path, description = "Refund id")),
    request_body = RefundDecisionRequest,
    responses(
        (status = 200, body = Refund),
        (status = 400, description = "Unknown status or transition not allowed"),
        (status = 403),
        (status = 404)
    ),
    tag = "refunds"
)]
pub async fn decide_refund(
    admin: AdminAuth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<RefundDecisionRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let body = payload.into_inner();
    let status: RefundStatus = body
        .status
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("status is required".into()))?
        .parse()?;
    let refund = data
        .repo
        .decide_refund(id, RefundDecision { status, admin_note: body.admin_note })
        .await
        .map_err(|e| match e {
            RepoError::NotFound => ApiError::NotFound("refund not found".into()),
            other => other.into(),
        })?;
    data.audit(NewLog::info("refunds", admin.user_id(), format!("refund {id} -> {status}"))).await;
    Ok(HttpResponse::Ok().json(refund))
}
