use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::gateway::{ChargeRequest, GatewayOutcome, DEFAULT_METHOD};
use crate::models::*;
use crate::repo::RepoError;
use crate::status::{OrderStatus, PaymentStatus};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PayRequest {
    pub payment_method: Option<String>,
    pub payment_number: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentListQuery {
    pub order_id: Option<Id>,
}

/// Charges the order total through the configured gateway and records the
/// outcome. Only orders awaiting payment are charged.
#[utoipa::path(
    post,
    path = "/api/orders/{id}/pay",
    params(("id" = Id, Path, description = "Order id")),
    request_body = PayRequest,
    responses(
        (status = 201, description = "Order paid", body = PaymentReceipt),
        (status = 400, description = "Order not awaiting payment, or payment declined"),
        (status = 404, description = "No such order for this user")
    ),
    tag = "payments"
)]
pub async fn pay_order(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<PayRequest>>,
) -> Result<HttpResponse, ApiError> {
    let order_id = path.into_inner();
    let uid = auth.user_id();
    let body = payload.map(web::Json::into_inner).unwrap_or_default();

    let not_found = || ApiError::NotFound("order not found".into());
    let order = match data.repo.get_order(order_id).await {
        Ok(o) if o.order.user_id == uid => o.order,
        Ok(_) | Err(RepoError::NotFound) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    if order.status != OrderStatus::PendingPayment {
        return Err(ApiError::InvalidState("order is not awaiting payment".into()));
    }

    let payment_method = body.payment_method.filter(|m| !m.trim().is_empty()).unwrap_or_else(|| DEFAULT_METHOD.into());
    let charge = ChargeRequest {
        order_id,
        amount: order.total_amount,
        payment_method: payment_method.clone(),
        payment_number: body.payment_number.clone(),
    };
    let outcome = data.gateway.charge(&charge).await.map_err(ApiError::internal)?;
    let (settlement, declined) = match outcome {
        GatewayOutcome::Approved { payment_number } => (
            Settlement { payment_method, payment_number: Some(payment_number), status: PaymentStatus::Success },
            None,
        ),
        GatewayOutcome::Declined { reason } => (
            Settlement { payment_method, payment_number: body.payment_number, status: PaymentStatus::Failed },
            Some(reason),
        ),
    };

    let receipt = data.repo.settle_payment(order_id, uid, settlement).await.map_err(|e| match e {
        RepoError::NotFound => not_found(),
        other => other.into(),
    })?;
    if let Some(reason) = declined {
        log::warn!("payment for order {} declined: {reason}", receipt.order.order.order_number);
        return Err(ApiError::InvalidState(format!("payment declined: {reason}")));
    }
    data.audit(NewLog::info(
        "payments",
        uid,
        format!("order {} paid {:.2}", receipt.order.order.order_number, receipt.payment.amount),
    ))
    .await;
    Ok(HttpResponse::Created().json(receipt))
}

#[utoipa::path(
    get,
    path = "/api/payments",
    params(PaymentListQuery),
    responses((status = 200, body = [PaymentView])),
    tag = "payments"
)]
pub async fn list_payments(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<PaymentListQuery>,
) -> Result<HttpResponse, ApiError> {
    let payments = data.repo.list_payments(auth.user_id(), query.order_id).await?;
    Ok(HttpResponse::Ok().json(payments))
}
