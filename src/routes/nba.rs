use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize, ToSchema)]
pub struct FeedRefresh {
    pub message: String,
    pub matches_count: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// The caller must present `Bearer <CRON_SECRET>`. Without a configured
/// secret every call is refused.
fn authorize(req: &HttpRequest, secret: Option<&str>) -> Result<(), ApiError> {
    let presented = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    match (secret, presented.and_then(|h| h.strip_prefix("Bearer "))) {
        (Some(secret), Some(token)) if !secret.is_empty() && token == secret => Ok(()),
        _ => Err(ApiError::Unauthorized("unauthorized".into())),
    }
}

#[utoipa::path(
    post,
    path = "/api/nba/update",
    responses(
        (status = 200, description = "Feed refreshed", body = FeedRefresh),
        (status = 401, description = "Missing or wrong cron secret"),
        (status = 500, description = "Feed unavailable")
    ),
    tag = "nba"
)]
pub async fn update(req: HttpRequest, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    authorize(&req, data.cron_secret.as_deref())?;
    let feed = data.feed.as_ref().ok_or_else(|| ApiError::internal("NBA_FEED_URL is not configured"))?;
    let matches = feed.fetch_matches().await.map_err(|e| {
        tracing::error!(error = %e, "schedule feed refresh failed");
        ApiError::internal(e)
    })?;
    if matches.is_empty() {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "No matches to update", "updated": 0 })));
    }
    tracing::info!(count = matches.len(), "schedule feed refreshed");
    Ok(HttpResponse::Ok().json(FeedRefresh {
        message: "NBA data updated successfully".into(),
        matches_count: matches.len(),
        updated_at: chrono::Utc::now(),
    }))
}
