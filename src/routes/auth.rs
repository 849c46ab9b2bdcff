use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{client_ip, required, AppState};
use crate::auth::{create_jwt, hash_password, verify_password, Role};
use crate::error::ApiError;
use crate::models::{NewUser, User};
use crate::repo::RepoError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_seller: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email.
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

pub(crate) fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false };
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

/// Mainland mobile numbers: 11 digits, `1` then `3`-`9`.
pub(crate) fn valid_phone(phone: &str) -> bool {
    let b = phone.as_bytes();
    b.len() == 11 && b[0] == b'1' && (b'3'..=b'9').contains(&b[1]) && b.iter().all(u8::is_ascii_digit)
}

fn issue(user: &User) -> Result<String, ApiError> {
    create_jwt(user.id, &user.username, user.role).map_err(ApiError::internal)
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or username/email taken", body = ApiErrorBody)
    ),
    tag = "auth"
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let (Some(username), Some(email), Some(password)) = (
        body.username.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        body.email.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        body.password.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::BadRequest("username, email and password are required".into()));
    };
    if !valid_email(email) {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    let phone = body.phone.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if phone.is_some_and(|p| !valid_phone(p)) {
        return Err(ApiError::BadRequest("invalid phone number".into()));
    }
    let new = NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password)?,
        phone: phone.map(str::to_string),
        is_seller: body.is_seller,
        role: Role::User,
    };
    let user = data.repo.create_user(new).await.map_err(|e| match e {
        RepoError::Conflict => ApiError::BadRequest("username or email already exists".into()),
        other => other.into(),
    })?;
    log::info!("registered user {} ({})", user.username, user.id);
    let token = issue(&user)?;
    Ok(HttpResponse::Created().json(AuthResponse { user, token }))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = AuthResponse),
        (status = 401, description = "Unknown user or wrong password", body = ApiErrorBody),
        (status = 429, description = "Too many attempts", body = ApiErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_login(&client_ip(&req)) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let body = payload.into_inner();
    let login = required("username", body.username.as_deref())?;
    let password =
        body.password.filter(|p| !p.is_empty()).ok_or_else(|| ApiError::BadRequest("password is required".into()))?;

    let bad_credentials = || ApiError::Unauthorized("invalid username or password".into());
    let user = match data.repo.find_user_by_login(&login).await {
        Ok(user) => user,
        Err(RepoError::NotFound) => return Err(bad_credentials()),
        Err(other) => return Err(other.into()),
    };
    if !verify_password(&password, &user.password_hash) {
        return Err(bad_credentials());
    }
    let token = issue(&user)?;
    Ok(HttpResponse::Ok().json(AuthResponse { user, token }))
}
