use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use once_cell::sync::OnceCell;
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;
use crate::repo::Repo;

const DEFAULT_TTL_HOURS: i64 = 24 * 7;
const PASSWORD_COST: u32 = 10;

static TOKEN_TTL_HOURS: OnceCell<i64> = OnceCell::new();

/// Fix the access token lifetime for the process. Call once at startup with a
/// validated value.
pub fn set_token_ttl_hours(hours: i64) {
    let _ = TOKEN_TTL_HOURS.set(hours);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, utoipa::ToSchema, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// Identity carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Id {
        self.sub
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn secret() -> Result<String, jsonwebtoken::errors::Error> {
    env::var("JWT_SECRET").map_err(|_| ErrorKind::InvalidKeyFormat.into())
}

fn ttl_hours() -> i64 {
    *TOKEN_TTL_HOURS.get().unwrap_or(&DEFAULT_TTL_HOURS)
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    Ok(data.claims)
}

/// Create a signed token for a user.
pub fn create_jwt(user_id: Id, username: &str, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = secret()?;
    let exp = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(ttl_hours()))
        .ok_or(ErrorKind::ExpiredSignature)?
        .timestamp() as usize;
    let claims = Claims { sub: user_id, username: username.to_string(), role, exp };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn bearer_claims(req: &HttpRequest, pl: &mut Payload) -> Result<Claims, ApiError> {
    let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
        return Err(ApiError::Unauthorized("authorization required".into()));
    };
    decode_jwt(bearer.token()).map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))
}

/// Extractor for any authenticated caller.
#[derive(Debug, Clone)]
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        self.0.sub
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        ready(bearer_claims(req, pl).map(Auth))
    }
}

/// Extractor that only admits the ADMIN role.
#[derive(Debug, Clone)]
pub struct AdminAuth(pub Claims);

impl AdminAuth {
    pub fn user_id(&self) -> Id {
        self.0.sub
    }
}

impl FromRequest for AdminAuth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let result = bearer_claims(req, pl).and_then(|claims| {
            if claims.is_admin() {
                Ok(AdminAuth(claims))
            } else {
                Err(ApiError::Forbidden("admin role required".into()))
            }
        });
        ready(result)
    }
}

/// Seller capability. Admins always pass; everyone else needs the seller flag
/// on their stored account.
pub async fn require_seller(auth: &Auth, repo: &dyn Repo) -> Result<Claims, ApiError> {
    if auth.is_admin() {
        return Ok(auth.0.clone());
    }
    let user = repo.get_user(auth.user_id()).await.map_err(|e| match e {
        crate::repo::RepoError::NotFound => ApiError::NotFound("user not found".into()),
        other => other.into(),
    })?;
    if user.role == Role::Admin || user.is_seller {
        Ok(auth.0.clone())
    } else {
        Err(ApiError::Forbidden("seller account required".into()))
    }
}

/// bcrypt hash for storage.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    hash_password_with_cost(password, PASSWORD_COST)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, ApiError> {
    bcrypt::hash(password, cost).map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

/// Malformed stored hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    bcrypt::verify(password, stored).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let stored = hash_password_with_cost("hunter2", 4).unwrap();
        assert!(stored.starts_with("$2"));
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
        assert!(!verify_password("hunter2", "garbage"));
    }

    #[test]
    fn salts_differ() {
        let a = hash_password_with_cost("same", 4).unwrap();
        let b = hash_password_with_cost("same", 4).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn token_lifetime_defaults_to_a_week() {
        assert_eq!(ttl_hours(), DEFAULT_TTL_HOURS);
    }
}
