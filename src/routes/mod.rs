use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::error::ApiError;
use crate::feed::FeedSource;
use crate::gateway::{PaymentGateway, SimulatedGateway};
use crate::models::{NewLog, Pagination};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod comments;
pub mod complaints;
pub mod nba;
pub mod orders;
pub mod payments;
pub mod posts;
pub mod products;
pub mod refunds;
pub mod users;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
    cfg.service(
        web::scope("/api")
            .service(web::resource("/auth/register").route(web::post().to(auth::register)))
            .service(web::resource("/auth/login").route(web::post().to(auth::login)))
            .service(
                web::resource("/users/profile")
                    .route(web::get().to(users::get_profile))
                    .route(web::put().to(users::update_profile)),
            )
            .service(web::resource("/users/my-orders").route(web::get().to(users::my_orders)))
            .service(web::resource("/users/my-posts").route(web::get().to(users::my_posts)))
            .service(web::resource("/users/my-products").route(web::get().to(users::my_products)))
            .service(
                web::resource("/users/my-comments")
                    .route(web::get().to(users::my_comments))
                    .route(web::delete().to(users::delete_my_comment)),
            )
            .service(
                web::resource("/users/favorites")
                    .route(web::get().to(users::list_favorites))
                    .route(web::post().to(users::add_favorite))
                    .route(web::delete().to(users::remove_favorite)),
            )
            .service(web::resource("/users/expenses").route(web::get().to(users::expenses)))
            .service(web::resource("/users/incomes").route(web::get().to(users::incomes)))
            .service(web::resource("/categories").route(web::get().to(categories::list_categories)))
            .service(web::resource("/post-categories").route(web::get().to(categories::list_post_categories)))
            .service(
                web::resource("/products")
                    .route(web::get().to(products::list_products))
                    .route(web::post().to(products::create_product)),
            )
            .service(web::resource("/products/{id}").route(web::get().to(products::get_product)))
            .service(
                web::resource("/products/{id}/reviews")
                    .route(web::get().to(products::list_reviews))
                    .route(web::post().to(products::create_review)),
            )
            .service(
                web::resource("/cart")
                    .route(web::get().to(cart::get_cart))
                    .route(web::post().to(cart::add_to_cart))
                    .route(web::delete().to(cart::remove_from_cart)),
            )
            .service(
                web::resource("/posts")
                    .route(web::get().to(posts::list_posts))
                    .route(web::post().to(posts::create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(posts::get_post))
                    .route(web::put().to(posts::update_post))
                    .route(web::delete().to(posts::delete_post)),
            )
            .service(web::resource("/posts/{id}/like").route(web::post().to(posts::toggle_like)))
            .service(web::resource("/posts/{id}/check-like").route(web::get().to(posts::check_like)))
            .service(web::resource("/posts/{id}/share").route(web::post().to(posts::share_post)))
            .service(web::resource("/comments").route(web::post().to(comments::create_comment)))
            .service(
                web::resource("/orders")
                    .route(web::get().to(orders::list_orders))
                    .route(web::post().to(orders::create_order)),
            )
            .service(
                web::resource("/orders/{id}")
                    .route(web::get().to(orders::get_order))
                    .route(web::put().to(orders::update_order)),
            )
            .service(
                web::resource("/orders/{id}/pay")
                    .route(web::post().to(payments::pay_order))
                    .route(web::put().to(payments::pay_order)),
            )
            .service(web::resource("/payments").route(web::get().to(payments::list_payments)))
            .service(
                web::resource("/refunds")
                    .route(web::get().to(refunds::list_refunds))
                    .route(web::post().to(refunds::create_refund)),
            )
            .service(web::resource("/refunds/{id}").route(web::put().to(refunds::decide_refund)))
            .service(
                web::resource("/complaints")
                    .route(web::get().to(complaints::list_complaints))
                    .route(web::post().to(complaints::create_complaint)),
            )
            .service(web::resource("/complaints/{id}").route(web::put().to(complaints::update_complaint)))
            // Admin moderation endpoints
            .service(
                web::resource("/admin/posts")
                    .route(web::get().to(admin::list_posts))
                    .route(web::put().to(admin::set_post_status)),
            )
            .service(
                web::resource("/admin/comments")
                    .route(web::get().to(admin::list_comments))
                    .route(web::put().to(admin::set_comment_status)),
            )
            .service(
                web::resource("/admin/products")
                    .route(web::get().to(admin::list_products))
                    .route(web::put().to(admin::set_product_status)),
            )
            .service(web::resource("/admin/categories").route(web::post().to(admin::create_category)))
            .service(
                web::resource("/admin/post-categories")
                    .route(web::post().to(admin::create_post_category))
                    .route(web::put().to(admin::update_post_category))
                    .route(web::delete().to(admin::delete_post_category)),
            )
            .service(
                web::resource("/admin/users")
                    .route(web::get().to(admin::list_users))
                    .route(web::put().to(admin::update_user_access)),
            )
            .service(web::resource("/admin/logs").route(web::get().to(admin::list_logs)))
            .service(
                web::resource("/nba/update")
                    .route(web::get().to(nba::update))
                    .route(web::post().to(nba::update)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub feed: Option<Arc<dyn FeedSource>>,
    pub rate_limiter: Option<RateLimiterFacade>,
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo, gateway: Arc::new(SimulatedGateway), feed: None, rate_limiter: None, cron_secret: None }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedSource>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_cron_secret(mut self, secret: impl Into<String>) -> Self {
        self.cron_secret = Some(secret.into());
        self
    }

    /// Appends an audit entry. A failed write is logged and does not fail
    /// the request that triggered it.
    pub(crate) async fn audit(&self, entry: NewLog) {
        if let Err(e) = self.repo.append_log(entry).await {
            log::warn!("audit log write failed: {e}");
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn pagination(&self, default_limit: i64) -> Pagination {
        Pagination::new(self.page, self.limit, default_limit)
    }
}

/// Trimmed, non-empty text field.
pub(crate) fn required(field: &str, value: Option<&str>) -> Result<String, ApiError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ApiError::BadRequest(format!("{field} is required"))),
    }
}

pub(crate) fn client_ip(req: &HttpRequest) -> String {
    req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string()
}

#[utoipa::path(get, path = "/health", responses((status = 200, description = "Service is up")))]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
