#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::Role;
use courtside::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use courtside::repo::inmem::InMemRepo;
use courtside::repo::EngagementRepo;
use courtside::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn limiter(cfg: RateLimitConfig) -> RateLimiterFacade {
    RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg)
}

#[actix_web::test]
#[serial]
async fn login_attempts_are_limited_per_address() {
    let repo = InMemRepo::new();
    common::account(&repo, "target", Role::User, false).await;
    let cfg = RateLimitConfig { login_limit: 2, login_window: Duration::from_secs(300), ..RateLimitConfig::default() };
    let state = AppState::new(Arc::new(repo.clone())).with_rate_limiter(limiter(cfg));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let attempt = || {
        test::TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr("10.0.0.7:5555".parse().unwrap())
            .set_json(json!({ "username": "target", "password": "guess" }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, attempt()).await.status(), 401);
    assert_eq!(test::call_service(&app, attempt()).await.status(), 401);
    let resp = test::call_service(&app, attempt()).await;
    assert_eq!(resp.status(), 429);
    assert_eq!(common::json(resp).await["error"], "too many requests");

    // a different client is unaffected
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .peer_addr("10.0.0.8:5555".parse().unwrap())
        .set_json(json!({ "username": "target", "password": "password123" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
#[serial]
async fn shares_over_the_limit_are_not_recorded() {
    let repo = InMemRepo::new();
    let user = common::account(&repo, "spammer", Role::User, false).await;
    let post_id = common::approved_post(&repo, user.id()).await;
    let cfg = RateLimitConfig { share_limit: 1, share_window: Duration::from_secs(60), ..RateLimitConfig::default() };
    let state = AppState::new(Arc::new(repo.clone())).with_rate_limiter(limiter(cfg));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let share = || {
        test::TestRequest::post()
            .uri(&format!("/api/posts/{post_id}/share"))
            .insert_header(user.bearer())
            .to_request()
    };
    assert_eq!(test::call_service(&app, share()).await.status(), 201);
    assert_eq!(test::call_service(&app, share()).await.status(), 429);
    assert_eq!(repo.count_shares(post_id).await.unwrap(), 1);
}

#[actix_web::test]
#[serial]
async fn comment_limit_is_per_user() {
    let repo = InMemRepo::new();
    let a = common::account(&repo, "chatty", Role::User, false).await;
    let b = common::account(&repo, "quiet", Role::User, false).await;
    let post_id = common::approved_post(&repo, a.id()).await;
    let cfg =
        RateLimitConfig { comment_limit: 1, comment_window: Duration::from_secs(60), ..RateLimitConfig::default() };
    let state = AppState::new(Arc::new(repo.clone())).with_rate_limiter(limiter(cfg));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let comment = |who: &common::Account| {
        test::TestRequest::post()
            .uri("/api/comments")
            .insert_header(who.bearer())
            .set_json(json!({ "content": "and one!", "post_id": post_id }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, comment(&a)).await.status(), 201);
    assert_eq!(test::call_service(&app, comment(&a)).await.status(), 429);
    assert_eq!(test::call_service(&app, comment(&b)).await.status(), 201);
}
