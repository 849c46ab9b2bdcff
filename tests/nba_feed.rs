#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use courtside::feed::HttpFeedSource;
use courtside::repo::inmem::InMemRepo;
use courtside::{config, AppState};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CRON: &str = "cron-secret-for-tests";

async fn feed_with(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path("/schedule")).respond_with(template).mount(&server).await;
    server
}

fn state_for(server: &MockServer) -> AppState {
    AppState::new(Arc::new(InMemRepo::new()))
        .with_feed(Arc::new(HttpFeedSource::new(format!("{}/schedule", server.uri()))))
        .with_cron_secret(CRON)
}

#[actix_web::test]
async fn refresh_reports_match_count() {
    let server = feed_with(ResponseTemplate::new(200).set_body_json(json!({
        "matches": [
            { "home": "LAL", "away": "BOS", "tipoff": "2026-10-21T19:30:00Z" },
            { "home": "GSW", "away": "DEN", "tipoff": "2026-10-21T22:00:00Z" }
        ]
    })))
    .await;
    let app = test::init_service(App::new().app_data(web::Data::new(state_for(&server))).configure(config)).await;

    for req in [test::TestRequest::post(), test::TestRequest::get()] {
        let req = req
            .uri("/api/nba/update")
            .insert_header(("Authorization", format!("Bearer {CRON}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "NBA data updated successfully");
        assert_eq!(body["matches_count"], 2);
        assert!(body["updated_at"].is_string());
    }
}

#[actix_web::test]
async fn empty_schedule_updates_nothing() {
    let server = feed_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] }))).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state_for(&server))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/nba/update")
        .insert_header(("Authorization", format!("Bearer {CRON}")))
        .to_request();
    let body: serde_json::Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body, json!({ "message": "No matches to update", "updated": 0 }));
}

#[actix_web::test]
async fn wrong_secret_never_reaches_the_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .expect(0)
        .mount(&server)
        .await;
    let app = test::init_service(App::new().app_data(web::Data::new(state_for(&server))).configure(config)).await;

    for header in [None, Some("Bearer wrong"), Some(CRON)] {
        let mut req = test::TestRequest::post().uri("/api/nba/update");
        if let Some(h) = header {
            req = req.insert_header(("Authorization", h));
        }
        assert_eq!(test::call_service(&app, req.to_request()).await.status(), 401);
    }
    server.verify().await;
}

#[actix_web::test]
async fn unset_secret_closes_the_endpoint() {
    let server = feed_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] }))).await;
    let state = AppState::new(Arc::new(InMemRepo::new()))
        .with_feed(Arc::new(HttpFeedSource::new(format!("{}/schedule", server.uri()))));
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/nba/update")
        .insert_header(("Authorization", "Bearer "))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn upstream_failure_is_a_server_error() {
    let server = feed_with(ResponseTemplate::new(503)).await;
    let app = test::init_service(App::new().app_data(web::Data::new(state_for(&server))).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/nba/update")
        .insert_header(("Authorization", format!("Bearer {CRON}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}
