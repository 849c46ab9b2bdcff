#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::Role;
use courtside::repo::inmem::InMemRepo;
use courtside::repo::{EngagementRepo, PostRepo};
use courtside::{config, AppState};
use serial_test::serial;
use std::sync::Arc;

use common::{account, approved_post, json};

#[actix_web::test]
#[serial]
async fn like_counter_tracks_like_rows() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let author = account(&repo, "author", Role::User, false).await;
    let fans = [
        account(&repo, "fan1", Role::User, false).await,
        account(&repo, "fan2", Role::User, false).await,
        account(&repo, "fan3", Role::User, false).await,
    ];
    let post_id = approved_post(&repo, author.id()).await;

    // fan1 likes, fan2 likes, fan3 likes then unlikes, fan1 unlikes
    let sequence = [0usize, 1, 2, 2, 0];
    for idx in sequence {
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{post_id}/like"))
            .insert_header(fans[idx].bearer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body = json(resp).await;
        let stored = repo.get_post(post_id).await.unwrap();
        assert_eq!(body["likes"], stored.likes);
        assert_eq!(stored.likes, repo.count_likes(post_id).await.unwrap());
    }
    assert_eq!(repo.get_post(post_id).await.unwrap().likes, 1);
    assert!(repo.has_liked(post_id, fans[1].id()).await.unwrap());
    assert!(!repo.has_liked(post_id, fans[0].id()).await.unwrap());
}

#[actix_web::test]
#[serial]
async fn toggling_twice_restores_state() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "jordan", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    let mut states = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{post_id}/like"))
            .insert_header(user.bearer())
            .to_request();
        let body = json(test::call_service(&app, req).await).await;
        states.push(body["liked"].as_bool().unwrap());
    }
    assert_eq!(states, vec![true, false]);

    let req = test::TestRequest::get()
        .uri(&format!("/api/posts/{post_id}/check-like"))
        .insert_header(user.bearer())
        .to_request();
    let body = json(test::call_service(&app, req).await).await;
    assert_eq!(body["liked"], false);
    assert_eq!(repo.get_post(post_id).await.unwrap().likes, 0);
}

#[actix_web::test]
#[serial]
async fn check_like_is_false_for_anonymous_callers() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "magic", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;
    repo.toggle_like(post_id, user.id()).await.unwrap();

    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}/check-like")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json(resp).await["liked"], false);
}

#[actix_web::test]
#[serial]
async fn like_requires_login_and_existing_post() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "bird", Role::User, false).await;

    let req = test::TestRequest::post().uri("/api/posts/999/like").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post().uri("/api/posts/999/like").insert_header(user.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn sharing_twice_records_two_rows() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "duncan", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri(&format!("/api/posts/{post_id}/share"))
            .insert_header(user.bearer())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let share = json(resp).await;
        assert_eq!(share["post_id"], post_id);
    }
    assert_eq!(repo.get_post(post_id).await.unwrap().shares, 2);
    assert_eq!(repo.count_shares(post_id).await.unwrap(), 2);
}

#[actix_web::test]
#[serial]
async fn viewing_counts_and_hides_deleted_posts() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "tim", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    for _ in 0..2 {
        let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    assert_eq!(repo.get_post(post_id).await.unwrap().views, 2);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{post_id}"))
        .insert_header(user.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get().uri(&format!("/api/posts/{post_id}")).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn absurd_page_numbers_return_an_empty_page() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "deep", Role::User, false).await;
    approved_post(&repo, user.id()).await;

    let req = test::TestRequest::get().uri(&format!("/api/posts?page={}&limit=100", i64::MAX)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = json(resp).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["page"], 1_000_000);
    assert!(body["posts"].as_array().unwrap().is_empty());
}
