#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::{create_jwt, Role};
use courtside::repo::inmem::InMemRepo;
use courtside::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

#[actix_web::test]
#[serial]
async fn register_login_and_profile() {
    common::setup_env();
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": "lebron",
            "email": "lebron@courtside.test",
            "password": "kingjames",
            "phone": "13800138000"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body = common::json(resp).await;
    assert_eq!(body["user"]["role"], "USER");
    assert!(body["user"].get("password_hash").is_none());

    // same username again
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "username": "lebron", "email": "other@courtside.test", "password": "x" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // login by email
    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "lebron@courtside.test", "password": "kingjames" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let token = common::json(resp).await["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "lebron", "password": "wrong" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::put()
        .uri("/api/users/profile")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .set_json(json!({ "bio": "Akron" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/users/profile")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let profile = common::json(test::call_service(&app, req).await).await;
    assert_eq!(profile["username"], "lebron");
    assert_eq!(profile["bio"], "Akron");
}

#[actix_web::test]
#[serial]
async fn register_validates_input() {
    common::setup_env();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(InMemRepo::new())))).configure(config),
    )
    .await;
    for body in [
        json!({ "username": "a", "password": "p" }),
        json!({ "username": "a", "email": "not-an-email", "password": "p" }),
        json!({ "username": "a", "email": "a@b.co", "password": "p", "phone": "12345" }),
    ] {
        let req = test::TestRequest::post().uri("/api/auth/register").set_json(body).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}

#[actix_web::test]
#[serial]
async fn bad_or_missing_tokens_are_unauthorized() {
    common::setup_env();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(InMemRepo::new())))).configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/orders").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert!(common::json(resp).await["error"].is_string());

    let req = test::TestRequest::get()
        .uri("/api/orders")
        .insert_header(("Authorization", "Bearer not.a.jwt"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // signed with another key
    std::env::set_var("JWT_SECRET", "another-secret-that-is-32-bytes-long");
    let foreign = create_jwt(1, "mallory", Role::Admin).unwrap();
    common::setup_env();
    let req = test::TestRequest::get()
        .uri("/api/admin/logs")
        .insert_header(("Authorization", format!("Bearer {foreign}")))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn seller_capability_gates_listings() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let buyer = common::account(&repo, "shopper", Role::User, false).await;
    let seller = common::account(&repo, "maker", Role::User, true).await;
    let admin = common::account(&repo, "boss", Role::Admin, false).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/categories")
        .insert_header(admin.bearer())
        .set_json(json!({ "name": "Balls" }))
        .to_request();
    let cat = common::json(test::call_service(&app, req).await).await;
    let cat_id = cat["id"].as_i64().unwrap();

    let listing = json!({
        "name": "Indoor ball",
        "description": "Composite leather",
        "price": 59.5,
        "stock": 10,
        "category_id": cat_id
    });
    let req =
        test::TestRequest::post().uri("/api/products").insert_header(buyer.bearer()).set_json(&listing).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req =
        test::TestRequest::post().uri("/api/products").insert_header(seller.bearer()).set_json(&listing).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let bad = json!({ "name": "Ghost", "description": "d", "price": 1.0, "category_id": 424242 });
    let req = test::TestRequest::post().uri("/api/products").insert_header(seller.bearer()).set_json(&bad).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/api/users/my-products").insert_header(seller.bearer()).to_request();
    let mine = common::json(test::call_service(&app, req).await).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/products?keyword=leather").to_request();
    let page = common::json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["products"][0]["seller_username"], "maker");
    assert_eq!(page["products"][0]["category_name"], "Balls");
}

#[actix_web::test]
#[serial]
async fn own_content_lists_and_comment_removal() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let me = common::account(&repo, "poster", Role::User, false).await;
    let other = common::account(&repo, "lurker", Role::User, false).await;
    let post_id = common::approved_post(&repo, me.id()).await;

    let comment = |who: &common::Account, parent: Option<i64>| {
        test::TestRequest::post()
            .uri("/api/comments")
            .insert_header(who.bearer())
            .set_json(json!({ "content": "swish", "post_id": post_id, "parent_id": parent }))
            .to_request()
    };
    let root = common::json(test::call_service(&app, comment(&me, None)).await).await["id"].as_i64().unwrap();
    test::call_service(&app, comment(&other, Some(root))).await;

    let req = test::TestRequest::get().uri("/api/users/my-posts").insert_header(me.bearer()).to_request();
    assert_eq!(common::json(test::call_service(&app, req).await).await.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get().uri("/api/users/my-comments").insert_header(me.bearer()).to_request();
    let mine = common::json(test::call_service(&app, req).await).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["status"], "PENDING");

    // someone else's comment looks missing
    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/my-comments?id={root}"))
        .insert_header(other.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri("/api/users/my-comments").insert_header(me.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/my-comments?id={root}"))
        .insert_header(me.bearer())
        .to_request();
    let body = common::json(test::call_service(&app, req).await).await;
    assert_eq!(body["deleted"], 2);
}
