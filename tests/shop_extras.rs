#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::Role;
use courtside::repo::inmem::InMemRepo;
use courtside::repo::{ProductRepo, UserRepo};
use courtside::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

use common::{account, json, product};

#[actix_web::test]
#[serial]
async fn cart_adds_merge_and_totals_follow() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let seller = account(&repo, "outfitter", Role::User, true).await;
    let buyer = account(&repo, "shopper", Role::User, false).await;
    let shoes = product(&repo, seller.id(), 120.0, 10).await;

    let add = |qty: serde_json::Value| {
        test::TestRequest::post()
            .uri("/api/cart")
            .insert_header(buyer.bearer())
            .set_json(json!({ "product_id": shoes.id, "quantity": qty }))
            .to_request()
    };
    let resp = test::call_service(&app, add(json!(1))).await;
    assert_eq!(resp.status(), 201);
    let line_id = json(resp).await["id"].as_i64().unwrap();
    let resp = test::call_service(&app, add(json!(2))).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json(resp).await["quantity"], 3);

    for bad in [json!(0), json!(-4), json!(10_000), json!(null)] {
        assert_eq!(test::call_service(&app, add(bad)).await.status(), 400);
    }

    let req = test::TestRequest::get().uri("/api/cart").insert_header(buyer.bearer()).to_request();
    let body = json(test::call_service(&app, req).await).await;
    assert_eq!(body["cartItems"].as_array().unwrap().len(), 1);
    assert_eq!(body["cartItems"][0]["product_name"], "Signature sneaker");
    assert_eq!(body["total"], 360.0);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/cart?id={line_id}"))
        .insert_header(seller.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::delete().uri("/api/cart").insert_header(buyer.bearer()).to_request();
    assert_eq!(json(test::call_service(&app, req).await).await["deleted"], 1);

    let req = test::TestRequest::get().uri("/api/cart").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn favorites_reject_repeats_and_filter_by_type() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let fan = account(&repo, "superfan", Role::User, false).await;
    let favorite = |body: serde_json::Value| {
        test::TestRequest::post().uri("/api/users/favorites").insert_header(fan.bearer()).set_json(body).to_request()
    };

    let resp = test::call_service(&app, favorite(json!({ "type": "POST", "target_id": 7 }))).await;
    assert_eq!(resp.status(), 201);
    let fav_id = json(resp).await["id"].as_i64().unwrap();

    let resp = test::call_service(&app, favorite(json!({ "type": "POST", "target_id": 7 }))).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(json(resp).await["error"], "already favorited");

    assert_eq!(test::call_service(&app, favorite(json!({ "type": "TEAM", "target_id": 7 }))).await.status(), 400);
    assert_eq!(test::call_service(&app, favorite(json!({ "target_id": 7 }))).await.status(), 400);
    assert_eq!(test::call_service(&app, favorite(json!({ "type": "PRODUCT", "target_id": 9 }))).await.status(), 201);

    let req =
        test::TestRequest::get().uri("/api/users/favorites?type=PRODUCT").insert_header(fan.bearer()).to_request();
    let listed = json(test::call_service(&app, req).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["type"], "PRODUCT");
    assert_eq!(listed[0]["target_id"], 9);

    let req = test::TestRequest::delete().uri("/api/users/favorites").insert_header(fan.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
    let req = test::TestRequest::delete()
        .uri(&format!("/api/users/favorites?id={fav_id}"))
        .insert_header(fan.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
#[serial]
async fn reviews_update_product_rating() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let seller = account(&repo, "maker", Role::User, true).await;
    let a = account(&repo, "hooper", Role::User, false).await;
    let b = account(&repo, "baller", Role::User, false).await;
    let ball = product(&repo, seller.id(), 40.0, 5).await;
    let uri = format!("/api/products/{}/reviews", ball.id);
    let review = |who: &common::Account, body: serde_json::Value| {
        test::TestRequest::post().uri(&uri).insert_header(who.bearer()).set_json(body).to_request()
    };

    for rating in [json!(0), json!(6), json!(null)] {
        let resp = test::call_service(&app, review(&a, json!({ "rating": rating }))).await;
        assert_eq!(resp.status(), 400);
    }
    let resp = test::call_service(&app, review(&a, json!({ "rating": 5, "content": "Great grip" }))).await;
    assert_eq!(resp.status(), 201);
    assert_eq!(json(resp).await["username"], "hooper");
    let resp = test::call_service(&app, review(&a, json!({ "rating": 1 }))).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(test::call_service(&app, review(&b, json!({ "rating": 2 }))).await.status(), 201);

    // someone else's order cannot anchor a review
    let resp = test::call_service(&app, review(&b, json!({ "rating": 3, "order_id": 999 }))).await;
    assert_eq!(resp.status(), 400);

    let stored = repo.get_product(ball.id).await.unwrap().product;
    assert_eq!(stored.review_count, 2);
    assert_eq!(stored.rating, 3.5);

    let req = test::TestRequest::get().uri(&format!("{uri}?page=1&limit=1")).to_request();
    let page = json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["limit"], 1);
    assert_eq!(page["reviews"][0]["username"], "baller");

    let req = test::TestRequest::post()
        .uri("/api/products/424242/reviews")
        .insert_header(a.bearer())
        .set_json(json!({ "rating": 4 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn admins_manage_roles_and_seller_flag() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "commissioner", Role::Admin, false).await;
    let user = account(&repo, "walkon", Role::User, false).await;
    account(&repo, "benchwarmer", Role::User, false).await;

    let req = test::TestRequest::get().uri("/api/admin/users").insert_header(user.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get()
        .uri("/api/admin/users?role=USER&page=1&limit=1")
        .insert_header(admin.bearer())
        .to_request();
    let page = json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["users"].as_array().unwrap().len(), 1);
    assert_eq!(page["users"][0]["username"], "benchwarmer");
    assert!(page["users"][0].get("password_hash").is_none());

    let req = test::TestRequest::get().uri("/api/admin/users?role=OWNER").insert_header(admin.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::put()
        .uri("/api/admin/users")
        .insert_header(admin.bearer())
        .set_json(json!({ "is_seller": true }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::put()
        .uri("/api/admin/users")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": user.id(), "is_seller": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json(resp).await["is_seller"], true);
    let stored = repo.get_user(user.id()).await.unwrap();
    assert!(stored.is_seller);
    assert_eq!(stored.role, Role::User);

    let req = test::TestRequest::put()
        .uri("/api/admin/users")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": 4242, "role": "ADMIN" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn post_categories_in_use_cannot_be_deleted() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "editor", Role::Admin, false).await;
    let writer = account(&repo, "beatwriter", Role::User, false).await;
    let create = |name: serde_json::Value| {
        test::TestRequest::post()
            .uri("/api/admin/post-categories")
            .insert_header(admin.bearer())
            .set_json(json!({ "name": name, "description": "League news" }))
            .to_request()
    };

    let resp = test::call_service(&app, create(json!("Trades"))).await;
    assert_eq!(resp.status(), 201);
    let cat_id = json(resp).await["id"].as_i64().unwrap();
    let resp = test::call_service(&app, create(json!("Trades"))).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(json(resp).await["error"], "category name already exists");
    assert_eq!(test::call_service(&app, create(json!("  "))).await.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(writer.bearer())
        .set_json(json!({ "title": "Deadline deal", "content": "Blockbuster", "category_id": cat_id }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    assert_eq!(json(resp).await["category_name"], "Trades");

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(writer.bearer())
        .set_json(json!({ "title": "Lost", "content": "Nowhere", "category_id": 999 }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/post-categories?id={cat_id}"))
        .insert_header(admin.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(json(resp).await["error"], "category still has posts");

    let req = test::TestRequest::put()
        .uri("/api/admin/post-categories")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": cat_id, "name": "Transactions" }))
        .to_request();
    assert_eq!(json(test::call_service(&app, req).await).await["name"], "Transactions");

    let req = test::TestRequest::get().uri("/api/post-categories").to_request();
    let listed = json(test::call_service(&app, req).await).await;
    assert_eq!(listed[0]["name"], "Transactions");

    let req = test::TestRequest::delete()
        .uri("/api/admin/post-categories?id=4242")
        .insert_header(admin.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
    let req = test::TestRequest::delete()
        .uri(&format!("/api/admin/post-categories?id={cat_id}"))
        .insert_header(writer.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
}
