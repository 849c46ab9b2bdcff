#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::Role;
use courtside::models::NewCategory;
use courtside::repo::inmem::InMemRepo;
use courtside::repo::CategoryRepo;
use courtside::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

#[actix_web::test]
#[serial]
async fn empty_store_gives_empty_tree() {
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(InMemRepo::new())))).configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/categories").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(common::json(resp).await, json!([]));
}

#[actix_web::test]
#[serial]
async fn parents_carry_their_children() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let shoes = repo.create_category(NewCategory { name: "Shoes".into(), parent_id: None }).await.unwrap();
    repo.create_category(NewCategory { name: "High tops".into(), parent_id: Some(shoes.id) }).await.unwrap();
    repo.create_category(NewCategory { name: "Apparel".into(), parent_id: None }).await.unwrap();

    let req = test::TestRequest::get().uri("/api/categories").to_request();
    let tree = common::json(test::call_service(&app, req).await).await;
    let nodes = tree.as_array().unwrap();
    assert_eq!(nodes.len(), 2);
    // ordered by name
    assert_eq!(nodes[0]["name"], "Apparel");
    assert_eq!(nodes[1]["name"], "Shoes");
    assert_eq!(nodes[1]["children"][0]["name"], "High tops");
    assert!(nodes.iter().all(|n| n["name"] != "其他"));
}

#[actix_web::test]
#[serial]
async fn admin_creates_nested_categories() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = common::account(&repo, "curator", Role::Admin, false).await;
    let user = common::account(&repo, "visitor", Role::User, false).await;

    let req = test::TestRequest::post()
        .uri("/api/admin/categories")
        .insert_header(admin.bearer())
        .set_json(json!({ "name": "Accessories" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let parent = common::json(resp).await["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/admin/categories")
        .insert_header(admin.bearer())
        .set_json(json!({ "name": "Headbands", "parent_id": parent }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    for (who, body, status) in [
        (&admin, json!({ "name": "  " }), 400),
        (&admin, json!({ "name": "Socks", "parent_id": 9999 }), 400),
        (&user, json!({ "name": "Socks" }), 403),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/admin/categories")
            .insert_header(who.bearer())
            .set_json(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), status);
    }

    let req = test::TestRequest::get().uri("/api/categories").to_request();
    let tree = common::json(test::call_service(&app, req).await).await;
    assert_eq!(tree.as_array().unwrap().len(), 1);
    assert_eq!(tree[0]["children"].as_array().unwrap().len(), 1);
}
