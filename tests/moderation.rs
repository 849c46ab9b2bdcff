#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use courtside::auth::Role;
use courtside::models::{CommentQuery, LogQuery, Pagination};
use courtside::repo::inmem::InMemRepo;
use courtside::repo::{AuditRepo, CommentRepo, PostRepo, ProductRepo};
use courtside::status::{CommentStatus, PostStatus, ProductStatus};
use courtside::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

use common::{account, approved_post, product};

#[actix_web::test]
#[serial]
async fn unknown_post_status_is_rejected_and_nothing_changes() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "commissioner", Role::Admin, false).await;
    let post_id = approved_post(&repo, admin.id()).await;

    let req = test::TestRequest::put()
        .uri("/api/admin/posts")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": post_id, "status": "PUBLISHED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = common::json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("PUBLISHED"));
    assert_eq!(repo.get_post(post_id).await.unwrap().status, PostStatus::Approved);

    let req = test::TestRequest::put()
        .uri("/api/admin/posts")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": post_id, "status": "REJECTED" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert_eq!(repo.get_post(post_id).await.unwrap().status, PostStatus::Rejected);

    let req = test::TestRequest::put()
        .uri("/api/admin/posts")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": 4242, "status": "APPROVED" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
#[serial]
async fn moderation_is_admin_only() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let user = account(&repo, "rookie", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    let req = test::TestRequest::put()
        .uri("/api/admin/posts")
        .insert_header(user.bearer())
        .set_json(json!({ "id": post_id, "status": "DELETED" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::get().uri("/api/admin/posts").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
    assert_eq!(repo.get_post(post_id).await.unwrap().status, PostStatus::Approved);
}

#[actix_web::test]
#[serial]
async fn new_posts_wait_for_review_unless_admin() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "editor", Role::Admin, false).await;
    let user = account(&repo, "blogger", Role::User, false).await;

    for (who, expected) in [(&admin, "APPROVED"), (&user, "PENDING")] {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(who.bearer())
            .set_json(json!({ "title": "Trade deadline", "content": "Rumours", "content_type": "MARKDOWN" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let post = common::json(resp).await;
        assert_eq!(post["status"], expected);
        assert_eq!(post["content_type"], "MARKDOWN");
    }

    // queue shows only the pending post
    let req = test::TestRequest::get().uri("/api/admin/posts").insert_header(admin.bearer()).to_request();
    let queue = common::json(test::call_service(&app, req).await).await;
    let queue = queue.as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["author_username"], "blogger");

    // public listing shows only the approved one
    let req = test::TestRequest::get().uri("/api/posts").to_request();
    let page = common::json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["posts"][0]["author_username"], "editor");
}

#[actix_web::test]
#[serial]
async fn non_admin_edit_sends_post_back_to_review() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let author = account(&repo, "writer", Role::User, false).await;
    let other = account(&repo, "stranger", Role::User, false).await;
    let post_id = approved_post(&repo, author.id()).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{post_id}"))
        .insert_header(other.bearer())
        .set_json(json!({ "title": "hijacked" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{post_id}"))
        .insert_header(author.bearer())
        .set_json(json!({ "title": "Finals recap, updated" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let post = repo.get_post(post_id).await.unwrap();
    assert_eq!(post.status, PostStatus::Pending);
    assert_eq!(post.title, "Finals recap, updated");
}

#[actix_web::test]
#[serial]
async fn comment_status_depends_on_author_role() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "mod", Role::Admin, false).await;
    let user = account(&repo, "fan", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    for (who, expected) in [(&admin, "APPROVED"), (&user, "PENDING")] {
        let req = test::TestRequest::post()
            .uri("/api/comments")
            .insert_header(who.bearer())
            .set_json(json!({ "content": "Great game", "post_id": post_id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let comment = common::json(resp).await;
        assert_eq!(comment["status"], expected);
        assert_eq!(comment["author_username"], who.user.username.as_str());
    }

    // both targets, or none, is a bad request
    let seller = account(&repo, "shop", Role::User, true).await;
    let p = product(&repo, seller.id(), 10.0, 1).await;
    for body in [json!({ "content": "x", "post_id": post_id, "product_id": p.id }), json!({ "content": "x" })] {
        let req =
            test::TestRequest::post().uri("/api/comments").insert_header(user.bearer()).set_json(body).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }
}

#[actix_web::test]
#[serial]
async fn deleting_a_comment_removes_its_whole_thread() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "ref", Role::Admin, false).await;
    let user = account(&repo, "poster", Role::User, false).await;
    let post_id = approved_post(&repo, user.id()).await;

    let new = |parent, content: &str| courtside::models::NewComment {
        author_id: user.id(),
        post_id: Some(post_id),
        product_id: None,
        parent_id: parent,
        content: content.into(),
        status: CommentStatus::Approved,
    };
    let root = repo.create_comment(new(None, "root")).await.unwrap().comment.id;
    let reply = repo.create_comment(new(Some(root), "reply")).await.unwrap().comment.id;
    repo.create_comment(new(Some(reply), "nested")).await.unwrap();
    let keeper = repo.create_comment(new(None, "unrelated")).await.unwrap().comment.id;

    let req = test::TestRequest::put()
        .uri("/api/admin/comments")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": root, "status": "DELETED" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(common::json(resp).await["deleted"], 3);

    let left = repo.list_comments(CommentQuery::default()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].comment.id, keeper);

    // plain status change on the survivor
    let req = test::TestRequest::put()
        .uri("/api/admin/comments")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": keeper, "status": "REJECTED" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let left = repo.list_comments(CommentQuery::default()).await.unwrap();
    assert_eq!(left[0].comment.status, CommentStatus::Rejected);
}

#[actix_web::test]
#[serial]
async fn product_moderation_reports_stats_and_logs() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "ops", Role::Admin, false).await;
    let seller = account(&repo, "store", Role::User, true).await;
    let a = product(&repo, seller.id(), 99.0, 5).await;
    product(&repo, seller.id(), 49.0, 3).await;

    let req = test::TestRequest::put()
        .uri("/api/admin/products")
        .insert_header(admin.bearer())
        .set_json(json!({ "id": a.id, "status": "INACTIVE" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert_eq!(repo.get_product(a.id).await.unwrap().product.status, ProductStatus::Inactive);

    let req = test::TestRequest::get().uri("/api/admin/products").insert_header(admin.bearer()).to_request();
    let page = common::json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["stats"]["active"], 1);
    assert_eq!(page["stats"]["inactive"], 1);

    let logs = repo.list_logs(LogQuery { page: Pagination::new(None, None, 50), ..Default::default() }).await.unwrap();
    assert_eq!(logs.total, 1);
    assert_eq!(logs.items[0].log.module, "moderation");
    assert_eq!(logs.items[0].username.as_deref(), Some("ops"));
}

#[actix_web::test]
#[serial]
async fn admin_logs_filter_and_paginate() {
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new().app_data(web::Data::new(AppState::new(Arc::new(repo.clone())))).configure(config),
    )
    .await;
    let admin = account(&repo, "auditor", Role::Admin, false).await;
    let post_id = approved_post(&repo, admin.id()).await;

    for status in ["PENDING", "APPROVED", "REJECTED"] {
        let req = test::TestRequest::put()
            .uri("/api/admin/posts")
            .insert_header(admin.bearer())
            .set_json(json!({ "id": post_id, "status": status }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
    let req = test::TestRequest::post()
        .uri("/api/admin/categories")
        .insert_header(admin.bearer())
        .set_json(json!({ "name": "Jerseys" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get().uri("/api/admin/logs").insert_header(admin.bearer()).to_request();
    let page = common::json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 4);
    assert_eq!(page["limit"], 50);
    // newest first
    assert_eq!(page["logs"][0]["module"], "categories");

    let req = test::TestRequest::get()
        .uri("/api/admin/logs?module=moderation&page=2&limit=2")
        .insert_header(admin.bearer())
        .to_request();
    let page = common::json(test::call_service(&app, req).await).await;
    assert_eq!(page["total"], 3);
    assert_eq!(page["page"], 2);
    assert_eq!(page["logs"].as_array().unwrap().len(), 1);
    assert_eq!(page["logs"][0]["message"], format!("post {post_id} -> PENDING"));

    let req = test::TestRequest::get().uri("/api/admin/logs?level=LOUD").insert_header(admin.bearer()).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}
