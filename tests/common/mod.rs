#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::test;
use courtside::auth::{create_jwt, hash_password_with_cost, Role};
use courtside::models::*;
use courtside::repo::inmem::InMemRepo;
use courtside::repo::{CategoryRepo, PostRepo, ProductRepo, UserRepo};
use courtside::status::{ContentType, PostStatus, ProductStatus};

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn setup_env() {
    std::env::set_var("JWT_SECRET", SECRET);
}

/// A stored account plus a bearer header value for it.
pub struct Account {
    pub user: User,
    pub token: String,
}

impl Account {
    pub fn id(&self) -> Id {
        self.user.id
    }

    pub fn bearer(&self) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", self.token))
    }
}

pub async fn account(repo: &InMemRepo, name: &str, role: Role, is_seller: bool) -> Account {
    setup_env();
    let user = repo
        .create_user(NewUser {
            username: name.into(),
            email: format!("{name}@courtside.test"),
            password_hash: hash_password_with_cost("password123", 4).unwrap(),
            phone: None,
            is_seller,
            role,
        })
        .await
        .unwrap();
    let token = create_jwt(user.id, &user.username, user.role).unwrap();
    Account { user, token }
}

pub async fn approved_post(repo: &InMemRepo, author: Id) -> Id {
    repo.create_post(NewPost {
        author_id: author,
        category_id: None,
        title: "Finals recap".into(),
        content: "Game 7 was wild".into(),
        content_type: ContentType::Text,
        status: PostStatus::Approved,
        is_news: false,
    })
    .await
    .unwrap()
    .post
    .id
}

pub async fn product(repo: &InMemRepo, seller: Id, price: f64, stock: i32) -> Product {
    let cat =
        repo.create_category(NewCategory { name: format!("shoes-{seller}-{stock}"), parent_id: None }).await.unwrap();
    repo.create_product(NewProduct {
        seller_id: seller,
        category_id: cat.id,
        name: "Signature sneaker".into(),
        description: "Low top".into(),
        price,
        stock,
        status: ProductStatus::Active,
    })
    .await
    .unwrap()
}

pub async fn json<B: MessageBody>(resp: ServiceResponse<B>) -> serde_json::Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}
