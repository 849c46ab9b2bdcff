use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;
use crate::status::*;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    #[schema(skip)]
    pub password_hash: String,
    pub role: Role,
    pub is_seller: bool,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub phone: Option<String>,
    pub is_seller: bool,
    pub role: Role,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

/// Account row for the admin user list, with activity counts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct UserSummary {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_seller: bool,
    pub created_at: DateTime<Utc>,
    pub order_count: i64,
    pub post_count: i64,
    pub product_count: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub page: Pagination,
}

#[derive(Debug, Clone, Default)]
pub struct UserAccessUpdate {
    pub role: Option<Role>,
    pub is_seller: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub name: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    pub id: Id,
    pub seller_id: Id,
    pub category_id: Id,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i32,
    pub status: ProductStatus,
    /// Mean review rating, 0 until the first review.
    pub rating: f64,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Product joined with seller/category names and units sold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ProductView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub product: Product,
    pub seller_username: String,
    pub category_name: Option<String>,
    pub sales_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: Id,
    pub category_id: Id,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i32,
    pub status: ProductStatus,
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub status: Option<ProductStatus>,
    pub category_id: Option<Id>,
    pub keyword: Option<String>,
    pub seller_id: Option<Id>,
    pub page: Option<Pagination>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProductStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub sold_out: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ProductReview {
    pub id: Id,
    pub product_id: Id,
    pub user_id: Id,
    pub order_id: Option<Id>,
    pub rating: i32,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ReviewView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub review: ProductReview,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct NewReview {
    pub product_id: Id,
    pub user_id: Id,
    pub order_id: Option<Id>,
    pub rating: i32,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CartItem {
    pub id: Id,
    pub user_id: Id,
    pub product_id: Id,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Cart row with the product fields the checkout page shows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CartLine {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub item: CartItem,
    pub product_name: String,
    pub price: f64,
    pub stock: i32,
    pub product_status: ProductStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartSummary {
    #[serde(rename = "cartItems")]
    pub items: Vec<CartLine>,
    pub total: f64,
}

impl CartSummary {
    pub fn new(items: Vec<CartLine>) -> Self {
        let total = items.iter().map(|l| l.price * l.item.quantity as f64).sum();
        Self { items, total }
    }
}

/// Result of adding to the cart: the stored row and whether it was new.
#[derive(Debug, Clone)]
pub struct CartAdd {
    pub item: CartItem,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Favorite {
    pub id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub kind: FavoriteKind,
    pub target_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostCategory {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPostCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostCategory {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub author_id: Id,
    pub category_id: Option<Id>,
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub status: PostStatus,
    pub likes: i64,
    pub shares: i64,
    pub views: i64,
    pub is_news: bool,
    pub is_hot: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub post: Post,
    pub author_username: String,
    pub category_name: Option<String>,
    pub comment_count: i64,
}

/// Post page: approved top-level comments, each with its approved replies.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostView,
    pub comments: Vec<CommentThread>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Id,
    pub category_id: Option<Id>,
    pub title: String,
    pub content: String,
    pub content_type: ContentType,
    pub status: PostStatus,
    pub is_news: bool,
}

#[derive(Debug, Clone)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category_id: Option<Id>,
    pub content_type: Option<ContentType>,
    pub status: PostStatus,
}

#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    pub status: Option<PostStatus>,
    pub author_id: Option<Id>,
    pub category_id: Option<Id>,
    pub news_only: bool,
    pub hot_only: bool,
    pub page: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostLike {
    pub post_id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostShare {
    pub id: Id,
    pub post_id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub author_id: Id,
    pub post_id: Option<Id>,
    pub product_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CommentView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_username: String,
    pub post_title: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: Id,
    pub post_id: Option<Id>,
    pub product_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub content: String,
    pub status: CommentStatus,
}

#[derive(Debug, Clone, Default)]
pub struct CommentQuery {
    pub status: Option<CommentStatus>,
    pub author_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Order {
    pub id: Id,
    pub order_number: String,
    pub user_id: Id,
    pub total_amount: f64,
    pub status: OrderStatus,
    pub payment_method: Option<String>,
    pub payment_id: Option<Id>,
    pub shipping_name: Option<String>,
    pub shipping_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Id,
    pub order_id: Id,
    pub product_id: Id,
    pub quantity: i32,
    pub price: f64,
    pub product_name: String,
    pub seller_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

/// Upper bound for one product's quantity in an order or cart.
pub const MAX_ITEM_QUANTITY: i32 = 9_999;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewOrderItem {
    pub product_id: Id,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Id,
    pub order_number: String,
    pub items: Vec<NewOrderItem>,
    pub shipping_name: Option<String>,
    pub shipping_phone: Option<String>,
    pub shipping_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Payment {
    pub id: Id,
    pub order_id: Id,
    pub user_id: Id,
    pub amount: f64,
    pub payment_method: String,
    pub payment_number: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PaymentView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub payment: Payment,
    pub order_number: String,
    pub total_amount: f64,
}

/// Outcome of a gateway charge, ready to be written against an order.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment_method: String,
    pub payment_number: Option<String>,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentReceipt {
    pub order: OrderDetail,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Refund {
    pub id: Id,
    pub order_id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub kind: RefundKind,
    pub reason: String,
    pub amount: f64,
    pub status: RefundStatus,
    pub admin_note: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct RefundView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub refund: Refund,
    pub username: String,
    pub order_number: String,
    pub order_status: OrderStatus,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub order_id: Id,
    pub user_id: Id,
    pub kind: RefundKind,
    pub reason: String,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RefundDecision {
    pub status: RefundStatus,
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Complaint {
    pub id: Id,
    pub user_id: Id,
    pub order_id: Option<Id>,
    #[serde(rename = "type")]
    pub kind: ComplaintKind,
    pub title: String,
    pub content: String,
    pub status: ComplaintStatus,
    pub reply: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ComplaintView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub complaint: Complaint,
    pub username: String,
    pub order_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub user_id: Id,
    pub order_id: Option<Id>,
    pub kind: ComplaintKind,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintQuery {
    pub user_id: Option<Id>,
    pub kind: Option<ComplaintKind>,
    pub status: Option<ComplaintStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintUpdate {
    pub reply: Option<String>,
    pub status: Option<ComplaintStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Income {
    pub id: Id,
    pub seller_id: Id,
    pub order_id: Id,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Expense {
    pub id: Id,
    pub user_id: Id,
    pub order_id: Id,
    pub amount: f64,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SystemLog {
    pub id: Id,
    pub level: LogLevel,
    pub module: String,
    pub message: String,
    pub user_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SystemLogView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub log: SystemLog,
    pub username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewLog {
    pub level: LogLevel,
    pub module: String,
    pub message: String,
    pub user_id: Option<Id>,
}

impl NewLog {
    pub fn info(module: &str, user_id: Id, message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, module: module.to_string(), message: message.into(), user_id: Some(user_id) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub module: Option<String>,
    pub page: Pagination,
}

/// 1-based page with a clamped page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub const MAX_LIMIT: i64 = 100;
    pub const MAX_PAGE: i64 = 1_000_000;

    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        let page = page.filter(|p| *p >= 1).unwrap_or(1).min(Self::MAX_PAGE);
        let limit = limit.filter(|l| *l >= 1).unwrap_or(default_limit).min(Self::MAX_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps() {
        let p = Pagination::new(Some(0), Some(1000), 10);
        assert_eq!(p, Pagination { page: 1, limit: 100 });
        assert_eq!(Pagination::new(Some(3), None, 50).offset(), 100);
    }

    #[test]
    fn huge_pages_stay_in_range() {
        let p = Pagination::new(Some(i64::MAX), Some(100), 10);
        assert_eq!(p.page, Pagination::MAX_PAGE);
        assert!(p.offset() > 0);
        let raw = Pagination { page: i64::MAX, limit: i64::MAX };
        assert_eq!(raw.offset(), i64::MAX);
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let u = User {
            id: 1,
            username: "kobe".into(),
            email: "k@example.com".into(),
            password_hash: "salt$digest".into(),
            role: Role::User,
            is_seller: false,
            phone: None,
            avatar: None,
            bio: None,
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&u).unwrap();
        assert!(v.get("password_hash").is_none());
        assert_eq!(v["role"], "USER");
    }
}
