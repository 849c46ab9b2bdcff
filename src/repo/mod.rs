use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::models::*;
use crate::status::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("{0}")]
    InvalidState(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }
}

/// Sums quantities per product. A per-product total above
/// [`MAX_ITEM_QUANTITY`] is rejected rather than wrapped.
pub(crate) fn tally_items(items: &[NewOrderItem]) -> RepoResult<BTreeMap<Id, i32>> {
    let mut wanted: BTreeMap<Id, i32> = BTreeMap::new();
    for item in items {
        let slot = wanted.entry(item.product_id).or_default();
        *slot = slot
            .checked_add(item.quantity)
            .filter(|q| *q <= MAX_ITEM_QUANTITY)
            .ok_or_else(|| RepoError::InvalidState("order quantity is too large".into()))?;
    }
    Ok(wanted)
}

/// Cart line quantity after adding `extra` to `current`.
pub(crate) fn merged_quantity(current: i32, extra: i32) -> RepoResult<i32> {
    current
        .checked_add(extra)
        .filter(|q| (1..=MAX_ITEM_QUANTITY).contains(q))
        .ok_or_else(|| RepoError::InvalidState("cart quantity is too large".into()))
}

/// Mean of the stored ratings, 0 with no reviews.
pub(crate) fn mean_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().map(|r| *r as f64).sum::<f64>() / ratings.len() as f64
}

/// Refund amount, defaulting to the order total and never above it.
pub(crate) fn refund_amount(requested: Option<f64>, order_total: f64) -> RepoResult<f64> {
    match requested {
        Some(amount) if amount > order_total => {
            Err(RepoError::InvalidState("refund amount exceeds order total".into()))
        }
        Some(amount) => Ok(amount),
        None => Ok(order_total),
    }
}

impl From<InvalidTransition> for RepoError {
    fn from(e: InvalidTransition) -> Self {
        RepoError::InvalidState(e.to_string())
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    /// Looks the login up as username first, then as email.
    async fn find_user_by_login(&self, login: &str) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User>;
    /// Newest accounts first, with their order, post and product counts.
    async fn list_users(&self, q: UserQuery) -> RepoResult<Paged<UserSummary>>;
    async fn update_access(&self, id: Id, upd: UserAccessUpdate) -> RepoResult<User>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    /// All categories ordered by name.
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn get_category(&self, id: Id) -> RepoResult<Category>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
}

#[async_trait]
pub trait ProductRepo: Send + Sync {
    async fn list_products(&self, q: ProductQuery) -> RepoResult<Paged<ProductView>>;
    async fn product_stats(&self) -> RepoResult<ProductStats>;
    async fn get_product(&self, id: Id) -> RepoResult<ProductView>;
    async fn create_product(&self, new: NewProduct) -> RepoResult<Product>;
    async fn set_product_status(&self, id: Id, status: ProductStatus) -> RepoResult<Product>;
}

/// Star ratings on products. Writing a review refreshes the product's
/// `rating` and `review_count` in the same unit of work.
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn list_reviews(&self, product_id: Id, page: Pagination) -> RepoResult<Paged<ReviewView>>;
    /// One review per product, user and order. A repeat is a `Conflict`.
    async fn create_review(&self, new: NewReview) -> RepoResult<ReviewView>;
}

#[async_trait]
pub trait CartRepo: Send + Sync {
    async fn list_cart(&self, user_id: Id) -> RepoResult<Vec<CartLine>>;
    /// Adds to an existing line for the product or opens a new one.
    async fn add_to_cart(&self, user_id: Id, product_id: Id, quantity: i32) -> RepoResult<CartAdd>;
    async fn remove_cart_item(&self, user_id: Id, id: Id) -> RepoResult<()>;
    async fn clear_cart(&self, user_id: Id) -> RepoResult<u64>;
}

#[async_trait]
pub trait FavoriteRepo: Send + Sync {
    async fn list_favorites(&self, user_id: Id, kind: Option<FavoriteKind>) -> RepoResult<Vec<Favorite>>;
    /// A repeat of the same kind and target is a `Conflict`.
    async fn add_favorite(&self, user_id: Id, kind: FavoriteKind, target_id: Id) -> RepoResult<Favorite>;
    async fn remove_favorite(&self, user_id: Id, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostCategoryRepo: Send + Sync {
    async fn list_post_categories(&self) -> RepoResult<Vec<PostCategory>>;
    async fn create_post_category(&self, new: NewPostCategory) -> RepoResult<PostCategory>;
    async fn update_post_category(&self, id: Id, upd: UpdatePostCategory) -> RepoResult<PostCategory>;
    /// Refuses while any post still points at the category.
    async fn delete_post_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn list_posts(&self, q: PostQuery) -> RepoResult<Paged<PostView>>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// Counts a view and returns the post with its approved comment threads.
    /// Deleted posts are reported as missing.
    async fn view_post(&self, id: Id) -> RepoResult<PostDetail>;
    async fn create_post(&self, new: NewPost) -> RepoResult<PostView>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn set_post_status(&self, id: Id, status: PostStatus) -> RepoResult<Post>;
}

/// Like and share bookkeeping. Each call mutates the child row and the
/// post counter as one atomic unit.
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    /// Returns the liked state after the toggle.
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<bool>;
    async fn has_liked(&self, post_id: Id, user_id: Id) -> RepoResult<bool>;
    async fn record_share(&self, post_id: Id, user_id: Id) -> RepoResult<PostShare>;
    async fn count_likes(&self, post_id: Id) -> RepoResult<i64>;
    async fn count_shares(&self, post_id: Id) -> RepoResult<i64>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView>;
    async fn list_comments(&self, q: CommentQuery) -> RepoResult<Vec<CommentView>>;
    async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment>;
    /// Deletes a comment and every reply beneath it. With `author` set, the
    /// root comment must belong to that user. Returns the number of rows removed.
    async fn delete_comment_tree(&self, id: Id, author: Option<Id>) -> RepoResult<u64>;
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    /// Prices the items, reserves stock and opens the order in PENDING_PAYMENT.
    async fn create_order(&self, new: NewOrder) -> RepoResult<OrderDetail>;
    async fn list_orders(&self, user_id: Id) -> RepoResult<Vec<OrderDetail>>;
    async fn get_order(&self, id: Id) -> RepoResult<OrderDetail>;
    /// Applies a status change and its timestamps. With `enforce` the order
    /// transition table must allow it. Completing an order books one income
    /// row per item for its seller and one expense row for the buyer.
    async fn update_order_status(&self, id: Id, next: OrderStatus, enforce: bool) -> RepoResult<Order>;
    /// Records a payment against an order owned by `user_id` that is still
    /// awaiting payment. A successful settlement marks the order PAID.
    async fn settle_payment(&self, order_id: Id, user_id: Id, s: Settlement) -> RepoResult<PaymentReceipt>;
    async fn list_payments(&self, user_id: Id, order_id: Option<Id>) -> RepoResult<Vec<PaymentView>>;
}

#[async_trait]
pub trait RefundRepo: Send + Sync {
    /// Opens a refund on a shipped or completed order and moves the order to
    /// REFUNDING.
    async fn create_refund(&self, new: NewRefund) -> RepoResult<Refund>;
    async fn list_refunds(&self, user_id: Option<Id>, status: Option<RefundStatus>) -> RepoResult<Vec<RefundView>>;
    /// Moves a refund along its transition table. Approval stamps
    /// `approved_at` and marks the order REFUNDED; completion stamps
    /// `completed_at` only.
    async fn decide_refund(&self, id: Id, d: RefundDecision) -> RepoResult<Refund>;
}

#[async_trait]
pub trait ComplaintRepo: Send + Sync {
    async fn create_complaint(&self, new: NewComplaint) -> RepoResult<Complaint>;
    async fn list_complaints(&self, q: ComplaintQuery) -> RepoResult<Vec<ComplaintView>>;
    async fn update_complaint(&self, id: Id, upd: ComplaintUpdate) -> RepoResult<Complaint>;
}

#[async_trait]
pub trait LedgerRepo: Send + Sync {
    async fn list_expenses(&self, user_id: Id) -> RepoResult<Vec<Expense>>;
    async fn list_incomes(&self, seller_id: Id) -> RepoResult<Vec<Income>>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, entry: NewLog) -> RepoResult<()>;
    async fn list_logs(&self, q: LogQuery) -> RepoResult<Paged<SystemLogView>>;
}

pub trait Repo:
    UserRepo
    + CategoryRepo
    + ProductRepo
    + ReviewRepo
    + CartRepo
    + FavoriteRepo
    + PostCategoryRepo
    + PostRepo
    + EngagementRepo
    + CommentRepo
    + OrderRepo
    + RefundRepo
    + ComplaintRepo
    + LedgerRepo
    + AuditRepo
{
}

impl<T> Repo for T where
    T: UserRepo
        + CategoryRepo
        + ProductRepo
        + ReviewRepo
        + CartRepo
        + FavoriteRepo
        + PostCategoryRepo
        + PostRepo
        + EngagementRepo
        + CommentRepo
        + OrderRepo
        + RefundRepo
        + ComplaintRepo
        + LedgerRepo
        + AuditRepo
{
}
