use crate::models::*;
use crate::routes::{
    admin, auth, cart, categories, comments, complaints, nba, orders, payments, posts, products, refunds, users,
};
use crate::status::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        auth::register,
        auth::login,
        users::get_profile,
        users::update_profile,
        users::my_orders,
        users::my_posts,
        users::my_products,
        users::my_comments,
        users::delete_my_comment,
        users::expenses,
        users::incomes,
        users::list_favorites,
        users::add_favorite,
        users::remove_favorite,
        categories::list_categories,
        categories::list_post_categories,
        products::list_products,
        products::get_product,
        products::create_product,
        products::list_reviews,
        products::create_review,
        cart::get_cart,
        cart::add_to_cart,
        cart::remove_from_cart,
        posts::list_posts,
        posts::create_post,
        posts::get_post,
        posts::update_post,
        posts::delete_post,
        posts::toggle_like,
        posts::check_like,
        posts::share_post,
        comments::create_comment,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::update_order,
        payments::pay_order,
        payments::list_payments,
        refunds::create_refund,
        refunds::list_refunds,
        refunds::decide_refund,
        complaints::create_complaint,
        complaints::list_complaints,
        complaints::update_complaint,
        admin::list_posts,
        admin::set_post_status,
        admin::list_comments,
        admin::set_comment_status,
        admin::list_products,
        admin::set_product_status,
        admin::create_category,
        admin::create_post_category,
        admin::update_post_category,
        admin::delete_post_category,
        admin::list_users,
        admin::update_user_access,
        admin::list_logs,
        nba::update,
    ),
    components(schemas(
        crate::auth::Role, crate::error::ApiErrorBody,
        User, UpdateProfile, Category, NewCategory, Product, ProductView, ProductStats,
        Post, PostView, PostDetail, PostShare, Comment, CommentView, CommentThread,
        Order, OrderItem, OrderDetail, NewOrderItem, Payment, PaymentView, PaymentReceipt,
        Refund, RefundView, Complaint, ComplaintView, Income, Expense, SystemLog, SystemLogView,
        ProductReview, ReviewView, CartItem, CartLine, CartSummary, Favorite, PostCategory, UserSummary,
        PostStatus, CommentStatus, ProductStatus, OrderStatus, PaymentStatus, RefundStatus,
        ComplaintStatus, ContentType, RefundKind, ComplaintKind, FavoriteKind, LogLevel,
        auth::RegisterRequest, auth::LoginRequest, auth::AuthResponse,
        users::ExpenseSummary, users::IncomeSummary, users::AddFavoriteRequest,
        categories::CategoryNode,
        products::ProductPage, products::CreateProductRequest, products::ReviewPage, products::CreateReviewRequest,
        cart::AddToCartRequest,
        posts::PostPage, posts::PostPayload, posts::LikeState, posts::LikeCheck,
        comments::CreateCommentRequest,
        orders::CreateOrderRequest, orders::UpdateOrderRequest,
        payments::PayRequest,
        refunds::CreateRefundRequest, refunds::RefundDecisionRequest,
        complaints::CreateComplaintRequest, complaints::UpdateComplaintRequest,
        admin::SetStatusRequest, admin::AdminProductPage, admin::CreateCategoryRequest, admin::LogPage,
        admin::UserPage, admin::UpdateAccessRequest, admin::PostCategoryRequest,
        nba::FeedRefresh,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "users", description = "Profile and personal listings"),
        (name = "posts", description = "Community posts, likes and shares"),
        (name = "categories", description = "Product category tree and post categories"),
        (name = "cart", description = "Shopping cart"),
        (name = "comments", description = "Comments on posts and products"),
        (name = "products", description = "Marketplace catalogue"),
        (name = "orders", description = "Checkout and fulfilment"),
        (name = "payments", description = "Payment capture"),
        (name = "refunds", description = "Refund and exchange requests"),
        (name = "complaints", description = "Complaints and suggestions"),
        (name = "admin", description = "Moderation, accounts, categories and audit log"),
        (name = "nba", description = "Schedule feed refresh"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_covers_admin_and_cron_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/orders/{id}/pay",
            "/api/admin/logs",
            "/api/nba/update",
            "/api/cart",
            "/api/users/favorites",
            "/api/products/{id}/reviews",
            "/api/admin/users",
            "/api/admin/post-categories",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
