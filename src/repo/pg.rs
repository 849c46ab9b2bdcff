//! Postgres store. Multi-row writes run in a transaction and lock the rows
//! whose state they check with `SELECT ... FOR UPDATE`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Pool, Postgres};

use super::*;

const PRODUCT_VIEW: &str = r#"
    SELECT p.*, u.username AS seller_username, c.name AS category_name,
           COALESCE((SELECT SUM(oi.quantity) FROM order_items oi WHERE oi.product_id = p.id), 0)::BIGINT AS sales_count
    FROM products p
    JOIN users u ON u.id = p.seller_id
    LEFT JOIN categories c ON c.id = p.category_id
"#;

const PRODUCT_FILTER: &str = r#"
    WHERE ($1::product_status IS NULL OR p.status = $1)
      AND ($2::BIGINT IS NULL OR p.category_id = $2)
      AND ($3::BIGINT IS NULL OR p.seller_id = $3)
      AND ($4::TEXT IS NULL OR p.name ILIKE $4 OR p.description ILIKE $4 OR u.username ILIKE $4 OR c.name ILIKE $4)
"#;

const POST_VIEW: &str = r#"
    SELECT p.*, u.username AS author_username, c.name AS category_name,
           (SELECT COUNT(*) FROM comments cm WHERE cm.post_id = p.id) AS comment_count
    FROM posts p
    JOIN users u ON u.id = p.author_id
    LEFT JOIN post_categories c ON c.id = p.category_id
"#;

const POST_FILTER: &str = r#"
    WHERE ($1::post_status IS NULL OR p.status = $1)
      AND ($2::BIGINT IS NULL OR p.author_id = $2)
      AND ($3::BIGINT IS NULL OR p.category_id = $3)
      AND (NOT $4 OR p.is_news)
      AND (NOT $5 OR p.is_hot)
"#;

const COMMENT_VIEW: &str = r#"
    SELECT cm.*, u.username AS author_username, p.title AS post_title, pr.name AS product_name
    FROM comments cm
    JOIN users u ON u.id = cm.author_id
    LEFT JOIN posts p ON p.id = cm.post_id
    LEFT JOIN products pr ON pr.id = cm.product_id
"#;

const CART_VIEW: &str = r#"
    SELECT ci.*, p.name AS product_name, p.price, p.stock, p.status AS product_status
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
"#;

const REFUND_VIEW: &str = r#"
    SELECT r.*, u.username, o.order_number, o.status AS order_status
    FROM refunds r
    JOIN users u ON u.id = r.user_id
    JOIN orders o ON o.id = r.order_id
"#;

/// `LIMIT` and `OFFSET` arguments; a NULL limit means no limit.
fn page_args(page: Option<Pagination>) -> (Option<i64>, i64) {
    match page {
        Some(p) => (Some(p.limit), p.offset()),
        None => (None, 0),
    }
}

async fn load_detail(conn: &mut PgConnection, order: Order) -> RepoResult<OrderDetail> {
    let items = sqlx::query_as::<_, OrderItem>(
        r#"SELECT oi.id, oi.order_id, oi.product_id, oi.quantity, oi.price,
                  p.name AS product_name, p.seller_id
           FROM order_items oi JOIN products p ON p.id = oi.product_id
           WHERE oi.order_id = $1 ORDER BY oi.id"#,
    )
    .bind(order.id)
    .fetch_all(&mut *conn)
    .await?;
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(order.id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(OrderDetail { order, items, payments })
}

#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Opens a pool and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> RepoResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepoError::Internal(e.to_string()))?;
        tracing::info!(max_connections, "postgres pool ready");
        Ok(Self::new(pool))
    }

    async fn post_view(&self, id: Id) -> RepoResult<PostView> {
        let view = sqlx::query_as::<_, PostView>(&format!("{POST_VIEW} WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(view)
    }

    async fn require_post_category(&self, id: Id) -> RepoResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM post_categories WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }

    async fn comment_view(&self, id: Id) -> RepoResult<CommentView> {
        let view = sqlx::query_as::<_, CommentView>(&format!("{COMMENT_VIEW} WHERE cm.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(view)
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO users (username, email, password_hash, role, is_seller, phone)
               VALUES ($1, $2, $3, $4, $5, $6) RETURNING *"#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role)
        .bind(new.is_seller)
        .bind(&new.phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR email = $1 ORDER BY (username = $1) DESC LIMIT 1",
        )
        .bind(login)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self, q: UserQuery) -> RepoResult<Paged<UserSummary>> {
        let items = sqlx::query_as::<_, UserSummary>(
            r#"SELECT u.id, u.username, u.email, u.role, u.is_seller, u.created_at,
                      (SELECT COUNT(*) FROM orders o WHERE o.user_id = u.id) AS order_count,
                      (SELECT COUNT(*) FROM posts p WHERE p.author_id = u.id) AS post_count,
                      (SELECT COUNT(*) FROM products pr WHERE pr.seller_id = u.id) AS product_count
               FROM users u
               WHERE ($1::user_role IS NULL OR u.role = $1)
               ORDER BY u.created_at DESC, u.id DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(q.role)
        .bind(q.page.limit)
        .bind(q.page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE ($1::user_role IS NULL OR role = $1)")
            .bind(q.role)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }

    async fn update_access(&self, id: Id, upd: UserAccessUpdate) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role = COALESCE($2, role), is_seller = COALESCE($3, is_seller) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(upd.role)
        .bind(upd.is_seller)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"UPDATE users SET phone = COALESCE($2, phone), avatar = COALESCE($3, avatar), bio = COALESCE($4, bio)
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(upd.phone)
        .bind(upd.avatar)
        .bind(upd.bio)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let recs = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        let rec = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        if let Some(parent) = new.parent_id {
            self.get_category(parent).await?;
        }
        let rec = sqlx::query_as::<_, Category>("INSERT INTO categories (name, parent_id) VALUES ($1, $2) RETURNING *")
            .bind(&new.name)
            .bind(new.parent_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }
}

#[async_trait]
impl ProductRepo for PgRepo {
    async fn list_products(&self, q: ProductQuery) -> RepoResult<Paged<ProductView>> {
        let keyword = q.keyword.as_ref().map(|k| format!("%{k}%"));
        let (limit, offset) = page_args(q.page);
        let items = sqlx::query_as::<_, ProductView>(&format!(
            "{PRODUCT_VIEW}{PRODUCT_FILTER} ORDER BY p.created_at DESC, p.id DESC LIMIT $5 OFFSET $6"
        ))
        .bind(q.status)
        .bind(q.category_id)
        .bind(q.seller_id)
        .bind(&keyword)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM products p JOIN users u ON u.id = p.seller_id \
             LEFT JOIN categories c ON c.id = p.category_id {PRODUCT_FILTER}"
        ))
        .bind(q.status)
        .bind(q.category_id)
        .bind(q.seller_id)
        .bind(&keyword)
        .fetch_one(&self.pool)
        .await?;
        Ok(Paged { items, total })
    }

    async fn product_stats(&self) -> RepoResult<ProductStats> {
        let (total, active, inactive, sold_out): (i64, i64, i64, i64) = sqlx::query_as(
            r#"SELECT COUNT(*),
                      COUNT(*) FILTER (WHERE status = 'ACTIVE'),
                      COUNT(*) FILTER (WHERE status = 'INACTIVE'),
                      COUNT(*) FILTER (WHERE status = 'SOLD_OUT')
               FROM products"#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(ProductStats { total, active, inactive, sold_out })
    }

    async fn get_product(&self, id: Id) -> RepoResult<ProductView> {
        let view = sqlx::query_as::<_, ProductView>(&format!("{PRODUCT_VIEW} WHERE p.id = $1"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(view)
    }

    async fn create_product(&self, new: NewProduct) -> RepoResult<Product> {
        self.get_category(new.category_id).await?;
        let rec = sqlx::query_as::<_, Product>(
            r#"INSERT INTO products (seller_id, category_id, name, description, price, stock, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *"#,
        )
        .bind(new.seller_id)
        .bind(new.category_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.stock)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn set_product_status(&self, id: Id, status: ProductStatus) -> RepoResult<Product> {
        let mut tx = self.pool.begin().await?;
        let current: ProductStatus = sqlx::query_scalar("SELECT status FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        current.transition(status)?;
        let rec = sqlx::query_as::<_, Product>("UPDATE products SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(rec)
    }
}

#[async_trait]
impl ReviewRepo for PgRepo {
    async fn list_reviews(&self, product_id: Id, page: Pagination) -> RepoResult<Paged<ReviewView>> {
        let items = sqlx::query_as::<_, ReviewView>(
            r#"SELECT r.*, u.username FROM product_reviews r JOIN users u ON u.id = r.user_id
               WHERE r.product_id = $1 ORDER BY r.created_at DESC, r.id DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(product_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_reviews WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }

    async fn create_review(&self, new: NewReview) -> RepoResult<ReviewView> {
        let mut tx = self.pool.begin().await?;
        // Product lock serializes reviews of one product, so the aggregate
        // below sees every committed rating.
        let locked: Option<Id> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(new.product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }
        let duplicate: bool = sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM product_reviews
                             WHERE product_id = $1 AND user_id = $2 AND order_id IS NOT DISTINCT FROM $3)"#,
        )
        .bind(new.product_id)
        .bind(new.user_id)
        .bind(new.order_id)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(RepoError::Conflict);
        }
        let review = sqlx::query_as::<_, ProductReview>(
            r#"INSERT INTO product_reviews (product_id, user_id, order_id, rating, content)
               VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
        )
        .bind(new.product_id)
        .bind(new.user_id)
        .bind(new.order_id)
        .bind(new.rating)
        .bind(&new.content)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            r#"UPDATE products SET
                   rating = (SELECT AVG(rating)::DOUBLE PRECISION FROM product_reviews WHERE product_id = $1),
                   review_count = (SELECT COUNT(*) FROM product_reviews WHERE product_id = $1)
               WHERE id = $1"#,
        )
        .bind(new.product_id)
        .execute(&mut *tx)
        .await?;
        let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
            .bind(new.user_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ReviewView { review, username })
    }
}

#[async_trait]
impl CartRepo for PgRepo {
    async fn list_cart(&self, user_id: Id) -> RepoResult<Vec<CartLine>> {
        let recs = sqlx::query_as::<_, CartLine>(&format!(
            "{CART_VIEW} WHERE ci.user_id = $1 ORDER BY ci.created_at DESC, ci.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn add_to_cart(&self, user_id: Id, product_id: Id, quantity: i32) -> RepoResult<CartAdd> {
        let mut tx = self.pool.begin().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(RepoError::NotFound);
        }
        let current = sqlx::query_as::<_, CartItem>(
            "SELECT * FROM cart_items WHERE user_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
        let added = match current {
            Some(item) => {
                let quantity = merged_quantity(item.quantity, quantity)?;
                let item =
                    sqlx::query_as::<_, CartItem>("UPDATE cart_items SET quantity = $2 WHERE id = $1 RETURNING *")
                        .bind(item.id)
                        .bind(quantity)
                        .fetch_one(&mut *tx)
                        .await?;
                CartAdd { item, created: false }
            }
            None => {
                let quantity = merged_quantity(0, quantity)?;
                let item = sqlx::query_as::<_, CartItem>(
                    "INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3) RETURNING *",
                )
                .bind(user_id)
                .bind(product_id)
                .bind(quantity)
                .fetch_one(&mut *tx)
                .await?;
                CartAdd { item, created: true }
            }
        };
        tx.commit().await?;
        Ok(added)
    }

    async fn remove_cart_item(&self, user_id: Id, id: Id) -> RepoResult<()> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: Id) -> RepoResult<u64> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[async_trait]
impl FavoriteRepo for PgRepo {
    async fn list_favorites(&self, user_id: Id, kind: Option<FavoriteKind>) -> RepoResult<Vec<Favorite>> {
        let recs = sqlx::query_as::<_, Favorite>(
            r#"SELECT * FROM favorites WHERE user_id = $1 AND ($2::favorite_kind IS NULL OR kind = $2)
               ORDER BY created_at DESC, id DESC"#,
        )
        .bind(user_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn add_favorite(&self, user_id: Id, kind: FavoriteKind, target_id: Id) -> RepoResult<Favorite> {
        let rec = sqlx::query_as::<_, Favorite>(
            "INSERT INTO favorites (user_id, kind, target_id) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(user_id)
        .bind(kind)
        .bind(target_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn remove_favorite(&self, user_id: Id, id: Id) -> RepoResult<()> {
        let removed = sqlx::query("DELETE FROM favorites WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl PostCategoryRepo for PgRepo {
    async fn list_post_categories(&self) -> RepoResult<Vec<PostCategory>> {
        let recs = sqlx::query_as::<_, PostCategory>("SELECT * FROM post_categories ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(recs)
    }

    async fn create_post_category(&self, new: NewPostCategory) -> RepoResult<PostCategory> {
        let rec = sqlx::query_as::<_, PostCategory>(
            "INSERT INTO post_categories (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn update_post_category(&self, id: Id, upd: UpdatePostCategory) -> RepoResult<PostCategory> {
        let rec = sqlx::query_as::<_, PostCategory>(
            r#"UPDATE post_categories SET name = COALESCE($2, name), description = COALESCE($3, description)
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(&upd.name)
        .bind(&upd.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn delete_post_category(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<Id> = sqlx::query_scalar("SELECT id FROM post_categories WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }
        let in_use: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE category_id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if in_use {
            return Err(RepoError::InvalidState("category still has posts".into()));
        }
        sqlx::query("DELETE FROM post_categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PostRepo for PgRepo {
    async fn list_posts(&self, q: PostQuery) -> RepoResult<Paged<PostView>> {
        let (limit, offset) = page_args(q.page);
        let order = if q.hot_only { "p.likes DESC, p.created_at DESC" } else { "p.created_at DESC, p.id DESC" };
        let items = sqlx::query_as::<_, PostView>(&format!(
            "{POST_VIEW}{POST_FILTER} ORDER BY {order} LIMIT $6 OFFSET $7"
        ))
        .bind(q.status)
        .bind(q.author_id)
        .bind(q.category_id)
        .bind(q.news_only)
        .bind(q.hot_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM posts p {POST_FILTER}"))
            .bind(q.status)
            .bind(q.author_id)
            .bind(q.category_id)
            .bind(q.news_only)
            .bind(q.hot_only)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        let rec = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec)
    }

    async fn view_post(&self, id: Id) -> RepoResult<PostDetail> {
        let bumped: Option<Id> =
            sqlx::query_scalar("UPDATE posts SET views = views + 1 WHERE id = $1 AND status <> 'DELETED' RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        if bumped.is_none() {
            return Err(RepoError::NotFound);
        }
        let post = self.post_view(id).await?;
        let roots = sqlx::query_as::<_, CommentView>(&format!(
            "{COMMENT_VIEW} WHERE cm.post_id = $1 AND cm.parent_id IS NULL AND cm.status = 'APPROVED' \
             ORDER BY cm.created_at DESC, cm.id DESC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let root_ids: Vec<Id> = roots.iter().map(|c| c.comment.id).collect();
        let replies = sqlx::query_as::<_, CommentView>(&format!(
            "{COMMENT_VIEW} WHERE cm.parent_id = ANY($1) AND cm.status = 'APPROVED' ORDER BY cm.created_at, cm.id"
        ))
        .bind(&root_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut by_parent: HashMap<Id, Vec<CommentView>> = HashMap::new();
        for reply in replies {
            if let Some(parent) = reply.comment.parent_id {
                by_parent.entry(parent).or_default().push(reply);
            }
        }
        let comments = roots
            .into_iter()
            .map(|root| {
                let replies = by_parent.remove(&root.comment.id).unwrap_or_default();
                CommentThread { comment: root, replies }
            })
            .collect();
        Ok(PostDetail { post, comments })
    }

    async fn create_post(&self, new: NewPost) -> RepoResult<PostView> {
        if let Some(c) = new.category_id {
            self.require_post_category(c).await?;
        }
        let id: Id = sqlx::query_scalar(
            r#"INSERT INTO posts (author_id, category_id, title, content, content_type, status, is_news)
               VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id"#,
        )
        .bind(new.author_id)
        .bind(new.category_id)
        .bind(&new.title)
        .bind(&new.content)
        .bind(new.content_type)
        .bind(new.status)
        .bind(new.is_news)
        .fetch_one(&self.pool)
        .await?;
        self.post_view(id).await
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        if let Some(c) = upd.category_id {
            self.require_post_category(c).await?;
        }
        let rec = sqlx::query_as::<_, Post>(
            r#"UPDATE posts SET title = COALESCE($2, title), content = COALESCE($3, content),
                      category_id = COALESCE($4, category_id), content_type = COALESCE($5, content_type),
                      status = $6, updated_at = now()
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(upd.title)
        .bind(upd.content)
        .bind(upd.category_id)
        .bind(upd.content_type)
        .bind(upd.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn set_post_status(&self, id: Id, status: PostStatus) -> RepoResult<Post> {
        let mut tx = self.pool.begin().await?;
        let current: PostStatus = sqlx::query_scalar("SELECT status FROM posts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        current.transition(status)?;
        let rec = sqlx::query_as::<_, Post>(
            "UPDATE posts SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rec)
    }
}

#[async_trait]
impl EngagementRepo for PgRepo {
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<bool> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<Id> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }
        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let (liked, delta) = if removed > 0 {
            (false, -1i64)
        } else {
            sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            (true, 1i64)
        };
        sqlx::query("UPDATE posts SET likes = likes + $2 WHERE id = $1")
            .bind(post_id)
            .bind(delta)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(liked)
    }

    async fn has_liked(&self, post_id: Id, user_id: Id) -> RepoResult<bool> {
        let liked: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM post_likes WHERE post_id = $1 AND user_id = $2)")
                .bind(post_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(liked)
    }

    async fn record_share(&self, post_id: Id, user_id: Id) -> RepoResult<PostShare> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<Id> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepoError::NotFound);
        }
        let share = sqlx::query_as::<_, PostShare>(
            "INSERT INTO post_shares (post_id, user_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE posts SET shares = shares + 1 WHERE id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(share)
    }

    async fn count_likes(&self, post_id: Id) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn count_shares(&self, post_id: Id) -> RepoResult<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_shares WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView> {
        let target_exists: bool = match (new.post_id, new.product_id) {
            (Some(p), None) => sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
                .bind(p)
                .fetch_one(&self.pool)
                .await?,
            (None, Some(p)) => sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(p)
                .fetch_one(&self.pool)
                .await?,
            _ => return Err(RepoError::InvalidState("comment needs exactly one target".into())),
        };
        if !target_exists {
            return Err(RepoError::NotFound);
        }
        if let Some(parent) = new.parent_id {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM comments WHERE id = $1)")
                .bind(parent)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(RepoError::NotFound);
            }
        }
        let id: Id = sqlx::query_scalar(
            r#"INSERT INTO comments (author_id, post_id, product_id, parent_id, content, status)
               VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"#,
        )
        .bind(new.author_id)
        .bind(new.post_id)
        .bind(new.product_id)
        .bind(new.parent_id)
        .bind(&new.content)
        .bind(new.status)
        .fetch_one(&self.pool)
        .await?;
        self.comment_view(id).await
    }

    async fn list_comments(&self, q: CommentQuery) -> RepoResult<Vec<CommentView>> {
        let recs = sqlx::query_as::<_, CommentView>(&format!(
            "{COMMENT_VIEW} WHERE ($1::comment_status IS NULL OR cm.status = $1) \
             AND ($2::BIGINT IS NULL OR cm.author_id = $2) ORDER BY cm.created_at DESC, cm.id DESC"
        ))
        .bind(q.status)
        .bind(q.author_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment> {
        let mut tx = self.pool.begin().await?;
        let current: CommentStatus = sqlx::query_scalar("SELECT status FROM comments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        current.transition(status)?;
        let rec = sqlx::query_as::<_, Comment>("UPDATE comments SET status = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(status)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(rec)
    }

    async fn delete_comment_tree(&self, id: Id, author: Option<Id>) -> RepoResult<u64> {
        let mut tx = self.pool.begin().await?;
        let owner: Id = sqlx::query_scalar("SELECT author_id FROM comments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if author.map_or(false, |a| a != owner) {
            return Err(RepoError::NotFound);
        }
        let removed = sqlx::query(
            r#"WITH RECURSIVE tree AS (
                   SELECT id FROM comments WHERE id = $1
                   UNION ALL
                   SELECT c.id FROM comments c JOIN tree t ON c.parent_id = t.id
               )
               DELETE FROM comments WHERE id IN (SELECT id FROM tree)"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }
}

#[async_trait]
impl OrderRepo for PgRepo {
    async fn create_order(&self, new: NewOrder) -> RepoResult<OrderDetail> {
        let wanted = tally_items(&new.items)?;
        let mut tx = self.pool.begin().await?;
        let mut prices: HashMap<Id, f64> = HashMap::new();
        let mut total = 0.0;
        // BTreeMap order keeps lock acquisition consistent across orders.
        for (product_id, qty) in &wanted {
            let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| RepoError::InvalidState(format!("product {product_id} is out of stock")))?;
            if product.status != ProductStatus::Active || product.stock < *qty {
                return Err(RepoError::InvalidState(format!("product {} is out of stock", product.name)));
            }
            total += product.price * *qty as f64;
            prices.insert(product.id, product.price);
        }
        let order = sqlx::query_as::<_, Order>(
            r#"INSERT INTO orders (order_number, user_id, total_amount, shipping_name, shipping_phone, shipping_address)
               VALUES ($1, $2, $3, $4, $5, $6) RETURNING *"#,
        )
        .bind(&new.order_number)
        .bind(new.user_id)
        .bind(total)
        .bind(&new.shipping_name)
        .bind(&new.shipping_phone)
        .bind(&new.shipping_address)
        .fetch_one(&mut *tx)
        .await?;
        for item in &new.items {
            sqlx::query("INSERT INTO order_items (order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4)")
                .bind(order.id)
                .bind(item.product_id)
                .bind(item.quantity)
                .bind(prices.get(&item.product_id).copied().unwrap_or_default())
                .execute(&mut *tx)
                .await?;
        }
        for (product_id, qty) in &wanted {
            sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
                .bind(product_id)
                .bind(qty)
                .execute(&mut *tx)
                .await?;
        }
        let detail = load_detail(&mut *tx, order).await?;
        tx.commit().await?;
        Ok(detail)
    }

    async fn list_orders(&self, user_id: Id) -> RepoResult<Vec<OrderDetail>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            out.push(load_detail(&mut *conn, order).await?);
        }
        Ok(out)
    }

    async fn get_order(&self, id: Id) -> RepoResult<OrderDetail> {
        let mut conn = self.pool.acquire().await?;
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;
        load_detail(&mut *conn, order).await
    }

    async fn update_order_status(&self, id: Id, next: OrderStatus, enforce: bool) -> RepoResult<Order> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if enforce {
            current.status.transition(next)?;
        }
        let order = sqlx::query_as::<_, Order>(
            r#"UPDATE orders SET status = $2::order_status,
                      shipped_at = CASE WHEN $2::order_status = 'SHIPPED' THEN now() ELSE shipped_at END,
                      completed_at = CASE WHEN $2::order_status = 'COMPLETED' THEN now() ELSE completed_at END,
                      paid_at = CASE WHEN $2::order_status = 'PAID' AND paid_at IS NULL THEN now() ELSE paid_at END
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(next)
        .fetch_one(&mut *tx)
        .await?;
        if next == OrderStatus::Completed && current.status != OrderStatus::Completed {
            sqlx::query(
                r#"INSERT INTO incomes (seller_id, order_id, amount, description)
                   SELECT p.seller_id, oi.order_id, oi.price * oi.quantity, 'order ' || $2::TEXT || ' income'
                   FROM order_items oi JOIN products p ON p.id = oi.product_id
                   WHERE oi.order_id = $1"#,
            )
            .bind(id)
            .bind(&order.order_number)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                r#"INSERT INTO expenses (user_id, order_id, amount, description)
                   SELECT $2::BIGINT, oi.order_id, oi.price * oi.quantity, 'purchase ' || p.name
                   FROM order_items oi JOIN products p ON p.id = oi.product_id
                   WHERE oi.order_id = $1"#,
            )
            .bind(id)
            .bind(order.user_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn settle_payment(&self, order_id: Id, user_id: Id, s: Settlement) -> RepoResult<PaymentReceipt> {
        let mut tx = self.pool.begin().await?;
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(order_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        if order.status != OrderStatus::PendingPayment {
            return Err(RepoError::InvalidState("order is not awaiting payment".into()));
        }
        let payment = sqlx::query_as::<_, Payment>(
            r#"INSERT INTO payments (order_id, user_id, amount, payment_method, payment_number, status, paid_at)
               VALUES ($1, $2, $3, $4, $5, $6, CASE WHEN $6::payment_status = 'SUCCESS' THEN now() END)
               RETURNING *"#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(order.total_amount)
        .bind(&s.payment_method)
        .bind(&s.payment_number)
        .bind(s.status)
        .fetch_one(&mut *tx)
        .await?;
        let order = if s.status == PaymentStatus::Success {
            sqlx::query_as::<_, Order>(
                r#"UPDATE orders SET status = 'PAID', payment_method = $2, payment_id = $3, paid_at = $4
                   WHERE id = $1 RETURNING *"#,
            )
            .bind(order_id)
            .bind(&s.payment_method)
            .bind(payment.id)
            .bind(payment.paid_at)
            .fetch_one(&mut *tx)
            .await?
        } else {
            order
        };
        let detail = load_detail(&mut *tx, order).await?;
        tx.commit().await?;
        Ok(PaymentReceipt { order: detail, payment })
    }

    async fn list_payments(&self, user_id: Id, order_id: Option<Id>) -> RepoResult<Vec<PaymentView>> {
        let recs = sqlx::query_as::<_, PaymentView>(
            r#"SELECT pm.*, o.order_number, o.total_amount
               FROM payments pm JOIN orders o ON o.id = pm.order_id
               WHERE pm.user_id = $1 AND ($2::BIGINT IS NULL OR pm.order_id = $2)
               ORDER BY pm.created_at DESC, pm.id DESC"#,
        )
        .bind(user_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

#[async_trait]
impl RefundRepo for PgRepo {
    async fn create_refund(&self, new: NewRefund) -> RepoResult<Refund> {
        let mut tx = self.pool.begin().await?;
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(new.order_id)
            .bind(new.user_id)
            .fetch_one(&mut *tx)
            .await?;
        if !order_refundable(order.status) {
            return Err(RepoError::InvalidState("order status does not allow refunds".into()));
        }
        let amount = refund_amount(new.amount, order.total_amount)?;
        let refund = sqlx::query_as::<_, Refund>(
            r#"INSERT INTO refunds (order_id, user_id, kind, reason, amount)
               VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
        )
        .bind(new.order_id)
        .bind(new.user_id)
        .bind(new.kind)
        .bind(&new.reason)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE orders SET status = 'REFUNDING' WHERE id = $1")
            .bind(new.order_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(refund)
    }

    async fn list_refunds(&self, user_id: Option<Id>, status: Option<RefundStatus>) -> RepoResult<Vec<RefundView>> {
        let recs = sqlx::query_as::<_, RefundView>(&format!(
            "{REFUND_VIEW} WHERE ($1::BIGINT IS NULL OR r.user_id = $1) \
             AND ($2::refund_status IS NULL OR r.status = $2) ORDER BY r.created_at DESC, r.id DESC"
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn decide_refund(&self, id: Id, d: RefundDecision) -> RepoResult<Refund> {
        let mut tx = self.pool.begin().await?;
        let current: RefundStatus = sqlx::query_scalar("SELECT status FROM refunds WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        current.transition(d.status)?;
        let refund = sqlx::query_as::<_, Refund>(
            r#"UPDATE refunds SET status = $2::refund_status, admin_note = COALESCE($3, admin_note),
                      approved_at = CASE WHEN $2::refund_status = 'APPROVED' AND status <> 'APPROVED'
                                         THEN now() ELSE approved_at END,
                      completed_at = CASE WHEN $2::refund_status = 'COMPLETED' AND status <> 'COMPLETED'
                                          THEN now() ELSE completed_at END
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(d.status)
        .bind(&d.admin_note)
        .fetch_one(&mut *tx)
        .await?;
        if refund.status == RefundStatus::Approved {
            sqlx::query("UPDATE orders SET status = 'REFUNDED' WHERE id = $1")
                .bind(refund.order_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(refund)
    }
}

#[async_trait]
impl ComplaintRepo for PgRepo {
    async fn create_complaint(&self, new: NewComplaint) -> RepoResult<Complaint> {
        if let Some(order_id) = new.order_id {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(RepoError::NotFound);
            }
        }
        let rec = sqlx::query_as::<_, Complaint>(
            r#"INSERT INTO complaints (user_id, order_id, kind, title, content)
               VALUES ($1, $2, $3, $4, $5) RETURNING *"#,
        )
        .bind(new.user_id)
        .bind(new.order_id)
        .bind(new.kind)
        .bind(&new.title)
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(rec)
    }

    async fn list_complaints(&self, q: ComplaintQuery) -> RepoResult<Vec<ComplaintView>> {
        let recs = sqlx::query_as::<_, ComplaintView>(
            r#"SELECT c.*, u.username, o.order_number
               FROM complaints c
               JOIN users u ON u.id = c.user_id
               LEFT JOIN orders o ON o.id = c.order_id
               WHERE ($1::BIGINT IS NULL OR c.user_id = $1)
                 AND ($2::complaint_kind IS NULL OR c.kind = $2)
                 AND ($3::complaint_status IS NULL OR c.status = $3)
               ORDER BY c.created_at DESC, c.id DESC"#,
        )
        .bind(q.user_id)
        .bind(q.kind)
        .bind(q.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn update_complaint(&self, id: Id, upd: ComplaintUpdate) -> RepoResult<Complaint> {
        let mut tx = self.pool.begin().await?;
        let current: ComplaintStatus = sqlx::query_scalar("SELECT status FROM complaints WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if let Some(next) = upd.status {
            current.transition(next)?;
        }
        let rec = sqlx::query_as::<_, Complaint>(
            r#"UPDATE complaints SET status = COALESCE($2, status), reply = COALESCE($3, reply),
                      replied_at = CASE WHEN $3::TEXT IS NOT NULL THEN now() ELSE replied_at END
               WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(upd.status)
        .bind(&upd.reply)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(rec)
    }
}

#[async_trait]
impl LedgerRepo for PgRepo {
    async fn list_expenses(&self, user_id: Id) -> RepoResult<Vec<Expense>> {
        let recs = sqlx::query_as::<_, Expense>(
            "SELECT * FROM expenses WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }

    async fn list_incomes(&self, seller_id: Id) -> RepoResult<Vec<Income>> {
        let recs = sqlx::query_as::<_, Income>(
            "SELECT * FROM incomes WHERE seller_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(recs)
    }
}

#[async_trait]
impl AuditRepo for PgRepo {
    async fn append_log(&self, entry: NewLog) -> RepoResult<()> {
        sqlx::query("INSERT INTO system_logs (level, module, message, user_id) VALUES ($1, $2, $3, $4)")
            .bind(entry.level)
            .bind(&entry.module)
            .bind(&entry.message)
            .bind(entry.user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_logs(&self, q: LogQuery) -> RepoResult<Paged<SystemLogView>> {
        const FILTER: &str = "WHERE ($1::log_level IS NULL OR l.level = $1) AND ($2::TEXT IS NULL OR l.module = $2)";
        let items = sqlx::query_as::<_, SystemLogView>(&format!(
            "SELECT l.*, u.username FROM system_logs l LEFT JOIN users u ON u.id = l.user_id {FILTER} \
             ORDER BY l.created_at DESC, l.id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(q.level)
        .bind(&q.module)
        .bind(q.page.limit)
        .bind(q.page.offset())
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM system_logs l {FILTER}"))
            .bind(q.level)
            .bind(&q.module)
            .fetch_one(&self.pool)
            .await?;
        Ok(Paged { items, total })
    }
}
