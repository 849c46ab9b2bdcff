//! In-process store. A single lock guards every table, so each repository
//! call is atomic with respect to every other call.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::*;

#[derive(Debug, Clone)]
struct StoredItem {
    id: Id,
    order_id: Id,
    product_id: Id,
    quantity: i32,
    price: f64,
}

#[derive(Default)]
struct State {
    users: HashMap<Id, User>,
    categories: HashMap<Id, Category>,
    products: HashMap<Id, Product>,
    reviews: HashMap<Id, ProductReview>,
    cart: HashMap<Id, CartItem>,
    favorites: HashMap<Id, Favorite>,
    post_categories: HashMap<Id, PostCategory>,
    posts: HashMap<Id, Post>,
    likes: Vec<PostLike>,
    shares: Vec<PostShare>,
    comments: HashMap<Id, Comment>,
    orders: HashMap<Id, Order>,
    order_items: Vec<StoredItem>,
    payments: HashMap<Id, Payment>,
    refunds: HashMap<Id, Refund>,
    complaints: HashMap<Id, Complaint>,
    incomes: Vec<Income>,
    expenses: Vec<Expense>,
    logs: Vec<SystemLog>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn username(&self, id: Id) -> String {
        self.users.get(&id).map(|u| u.username.clone()).unwrap_or_default()
    }

    fn category_name(&self, id: Id) -> Option<String> {
        self.categories.get(&id).map(|c| c.name.clone())
    }

    fn post_view(&self, p: &Post) -> PostView {
        PostView {
            post: p.clone(),
            author_username: self.username(p.author_id),
            category_name: p.category_id.and_then(|id| self.post_categories.get(&id)).map(|c| c.name.clone()),
            comment_count: self.comments.values().filter(|c| c.post_id == Some(p.id)).count() as i64,
        }
    }

    fn product_view(&self, p: &Product) -> ProductView {
        ProductView {
            product: p.clone(),
            seller_username: self.username(p.seller_id),
            category_name: self.category_name(p.category_id),
            sales_count: self
                .order_items
                .iter()
                .filter(|i| i.product_id == p.id)
                .map(|i| i.quantity as i64)
                .sum(),
        }
    }

    fn review_view(&self, r: &ProductReview) -> ReviewView {
        ReviewView { review: r.clone(), username: self.username(r.user_id) }
    }

    fn cart_line(&self, item: &CartItem) -> CartLine {
        let product = self.products.get(&item.product_id);
        CartLine {
            item: item.clone(),
            product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
            price: product.map(|p| p.price).unwrap_or_default(),
            stock: product.map(|p| p.stock).unwrap_or_default(),
            product_status: product.map(|p| p.status).unwrap_or(ProductStatus::Deleted),
        }
    }

    fn comment_view(&self, c: &Comment) -> CommentView {
        CommentView {
            comment: c.clone(),
            author_username: self.username(c.author_id),
            post_title: c.post_id.and_then(|id| self.posts.get(&id)).map(|p| p.title.clone()),
            product_name: c.product_id.and_then(|id| self.products.get(&id)).map(|p| p.name.clone()),
        }
    }

    fn order_item(&self, i: &StoredItem) -> OrderItem {
        let product = self.products.get(&i.product_id);
        OrderItem {
            id: i.id,
            order_id: i.order_id,
            product_id: i.product_id,
            quantity: i.quantity,
            price: i.price,
            product_name: product.map(|p| p.name.clone()).unwrap_or_default(),
            seller_id: product.map(|p| p.seller_id).unwrap_or_default(),
        }
    }

    fn order_detail(&self, o: &Order) -> OrderDetail {
        let mut items: Vec<_> = self
            .order_items
            .iter()
            .filter(|i| i.order_id == o.id)
            .map(|i| self.order_item(i))
            .collect();
        items.sort_by_key(|i| i.id);
        let mut payments: Vec<_> = self.payments.values().filter(|p| p.order_id == o.id).cloned().collect();
        payments.sort_by(|a, b| b.id.cmp(&a.id));
        OrderDetail { order: o.clone(), items, payments }
    }
}

fn paginate<T>(items: Vec<T>, page: Option<Pagination>) -> Paged<T> {
    let total = items.len() as i64;
    let items = match page {
        Some(p) => items.into_iter().skip(p.offset() as usize).take(p.limit as usize).collect(),
        None => items,
    };
    Paged { items, total }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
}

impl InMemRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        if s.users.values().any(|u| u.username == new.username || u.email == new.email) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            is_seller: new.is_seller,
            phone: new.phone,
            avatar: None,
            bio: None,
            created_at: Utc::now(),
        };
        s.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> RepoResult<User> {
        let s = self.read()?;
        s.users
            .values()
            .find(|u| u.username == login)
            .or_else(|| s.users.values().find(|u| u.email == login))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        let s = self.read()?;
        s.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update_profile(&self, id: Id, upd: UpdateProfile) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(phone) = upd.phone {
            user.phone = Some(phone);
        }
        if let Some(avatar) = upd.avatar {
            user.avatar = Some(avatar);
        }
        if let Some(bio) = upd.bio {
            user.bio = Some(bio);
        }
        Ok(user.clone())
    }

    async fn list_users(&self, q: UserQuery) -> RepoResult<Paged<UserSummary>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .users
            .values()
            .filter(|u| q.role.map_or(true, |r| u.role == r))
            .map(|u| UserSummary {
                id: u.id,
                username: u.username.clone(),
                email: u.email.clone(),
                role: u.role,
                is_seller: u.is_seller,
                created_at: u.created_at,
                order_count: s.orders.values().filter(|o| o.user_id == u.id).count() as i64,
                post_count: s.posts.values().filter(|p| p.author_id == u.id).count() as i64,
                product_count: s.products.values().filter(|p| p.seller_id == u.id).count() as i64,
            })
            .collect();
        v.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(paginate(v, Some(q.page)))
    }

    async fn update_access(&self, id: Id, upd: UserAccessUpdate) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(role) = upd.role {
            user.role = role;
        }
        if let Some(is_seller) = upd.is_seller {
            user.is_seller = is_seller;
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn list_categories(&self) -> RepoResult<Vec<Category>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.categories.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_category(&self, id: Id) -> RepoResult<Category> {
        let s = self.read()?;
        s.categories.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let mut s = self.write()?;
        if let Some(parent) = new.parent_id {
            if !s.categories.contains_key(&parent) {
                return Err(RepoError::NotFound);
            }
        }
        let id = s.next_id();
        let cat = Category { id, name: new.name, parent_id: new.parent_id };
        s.categories.insert(id, cat.clone());
        Ok(cat)
    }
}

#[async_trait]
impl ProductRepo for InMemRepo {
    async fn list_products(&self, q: ProductQuery) -> RepoResult<Paged<ProductView>> {
        let s = self.read()?;
        let keyword = q.keyword.as_deref().map(str::to_lowercase);
        let mut v: Vec<_> = s
            .products
            .values()
            .filter(|p| q.status.map_or(true, |st| p.status == st))
            .filter(|p| q.category_id.map_or(true, |c| p.category_id == c))
            .filter(|p| q.seller_id.map_or(true, |id| p.seller_id == id))
            .map(|p| s.product_view(p))
            .filter(|v| match &keyword {
                Some(k) => {
                    contains_ci(&v.product.name, k)
                        || contains_ci(&v.product.description, k)
                        || contains_ci(&v.seller_username, k)
                        || v.category_name.as_deref().map_or(false, |c| contains_ci(c, k))
                }
                None => true,
            })
            .collect();
        v.sort_by(|a, b| b.product.id.cmp(&a.product.id));
        Ok(paginate(v, q.page))
    }

    async fn product_stats(&self) -> RepoResult<ProductStats> {
        let s = self.read()?;
        let count = |st: ProductStatus| s.products.values().filter(|p| p.status == st).count() as i64;
        Ok(ProductStats {
            total: s.products.len() as i64,
            active: count(ProductStatus::Active),
            inactive: count(ProductStatus::Inactive),
            sold_out: count(ProductStatus::SoldOut),
        })
    }

    async fn get_product(&self, id: Id) -> RepoResult<ProductView> {
        let s = self.read()?;
        let p = s.products.get(&id).ok_or(RepoError::NotFound)?;
        Ok(s.product_view(p))
    }

    async fn create_product(&self, new: NewProduct) -> RepoResult<Product> {
        let mut s = self.write()?;
        if !s.categories.contains_key(&new.category_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let product = Product {
            id,
            seller_id: new.seller_id,
            category_id: new.category_id,
            name: new.name,
            description: new.description,
            price: new.price,
            stock: new.stock,
            status: new.status,
            rating: 0.0,
            review_count: 0,
            created_at: Utc::now(),
        };
        s.products.insert(id, product.clone());
        Ok(product)
    }

    async fn set_product_status(&self, id: Id, status: ProductStatus) -> RepoResult<Product> {
        let mut s = self.write()?;
        let p = s.products.get_mut(&id).ok_or(RepoError::NotFound)?;
        p.status = p.status.transition(status)?;
        Ok(p.clone())
    }
}

#[async_trait]
impl ReviewRepo for InMemRepo {
    async fn list_reviews(&self, product_id: Id, page: Pagination) -> RepoResult<Paged<ReviewView>> {
        let s = self.read()?;
        let mut v: Vec<_> =
            s.reviews.values().filter(|r| r.product_id == product_id).map(|r| s.review_view(r)).collect();
        v.sort_by(|a, b| b.review.id.cmp(&a.review.id));
        Ok(paginate(v, Some(page)))
    }

    async fn create_review(&self, new: NewReview) -> RepoResult<ReviewView> {
        let mut s = self.write()?;
        if !s.products.contains_key(&new.product_id) {
            return Err(RepoError::NotFound);
        }
        let duplicate = s.reviews.values().any(|r| {
            r.product_id == new.product_id && r.user_id == new.user_id && r.order_id == new.order_id
        });
        if duplicate {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let review = ProductReview {
            id,
            product_id: new.product_id,
            user_id: new.user_id,
            order_id: new.order_id,
            rating: new.rating,
            content: new.content,
            created_at: Utc::now(),
        };
        s.reviews.insert(id, review.clone());
        let ratings: Vec<i32> =
            s.reviews.values().filter(|r| r.product_id == new.product_id).map(|r| r.rating).collect();
        if let Some(p) = s.products.get_mut(&new.product_id) {
            p.rating = mean_rating(&ratings);
            p.review_count = ratings.len() as i64;
        }
        Ok(s.review_view(&review))
    }
}

#[async_trait]
impl CartRepo for InMemRepo {
    async fn list_cart(&self, user_id: Id) -> RepoResult<Vec<CartLine>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.cart.values().filter(|c| c.user_id == user_id).map(|c| s.cart_line(c)).collect();
        v.sort_by(|a, b| b.item.id.cmp(&a.item.id));
        Ok(v)
    }

    async fn add_to_cart(&self, user_id: Id, product_id: Id, quantity: i32) -> RepoResult<CartAdd> {
        let mut s = self.write()?;
        if !s.products.contains_key(&product_id) {
            return Err(RepoError::NotFound);
        }
        if let Some(item) = s.cart.values_mut().find(|c| c.user_id == user_id && c.product_id == product_id) {
            item.quantity = merged_quantity(item.quantity, quantity)?;
            return Ok(CartAdd { item: item.clone(), created: false });
        }
        let quantity = merged_quantity(0, quantity)?;
        let id = s.next_id();
        let item = CartItem { id, user_id, product_id, quantity, created_at: Utc::now() };
        s.cart.insert(id, item.clone());
        Ok(CartAdd { item, created: true })
    }

    async fn remove_cart_item(&self, user_id: Id, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        match s.cart.get(&id) {
            Some(item) if item.user_id == user_id => {
                s.cart.remove(&id);
                Ok(())
            }
            _ => Err(RepoError::NotFound),
        }
    }

    async fn clear_cart(&self, user_id: Id) -> RepoResult<u64> {
        let mut s = self.write()?;
        let before = s.cart.len();
        s.cart.retain(|_, c| c.user_id != user_id);
        Ok((before - s.cart.len()) as u64)
    }
}

#[async_trait]
impl FavoriteRepo for InMemRepo {
    async fn list_favorites(&self, user_id: Id, kind: Option<FavoriteKind>) -> RepoResult<Vec<Favorite>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .favorites
            .values()
            .filter(|f| f.user_id == user_id)
            .filter(|f| kind.map_or(true, |k| f.kind == k))
            .cloned()
            .collect();
        v.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(v)
    }

    async fn add_favorite(&self, user_id: Id, kind: FavoriteKind, target_id: Id) -> RepoResult<Favorite> {
        let mut s = self.write()?;
        if s.favorites.values().any(|f| f.user_id == user_id && f.kind == kind && f.target_id == target_id) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let favorite = Favorite { id, user_id, kind, target_id, created_at: Utc::now() };
        s.favorites.insert(id, favorite.clone());
        Ok(favorite)
    }

    async fn remove_favorite(&self, user_id: Id, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        match s.favorites.get(&id) {
            Some(f) if f.user_id == user_id => {
                s.favorites.remove(&id);
                Ok(())
            }
            _ => Err(RepoError::NotFound),
        }
    }
}

#[async_trait]
impl PostCategoryRepo for InMemRepo {
    async fn list_post_categories(&self) -> RepoResult<Vec<PostCategory>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.post_categories.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn create_post_category(&self, new: NewPostCategory) -> RepoResult<PostCategory> {
        let mut s = self.write()?;
        if s.post_categories.values().any(|c| c.name == new.name) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let category = PostCategory { id, name: new.name, description: new.description, created_at: Utc::now() };
        s.post_categories.insert(id, category.clone());
        Ok(category)
    }

    async fn update_post_category(&self, id: Id, upd: UpdatePostCategory) -> RepoResult<PostCategory> {
        let mut s = self.write()?;
        if let Some(name) = &upd.name {
            if s.post_categories.values().any(|c| c.id != id && &c.name == name) {
                return Err(RepoError::Conflict);
            }
        }
        let category = s.post_categories.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name {
            category.name = name;
        }
        if let Some(description) = upd.description {
            category.description = Some(description);
        }
        Ok(category.clone())
    }

    async fn delete_post_category(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        if !s.post_categories.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        if s.posts.values().any(|p| p.category_id == Some(id)) {
            return Err(RepoError::InvalidState("category still has posts".into()));
        }
        s.post_categories.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl PostRepo for InMemRepo {
    async fn list_posts(&self, q: PostQuery) -> RepoResult<Paged<PostView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .posts
            .values()
            .filter(|p| q.status.map_or(true, |st| p.status == st))
            .filter(|p| q.author_id.map_or(true, |a| p.author_id == a))
            .filter(|p| q.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| !q.news_only || p.is_news)
            .filter(|p| !q.hot_only || p.is_hot)
            .map(|p| s.post_view(p))
            .collect();
        if q.hot_only {
            v.sort_by(|a, b| b.post.likes.cmp(&a.post.likes).then(b.post.id.cmp(&a.post.id)));
        } else {
            v.sort_by(|a, b| b.post.id.cmp(&a.post.id));
        }
        Ok(paginate(v, q.page))
    }

    async fn get_post(&self, id: Id) -> RepoResult<Post> {
        let s = self.read()?;
        s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn view_post(&self, id: Id) -> RepoResult<PostDetail> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if post.status == PostStatus::Deleted {
            return Err(RepoError::NotFound);
        }
        post.views += 1;
        let post = post.clone();

        let approved = |c: &&Comment| c.status == CommentStatus::Approved;
        let mut roots: Vec<_> = s
            .comments
            .values()
            .filter(|c| c.post_id == Some(id) && c.parent_id.is_none())
            .filter(approved)
            .collect();
        roots.sort_by(|a, b| b.id.cmp(&a.id));
        let comments = roots
            .into_iter()
            .map(|root| {
                let mut replies: Vec<_> = s
                    .comments
                    .values()
                    .filter(|c| c.parent_id == Some(root.id))
                    .filter(approved)
                    .map(|c| s.comment_view(c))
                    .collect();
                replies.sort_by_key(|r| r.comment.id);
                CommentThread { comment: s.comment_view(root), replies }
            })
            .collect();
        Ok(PostDetail { post: s.post_view(&post), comments })
    }

    async fn create_post(&self, new: NewPost) -> RepoResult<PostView> {
        let mut s = self.write()?;
        if let Some(c) = new.category_id {
            if !s.post_categories.contains_key(&c) {
                return Err(RepoError::NotFound);
            }
        }
        let id = s.next_id();
        let now = Utc::now();
        let post = Post {
            id,
            author_id: new.author_id,
            category_id: new.category_id,
            title: new.title,
            content: new.content,
            content_type: new.content_type,
            status: new.status,
            likes: 0,
            shares: 0,
            views: 0,
            is_news: new.is_news,
            is_hot: false,
            created_at: now,
            updated_at: now,
        };
        s.posts.insert(id, post.clone());
        Ok(s.post_view(&post))
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
        let mut s = self.write()?;
        if let Some(c) = upd.category_id {
            if !s.post_categories.contains_key(&c) {
                return Err(RepoError::NotFound);
            }
        }
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(t) = upd.title {
            post.title = t;
        }
        if let Some(c) = upd.content {
            post.content = c;
        }
        if let Some(c) = upd.category_id {
            post.category_id = Some(c);
        }
        if let Some(ct) = upd.content_type {
            post.content_type = ct;
        }
        post.status = upd.status;
        post.updated_at = Utc::now();
        Ok(post.clone())
    }

    async fn set_post_status(&self, id: Id, status: PostStatus) -> RepoResult<Post> {
        let mut s = self.write()?;
        let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.status = post.status.transition(status)?;
        post.updated_at = Utc::now();
        Ok(post.clone())
    }
}

#[async_trait]
impl EngagementRepo for InMemRepo {
    async fn toggle_like(&self, post_id: Id, user_id: Id) -> RepoResult<bool> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&post_id) {
            return Err(RepoError::NotFound);
        }
        let existing = s.likes.iter().position(|l| l.post_id == post_id && l.user_id == user_id);
        let (liked, delta) = match existing {
            Some(idx) => {
                s.likes.swap_remove(idx);
                (false, -1)
            }
            None => {
                s.likes.push(PostLike { post_id, user_id, created_at: Utc::now() });
                (true, 1)
            }
        };
        if let Some(post) = s.posts.get_mut(&post_id) {
            post.likes += delta;
        }
        Ok(liked)
    }

    async fn has_liked(&self, post_id: Id, user_id: Id) -> RepoResult<bool> {
        let s = self.read()?;
        Ok(s.likes.iter().any(|l| l.post_id == post_id && l.user_id == user_id))
    }

    async fn record_share(&self, post_id: Id, user_id: Id) -> RepoResult<PostShare> {
        let mut s = self.write()?;
        if !s.posts.contains_key(&post_id) {
            return Err(RepoError::NotFound);
        }
        let id = s.next_id();
        let share = PostShare { id, post_id, user_id, created_at: Utc::now() };
        s.shares.push(share.clone());
        if let Some(post) = s.posts.get_mut(&post_id) {
            post.shares += 1;
        }
        Ok(share)
    }

    async fn count_likes(&self, post_id: Id) -> RepoResult<i64> {
        let s = self.read()?;
        Ok(s.likes.iter().filter(|l| l.post_id == post_id).count() as i64)
    }

    async fn count_shares(&self, post_id: Id) -> RepoResult<i64> {
        let s = self.read()?;
        Ok(s.shares.iter().filter(|l| l.post_id == post_id).count() as i64)
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn create_comment(&self, new: NewComment) -> RepoResult<CommentView> {
        let mut s = self.write()?;
        let target_ok = match (new.post_id, new.product_id) {
            (Some(p), None) => s.posts.contains_key(&p),
            (None, Some(p)) => s.products.contains_key(&p),
            _ => return Err(RepoError::InvalidState("comment needs exactly one target".into())),
        };
        if !target_ok {
            return Err(RepoError::NotFound);
        }
        if let Some(parent) = new.parent_id {
            if !s.comments.contains_key(&parent) {
                return Err(RepoError::NotFound);
            }
        }
        let id = s.next_id();
        let comment = Comment {
            id,
            author_id: new.author_id,
            post_id: new.post_id,
            product_id: new.product_id,
            parent_id: new.parent_id,
            content: new.content,
            status: new.status,
            created_at: Utc::now(),
        };
        s.comments.insert(id, comment.clone());
        Ok(s.comment_view(&comment))
    }

    async fn list_comments(&self, q: CommentQuery) -> RepoResult<Vec<CommentView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .comments
            .values()
            .filter(|c| q.status.map_or(true, |st| c.status == st))
            .filter(|c| q.author_id.map_or(true, |a| c.author_id == a))
            .map(|c| s.comment_view(c))
            .collect();
        v.sort_by(|a, b| b.comment.id.cmp(&a.comment.id));
        Ok(v)
    }

    async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment> {
        let mut s = self.write()?;
        let c = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
        c.status = c.status.transition(status)?;
        Ok(c.clone())
    }

    async fn delete_comment_tree(&self, id: Id, author: Option<Id>) -> RepoResult<u64> {
        let mut s = self.write()?;
        let root = s.comments.get(&id).ok_or(RepoError::NotFound)?;
        if author.map_or(false, |a| root.author_id != a) {
            return Err(RepoError::NotFound);
        }
        let mut doomed: HashSet<Id> = HashSet::from([id]);
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            for c in s.comments.values().filter(|c| c.parent_id == Some(parent)) {
                if doomed.insert(c.id) {
                    frontier.push(c.id);
                }
            }
        }
        s.comments.retain(|cid, _| !doomed.contains(cid));
        Ok(doomed.len() as u64)
    }
}

#[async_trait]
impl OrderRepo for InMemRepo {
    async fn create_order(&self, new: NewOrder) -> RepoResult<OrderDetail> {
        let mut s = self.write()?;
        let wanted = tally_items(&new.items)?;
        let mut total = 0.0;
        for (product_id, qty) in &wanted {
            let p = s.products.get(product_id).ok_or_else(|| {
                RepoError::InvalidState(format!("product {product_id} is out of stock"))
            })?;
            if p.status != ProductStatus::Active || p.stock < *qty {
                return Err(RepoError::InvalidState(format!("product {} is out of stock", p.name)));
            }
            total += p.price * *qty as f64;
        }

        let order_id = s.next_id();
        for item in new.items {
            let id = s.next_id();
            let price = s.products.get(&item.product_id).map(|p| p.price).unwrap_or_default();
            s.order_items.push(StoredItem {
                id,
                order_id,
                product_id: item.product_id,
                quantity: item.quantity,
                price,
            });
        }
        for (product_id, qty) in wanted {
            if let Some(p) = s.products.get_mut(&product_id) {
                p.stock -= qty;
            }
        }
        let order = Order {
            id: order_id,
            order_number: new.order_number,
            user_id: new.user_id,
            total_amount: total,
            status: OrderStatus::PendingPayment,
            payment_method: None,
            payment_id: None,
            shipping_name: new.shipping_name,
            shipping_phone: new.shipping_phone,
            shipping_address: new.shipping_address,
            paid_at: None,
            shipped_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        s.orders.insert(order_id, order.clone());
        Ok(s.order_detail(&order))
    }

    async fn list_orders(&self, user_id: Id) -> RepoResult<Vec<OrderDetail>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.orders.values().filter(|o| o.user_id == user_id).map(|o| s.order_detail(o)).collect();
        v.sort_by(|a, b| b.order.id.cmp(&a.order.id));
        Ok(v)
    }

    async fn get_order(&self, id: Id) -> RepoResult<OrderDetail> {
        let s = self.read()?;
        let o = s.orders.get(&id).ok_or(RepoError::NotFound)?;
        Ok(s.order_detail(o))
    }

    async fn update_order_status(&self, id: Id, next: OrderStatus, enforce: bool) -> RepoResult<Order> {
        let mut s = self.write()?;
        let now = Utc::now();
        let order = s.orders.get_mut(&id).ok_or(RepoError::NotFound)?;
        let prev = order.status;
        if enforce {
            prev.transition(next)?;
        }
        order.status = next;
        match next {
            OrderStatus::Shipped => order.shipped_at = Some(now),
            OrderStatus::Completed => order.completed_at = Some(now),
            OrderStatus::Paid if order.paid_at.is_none() => order.paid_at = Some(now),
            _ => {}
        }
        let order = order.clone();

        if next == OrderStatus::Completed && prev != OrderStatus::Completed {
            let items: Vec<_> = s
                .order_items
                .iter()
                .filter(|i| i.order_id == id)
                .map(|i| s.order_item(i))
                .collect();
            for item in items {
                let amount = item.price * item.quantity as f64;
                let income_id = s.next_id();
                s.incomes.push(Income {
                    id: income_id,
                    seller_id: item.seller_id,
                    order_id: id,
                    amount,
                    description: format!("order {} income", order.order_number),
                    created_at: now,
                });
                let expense_id = s.next_id();
                s.expenses.push(Expense {
                    id: expense_id,
                    user_id: order.user_id,
                    order_id: id,
                    amount,
                    description: format!("purchase {}", item.product_name),
                    created_at: now,
                });
            }
        }
        Ok(order)
    }

    async fn settle_payment(&self, order_id: Id, user_id: Id, st: Settlement) -> RepoResult<PaymentReceipt> {
        let mut s = self.write()?;
        let order = s.orders.get(&order_id).filter(|o| o.user_id == user_id).ok_or(RepoError::NotFound)?;
        if order.status != OrderStatus::PendingPayment {
            return Err(RepoError::InvalidState("order is not awaiting payment".into()));
        }
        let amount = order.total_amount;
        let now = Utc::now();
        let payment_id = s.next_id();
        let succeeded = st.status == PaymentStatus::Success;
        let payment = Payment {
            id: payment_id,
            order_id,
            user_id,
            amount,
            payment_method: st.payment_method.clone(),
            payment_number: st.payment_number,
            status: st.status,
            paid_at: succeeded.then_some(now),
            created_at: now,
        };
        s.payments.insert(payment_id, payment.clone());
        if succeeded {
            if let Some(order) = s.orders.get_mut(&order_id) {
                order.status = OrderStatus::Paid;
                order.payment_method = Some(st.payment_method);
                order.payment_id = Some(payment_id);
                order.paid_at = Some(now);
            }
        }
        let order = s.orders.get(&order_id).ok_or(RepoError::NotFound)?;
        Ok(PaymentReceipt { order: s.order_detail(order), payment })
    }

    async fn list_payments(&self, user_id: Id, order_id: Option<Id>) -> RepoResult<Vec<PaymentView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .filter(|p| order_id.map_or(true, |o| p.order_id == o))
            .map(|p| {
                let order = s.orders.get(&p.order_id);
                PaymentView {
                    payment: p.clone(),
                    order_number: order.map(|o| o.order_number.clone()).unwrap_or_default(),
                    total_amount: order.map(|o| o.total_amount).unwrap_or_default(),
                }
            })
            .collect();
        v.sort_by(|a, b| b.payment.id.cmp(&a.payment.id));
        Ok(v)
    }
}

#[async_trait]
impl RefundRepo for InMemRepo {
    async fn create_refund(&self, new: NewRefund) -> RepoResult<Refund> {
        let mut s = self.write()?;
        let order = s.orders.get(&new.order_id).filter(|o| o.user_id == new.user_id).ok_or(RepoError::NotFound)?;
        if !order_refundable(order.status) {
            return Err(RepoError::InvalidState("order status does not allow refunds".into()));
        }
        let amount = refund_amount(new.amount, order.total_amount)?;
        let id = s.next_id();
        let refund = Refund {
            id,
            order_id: new.order_id,
            user_id: new.user_id,
            kind: new.kind,
            reason: new.reason,
            amount,
            status: RefundStatus::Pending,
            admin_note: None,
            approved_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        s.refunds.insert(id, refund.clone());
        if let Some(order) = s.orders.get_mut(&new.order_id) {
            order.status = OrderStatus::Refunding;
        }
        Ok(refund)
    }

    async fn list_refunds(&self, user_id: Option<Id>, status: Option<RefundStatus>) -> RepoResult<Vec<RefundView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .refunds
            .values()
            .filter(|r| user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| status.map_or(true, |st| r.status == st))
            .map(|r| {
                let order = s.orders.get(&r.order_id);
                RefundView {
                    refund: r.clone(),
                    username: s.username(r.user_id),
                    order_number: order.map(|o| o.order_number.clone()).unwrap_or_default(),
                    order_status: order.map(|o| o.status).unwrap_or(OrderStatus::Refunding),
                }
            })
            .collect();
        v.sort_by(|a, b| b.refund.id.cmp(&a.refund.id));
        Ok(v)
    }

    async fn decide_refund(&self, id: Id, d: RefundDecision) -> RepoResult<Refund> {
        let mut s = self.write()?;
        let now = Utc::now();
        let refund = s.refunds.get_mut(&id).ok_or(RepoError::NotFound)?;
        let prev = refund.status;
        refund.status = prev.transition(d.status)?;
        if d.admin_note.is_some() {
            refund.admin_note = d.admin_note;
        }
        if d.status == RefundStatus::Approved && prev != RefundStatus::Approved {
            refund.approved_at = Some(now);
        }
        if d.status == RefundStatus::Completed && prev != RefundStatus::Completed {
            refund.completed_at = Some(now);
        }
        let refund = refund.clone();
        if refund.status == RefundStatus::Approved {
            if let Some(order) = s.orders.get_mut(&refund.order_id) {
                order.status = OrderStatus::Refunded;
            }
        }
        Ok(refund)
    }
}

#[async_trait]
impl ComplaintRepo for InMemRepo {
    async fn create_complaint(&self, new: NewComplaint) -> RepoResult<Complaint> {
        let mut s = self.write()?;
        if let Some(o) = new.order_id {
            if !s.orders.contains_key(&o) {
                return Err(RepoError::NotFound);
            }
        }
        let id = s.next_id();
        let complaint = Complaint {
            id,
            user_id: new.user_id,
            order_id: new.order_id,
            kind: new.kind,
            title: new.title,
            content: new.content,
            status: ComplaintStatus::Pending,
            reply: None,
            replied_at: None,
            created_at: Utc::now(),
        };
        s.complaints.insert(id, complaint.clone());
        Ok(complaint)
    }

    async fn list_complaints(&self, q: ComplaintQuery) -> RepoResult<Vec<ComplaintView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .complaints
            .values()
            .filter(|c| q.user_id.map_or(true, |u| c.user_id == u))
            .filter(|c| q.kind.map_or(true, |k| c.kind == k))
            .filter(|c| q.status.map_or(true, |st| c.status == st))
            .map(|c| ComplaintView {
                complaint: c.clone(),
                username: s.username(c.user_id),
                order_number: c.order_id.and_then(|o| s.orders.get(&o)).map(|o| o.order_number.clone()),
            })
            .collect();
        v.sort_by(|a, b| b.complaint.id.cmp(&a.complaint.id));
        Ok(v)
    }

    async fn update_complaint(&self, id: Id, upd: ComplaintUpdate) -> RepoResult<Complaint> {
        let mut s = self.write()?;
        let c = s.complaints.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(status) = upd.status {
            c.status = c.status.transition(status)?;
        }
        if let Some(reply) = upd.reply {
            c.reply = Some(reply);
            c.replied_at = Some(Utc::now());
        }
        Ok(c.clone())
    }
}

#[async_trait]
impl LedgerRepo for InMemRepo {
    async fn list_expenses(&self, user_id: Id) -> RepoResult<Vec<Expense>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.expenses.iter().filter(|e| e.user_id == user_id).cloned().collect();
        v.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(v)
    }

    async fn list_incomes(&self, seller_id: Id) -> RepoResult<Vec<Income>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.incomes.iter().filter(|i| i.seller_id == seller_id).cloned().collect();
        v.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(v)
    }
}

#[async_trait]
impl AuditRepo for InMemRepo {
    async fn append_log(&self, entry: NewLog) -> RepoResult<()> {
        let mut s = self.write()?;
        let id = s.next_id();
        s.logs.push(SystemLog {
            id,
            level: entry.level,
            module: entry.module,
            message: entry.message,
            user_id: entry.user_id,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_logs(&self, q: LogQuery) -> RepoResult<Paged<SystemLogView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .logs
            .iter()
            .filter(|l| q.level.map_or(true, |lv| l.level == lv))
            .filter(|l| q.module.as_deref().map_or(true, |m| l.module == m))
            .map(|l| SystemLogView { log: l.clone(), username: l.user_id.map(|u| s.username(u)) })
            .collect();
        v.sort_by(|a, b| b.log.id.cmp(&a.log.id));
        Ok(paginate(v, Some(q.page)))
    }
}
