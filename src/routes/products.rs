use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{required, AppState, PageQuery};
use crate::auth::{require_seller, Auth};
use crate::error::ApiError;
use crate::models::*;
use crate::repo::RepoError;
use crate::status::ProductStatus;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ProductListQuery {
    pub category_id: Option<Id>,
    pub keyword: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i32>,
    pub category_id: Option<Id>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    /// 1 to 5.
    pub rating: Option<i32>,
    pub content: Option<String>,
    pub order_id: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductListQuery),
    responses((status = 200, description = "Active products", body = ProductPage)),
    tag = "products"
)]
pub async fn list_products(
    data: web::Data<AppState>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let page = Pagination::new(q.page, q.limit, 10);
    let result = data
        .repo
        .list_products(ProductQuery {
            status: Some(ProductStatus::Active),
            category_id: q.category_id,
            keyword: q.keyword.filter(|k| !k.trim().is_empty()),
            seller_id: None,
            page: Some(page),
        })
        .await?;
    Ok(HttpResponse::Ok().json(ProductPage {
        products: result.items,
        total: result.total,
        page: page.page,
        limit: page.limit,
    }))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Id, Path, description = "Product id")),
    responses((status = 200, body = ProductView), (status = 404)),
    tag = "products"
)]
pub async fn get_product(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let product = data.repo.get_product(path.into_inner()).await?;
    if product.product.status == ProductStatus::Deleted {
        return Err(ApiError::NotFound("product not found".into()));
    }
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, body = Product),
        (status = 400, description = "Invalid input or unknown category"),
        (status = 403, description = "Not a seller")
    ),
    tag = "products"
)]
pub async fn create_product(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<CreateProductRequest>,
) -> Result<HttpResponse, ApiError> {
    let seller = require_seller(&auth, data.repo.as_ref()).await?;
    let body = payload.into_inner();
    let name = required("name", body.name.as_deref())?;
    let description = required("description", body.description.as_deref())?;
    let price = body.price.ok_or_else(|| ApiError::BadRequest("price is required".into()))?;
    if !price.is_finite() || price < 0.0 {
        return Err(ApiError::BadRequest("invalid price".into()));
    }
    let stock = body.stock.unwrap_or(0);
    if stock < 0 {
        return Err(ApiError::BadRequest("invalid stock".into()));
    }
    let category_id = body.category_id.ok_or_else(|| ApiError::BadRequest("category_id is required".into()))?;

    let new = NewProduct {
        seller_id: seller.user_id(),
        category_id,
        name,
        description,
        price,
        stock,
        status: ProductStatus::Active,
    };
    let product = data.repo.create_product(new).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::BadRequest("category not found".into()),
        other => other.into(),
    })?;
    log::info!("product {} listed by seller {}", product.id, product.seller_id);
    Ok(HttpResponse::Created().json(product))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/reviews",
    params(("id" = Id, Path, description = "Product id"), PageQuery),
    responses((status = 200, description = "Newest reviews first", body = ReviewPage)),
    tag = "products"
)]
pub async fn list_reviews(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.pagination(10);
    let result = data.repo.list_reviews(path.into_inner(), page).await?;
    Ok(HttpResponse::Ok().json(ReviewPage {
        reviews: result.items,
        total: result.total,
        page: page.page,
        limit: page.limit,
    }))
}

/// Stores the review and refreshes the product's average rating.
#[utoipa::path(
    post,
    path = "/api/products/{id}/reviews",
    params(("id" = Id, Path, description = "Product id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, body = ReviewView),
        (status = 400, description = "Rating outside 1-5, foreign order or already reviewed"),
        (status = 401),
        (status = 404)
    ),
    tag = "products"
)]
pub async fn create_review(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<CreateReviewRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = payload.into_inner();
    let rating = body.rating.filter(|r| (1..=5).contains(r));
    let Some(rating) = rating else {
        return Err(ApiError::BadRequest("rating must be between 1 and 5".into()));
    };
    if let Some(order_id) = body.order_id {
        let owned = match data.repo.get_order(order_id).await {
            Ok(detail) => detail.order.user_id == auth.user_id(),
            Err(RepoError::NotFound) => false,
            Err(e) => return Err(e.into()),
        };
        if !owned {
            return Err(ApiError::BadRequest("order not found".into()));
        }
    }
    let new = NewReview {
        product_id: path.into_inner(),
        user_id: auth.user_id(),
        order_id: body.order_id,
        rating,
        content: body.content.filter(|c| !c.trim().is_empty()),
    };
    let review = data.repo.create_review(new).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::NotFound("product not found".into()),
        RepoError::Conflict => ApiError::BadRequest("product already reviewed".into()),
        other => other.into(),
    })?;
    Ok(HttpResponse::Created().json(review))
}
