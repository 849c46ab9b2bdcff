use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;
use crate::error::ApiError;
use crate::models::{Category, Id, PostCategory};

/// Name of the synthetic group that collects children of missing parents.
pub const ORPHAN_BUCKET: &str = "其他";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryNode {
    /// `None` only for the orphan bucket.
    pub id: Option<Id>,
    pub name: String,
    pub parent_id: Option<Id>,
    pub children: Vec<Category>,
}

/// Two-level tree: each root carries its direct children, in input order.
/// Children whose parent is absent are gathered under a trailing
/// [`ORPHAN_BUCKET`] node.
pub fn build_tree(categories: &[Category]) -> Vec<CategoryNode> {
    let (roots, children): (Vec<&Category>, Vec<&Category>) =
        categories.iter().partition(|c| c.parent_id.is_none());

    let mut tree: Vec<CategoryNode> = roots
        .iter()
        .map(|root| CategoryNode {
            id: Some(root.id),
            name: root.name.clone(),
            parent_id: None,
            children: children.iter().filter(|c| c.parent_id == Some(root.id)).map(|c| (*c).clone()).collect(),
        })
        .collect();

    let orphans: Vec<Category> = children
        .iter()
        .filter(|c| !roots.iter().any(|r| Some(r.id) == c.parent_id))
        .map(|c| (*c).clone())
        .collect();
    if !orphans.is_empty() {
        tree.push(CategoryNode { id: None, name: ORPHAN_BUCKET.to_string(), parent_id: None, children: orphans });
    }
    tree
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses((status = 200, description = "Category tree", body = [CategoryNode])),
    tag = "categories"
)]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = data.repo.list_categories().await?;
    Ok(HttpResponse::Ok().json(build_tree(&categories)))
}

#[utoipa::path(
    get,
    path = "/api/post-categories",
    responses((status = 200, description = "Post categories by name", body = [PostCategory])),
    tag = "categories"
)]
pub async fn list_post_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = data.repo.list_post_categories().await?;
    Ok(HttpResponse::Ok().json(categories))
}
