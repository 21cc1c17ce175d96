use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::HashMap;

use crate::AppState;
use crate::entities::{categories, prelude::*, product_images, products};
use crate::handlers::CurrentUser;
use crate::models::error::{ApiError, conflict, internal_error, not_found};
use crate::models::product::{
    CreateProductRequest, ProductDetailResponse, ProductListQuery, ProductListResponse,
    ProductSummary, SortBy, StockStatus, UpdateProductRequest,
};
use crate::services::util::{generate_sku, slugify};

const DEFAULT_PAGE_SIZE: u64 = 12;
const MAX_PAGE_SIZE: u64 = 50;

pub async fn list_products(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let mut select = Products::find();

    let show_inactive = query.include_inactive.unwrap_or(false)
        && user.map(|u| u.is_admin()).unwrap_or(false);
    if !show_inactive {
        select = select.filter(products::Column::IsActive.eq(true));
    }

    if let Some(category_slug) = &query.category {
        let category = Categories::find()
            .filter(categories::Column::Slug.eq(category_slug))
            .one(&state.db)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| not_found("Category not found"))?;
        select = select.filter(products::Column::CategoryId.eq(category.id));
    }

    if let Some(search) = &query.search {
        select = select.filter(products::Column::Name.contains(search));
    }
    if let Some(min_price) = query.min_price {
        select = select.filter(products::Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        select = select.filter(products::Column::Price.lte(max_price));
    }
    if let Some(featured) = query.featured {
        select = select.filter(products::Column::IsFeatured.eq(featured));
    }

    select = match query.sort_by {
        Some(SortBy::PriceAsc) => select.order_by_asc(products::Column::Price),
        Some(SortBy::PriceDesc) => select.order_by_desc(products::Column::Price),
        Some(SortBy::Newest) | None => select.order_by_desc(products::Column::CreatedAt),
    };

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);

    let paginator = select.paginate(&state.db, limit);
    let total = paginator.num_items().await.map_err(internal_error)?;
    let page_items = paginator
        .fetch_page(page - 1)
        .await
        .map_err(internal_error)?;

    // Primary image per product, one query for the whole page
    let ids: Vec<i32> = page_items.iter().map(|p| p.id).collect();
    let mut primary_images: HashMap<i32, String> = HashMap::new();
    if !ids.is_empty() {
        let images = ProductImages::find()
            .filter(product_images::Column::ProductId.is_in(ids))
            .filter(product_images::Column::IsPrimary.eq(true))
            .all(&state.db)
            .await
            .map_err(internal_error)?;
        for image in images {
            primary_images.entry(image.product_id).or_insert(image.url);
        }
    }

    let summaries = page_items
        .into_iter()
        .map(|p| ProductSummary {
            image: primary_images.get(&p.id).cloned(),
            stock_status: StockStatus::for_stock(p.stock, p.low_stock_threshold),
            id: p.id,
            name: p.name,
            slug: p.slug,
            price: p.price,
            compare_at_price: p.compare_at_price,
            sku: p.sku,
            is_featured: p.is_featured,
        })
        .collect();

    Ok(Json(ProductListResponse {
        products: summaries,
        total,
        page,
        limit,
    }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetailResponse>, ApiError> {
    let product = Products::find()
        .filter(products::Column::Slug.eq(&slug))
        .filter(products::Column::IsActive.eq(true))
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Product not found"))?;

    let category = Categories::find_by_id(product.category_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?;

    let images = ProductImages::find()
        .filter(product_images::Column::ProductId.eq(product.id))
        .order_by_asc(product_images::Column::SortOrder)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(ProductDetailResponse::from_parts(
        product, category, images,
    )))
}

pub async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductDetailResponse>), ApiError> {
    user.require_admin()?;

    let category = Categories::find_by_id(payload.category_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Category not found"))?;

    let slug = slugify(&payload.name);
    let sku = payload
        .sku
        .clone()
        .unwrap_or_else(|| generate_sku(&category.name, &payload.name));

    let existing = Products::find()
        .filter(
            products::Column::Slug
                .eq(&slug)
                .or(products::Column::Sku.eq(&sku)),
        )
        .one(&state.db)
        .await
        .map_err(internal_error)?;
    if existing.is_some() {
        return Err(conflict("A product with this slug or SKU already exists"));
    }

    let now = Utc::now().fixed_offset();
    let txn = state.db.begin().await.map_err(internal_error)?;

    let product = products::ActiveModel {
        name: Set(payload.name.clone()),
        slug: Set(slug),
        description: Set(payload.description.clone()),
        sku: Set(sku),
        price: Set(payload.price),
        compare_at_price: Set(payload.compare_at_price),
        stock: Set(payload.stock.unwrap_or(0)),
        low_stock_threshold: Set(payload.low_stock_threshold.unwrap_or(5)),
        category_id: Set(payload.category_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        is_featured: Set(payload.is_featured.unwrap_or(false)),
        tags: Set(serde_json::json!(payload.tags)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(internal_error)?;

    let mut images = Vec::with_capacity(payload.images.len());
    for (index, image) in payload.images.iter().enumerate() {
        let stored = product_images::ActiveModel {
            product_id: Set(product.id),
            url: Set(image.url.clone()),
            alt: Set(image.alt.clone().or_else(|| Some(payload.name.clone()))),
            is_primary: Set(index == 0),
            sort_order: Set(index as i32),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(internal_error)?;
        images.push(stored);
    }

    txn.commit().await.map_err(internal_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ProductDetailResponse::from_parts(
            product,
            Some(category),
            images,
        )),
    ))
}

pub async fn update_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductDetailResponse>, ApiError> {
    user.require_admin()?;

    let product = Products::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Product not found"))?;

    let mut active = product.into_active_model();
    if let Some(name) = payload.name {
        // Renames re-derive the slug, so they can collide like creations do
        let slug = slugify(&name);
        let duplicate = Products::find()
            .filter(products::Column::Slug.eq(&slug))
            .filter(products::Column::Id.ne(id))
            .one(&state.db)
            .await
            .map_err(internal_error)?;
        if duplicate.is_some() {
            return Err(conflict("A product with this slug already exists"));
        }
        active.slug = Set(slug);
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(compare_at_price) = payload.compare_at_price {
        active.compare_at_price = Set(Some(compare_at_price));
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(threshold) = payload.low_stock_threshold {
        active.low_stock_threshold = Set(threshold);
    }
    if let Some(category_id) = payload.category_id {
        active.category_id = Set(category_id);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(is_featured) = payload.is_featured {
        active.is_featured = Set(is_featured);
    }
    if let Some(tags) = payload.tags {
        active.tags = Set(serde_json::json!(tags));
    }
    active.updated_at = Set(Utc::now().fixed_offset());

    let updated = active.update(&state.db).await.map_err(internal_error)?;

    let category = Categories::find_by_id(updated.category_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?;
    let images = ProductImages::find()
        .filter(product_images::Column::ProductId.eq(updated.id))
        .order_by_asc(product_images::Column::SortOrder)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(ProductDetailResponse::from_parts(
        updated, category, images,
    )))
}

pub async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    user.require_admin()?;

    let result = Products::delete_by_id(id)
        .exec(&state.db)
        .await
        .map_err(internal_error)?;

    if result.rows_affected == 0 {
        return Err(not_found("Product not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{admin_user, test_state};
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn sample_product(id: i32, name: &str, slug: &str) -> products::Model {
        products::Model {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            sku: format!("SKU-{}", id),
            price: dec!(299),
            compare_at_price: None,
            stock: 10,
            low_stock_threshold: 5,
            category_id: 1,
            is_active: true,
            is_featured: false,
            tags: serde_json::json!([]),
            created_at: chrono::Utc::now().fixed_offset(),
            updated_at: chrono::Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_rename_onto_existing_slug_conflicts() {
        // Renaming product 2 to "Brass Diya" collides with product 1's slug
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![sample_product(2, "Copper Diya", "copper-diya")],
                vec![sample_product(1, "Brass Diya", "brass-diya")],
            ])
            .into_connection();

        let payload = UpdateProductRequest {
            name: Some("Brass Diya".to_string()),
            description: None,
            price: None,
            compare_at_price: None,
            stock: None,
            low_stock_threshold: None,
            category_id: None,
            is_active: None,
            is_featured: None,
            tags: None,
        };

        let err = update_product(State(test_state(db)), admin_user(), Path(2), Json(payload))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }
}
