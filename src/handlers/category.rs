use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::AppState;
use crate::entities::{categories, prelude::*};
use crate::handlers::CurrentUser;
use crate::models::category::{CategoryResponse, CreateCategoryRequest};
use crate::models::error::{ApiError, conflict, internal_error};
use crate::services::util::slugify;

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let categories = Categories::find()
        .filter(categories::Column::IsActive.eq(true))
        .order_by_asc(categories::Column::SortOrder)
        .order_by_asc(categories::Column::Name)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

pub async fn create_category(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    user.require_admin()?;

    let slug = slugify(&payload.name);

    let existing = Categories::find()
        .filter(categories::Column::Slug.eq(&slug))
        .one(&state.db)
        .await
        .map_err(internal_error)?;
    if existing.is_some() {
        return Err(conflict("A category with this name already exists"));
    }

    let category = categories::ActiveModel {
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description),
        is_active: Set(payload.is_active.unwrap_or(true)),
        sort_order: Set(payload.sort_order.unwrap_or(0)),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(category.into())))
}
