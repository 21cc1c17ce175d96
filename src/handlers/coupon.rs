use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::AppState;
use crate::entities::{coupons, prelude::*};
use crate::handlers::CurrentUser;
use crate::models::coupon::{
    ApplyCouponRequest, ApplyCouponResponse, CouponResponse, CreateCouponRequest,
};
use crate::models::error::{ApiError, bad_request, conflict, internal_error};
use crate::services::pricing::coupon_discount;

/// Cart-preview discount check. The same validation runs again at checkout;
/// this endpoint only exists so the cart can show the discount up front.
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<Json<ApplyCouponResponse>, ApiError> {
    let code = payload.code.trim().to_uppercase();

    let coupon = Coupons::find()
        .filter(coupons::Column::Code.eq(&code))
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| bad_request("Invalid coupon code"))?;

    let discount =
        coupon_discount(&coupon, payload.subtotal).map_err(|e| bad_request(e.to_string()))?;

    Ok(Json(ApplyCouponResponse {
        code,
        discount,
        message: "Coupon applied".to_string(),
    }))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<CouponResponse>>, ApiError> {
    user.require_admin()?;

    let coupons = Coupons::find()
        .order_by_asc(coupons::Column::Code)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(coupons.into_iter().map(Into::into).collect()))
}

pub async fn create_coupon(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<CouponResponse>), ApiError> {
    user.require_admin()?;

    let code = payload.code.trim().to_uppercase();
    if code.len() < 3 {
        return Err(bad_request("Code must be at least 3 characters"));
    }
    if payload.discount_value <= rust_decimal::Decimal::ZERO {
        return Err(bad_request("Discount value must be positive"));
    }

    let existing = Coupons::find()
        .filter(coupons::Column::Code.eq(&code))
        .one(&state.db)
        .await
        .map_err(internal_error)?;
    if existing.is_some() {
        return Err(conflict("A coupon with this code already exists"));
    }

    let coupon = coupons::ActiveModel {
        code: Set(code),
        description: Set(payload.description),
        discount_type: Set(payload.discount_type),
        discount_value: Set(payload.discount_value),
        min_order_amount: Set(payload.min_order_amount),
        max_discount: Set(payload.max_discount),
        usage_limit: Set(payload.usage_limit),
        used_count: Set(0),
        starts_at: Set(payload.starts_at),
        expires_at: Set(payload.expires_at),
        is_active: Set(payload.is_active.unwrap_or(true)),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(coupon.into())))
}
