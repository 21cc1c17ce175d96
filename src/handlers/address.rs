use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::AppState;
use crate::entities::{addresses, prelude::*};
use crate::handlers::CurrentUser;
use crate::models::address::{AddressResponse, CreateAddressRequest};
use crate::models::error::{ApiError, bad_request, internal_error};
use crate::services::util::{is_valid_phone, is_valid_pincode};

pub async fn list_addresses(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Vec<AddressResponse>>, ApiError> {
    let addresses = Addresses::find()
        .filter(addresses::Column::UserId.eq(user.id))
        .order_by_desc(addresses::Column::IsDefault)
        .order_by_asc(addresses::Column::Id)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(addresses.into_iter().map(Into::into).collect()))
}

pub async fn create_address(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<AddressResponse>), ApiError> {
    if !is_valid_phone(&payload.phone) {
        return Err(bad_request("Please enter a valid 10-digit phone number"));
    }
    if !is_valid_pincode(&payload.pincode) {
        return Err(bad_request("Please enter a valid 6-digit PIN code"));
    }

    let address = addresses::ActiveModel {
        user_id: Set(user.id),
        full_name: Set(payload.full_name),
        phone: Set(payload.phone),
        line1: Set(payload.line1),
        line2: Set(payload.line2),
        city: Set(payload.city),
        state: Set(payload.state),
        pincode: Set(payload.pincode),
        country: Set(payload.country.unwrap_or_else(|| "India".to_string())),
        is_default: Set(payload.is_default.unwrap_or(false)),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(address.into())))
}
