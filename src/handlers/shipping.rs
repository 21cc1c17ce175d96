use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};

use crate::AppState;
use crate::entities::orders::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order_items, order_timeline, prelude::*};
use crate::handlers::CurrentUser;
use crate::handlers::order::load_order_for;
use crate::models::error::{ApiError, bad_request, conflict, internal_error, not_found, upstream_error};
use crate::models::shipping::{
    CourierListResponse, CourierOptionResponse, OrderTrackingResponse, ShipOrderRequest,
    ShipOrderResponse, TrackingScanResponse,
};
use crate::services::shiprocket::ShipmentOrderRequest;

/// Courier options serviceable for the order's destination, so the admin can
/// pick one before shipping. Weight matches the flat parcel weight used in
/// the shipment payload.
pub async fn list_couriers(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<CourierListResponse>, ApiError> {
    user.require_admin()?;

    let order = Orders::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order not found"))?;
    let address = Addresses::find_by_id(order.address_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| internal_error("order has no address"))?;

    let cod = order.payment_method == PaymentMethod::Cod;
    let serviceability = state
        .shiprocket
        .check_serviceability(&address.pincode, 0.5, cod)
        .await
        .map_err(|e| {
            tracing::error!(order = %order.order_number, "Serviceability check failed: {}", e);
            upstream_error("Shipping aggregator unavailable, please try again")
        })?;

    Ok(Json(CourierListResponse {
        couriers: serviceability
            .data
            .available_courier_companies
            .into_iter()
            .map(|option| CourierOptionResponse {
                courier_id: option.courier_company_id,
                name: option.courier_name,
                rate: option.rate,
                estimated_delivery_days: option.estimated_delivery_days,
            })
            .collect(),
    }))
}

/// Hands the order to the shipping aggregator: creates the remote shipment,
/// optionally assigns an AWB with the requested courier, and schedules pickup.
/// AWB assignment and pickup are best-effort; the shipment itself is not.
pub async fn ship_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
    Json(payload): Json<ShipOrderRequest>,
) -> Result<Json<ShipOrderResponse>, ApiError> {
    user.require_admin()?;

    let order = Orders::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order not found"))?;

    if order.shipment_id.is_some() {
        return Err(conflict("A shipment already exists for this order"));
    }
    if order.status == OrderStatus::Cancelled || order.status.is_shipped() {
        return Err(bad_request("Order cannot be shipped in its current status"));
    }
    if order.payment_method == PaymentMethod::Razorpay
        && order.payment_status != PaymentStatus::Paid
    {
        return Err(bad_request("Order has not been paid yet"));
    }

    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&state.db)
        .await
        .map_err(internal_error)?;
    let address = Addresses::find_by_id(order.address_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| internal_error("order has no address"))?;
    let customer = Users::find_by_id(order.user_id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| internal_error("order has no user"))?;

    let request = ShipmentOrderRequest::from_order(&order, &items, &address, &customer.email);
    let shipment = state.shiprocket.create_order(&request).await.map_err(|e| {
        tracing::error!(order = %order.order_number, "Shipment creation failed: {}", e);
        upstream_error("Shipping aggregator unavailable, please try again")
    })?;

    let now = Utc::now().fixed_offset();
    let order_number = order.order_number.clone();
    let mut active = order.into_active_model();
    active.shiprocket_order_id = Set(Some(shipment.order_id.to_string()));
    active.shipment_id = Set(Some(shipment.shipment_id.to_string()));
    active.status = Set(OrderStatus::Packed);
    active.updated_at = Set(now);

    let mut status = OrderStatus::Packed;
    let mut timeline_message = "Shipment created, awaiting courier assignment".to_string();
    let mut awb_number = None;

    match state
        .shiprocket
        .assign_awb(shipment.shipment_id, payload.courier_id)
        .await
    {
        Ok(assignment) => {
            awb_number = Some(assignment.awb_code.clone());
            active.awb_number = Set(Some(assignment.awb_code.clone()));
            active.status = Set(OrderStatus::Shipped);
            status = OrderStatus::Shipped;
            timeline_message = format!("Shipped via courier, AWB {}", assignment.awb_code);
        }
        Err(e) => {
            tracing::warn!(order = %order_number, "AWB assignment failed: {}", e);
        }
    }

    let updated = active.update(&state.db).await.map_err(internal_error)?;

    order_timeline::ActiveModel {
        order_id: Set(updated.id),
        status: Set(status),
        message: Set(Some(timeline_message)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(internal_error)?;

    if let Err(e) = state.shiprocket.request_pickup(shipment.shipment_id).await {
        tracing::warn!(order = %order_number, "Pickup scheduling failed: {}", e);
    }

    if status == OrderStatus::Shipped {
        state
            .mailer
            .send_status_update(&customer.email, &order_number, status)
            .await;
    }

    Ok(Json(ShipOrderResponse {
        success: true,
        shipment_id: shipment.shipment_id.to_string(),
        awb_number,
        status,
    }))
}

/// Order timeline plus live carrier scans when an AWB exists. Carrier
/// tracking failures degrade to an empty scan list.
pub async fn track_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<OrderTrackingResponse>, ApiError> {
    let order = load_order_for(&state, &user, id).await?;

    let timeline = OrderTimeline::find()
        .filter(order_timeline::Column::OrderId.eq(order.id))
        .order_by_asc(order_timeline::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    let mut scans = Vec::new();
    if let Some(awb) = &order.awb_number {
        match state.shiprocket.track_by_awb(awb).await {
            Ok(tracking) => {
                scans = tracking
                    .tracking_data
                    .shipment_track
                    .into_iter()
                    .map(|scan| TrackingScanResponse {
                        activity: scan.activity,
                        date: scan.date,
                        location: scan.location,
                    })
                    .collect();
            }
            Err(e) => {
                tracing::warn!(order = %order.order_number, "Carrier tracking failed: {}", e);
            }
        }
    }

    Ok(Json(OrderTrackingResponse {
        order_number: order.order_number,
        status: order.status,
        awb_number: order.awb_number,
        timeline: timeline.into_iter().map(Into::into).collect(),
        scans,
    }))
}
