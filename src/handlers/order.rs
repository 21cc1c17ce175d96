use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashMap;

use crate::AppState;
use crate::entities::orders::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order_items, order_timeline, orders, prelude::*};
use crate::handlers::CurrentUser;
use crate::models::error::{ApiError, bad_request, internal_error, not_found};
use crate::models::order::{OrderListResponse, OrderResponse, UpdateOrderStatusRequest};
use crate::services::inventory::restock;

pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<OrderListResponse>, ApiError> {
    let orders = Orders::find()
        .filter(orders::Column::UserId.eq(user.id))
        .order_by_desc(orders::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    let ids: Vec<i32> = orders.iter().map(|o| o.id).collect();
    let mut items_by_order: HashMap<i32, Vec<order_items::Model>> = HashMap::new();
    if !ids.is_empty() {
        let items = OrderItems::find()
            .filter(order_items::Column::OrderId.is_in(ids))
            .all(&state.db)
            .await
            .map_err(internal_error)?;
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }
    }

    let responses = orders
        .into_iter()
        .map(|order| {
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            OrderResponse::from_parts(order, items, Vec::new())
        })
        .collect();

    Ok(Json(OrderListResponse { orders: responses }))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = load_order_for(&state, &user, id).await?;

    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(order.id))
        .all(&state.db)
        .await
        .map_err(internal_error)?;
    let timeline = OrderTimeline::find()
        .filter(order_timeline::Column::OrderId.eq(order.id))
        .order_by_asc(order_timeline::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(OrderResponse::from_parts(order, items, timeline)))
}

/// Loads an order visible to `user`: owners see their own orders, admins see
/// everything. Missing and foreign orders are indistinguishable (both 404).
pub(super) async fn load_order_for(
    state: &AppState,
    user: &CurrentUser,
    id: i32,
) -> Result<orders::Model, ApiError> {
    let order = Orders::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order not found"))?;

    if order.user_id != user.id && !user.is_admin() {
        return Err(not_found("Order not found"));
    }

    Ok(order)
}

pub async fn update_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    user.require_admin()?;

    let order = Orders::find_by_id(id)
        .one(&state.db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Order not found"))?;

    if order.status == payload.status {
        return Err(bad_request("Order is already in this status"));
    }
    if order.status.is_terminal() {
        return Err(bad_request("Order is in a final status"));
    }

    let previous_status = order.status;
    let was_paid = order.payment_status == PaymentStatus::Paid;
    let payment_method = order.payment_method;
    let remote_shipment = order.shiprocket_order_id.clone();
    // COD orders reserve stock at creation; gateway orders only once paid
    let stock_reserved = payment_method == PaymentMethod::Cod || was_paid;
    let now = Utc::now().fixed_offset();
    let txn = state.db.begin().await.map_err(internal_error)?;

    let mut active = order.into_active_model();
    active.status = Set(payload.status);
    active.updated_at = Set(now);

    // Cancelling before dispatch returns reserved stock; a paid order also
    // gets flagged for refund. Unpaid gateway orders never held stock, so
    // there is nothing to put back.
    if payload.status == OrderStatus::Cancelled && !previous_status.is_shipped() {
        if stock_reserved {
            let items = OrderItems::find()
                .filter(order_items::Column::OrderId.eq(id))
                .all(&txn)
                .await
                .map_err(internal_error)?;
            for item in &items {
                restock(&txn, item.product_id, item.quantity)
                    .await
                    .map_err(internal_error)?;
            }
        }
        if was_paid {
            active.payment_status = Set(PaymentStatus::Refunded);
        }
    }
    // COD collects on delivery; gateway orders only become paid through verify
    if payload.status == OrderStatus::Delivered
        && payment_method == PaymentMethod::Cod
        && !was_paid
    {
        active.payment_status = Set(PaymentStatus::Paid);
        active.paid_at = Set(Some(now));
    }

    let updated = active.update(&txn).await.map_err(internal_error)?;

    order_timeline::ActiveModel {
        order_id: Set(updated.id),
        status: Set(payload.status),
        message: Set(payload.message.clone()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(internal_error)?;

    txn.commit().await.map_err(internal_error)?;

    // Cancel the aggregator-side order too; local state stays authoritative
    if payload.status == OrderStatus::Cancelled {
        if let Some(remote_id) = remote_shipment {
            if let Err(e) = state.shiprocket.cancel_order(&[remote_id]).await {
                tracing::warn!(order = %updated.order_number, "Remote shipment cancel failed: {}", e);
            }
        }
    }

    if let Ok(Some(customer)) = Users::find_by_id(updated.user_id).one(&state.db).await {
        state
            .mailer
            .send_status_update(&customer.email, &updated.order_number, updated.status)
            .await;
    }

    let items = OrderItems::find()
        .filter(order_items::Column::OrderId.eq(updated.id))
        .all(&state.db)
        .await
        .map_err(internal_error)?;
    let timeline = OrderTimeline::find()
        .filter(order_timeline::Column::OrderId.eq(updated.id))
        .order_by_asc(order_timeline::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(internal_error)?;

    Ok(Json(OrderResponse::from_parts(updated, items, timeline)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::users::{self, UserRole};
    use crate::handlers::{admin_user, test_state};
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn gateway_order(status: OrderStatus, payment_status: PaymentStatus) -> orders::Model {
        orders::Model {
            id: 1,
            order_number: "DBSTEST1234".to_string(),
            user_id: 7,
            address_id: 1,
            status,
            payment_method: PaymentMethod::Razorpay,
            payment_status,
            subtotal: dec!(450),
            shipping_cost: dec!(49),
            discount: dec!(0),
            total: dec!(499),
            coupon_id: None,
            notes: None,
            razorpay_order_id: Some("order_rzp1".to_string()),
            razorpay_payment_id: None,
            razorpay_signature: None,
            shiprocket_order_id: None,
            shipment_id: None,
            awb_number: None,
            paid_at: None,
            created_at: chrono::Utc::now().fixed_offset(),
            updated_at: chrono::Utc::now().fixed_offset(),
        }
    }

    fn timeline_entry(status: OrderStatus) -> order_timeline::Model {
        order_timeline::Model {
            id: 1,
            order_id: 1,
            status,
            message: None,
            created_at: chrono::Utc::now().fixed_offset(),
        }
    }

    fn customer() -> users::Model {
        users::Model {
            id: 7,
            email: "user@example.com".to_string(),
            name: None,
            phone: None,
            role: UserRole::Customer,
            email_verified_at: None,
            created_at: chrono::Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_cancelling_unpaid_gateway_order_does_not_restock() {
        let pending = gateway_order(OrderStatus::Pending, PaymentStatus::Pending);
        let cancelled = orders::Model {
            status: OrderStatus::Cancelled,
            ..pending.clone()
        };
        let entry = timeline_entry(OrderStatus::Cancelled);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending], vec![cancelled]])
            .append_query_results([vec![entry.clone()]])
            .append_query_results([vec![customer()]])
            .append_query_results([Vec::<order_items::Model>::new()])
            .append_query_results([vec![entry]])
            .into_connection();

        let state = test_state(db);
        let response = update_status(
            State(state.clone()),
            admin_user(),
            Path(1),
            Json(UpdateOrderStatusRequest {
                status: OrderStatus::Cancelled,
                message: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.status, OrderStatus::Cancelled);

        // Stock was never reserved for this order, so nothing may touch it
        let log = format!("{:?}", state.db.into_transaction_log());
        assert!(!log.contains("\"products\""));
    }

    #[tokio::test]
    async fn test_delivering_unpaid_gateway_order_keeps_payment_pending() {
        let shipped = gateway_order(OrderStatus::Shipped, PaymentStatus::Pending);
        let delivered = orders::Model {
            status: OrderStatus::Delivered,
            ..shipped.clone()
        };
        let entry = timeline_entry(OrderStatus::Delivered);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![shipped], vec![delivered]])
            .append_query_results([vec![entry.clone()]])
            .append_query_results([vec![customer()]])
            .append_query_results([Vec::<order_items::Model>::new()])
            .append_query_results([vec![entry]])
            .into_connection();

        let state = test_state(db);
        update_status(
            State(state.clone()),
            admin_user(),
            Path(1),
            Json(UpdateOrderStatusRequest {
                status: OrderStatus::Delivered,
                message: None,
            }),
        )
        .await
        .unwrap();

        // Only verify may mark a gateway order paid
        let log = format!("{:?}", state.db.into_transaction_log());
        assert!(!log.contains("PAID"));
    }
}
