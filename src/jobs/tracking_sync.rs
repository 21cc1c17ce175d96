//! Periodic carrier tracking poll. Orders that have an AWB but are not yet
//! delivered get their status refreshed from the aggregator, with a timeline
//! entry appended on every change.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use std::time::Duration;

use crate::entities::orders::OrderStatus;
use crate::entities::{order_timeline, orders, prelude::*};
use crate::services::shiprocket::ShiprocketClient;

const POLL_INTERVAL_SECS: u64 = 1800;

pub fn start_tracking_sync_job(db: DatabaseConnection, shiprocket: ShiprocketClient) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        // First tick fires immediately; skip it so boot stays quiet
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = sync_once(&db, &shiprocket).await {
                tracing::error!("Tracking sync pass failed: {}", e);
            }
        }
    });
}

async fn sync_once(
    db: &DatabaseConnection,
    shiprocket: &ShiprocketClient,
) -> Result<(), sea_orm::DbErr> {
    let in_transit = Orders::find()
        .filter(orders::Column::AwbNumber.is_not_null())
        .filter(orders::Column::Status.is_in([
            OrderStatus::Packed,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
        ]))
        .all(db)
        .await?;

    if in_transit.is_empty() {
        return Ok(());
    }

    tracing::debug!("Polling carrier tracking for {} orders", in_transit.len());

    for order in in_transit {
        let Some(awb) = order.awb_number.clone() else {
            continue;
        };

        let tracking = match shiprocket.track_by_awb(&awb).await {
            Ok(tracking) => tracking,
            Err(e) => {
                tracing::warn!(order = %order.order_number, "Tracking poll failed: {}", e);
                continue;
            }
        };

        let Some(carrier_status) = tracking.tracking_data.shipment_status else {
            continue;
        };
        let Some(new_status) = map_carrier_status(&carrier_status) else {
            continue;
        };
        if new_status == order.status {
            continue;
        }

        tracing::info!(
            order = %order.order_number,
            from = ?order.status,
            to = ?new_status,
            "Carrier status changed"
        );

        let now = Utc::now().fixed_offset();
        let order_id = order.id;
        let mut active = order.into_active_model();
        active.status = Set(new_status);
        active.updated_at = Set(now);
        active.update(db).await?;

        order_timeline::ActiveModel {
            order_id: Set(order_id),
            status: Set(new_status),
            message: Set(Some(format!("Carrier update: {}", carrier_status))),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    Ok(())
}

/// Maps the aggregator's free-text shipment status onto our order states.
/// Unknown strings map to None and leave the order untouched.
fn map_carrier_status(carrier_status: &str) -> Option<OrderStatus> {
    let normalized = carrier_status.trim().to_uppercase();
    match normalized.as_str() {
        "PICKED UP" | "PICKED_UP" | "SHIPPED" | "IN TRANSIT" | "IN_TRANSIT" | "REACHED AT DESTINATION HUB" => {
            Some(OrderStatus::Shipped)
        }
        "OUT FOR DELIVERY" | "OUT_FOR_DELIVERY" => Some(OrderStatus::OutForDelivery),
        "DELIVERED" => Some(OrderStatus::Delivered),
        "RTO INITIATED" | "RTO DELIVERED" | "RETURNED" => Some(OrderStatus::Returned),
        "CANCELED" | "CANCELLED" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_transit_states() {
        assert_eq!(map_carrier_status("In Transit"), Some(OrderStatus::Shipped));
        assert_eq!(map_carrier_status("PICKED UP"), Some(OrderStatus::Shipped));
        assert_eq!(
            map_carrier_status("Out For Delivery"),
            Some(OrderStatus::OutForDelivery)
        );
        assert_eq!(map_carrier_status("Delivered"), Some(OrderStatus::Delivered));
    }

    #[test]
    fn test_maps_return_and_cancel() {
        assert_eq!(map_carrier_status("RTO Initiated"), Some(OrderStatus::Returned));
        assert_eq!(map_carrier_status("Canceled"), Some(OrderStatus::Cancelled));
    }

    #[test]
    fn test_unknown_status_is_ignored() {
        assert_eq!(map_carrier_status("Manifest Generated"), None);
        assert_eq!(map_carrier_status(""), None);
    }
}
