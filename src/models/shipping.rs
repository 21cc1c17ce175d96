use serde::{Deserialize, Serialize};

use super::order::TimelineEntryResponse;
use crate::entities::orders::OrderStatus;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipOrderRequest {
    /// Courier company id from the serviceability check; aggregator picks
    /// when absent
    pub courier_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipOrderResponse {
    pub success: bool,
    pub shipment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awb_number: Option<String>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierOptionResponse {
    pub courier_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_days: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierListResponse {
    pub couriers: Vec<CourierOptionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingScanResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTrackingResponse {
    pub order_number: String,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awb_number: Option<String>,
    pub timeline: Vec<TimelineEntryResponse>,
    /// Live carrier scans, present only when an AWB exists
    #[serde(default)]
    pub scans: Vec<TrackingScanResponse>,
}
