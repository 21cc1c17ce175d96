use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::orders::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{order_items, order_timeline};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: i32,
    pub name: String,
    pub sku: String,
    pub price: Decimal,
    pub quantity: i32,
    pub total: Decimal,
}

impl From<order_items::Model> for OrderItemResponse {
    fn from(item: order_items::Model) -> Self {
        Self {
            product_id: item.product_id,
            name: item.name,
            sku: item.sku,
            price: item.price,
            quantity: item.quantity,
            total: item.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntryResponse {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<FixedOffset>,
}

impl From<order_timeline::Model> for TimelineEntryResponse {
    fn from(entry: order_timeline::Model) -> Self {
        Self {
            status: entry.status,
            message: entry.message,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i32,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awb_number: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub timeline: Vec<TimelineEntryResponse>,
}

impl OrderResponse {
    pub fn from_parts(
        order: orders::Model,
        items: Vec<order_items::Model>,
        timeline: Vec<order_timeline::Model>,
    ) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            discount: order.discount,
            total: order.total,
            awb_number: order.awb_number,
            created_at: order.created_at,
            items: items.into_iter().map(Into::into).collect(),
            timeline: timeline.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub message: Option<String>,
}
