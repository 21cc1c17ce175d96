use serde::{Deserialize, Serialize};

use super::checkout::CartItemInput;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentOrderRequest {
    pub address_id: i32,
    pub items: Vec<CartItemInput>,
    pub coupon_code: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentOrderResponse {
    pub success: bool,
    pub order_id: i32,
    pub razorpay_order_id: String,
    /// Amount in paise, as the checkout widget expects
    pub amount: i64,
    pub currency: String,
    /// Public key id for the widget
    pub key: String,
}

/// Field names mirror the gateway checkout callback payload, which mixes
/// snake_case gateway fields with our camelCase order id.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "orderId")]
    pub order_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    pub order_id: i32,
    pub order_number: String,
}
