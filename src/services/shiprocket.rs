//! Shipping aggregator client (Shiprocket-compatible API).
//!
//! Auth is a bearer token obtained from email/password login, valid for ten
//! days; the token is cached behind an RwLock and refreshed on expiry.

use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

use crate::entities::{addresses, order_items, orders};

const DEFAULT_BASE_URL: &str = "https://apiv2.shiprocket.in/v1/external";
// Aggregator tokens are valid for 10 days
const TOKEN_TTL_SECS: u64 = 10 * 24 * 60 * 60;

type ServiceResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone)]
pub struct ShiprocketClient {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    /// Origin pincode used for serviceability lookups
    pickup_pincode: String,
    cache: Arc<RwLock<TokenCache>>,
}

struct TokenCache {
    token: Option<String>,
    fetched_at: SystemTime,
}

impl TokenCache {
    fn new() -> Self {
        Self {
            token: None,
            fetched_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn valid(&self) -> Option<&str> {
        let token = self.token.as_deref()?;
        match self.fetched_at.elapsed() {
            Ok(elapsed) if elapsed.as_secs() < TOKEN_TTL_SECS => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// Ad-hoc shipment order payload. Field names match the aggregator's API.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentOrderRequest {
    pub order_id: String,
    pub order_date: String,
    pub pickup_location: String,
    pub billing_customer_name: String,
    pub billing_last_name: String,
    pub billing_address: String,
    pub billing_address_2: String,
    pub billing_city: String,
    pub billing_pincode: String,
    pub billing_state: String,
    pub billing_country: String,
    pub billing_email: String,
    pub billing_phone: String,
    pub shipping_is_billing: bool,
    pub order_items: Vec<ShipmentItem>,
    pub payment_method: String,
    pub sub_total: f64,
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentItem {
    pub name: String,
    pub sku: String,
    pub units: i32,
    pub selling_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentOrderResponse {
    pub order_id: i64,
    pub shipment_id: i64,
    pub status: Option<String>,
    pub status_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwbAssignment {
    pub awb_code: String,
    pub awb_code_status: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickupResponse {
    pub pickup_scheduled_date: Option<String>,
    pub pickup_token_number: Option<String>,
    pub status: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingResponse {
    pub tracking_data: TrackingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingData {
    pub track_status: Option<i32>,
    pub shipment_status: Option<String>,
    #[serde(default)]
    pub shipment_track: Vec<TrackingScan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingScan {
    pub activity: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceabilityResponse {
    pub data: ServiceabilityData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceabilityData {
    #[serde(default)]
    pub available_courier_companies: Vec<CourierOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierOption {
    pub courier_company_id: i64,
    pub courier_name: String,
    pub rate: Option<f64>,
    pub estimated_delivery_days: Option<String>,
}

impl ShiprocketClient {
    pub fn new(
        email: String,
        password: String,
        pickup_pincode: String,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            email,
            password,
            pickup_pincode,
            cache: Arc::new(RwLock::new(TokenCache::new())),
        }
    }

    pub fn pickup_pincode(&self) -> &str {
        &self.pickup_pincode
    }

    async fn get_token(&self) -> ServiceResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.valid() {
                return Ok(token.to_string());
            }
        }

        tracing::info!("Refreshing shipping aggregator token");
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&json!({ "email": self.email, "password": self.password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!(
                "Shipping aggregator login failed: {}",
                response.status()
            )
            .into());
        }

        let auth: AuthResponse = response.json().await?;

        let mut cache = self.cache.write().await;
        cache.token = Some(auth.token.clone());
        cache.fetched_at = SystemTime::now();

        Ok(auth.token)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<serde_json::Value>,
    ) -> ServiceResult<T> {
        let token = self.get_token().await?;

        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token);

        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Shipping aggregator error ({}): {}", status, body).into());
        }

        Ok(response.json::<T>().await?)
    }

    pub async fn create_order(
        &self,
        payload: &ShipmentOrderRequest,
    ) -> ServiceResult<ShipmentOrderResponse> {
        self.request(
            Method::POST,
            "/orders/create/adhoc",
            Some(serde_json::to_value(payload)?),
        )
        .await
    }

    pub async fn assign_awb(
        &self,
        shipment_id: i64,
        courier_id: Option<i64>,
    ) -> ServiceResult<AwbAssignment> {
        let mut body = json!({ "shipment_id": shipment_id });
        if let Some(courier_id) = courier_id {
            body["courier_id"] = json!(courier_id);
        }
        self.request(Method::POST, "/courier/assign/awb", Some(body))
            .await
    }

    pub async fn request_pickup(&self, shipment_id: i64) -> ServiceResult<PickupResponse> {
        self.request(
            Method::POST,
            "/courier/generate/pickup",
            Some(json!({ "shipment_id": [shipment_id] })),
        )
        .await
    }

    pub async fn track_by_awb(&self, awb: &str) -> ServiceResult<TrackingResponse> {
        self.request(Method::GET, &format!("/courier/track/awb/{}", awb), None)
            .await
    }

    pub async fn cancel_order(&self, order_ids: &[String]) -> ServiceResult<serde_json::Value> {
        self.request(Method::POST, "/orders/cancel", Some(json!({ "ids": order_ids })))
            .await
    }

    pub async fn check_serviceability(
        &self,
        delivery_pincode: &str,
        weight_kg: f64,
        cod: bool,
    ) -> ServiceResult<ServiceabilityResponse> {
        self.request(
            Method::POST,
            "/courier/serviceability/",
            Some(json!({
                "pickup_postcode": self.pickup_pincode,
                "delivery_postcode": delivery_pincode,
                "weight": weight_kg,
                "cod": if cod { 1 } else { 0 },
            })),
        )
        .await
    }
}

impl ShipmentOrderRequest {
    /// Maps a local order onto the aggregator's ad-hoc order payload.
    /// Parcel dimensions are the store's standard box; weight is a flat
    /// 0.5kg until per-product weights exist.
    pub fn from_order(
        order: &orders::Model,
        items: &[order_items::Model],
        address: &addresses::Model,
        email: &str,
    ) -> Self {
        let mut parts = address.full_name.split_whitespace();
        let first_name = parts.next().unwrap_or_default().to_string();
        let last_name = {
            let rest = parts.collect::<Vec<_>>().join(" ");
            if rest.is_empty() { first_name.clone() } else { rest }
        };

        let payment_method = match order.payment_method {
            orders::PaymentMethod::Cod => "COD",
            orders::PaymentMethod::Razorpay => "Prepaid",
        };

        Self {
            order_id: order.order_number.clone(),
            order_date: order.created_at.format("%Y-%m-%d").to_string(),
            pickup_location: "Primary".to_string(),
            billing_customer_name: first_name,
            billing_last_name: last_name,
            billing_address: address.line1.clone(),
            billing_address_2: address.line2.clone().unwrap_or_default(),
            billing_city: address.city.clone(),
            billing_pincode: address.pincode.clone(),
            billing_state: address.state.clone(),
            billing_country: "India".to_string(),
            billing_email: email.to_string(),
            billing_phone: address.phone.clone(),
            shipping_is_billing: true,
            order_items: items
                .iter()
                .map(|item| ShipmentItem {
                    name: item.name.clone(),
                    sku: item.sku.clone(),
                    units: item.quantity,
                    selling_price: item.price.to_f64().unwrap_or_default(),
                })
                .collect(),
            payment_method: payment_method.to_string(),
            sub_total: order.subtotal.to_f64().unwrap_or_default(),
            length: 20.0,
            breadth: 15.0,
            height: 10.0,
            weight: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::orders::{OrderStatus, PaymentMethod, PaymentStatus};
    use rust_decimal_macros::dec;

    fn sample_order() -> orders::Model {
        orders::Model {
            id: 1,
            order_number: "DBSTEST1234".to_string(),
            user_id: 1,
            address_id: 1,
            status: OrderStatus::Confirmed,
            payment_method: PaymentMethod::Cod,
            payment_status: PaymentStatus::Pending,
            subtotal: dec!(450),
            shipping_cost: dec!(49),
            discount: dec!(0),
            total: dec!(499),
            coupon_id: None,
            notes: None,
            razorpay_order_id: None,
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

    fn sample_address() -> addresses::Model {
        addresses::Model {
            id: 1,
            user_id: 1,
            full_name: "Asha Kulkarni".to_string(),
            phone: "9876543210".to_string(),
            line1: "12 MG Road".to_string(),
            line2: None,
            city: "Pune".to_string(),
            state: "Maharashtra".to_string(),
            pincode: "411001".to_string(),
            country: "India".to_string(),
            is_default: true,
        }
    }

    #[test]
    fn test_payload_splits_name() {
        let payload = ShipmentOrderRequest::from_order(
            &sample_order(),
            &[],
            &sample_address(),
            "asha@example.com",
        );
        assert_eq!(payload.billing_customer_name, "Asha");
        assert_eq!(payload.billing_last_name, "Kulkarni");
    }

    #[test]
    fn test_payload_single_word_name() {
        let mut address = sample_address();
        address.full_name = "Asha".to_string();
        let payload =
            ShipmentOrderRequest::from_order(&sample_order(), &[], &address, "a@example.com");
        assert_eq!(payload.billing_customer_name, "Asha");
        assert_eq!(payload.billing_last_name, "Asha");
    }

    #[test]
    fn test_payload_maps_payment_method() {
        let mut order = sample_order();
        let payload =
            ShipmentOrderRequest::from_order(&order, &[], &sample_address(), "a@example.com");
        assert_eq!(payload.payment_method, "COD");

        order.payment_method = PaymentMethod::Razorpay;
        let payload =
            ShipmentOrderRequest::from_order(&order, &[], &sample_address(), "a@example.com");
        assert_eq!(payload.payment_method, "Prepaid");
    }

    #[test]
    fn test_token_cache_expiry() {
        let mut cache = TokenCache::new();
        assert!(cache.valid().is_none());

        cache.token = Some("tok".to_string());
        cache.fetched_at = SystemTime::now();
        assert_eq!(cache.valid(), Some("tok"));

        cache.fetched_at = SystemTime::now() - Duration::from_secs(TOKEN_TTL_SECS + 1);
        assert!(cache.valid().is_none());
    }
}
