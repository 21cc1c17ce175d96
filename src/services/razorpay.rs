//! Razorpay gateway client: remote order creation and payment signature
//! verification (HMAC-SHA256 over "order_id|payment_id", hex encoded).

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://api.razorpay.com/v1";

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

/// Order as created on the gateway. `amount` is in paise.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: Option<String>,
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap(),
            key_id,
            key_secret,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Public key id handed to the frontend checkout widget
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Creates a gateway order for `amount_paise` with our order number as
    /// the receipt. The gateway id comes back in the response and is stored
    /// on the local order for the later verify call.
    pub async fn create_order(
        &self,
        amount_paise: i64,
        receipt: &str,
        notes: serde_json::Value,
    ) -> Result<GatewayOrder, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_paise,
                "currency": "INR",
                "receipt": receipt,
                "notes": notes,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Gateway order creation failed ({}): {}", status, body).into());
        }

        Ok(response.json::<GatewayOrder>().await?)
    }

    /// Hex HMAC-SHA256 over "order_id|payment_id" with the key secret.
    pub fn compute_signature(&self, order_id: &str, payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison against the signature the checkout callback
    /// provided. Any malformed hex fails verification.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let provided = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RazorpayClient {
        RazorpayClient::new(
            "rzp_test_key".to_string(),
            "test_secret".to_string(),
            None,
        )
    }

    #[test]
    fn test_signature_round_trip() {
        let rzp = client();
        let sig = rzp.compute_signature("order_abc123", "pay_xyz789");
        assert!(rzp.verify_signature("order_abc123", "pay_xyz789", &sig));
    }

    #[test]
    fn test_signature_is_hex_sha256() {
        let sig = client().compute_signature("order_abc123", "pay_xyz789");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tampered_payment_id_rejected() {
        let rzp = client();
        let sig = rzp.compute_signature("order_abc123", "pay_xyz789");
        assert!(!rzp.verify_signature("order_abc123", "pay_other", &sig));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let rzp = client();
        let mut sig = rzp.compute_signature("order_abc123", "pay_xyz789");
        // Flip the last hex digit
        let last = sig.pop().unwrap();
        sig.push(if last == '0' { '1' } else { '0' });
        assert!(!rzp.verify_signature("order_abc123", "pay_xyz789", &sig));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!client().verify_signature("order_abc123", "pay_xyz789", "not-hex!"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let rzp = client();
        let other = RazorpayClient::new(
            "rzp_test_key".to_string(),
            "different_secret".to_string(),
            None,
        );
        let sig = other.compute_signature("order_abc123", "pay_xyz789");
        assert!(!rzp.verify_signature("order_abc123", "pay_xyz789", &sig));
    }
}
