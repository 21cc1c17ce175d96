//! Transactional email with two interchangeable providers: an HTTP API
//! (Resend-compatible) tried first, SMTP as the fallback. Sends are
//! best-effort; callers get a bool and failures are logged, never propagated.

use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::json;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::entities::orders::OrderStatus;

type ProviderResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> ProviderResult;
}

/// Resend-compatible HTTP API provider: POST {base}/emails with a bearer key.
pub struct ApiMailProvider {
    client: Client,
    api_key: String,
    base_url: String,
    from: String,
}

impl ApiMailProvider {
    pub fn new(api_key: String, from: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.resend.com".to_string()),
            from,
        }
    }
}

#[async_trait]
impl MailProvider for ApiMailProvider {
    async fn send(&self, message: &EmailMessage) -> ProviderResult {
        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": message.to,
                "subject": message.subject,
                "html": message.html,
                "text": message.text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Mail API rejected send ({}): {}", status, body).into());
        }

        Ok(())
    }
}

pub struct SmtpMailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailProvider {
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        from: String,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
            .port(port)
            .credentials(Credentials::new(username, password))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailProvider for SmtpMailProvider {
    async fn send(&self, message: &EmailMessage) -> ProviderResult {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(message.to.parse()?)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html.clone()),
                    ),
            )?;

        self.transport.send(email).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Mailer {
    provider: Option<Arc<dyn MailProvider>>,
}

/// Everything the order confirmation template needs, denormalized.
#[derive(Debug, Clone)]
pub struct OrderEmail {
    pub order_number: String,
    pub lines: Vec<OrderEmailLine>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct OrderEmailLine {
    pub name: String,
    pub quantity: i32,
    pub total: Decimal,
}

impl Mailer {
    pub fn new(provider: Option<Arc<dyn MailProvider>>) -> Self {
        Self { provider }
    }

    /// Picks a provider from the environment: RESEND_API_KEY wins, then
    /// SMTP_HOST/SMTP_PORT/SMTP_USER/SMTP_PASS. With neither set, sends
    /// become logged no-ops.
    pub fn from_env() -> Self {
        let from = env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "Storefront <no-reply@example.com>".to_string());

        if let Ok(api_key) = env::var("RESEND_API_KEY") {
            return Self::new(Some(Arc::new(ApiMailProvider::new(api_key, from, None))));
        }

        if let Ok(host) = env::var("SMTP_HOST") {
            let port = env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587);
            let username = env::var("SMTP_USER").unwrap_or_default();
            let password = env::var("SMTP_PASS").unwrap_or_default();

            match SmtpMailProvider::new(&host, port, username, password, from) {
                Ok(provider) => return Self::new(Some(Arc::new(provider))),
                Err(e) => tracing::error!("Failed to configure SMTP transport: {}", e),
            }
        }

        tracing::warn!("No email provider configured; transactional mail disabled");
        Self::new(None)
    }

    /// Best-effort send. Returns whether the message went out.
    pub async fn send(&self, message: EmailMessage) -> bool {
        let Some(provider) = &self.provider else {
            tracing::warn!("Dropping email to {}: no provider configured", message.to);
            return false;
        };

        match provider.send(&message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send email to {}: {}", message.to, e);
                false
            }
        }
    }

    pub async fn send_otp_email(&self, to: &str, code: &str) -> bool {
        let html = format!(
            "<h2>Verify your email</h2>\
             <p>Use this code to complete your login. It is valid for 10 minutes.</p>\
             <h1 style=\"letter-spacing:8px\">{code}</h1>\
             <p>If you didn't request this code, you can ignore this email.</p>"
        );
        let text = format!(
            "Your login code is {code}. It is valid for 10 minutes.\n\
             If you didn't request this code, ignore this email."
        );

        self.send(EmailMessage {
            to: to.to_string(),
            subject: "Your login code".to_string(),
            html,
            text,
        })
        .await
    }

    pub async fn send_order_confirmation(&self, to: &str, order: &OrderEmail) -> bool {
        let mut rows = String::new();
        for line in &order.lines {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>₹{}</td></tr>",
                line.name, line.quantity, line.total
            ));
        }

        let html = format!(
            "<h2>Thank you for your order {number}</h2>\
             <table>{rows}</table>\
             <p>Subtotal: ₹{subtotal}<br>Shipping: ₹{shipping}<br>\
             Discount: -₹{discount}<br><strong>Total: ₹{total}</strong></p>\
             <p>Delivery address: {address}</p>",
            number = order.order_number,
            rows = rows,
            subtotal = order.subtotal,
            shipping = order.shipping,
            discount = order.discount,
            total = order.total,
            address = order.address,
        );
        let text = format!(
            "Thank you for your order {}. Total: ₹{}. Delivery address: {}",
            order.order_number, order.total, order.address
        );

        self.send(EmailMessage {
            to: to.to_string(),
            subject: format!("Order confirmed — {}", order.order_number),
            html,
            text,
        })
        .await
    }

    pub async fn send_status_update(
        &self,
        to: &str,
        order_number: &str,
        status: OrderStatus,
    ) -> bool {
        let label = status_label(status);
        let html = format!(
            "<h2>Order {order_number}</h2><p>Your order is now <strong>{label}</strong>.</p>"
        );
        let text = format!("Your order {order_number} is now {label}.");

        self.send(EmailMessage {
            to: to.to_string(),
            subject: format!("Order update — {}", order_number),
            html,
            text,
        })
        .await
    }
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Confirmed => "confirmed",
        OrderStatus::Processing => "being processed",
        OrderStatus::Packed => "packed",
        OrderStatus::Shipped => "shipped",
        OrderStatus::OutForDelivery => "out for delivery",
        OrderStatus::Delivered => "delivered",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Returned => "returned",
        OrderStatus::Refunded => "refunded",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_mailer_drops_silently() {
        let mailer = Mailer::new(None);
        let sent = mailer.send_otp_email("user@example.com", "123456").await;
        assert!(!sent);
    }

    #[test]
    fn test_status_labels_cover_customer_facing_states() {
        assert_eq!(status_label(OrderStatus::OutForDelivery), "out for delivery");
        assert_eq!(status_label(OrderStatus::Delivered), "delivered");
    }
}
