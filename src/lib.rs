// src/lib.rs

use sea_orm::DatabaseConnection;
use services::{mailer::Mailer, razorpay::RazorpayClient, session::SessionKeys, shiprocket::ShiprocketClient};

#[cfg_attr(not(feature = "mock"), derive(Clone))]
pub struct AppState {
    pub db: DatabaseConnection,
    pub razorpay: RazorpayClient,
    pub shiprocket: ShiprocketClient,
    pub mailer: Mailer,
    pub sessions: SessionKeys,
}

// sea-orm's `mock` feature removes `Clone` from `DatabaseConnection`, so the
// derive above cannot be used in test builds; this impl clones each variant
// the enabled features expose (the mock variant is an `Arc`).
#[cfg(feature = "mock")]
impl Clone for AppState {
    fn clone(&self) -> Self {
        AppState {
            db: clone_connection(&self.db),
            razorpay: self.razorpay.clone(),
            shiprocket: self.shiprocket.clone(),
            mailer: self.mailer.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

#[cfg(not(feature = "mock"))]
pub fn clone_connection(db: &DatabaseConnection) -> DatabaseConnection {
    db.clone()
}

#[cfg(feature = "mock")]
pub fn clone_connection(db: &DatabaseConnection) -> DatabaseConnection {
    match db {
        DatabaseConnection::SqlxPostgresPoolConnection(conn) => {
            DatabaseConnection::SqlxPostgresPoolConnection(conn.clone())
        }
        DatabaseConnection::MockDatabaseConnection(conn) => {
            DatabaseConnection::MockDatabaseConnection(conn.clone())
        }
        DatabaseConnection::Disconnected => DatabaseConnection::Disconnected,
    }
}

pub mod entities {
    pub mod prelude;
    pub mod addresses;
    pub mod categories;
    pub mod coupons;
    pub mod order_items;
    pub mod order_timeline;
    pub mod orders;
    pub mod otp_tokens;
    pub mod product_images;
    pub mod products;
    pub mod users;
}

pub mod services {
    pub mod inventory;
    pub mod mailer;
    pub mod orders;
    pub mod pricing;
    pub mod razorpay;
    pub mod session;
    pub mod shiprocket;
    pub mod util;
}

pub mod models;
pub mod handlers;
pub mod jobs;
