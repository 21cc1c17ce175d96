use axum::{
    Router,
    routing::{get, patch, post, put},
};
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::env;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_backend::AppState;
use storefront_backend::handlers::{
    address, auth, category, checkout, coupon, order, payment, product, shipping,
};
use storefront_backend::jobs::tracking_sync::start_tracking_sync_job;
use storefront_backend::services::{
    mailer::Mailer, razorpay::RazorpayClient, session::SessionKeys, shiprocket::ShiprocketClient,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Connect to database
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    tracing::info!("Connecting to database...");
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let razorpay = RazorpayClient::new(
        env::var("RAZORPAY_KEY_ID").expect("RAZORPAY_KEY_ID must be set"),
        env::var("RAZORPAY_KEY_SECRET").expect("RAZORPAY_KEY_SECRET must be set"),
        env::var("RAZORPAY_BASE_URL").ok(),
    );

    let shiprocket_email = env::var("SHIPROCKET_EMAIL").unwrap_or_default();
    let shiprocket_password = env::var("SHIPROCKET_PASSWORD").unwrap_or_default();
    if shiprocket_email.is_empty() {
        tracing::warn!("SHIPROCKET_EMAIL not set; shipping operations will fail");
    }
    let shiprocket = ShiprocketClient::new(
        shiprocket_email,
        shiprocket_password,
        env::var("SHIPROCKET_PICKUP_PINCODE").unwrap_or_else(|_| "110001".to_string()),
        env::var("SHIPROCKET_BASE_URL").ok(),
    );

    let sessions = SessionKeys::new(
        env::var("SESSION_SECRET")
            .expect("SESSION_SECRET must be set")
            .as_bytes(),
    );

    let state = AppState {
        db: storefront_backend::clone_connection(&db),
        razorpay,
        shiprocket: shiprocket.clone(),
        mailer: Mailer::from_env(),
        sessions,
    };

    start_tracking_sync_job(db, shiprocket);

    // Build router
    let app = Router::new()
        .route("/", get(health))
        .route("/api/auth/send-otp", post(auth::send_otp))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .route(
            "/api/products",
            get(product::list_products).post(product::create_product),
        )
        .route("/api/products/{slug}", get(product::get_product))
        .route(
            "/api/admin/products/{id}",
            put(product::update_product).delete(product::delete_product),
        )
        .route(
            "/api/categories",
            get(category::list_categories).post(category::create_category),
        )
        .route(
            "/api/coupons",
            get(coupon::list_coupons).post(coupon::create_coupon),
        )
        .route("/api/coupons/apply", post(coupon::apply_coupon))
        .route(
            "/api/addresses",
            get(address::list_addresses).post(address::create_address),
        )
        .route("/api/checkout", post(checkout::checkout))
        .route("/api/razorpay/create-order", post(payment::create_order))
        .route("/api/razorpay/verify", post(payment::verify))
        .route("/api/orders", get(order::list_orders))
        .route("/api/orders/{id}", get(order::get_order))
        .route("/api/orders/{id}/status", patch(order::update_status))
        .route("/api/orders/{id}/couriers", get(shipping::list_couriers))
        .route("/api/orders/{id}/ship", post(shipping::ship_order))
        .route("/api/orders/{id}/tracking", get(shipping::track_order))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .unwrap();

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "ok"
}
