use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};

use crate::AppState;
use crate::entities::orders::{OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::{addresses, coupons, order_items, order_timeline, orders, prelude::*, products};
use crate::handlers::CurrentUser;
use crate::models::checkout::{CartItemInput, CheckoutRequest, CheckoutResponse};
use crate::models::error::{ApiError, bad_request, internal_error, not_found};
use crate::services::inventory::{bump_coupon_usage, decrement_stock};
use crate::services::mailer::{OrderEmail, OrderEmailLine};
use crate::services::pricing::{self, CartLine, Quote};
use crate::services::util::generate_order_number;

/// One cart line after server-side validation, with the product snapshot
/// that gets copied onto the order.
pub(super) struct PricedLine {
    pub product_id: i32,
    pub name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub total: Decimal,
}

pub(super) struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub quote: Quote,
    pub coupon: Option<coupons::Model>,
}

/// Re-prices the cart from the database: client-side prices are never
/// trusted. Rejects unknown/inactive products, short stock, and invalid
/// coupons with a 400 naming the problem.
pub(super) async fn price_cart(
    db: &DatabaseConnection,
    items: &[CartItemInput],
    coupon_code: Option<&str>,
) -> Result<PricedCart, ApiError> {
    if items.is_empty() {
        return Err(bad_request("Cart is empty"));
    }
    if items.iter().any(|item| item.quantity < 1) {
        return Err(bad_request("Quantity must be at least 1"));
    }

    let ids: Vec<i32> = items.iter().map(|item| item.product_id).collect();
    let products = Products::find()
        .filter(products::Column::Id.is_in(ids))
        .all(db)
        .await
        .map_err(internal_error)?;

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or_else(|| bad_request(format!("Product not found: {}", item.product_id)))?;

        if !product.is_active {
            return Err(bad_request(format!("Product not available: {}", product.name)));
        }
        if product.stock < item.quantity {
            return Err(bad_request(format!("Insufficient stock for: {}", product.name)));
        }

        let total = product.price * Decimal::from(item.quantity);
        lines.push(PricedLine {
            product_id: product.id,
            name: product.name.clone(),
            sku: product.sku.clone(),
            unit_price: product.price,
            quantity: item.quantity,
            total,
        });
    }

    let subtotal = pricing::cart_subtotal(
        &lines
            .iter()
            .map(|line| CartLine {
                unit_price: line.unit_price,
                quantity: line.quantity,
            })
            .collect::<Vec<_>>(),
    );

    let mut coupon = None;
    let mut discount = Decimal::ZERO;
    if let Some(code) = coupon_code {
        let code = code.trim().to_uppercase();
        let found = Coupons::find()
            .filter(coupons::Column::Code.eq(&code))
            .one(db)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| bad_request("Invalid coupon code"))?;

        discount =
            pricing::coupon_discount(&found, subtotal).map_err(|e| bad_request(e.to_string()))?;
        coupon = Some(found);
    }

    Ok(PricedCart {
        lines,
        quote: pricing::quote(subtotal, discount),
        coupon,
    })
}

pub(super) async fn load_own_address(
    db: &DatabaseConnection,
    user: &CurrentUser,
    address_id: i32,
) -> Result<addresses::Model, ApiError> {
    let address = Addresses::find_by_id(address_id)
        .one(db)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Address not found"))?;

    if address.user_id != user.id {
        return Err(not_found("Address not found"));
    }

    Ok(address)
}

pub(super) struct NewOrder<'a> {
    pub order_number: String,
    pub user_id: i32,
    pub address_id: i32,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub timeline_message: &'a str,
    pub notes: Option<String>,
    pub razorpay_order_id: Option<String>,
}

/// Inserts the order row, its item snapshots, and the first timeline entry
/// inside the caller's transaction.
pub(super) async fn insert_order(
    txn: &DatabaseTransaction,
    cart: &PricedCart,
    new_order: NewOrder<'_>,
) -> Result<orders::Model, ApiError> {
    let now = Utc::now().fixed_offset();

    let order = orders::ActiveModel {
        order_number: Set(new_order.order_number),
        user_id: Set(new_order.user_id),
        address_id: Set(new_order.address_id),
        status: Set(new_order.status),
        payment_method: Set(new_order.payment_method),
        payment_status: Set(PaymentStatus::Pending),
        subtotal: Set(cart.quote.subtotal),
        shipping_cost: Set(cart.quote.shipping_cost),
        discount: Set(cart.quote.discount),
        total: Set(cart.quote.total),
        coupon_id: Set(cart.coupon.as_ref().map(|c| c.id)),
        notes: Set(new_order.notes),
        razorpay_order_id: Set(new_order.razorpay_order_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(internal_error)?;

    for line in &cart.lines {
        order_items::ActiveModel {
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            name: Set(line.name.clone()),
            sku: Set(line.sku.clone()),
            price: Set(line.unit_price),
            quantity: Set(line.quantity),
            total: Set(line.total),
            ..Default::default()
        }
        .insert(txn)
        .await
        .map_err(internal_error)?;
    }

    order_timeline::ActiveModel {
        order_id: Set(order.id),
        status: Set(new_order.status),
        message: Set(Some(new_order.timeline_message.to_string())),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(internal_error)?;

    Ok(order)
}

pub(super) fn order_email(cart: &PricedCart, order: &orders::Model, address: &addresses::Model) -> OrderEmail {
    OrderEmail {
        order_number: order.order_number.clone(),
        lines: cart
            .lines
            .iter()
            .map(|line| OrderEmailLine {
                name: line.name.clone(),
                quantity: line.quantity,
                total: line.total,
            })
            .collect(),
        subtotal: order.subtotal,
        shipping: order.shipping_cost,
        discount: order.discount,
        total: order.total,
        address: format!(
            "{}, {}, {}, {} - {}",
            address.full_name, address.line1, address.city, address.state, address.pincode
        ),
    }
}

/// Cash-on-delivery checkout: the order is confirmed immediately and stock
/// is reserved up front, unlike the gateway flow which waits for payment.
pub async fn checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let address = load_own_address(&state.db, &user, payload.address_id).await?;
    let cart = price_cart(&state.db, &payload.items, payload.coupon_code.as_deref()).await?;

    let txn = state.db.begin().await.map_err(internal_error)?;

    let order = insert_order(
        &txn,
        &cart,
        NewOrder {
            order_number: generate_order_number(),
            user_id: user.id,
            address_id: address.id,
            status: OrderStatus::Confirmed,
            payment_method: PaymentMethod::Cod,
            timeline_message: "Order placed, payment on delivery",
            notes: payload.notes,
            razorpay_order_id: None,
        },
    )
    .await?;

    for line in &cart.lines {
        let reserved = decrement_stock(&txn, line.product_id, line.quantity)
            .await
            .map_err(internal_error)?;
        if !reserved {
            // Dropped transaction rolls the order back
            return Err(bad_request(format!("Insufficient stock for: {}", line.name)));
        }
    }

    if let Some(coupon) = &cart.coupon {
        let counted = bump_coupon_usage(&txn, coupon.id)
            .await
            .map_err(internal_error)?;
        if !counted {
            return Err(bad_request("Coupon usage limit exceeded"));
        }
    }

    txn.commit().await.map_err(internal_error)?;

    state
        .mailer
        .send_order_confirmation(&user.email, &order_email(&cart, &order, &address))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            success: true,
            order_id: order.id,
            order_number: order.order_number,
            total: order.total,
        }),
    ))
}
