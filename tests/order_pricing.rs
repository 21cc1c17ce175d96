//! End-to-end pricing and credential checks that run without a database.

use rust_decimal_macros::dec;

use storefront_backend::entities::coupons::{self, DiscountType};
use storefront_backend::services::pricing::{self, CartLine, CouponError};
use storefront_backend::services::razorpay::RazorpayClient;
use storefront_backend::services::util;

fn coupon(discount_type: DiscountType, value: rust_decimal::Decimal) -> coupons::Model {
    coupons::Model {
        id: 1,
        code: "SAVE10".to_string(),
        description: None,
        discount_type,
        discount_value: value,
        min_order_amount: None,
        max_discount: None,
        usage_limit: None,
        used_count: 0,
        starts_at: None,
        expires_at: None,
        is_active: true,
    }
}

#[test]
fn cart_total_respects_free_shipping_and_discount() {
    let lines = vec![
        CartLine {
            unit_price: dec!(299),
            quantity: 2,
        },
        CartLine {
            unit_price: dec!(150),
            quantity: 1,
        },
    ];
    let subtotal = pricing::cart_subtotal(&lines);
    assert_eq!(subtotal, dec!(748));

    let discount =
        pricing::coupon_discount(&coupon(DiscountType::Percentage, dec!(10)), subtotal).unwrap();
    assert_eq!(discount, dec!(74.80));

    let quote = pricing::quote(subtotal, discount);
    assert_eq!(quote.shipping_cost, dec!(0));
    assert_eq!(quote.total, dec!(673.20));
}

#[test]
fn small_cart_pays_flat_shipping() {
    let subtotal = pricing::cart_subtotal(&[CartLine {
        unit_price: dec!(199),
        quantity: 1,
    }]);
    let quote = pricing::quote(subtotal, dec!(0));
    assert_eq!(quote.shipping_cost, dec!(49));
    assert_eq!(quote.total, dec!(248));
}

#[test]
fn fixed_discount_larger_than_subtotal_floors_at_zero() {
    let quote = pricing::quote(dec!(100), dec!(150));
    assert_eq!(quote.total, quote.shipping_cost);
}

#[test]
fn expired_coupon_is_rejected() {
    let mut expired = coupon(DiscountType::Fixed, dec!(50));
    expired.expires_at = Some(chrono::Utc::now().fixed_offset() - chrono::Duration::days(1));
    let err = pricing::coupon_discount(&expired, dec!(500)).unwrap_err();
    assert!(matches!(err, CouponError::Expired));
}

#[test]
fn payment_signature_survives_round_trip_and_rejects_tampering() {
    let rzp = RazorpayClient::new("key".to_string(), "secret".to_string(), None);
    let signature = rzp.compute_signature("order_1", "pay_1");
    assert!(rzp.verify_signature("order_1", "pay_1", &signature));
    assert!(!rzp.verify_signature("order_2", "pay_1", &signature));
}

#[test]
fn generated_identifiers_have_expected_shape() {
    let order_number = util::generate_order_number();
    assert!(order_number.starts_with("DBS"));
    assert!(order_number.len() > 7);
    assert!(order_number.chars().all(|c| c.is_ascii_alphanumeric()));

    let otp = util::generate_otp();
    assert_eq!(otp.len(), 6);
    assert!(otp.chars().all(|c| c.is_ascii_digit()));
}
