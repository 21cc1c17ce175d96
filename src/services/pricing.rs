//! Cart pricing rules: subtotal, coupon discount, shipping threshold, total.
//!
//! All arithmetic is `Decimal`; the invariant throughout is
//! `total == max(0, subtotal - discount) + shipping_cost`.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::entities::coupons::{self, DiscountType};

/// Orders at or above this subtotal ship free
pub const FREE_SHIPPING_THRESHOLD: Decimal = dec!(499);
/// Flat rate below the threshold
pub const FLAT_SHIPPING_RATE: Decimal = dec!(49);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon is not valid yet")]
    NotStarted,
    #[error("Coupon has expired")]
    Expired,
    #[error("Minimum order amount is ₹{0}")]
    MinOrderNotMet(Decimal),
    #[error("Coupon usage limit exceeded")]
    UsageLimitReached,
}

#[derive(Debug, Clone, Copy)]
pub struct CartLine {
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

pub fn cart_subtotal(lines: &[CartLine]) -> Decimal {
    lines
        .iter()
        .map(|line| line.unit_price * Decimal::from(line.quantity))
        .sum()
}

pub fn shipping_cost(subtotal: Decimal) -> Decimal {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING_RATE
    }
}

/// Validates the coupon against the subtotal and returns the discount it
/// grants. Percentage discounts are rounded to 2dp and capped at
/// `max_discount`; fixed discounts are taken as-is (the total formula
/// clamps over-discounting to zero).
pub fn coupon_discount(coupon: &coupons::Model, subtotal: Decimal) -> Result<Decimal, CouponError> {
    if !coupon.is_active {
        return Err(CouponError::Inactive);
    }

    let now = Utc::now().fixed_offset();
    if let Some(starts_at) = coupon.starts_at {
        if now < starts_at {
            return Err(CouponError::NotStarted);
        }
    }
    if let Some(expires_at) = coupon.expires_at {
        if now > expires_at {
            return Err(CouponError::Expired);
        }
    }
    if let Some(min_order) = coupon.min_order_amount {
        if subtotal < min_order {
            return Err(CouponError::MinOrderNotMet(min_order));
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponError::UsageLimitReached);
        }
    }

    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let raw = (subtotal * coupon.discount_value / dec!(100)).round_dp(2);
            match coupon.max_discount {
                Some(cap) if raw > cap => cap,
                _ => raw,
            }
        }
        DiscountType::Fixed => coupon.discount_value,
    };

    Ok(discount)
}

pub fn quote(subtotal: Decimal, discount: Decimal) -> Quote {
    let shipping = shipping_cost(subtotal);
    let discounted = (subtotal - discount).max(Decimal::ZERO);
    Quote {
        subtotal,
        discount,
        shipping_cost: shipping,
        total: discounted + shipping,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: Decimal) -> coupons::Model {
        coupons::Model {
            id: 1,
            code: "TEST10".to_string(),
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
    fn test_subtotal_sums_lines() {
        let lines = vec![
            CartLine { unit_price: dec!(199), quantity: 2 },
            CartLine { unit_price: dec!(50.50), quantity: 1 },
        ];
        assert_eq!(cart_subtotal(&lines), dec!(448.50));
    }

    #[test]
    fn test_shipping_threshold() {
        assert_eq!(shipping_cost(dec!(498.99)), dec!(49));
        assert_eq!(shipping_cost(dec!(499)), Decimal::ZERO);
        assert_eq!(shipping_cost(dec!(1500)), Decimal::ZERO);
    }

    #[test]
    fn test_percentage_discount_rounds() {
        let c = coupon(DiscountType::Percentage, dec!(10));
        assert_eq!(coupon_discount(&c, dec!(333.33)).unwrap(), dec!(33.33));
    }

    #[test]
    fn test_percentage_discount_capped() {
        let mut c = coupon(DiscountType::Percentage, dec!(50));
        c.max_discount = Some(dec!(100));
        assert_eq!(coupon_discount(&c, dec!(1000)).unwrap(), dec!(100));
    }

    #[test]
    fn test_fixed_discount() {
        let c = coupon(DiscountType::Fixed, dec!(75));
        assert_eq!(coupon_discount(&c, dec!(500)).unwrap(), dec!(75));
    }

    #[test]
    fn test_inactive_coupon_rejected() {
        let mut c = coupon(DiscountType::Fixed, dec!(75));
        c.is_active = false;
        assert_eq!(coupon_discount(&c, dec!(500)), Err(CouponError::Inactive));
    }

    #[test]
    fn test_validity_window() {
        let mut c = coupon(DiscountType::Fixed, dec!(20));
        c.starts_at = Some((Utc::now() + Duration::hours(1)).fixed_offset());
        assert_eq!(coupon_discount(&c, dec!(500)), Err(CouponError::NotStarted));

        c.starts_at = None;
        c.expires_at = Some((Utc::now() - Duration::hours(1)).fixed_offset());
        assert_eq!(coupon_discount(&c, dec!(500)), Err(CouponError::Expired));
    }

    #[test]
    fn test_min_order_amount() {
        let mut c = coupon(DiscountType::Fixed, dec!(20));
        c.min_order_amount = Some(dec!(300));
        assert_eq!(
            coupon_discount(&c, dec!(299)),
            Err(CouponError::MinOrderNotMet(dec!(300)))
        );
        assert!(coupon_discount(&c, dec!(300)).is_ok());
    }

    #[test]
    fn test_usage_limit() {
        let mut c = coupon(DiscountType::Fixed, dec!(20));
        c.usage_limit = Some(5);
        c.used_count = 5;
        assert_eq!(
            coupon_discount(&c, dec!(500)),
            Err(CouponError::UsageLimitReached)
        );
    }

    #[test]
    fn test_quote_invariant() {
        let q = quote(dec!(450), dec!(50));
        assert_eq!(q.shipping_cost, dec!(49));
        assert_eq!(q.total, dec!(449));
    }

    #[test]
    fn test_quote_never_negative() {
        // Fixed discount larger than the cart clamps to zero before shipping
        let q = quote(dec!(100), dec!(150));
        assert_eq!(q.total, dec!(49));
    }

    #[test]
    fn test_quote_free_shipping() {
        let q = quote(dec!(999), dec!(0));
        assert_eq!(q.total, dec!(999));
    }
}
