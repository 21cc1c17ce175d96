pub mod address;
pub mod auth;
pub mod category;
pub mod checkout;
pub mod coupon;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;
pub mod shipping;
