pub use super::addresses::Entity as Addresses;
pub use super::categories::Entity as Categories;
pub use super::coupons::Entity as Coupons;
pub use super::order_items::Entity as OrderItems;
pub use super::order_timeline::Entity as OrderTimeline;
pub use super::orders::Entity as Orders;
pub use super::otp_tokens::Entity as OtpTokens;
pub use super::product_images::Entity as ProductImages;
pub use super::products::Entity as Products;
pub use super::users::Entity as Users;
