pub use sea_orm_migration::prelude::*;

mod m20260710_000001_create_users_and_auth;
mod m20260710_000002_create_catalog;
mod m20260710_000003_create_coupons;
mod m20260710_000004_create_orders;
mod m20260715_000001_add_order_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260710_000001_create_users_and_auth::Migration),
            Box::new(m20260710_000002_create_catalog::Migration),
            Box::new(m20260710_000003_create_coupons::Migration),
            Box::new(m20260710_000004_create_orders::Migration),
            Box::new(m20260715_000001_add_order_indexes::Migration),
        ]
    }
}
