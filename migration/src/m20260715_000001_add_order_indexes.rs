use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Order listing is always scoped to a user, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_id")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        // Payment verification looks orders up by gateway order id
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_razorpay_order_id")
                    .table(Orders::Table)
                    .col(Orders::RazorpayOrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_timeline_order_id")
                    .table(OrderTimeline::Table)
                    .col(OrderTimeline::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_order_timeline_order_id").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_orders_razorpay_order_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_orders_user_id").to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    UserId,
    RazorpayOrderId,
}

#[derive(DeriveIden)]
enum OrderTimeline {
    Table,
    OrderId,
}
