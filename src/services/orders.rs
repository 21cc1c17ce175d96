//! Guarded order state transitions, same single-conditional-UPDATE shape as
//! the stock and coupon counters.

use chrono::{DateTime, FixedOffset};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::entities::orders::{OrderStatus, PaymentStatus};
use crate::entities::{orders, prelude::*};

/// Marks an order paid and confirmed, recording the gateway ids, but only if
/// it is not paid already. Returns false when another caller won the race;
/// exactly one caller ever sees true for a given order.
pub async fn mark_paid<C: ConnectionTrait>(
    db: &C,
    order_id: i32,
    payment_id: &str,
    signature: &str,
    paid_at: DateTime<FixedOffset>,
) -> Result<bool, DbErr> {
    let result = Orders::update_many()
        .col_expr(orders::Column::Status, Expr::value(OrderStatus::Confirmed))
        .col_expr(
            orders::Column::PaymentStatus,
            Expr::value(PaymentStatus::Paid),
        )
        .col_expr(
            orders::Column::RazorpayPaymentId,
            Expr::value(payment_id.to_string()),
        )
        .col_expr(
            orders::Column::RazorpaySignature,
            Expr::value(signature.to_string()),
        )
        .col_expr(orders::Column::PaidAt, Expr::value(paid_at))
        .col_expr(orders::Column::UpdatedAt, Expr::value(paid_at))
        .filter(orders::Column::Id.eq(order_id))
        .filter(orders::Column::PaymentStatus.ne(PaymentStatus::Paid))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_mark_paid_claims_unpaid_order() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let claimed = mark_paid(&db, 1, "pay_abc", "sig", Utc::now().fixed_offset())
            .await
            .unwrap();
        assert!(claimed);
    }

    #[tokio::test]
    async fn test_mark_paid_loses_race_on_paid_order() {
        // The payment_status filter matches no row once the order is PAID
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let claimed = mark_paid(&db, 1, "pay_abc", "sig", Utc::now().fixed_offset())
            .await
            .unwrap();
        assert!(!claimed);
    }
}
