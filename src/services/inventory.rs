//! Guarded counter updates: stock decrement and coupon usage both go through
//! single conditional UPDATEs so concurrent checkouts can never drive stock
//! negative or push a coupon past its usage limit.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::entities::{coupons, prelude::*, products};

/// `UPDATE products SET stock = stock - qty WHERE id = ? AND stock >= qty`.
/// Returns false when stock was insufficient (nothing changed).
pub async fn decrement_stock<C: ConnectionTrait>(
    db: &C,
    product_id: i32,
    quantity: i32,
) -> Result<bool, DbErr> {
    let result = Products::update_many()
        .col_expr(
            products::Column::Stock,
            Expr::col(products::Column::Stock).sub(quantity),
        )
        .filter(products::Column::Id.eq(product_id))
        .filter(products::Column::Stock.gte(quantity))
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Puts cancelled quantities back on the shelf.
pub async fn restock<C: ConnectionTrait>(
    db: &C,
    product_id: i32,
    quantity: i32,
) -> Result<(), DbErr> {
    Products::update_many()
        .col_expr(
            products::Column::Stock,
            Expr::col(products::Column::Stock).add(quantity),
        )
        .filter(products::Column::Id.eq(product_id))
        .exec(db)
        .await?;

    Ok(())
}

/// Bumps `used_count`, but only while under `usage_limit` (when set).
/// Returns false when the limit was already reached.
pub async fn bump_coupon_usage<C: ConnectionTrait>(db: &C, coupon_id: i32) -> Result<bool, DbErr> {
    let under_limit = Condition::any()
        .add(coupons::Column::UsageLimit.is_null())
        .add(
            Expr::col(coupons::Column::UsedCount).lt(Expr::col(coupons::Column::UsageLimit)),
        );

    let result = Coupons::update_many()
        .col_expr(
            coupons::Column::UsedCount,
            Expr::col(coupons::Column::UsedCount).add(1),
        )
        .filter(coupons::Column::Id.eq(coupon_id))
        .filter(under_limit)
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_decrement_stock_refuses_shortage() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        assert!(decrement_stock(&db, 1, 2).await.unwrap());
        // Guard matched no row: requested more than was on the shelf
        assert!(!decrement_stock(&db, 1, 50).await.unwrap());

        // Both statements carry the stock guard in the WHERE clause
        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains(">="));
    }

    #[tokio::test]
    async fn test_coupon_bump_stops_at_limit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        assert!(bump_coupon_usage(&db, 1).await.unwrap());
        assert!(!bump_coupon_usage(&db, 1).await.unwrap());
    }
}
