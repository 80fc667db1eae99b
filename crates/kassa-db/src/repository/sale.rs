//! # Sale Repository
//!
//! Sale headers, their items and the daily receipt counter.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. NUMBER                                                              │
//! │     └── next_receipt_number() → "20261019-0007"                         │
//! │         (first write of the create-sale transaction)                    │
//! │                                                                         │
//! │  2. RECORD                                                              │
//! │     └── insert() → Sale { status: Completed }                           │
//! │     └── insert_item() × N → SaleItem (name + price snapshot)            │
//! │                                                                         │
//! │  3. (OPTIONAL) REFUND                                                   │
//! │     └── mark_refunded() → Sale { status: Refunded }                     │
//! │         guarded: WHERE status = 'completed', one way only               │
//! │         items are kept                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kassa_core::{Sale, SaleItem};

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    pub async fn get_by_receipt_number(&self, receipt_number: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE receipt_number = ?1")
            .bind(receipt_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales ORDER BY created_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    pub async fn list_for_client(&self, client_id: &str, limit: u32) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            r#"
            SELECT * FROM sales
            WHERE client_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE shift_id = ?1 ORDER BY created_at",
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Bumps the day's counter and returns `YYYYMMDD-NNNN`.
    ///
    /// An upsert, so it is a write: called first, it takes the database write
    /// lock for the rest of the transaction.
    pub async fn next_receipt_number(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<String> {
        let key = day.format("%Y%m%d").to_string();

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO receipt_counters (day, last_seq) VALUES (?1, 1)
            ON CONFLICT(day) DO UPDATE SET last_seq = last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(&key)
        .fetch_one(&mut *conn)
        .await?;

        Ok(format!("{}-{:04}", key, seq))
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(sale)
    }

    pub async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, status,
                subtotal_tiyin, bonus_spent_tiyin, total_tiyin, payment_method,
                cash_tiyin, card_tiyin, transfer_tiyin, debt_tiyin,
                bonus_earned_tiyin, cashier_id, cashier_name,
                client_id, shift_id, created_at, refunded_at, refunded_by
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11,
                ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.receipt_number)
        .bind(sale.status)
        .bind(sale.subtotal_tiyin)
        .bind(sale.bonus_spent_tiyin)
        .bind(sale.total_tiyin)
        .bind(sale.payment_method)
        .bind(sale.cash_tiyin)
        .bind(sale.card_tiyin)
        .bind(sale.transfer_tiyin)
        .bind(sale.debt_tiyin)
        .bind(sale.bonus_earned_tiyin)
        .bind(&sale.cashier_id)
        .bind(&sale.cashier_name)
        .bind(&sale.client_id)
        .bind(&sale.shift_id)
        .bind(sale.created_at)
        .bind(sale.refunded_at)
        .bind(&sale.refunded_by)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Snapshot pattern: name and unit price are copied, so later catalog
    /// edits never rewrite history.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, name_snapshot,
                quantity_milli, unit_price_tiyin, line_total_tiyin, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.name_snapshot)
        .bind(item.quantity_milli)
        .bind(item.unit_price_tiyin)
        .bind(item.line_total_tiyin)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// `completed → refunded`. Returns `false` when the sale is missing or
    /// already refunded.
    pub async fn mark_refunded(
        conn: &mut SqliteConnection,
        id: &str,
        refunded_by: &str,
        refunded_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'refunded',
                refunded_at = ?2,
                refunded_by = ?3
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(id)
        .bind(refunded_at)
        .bind(refunded_by)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::memory_db;
    use kassa_core::{PaymentMethod, SaleStatus};
    use uuid::Uuid;

    fn sale(receipt_number: String) -> Sale {
        Sale {
            id: Uuid::new_v4().to_string(),
            receipt_number,
            status: SaleStatus::Completed,
            subtotal_tiyin: 1_200_000,
            bonus_spent_tiyin: 0,
            total_tiyin: 1_200_000,
            payment_method: PaymentMethod::Cash,
            cash_tiyin: 1_200_000,
            card_tiyin: 0,
            transfer_tiyin: 0,
            debt_tiyin: 0,
            bonus_earned_tiyin: 0,
            cashier_id: "c1".into(),
            cashier_name: "Dilnoza".into(),
            client_id: None,
            shift_id: None,
            created_at: Utc::now(),
            refunded_at: None,
            refunded_by: None,
        }
    }

    #[tokio::test]
    async fn test_receipt_numbers_are_daily_sequences() {
        let db = memory_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 10, 20).unwrap();

        assert_eq!(
            SaleRepository::next_receipt_number(&mut conn, day).await.unwrap(),
            "20261019-0001"
        );
        assert_eq!(
            SaleRepository::next_receipt_number(&mut conn, day).await.unwrap(),
            "20261019-0002"
        );
        assert_eq!(
            SaleRepository::next_receipt_number(&mut conn, next_day).await.unwrap(),
            "20261020-0001"
        );
    }

    #[tokio::test]
    async fn test_mark_refunded_is_one_way() {
        let db = memory_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let day = Utc::now().date_naive();
        let number = SaleRepository::next_receipt_number(&mut conn, day).await.unwrap();
        let s = sale(number);
        SaleRepository::insert(&mut conn, &s).await.unwrap();

        assert!(SaleRepository::mark_refunded(&mut conn, &s.id, "admin", Utc::now())
            .await
            .unwrap());
        assert!(!SaleRepository::mark_refunded(&mut conn, &s.id, "admin", Utc::now())
            .await
            .unwrap());
        drop(conn);

        let stored = db.sales().get_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SaleStatus::Refunded);
        assert_eq!(stored.refunded_by.as_deref(), Some("admin"));
        assert!(stored.refunded_at.is_some());
    }
}
