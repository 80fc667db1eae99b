//! # Supplier Repository
//!
//! Supplier payables: a balance that supply receipts raise and supplier
//! payments lower.
//!
//! ```text
//! receipt 2 000 000 ──► balance +2 000 000   (store owes more)
//! payment   500 000 ──► balance −  500 000   (store owes less)
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kassa_core::{Money, Supplier, SupplierPayment, SupplyReceipt};

#[derive(Debug, Clone)]
pub struct SupplierRepository {
    pool: SqlitePool,
}

impl SupplierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SupplierRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(supplier)
    }

    pub async fn list(&self) -> DbResult<Vec<Supplier>> {
        let suppliers = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(suppliers)
    }

    pub async fn receipts_for(&self, supplier_id: &str) -> DbResult<Vec<SupplyReceipt>> {
        let receipts = sqlx::query_as::<_, SupplyReceipt>(
            "SELECT * FROM supply_receipts WHERE supplier_id = ?1 ORDER BY created_at DESC",
        )
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(receipts)
    }

    pub async fn payments_for(&self, supplier_id: &str) -> DbResult<Vec<SupplierPayment>> {
        let payments = sqlx::query_as::<_, SupplierPayment>(
            "SELECT * FROM supplier_payments WHERE supplier_id = ?1 ORDER BY created_at DESC",
        )
        .bind(supplier_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Supplier>> {
        let supplier = sqlx::query_as::<_, Supplier>("SELECT * FROM suppliers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(supplier)
    }

    pub async fn insert(conn: &mut SqliteConnection, supplier: &Supplier) -> DbResult<()> {
        debug!(id = %supplier.id, name = %supplier.name, "Inserting supplier");

        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, phone, balance_tiyin, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&supplier.id)
        .bind(&supplier.name)
        .bind(&supplier.phone)
        .bind(supplier.balance_tiyin)
        .bind(supplier.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Relative balance change. `false` when the supplier is missing.
    pub async fn adjust_balance(
        conn: &mut SqliteConnection,
        id: &str,
        delta: Money,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE suppliers SET balance_tiyin = balance_tiyin + ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(delta.tiyin())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_receipt(conn: &mut SqliteConnection, receipt: &SupplyReceipt) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO supply_receipts (id, supplier_id, total_tiyin, note, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.supplier_id)
        .bind(receipt.total_tiyin)
        .bind(&receipt.note)
        .bind(&receipt.created_by)
        .bind(receipt.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn insert_payment(conn: &mut SqliteConnection, payment: &SupplierPayment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO supplier_payments (
                id, supplier_id, amount_tiyin, method, note, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.supplier_id)
        .bind(payment.amount_tiyin)
        .bind(payment.method)
        .bind(&payment.note)
        .bind(&payment.created_by)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::memory_db;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_balance_moves_with_receipts_and_payments() {
        let db = memory_db().await;
        let supplier = Supplier {
            id: Uuid::new_v4().to_string(),
            name: "Toshkent Non".into(),
            phone: None,
            balance_tiyin: 0,
            created_at: Utc::now(),
        };

        let mut conn = db.pool().acquire().await.unwrap();
        SupplierRepository::insert(&mut conn, &supplier).await.unwrap();
        assert!(
            SupplierRepository::adjust_balance(&mut conn, &supplier.id, Money::from_som(2_000_000))
                .await
                .unwrap()
        );
        assert!(
            SupplierRepository::adjust_balance(&mut conn, &supplier.id, -Money::from_som(500_000))
                .await
                .unwrap()
        );
        assert!(!SupplierRepository::adjust_balance(&mut conn, "missing", Money::from_som(1))
            .await
            .unwrap());
        drop(conn);

        let stored = db.suppliers().get_by_id(&supplier.id).await.unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_som(1_500_000));
    }
}
