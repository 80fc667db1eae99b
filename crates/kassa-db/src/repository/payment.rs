//! # Payment Repository
//!
//! Append-only client balance changes outside a sale. Positive amounts are
//! settlements collected at the till, negative amounts are manual debt grants.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use kassa_core::Payment;

#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    pub async fn list_for_client(&self, client_id: &str, limit: u32) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE client_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE shift_id = ?1 ORDER BY created_at",
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(payments)
    }

    pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, client_id, amount_tiyin, method,
                shift_id, created_by, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.client_id)
        .bind(payment.amount_tiyin)
        .bind(payment.method)
        .bind(&payment.shift_id)
        .bind(&payment.created_by)
        .bind(&payment.note)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
