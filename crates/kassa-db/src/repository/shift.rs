//! # Shift Repository
//!
//! Cash-drawer sessions and the window aggregates used to reconcile them.
//!
//! ## One Open Shift per Cashier
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CREATE UNIQUE INDEX idx_shifts_one_open                                │
//! │      ON shifts(cashier_id) WHERE status = 'open';                       │
//! │                                                                         │
//! │  open #1  ──► INSERT ok                                                 │
//! │  open #2  ──► UNIQUE constraint failed: shifts.cashier_id               │
//! │  close #1 ──► UPDATE ... WHERE status = 'open'                          │
//! │  open #3  ──► INSERT ok (closed rows are outside the index)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Shift Window
//! Totals cover rows where `created_by/cashier = shift.cashier_id` and
//! `opened_at <= created_at <= until` (`closed_at`, or now for a live shift).

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use kassa_core::{Money, Shift, ShiftTotals};

#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

/// Fields written when a shift closes.
#[derive(Debug, Clone)]
pub struct ShiftClosing {
    pub closing_balance: Money,
    pub expected_balance: Money,
    pub difference: Money,
    pub note: Option<String>,
    pub closed_at: DateTime<Utc>,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(shift)
    }

    pub async fn current_for(&self, cashier_id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_open_for(&mut conn, cashier_id).await
    }

    pub async fn list_for_cashier(&self, cashier_id: &str, limit: u32) -> DbResult<Vec<Shift>> {
        let shifts = sqlx::query_as::<_, Shift>(
            r#"
            SELECT * FROM shifts
            WHERE cashier_id = ?1
            ORDER BY opened_at DESC
            LIMIT ?2
            "#,
        )
        .bind(cashier_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(shifts)
    }

    /// Window totals read through the pool.
    pub async fn totals(
        &self,
        cashier_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<ShiftTotals> {
        let mut conn = self.pool.acquire().await?;
        Self::window_totals(&mut conn, cashier_id, from, until).await
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(shift)
    }

    pub async fn fetch_open_for(
        conn: &mut SqliteConnection,
        cashier_id: &str,
    ) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            "SELECT * FROM shifts WHERE cashier_id = ?1 AND status = 'open'",
        )
        .bind(cashier_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(shift)
    }

    /// No-op write that takes the write lock and returns the row, open or
    /// closed. Opens a close transaction before any read.
    pub async fn claim(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            "UPDATE shifts SET status = status WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(shift)
    }

    /// Like [`claim`](Self::claim) for the cashier's open shift.
    pub async fn claim_open_for(
        conn: &mut SqliteConnection,
        cashier_id: &str,
    ) -> DbResult<Option<Shift>> {
        let shift = sqlx::query_as::<_, Shift>(
            r#"
            UPDATE shifts SET status = status
            WHERE cashier_id = ?1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(cashier_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(shift)
    }

    /// Fails with a unique violation on `shifts.cashier_id` when the cashier
    /// already has an open shift.
    pub async fn insert(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<()> {
        debug!(id = %shift.id, cashier_id = %shift.cashier_id, "Opening shift");

        sqlx::query(
            r#"
            INSERT INTO shifts (
                id, cashier_id, opening_balance_tiyin, closing_balance_tiyin,
                expected_balance_tiyin, difference_tiyin, status, note,
                opened_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&shift.id)
        .bind(&shift.cashier_id)
        .bind(shift.opening_balance_tiyin)
        .bind(shift.closing_balance_tiyin)
        .bind(shift.expected_balance_tiyin)
        .bind(shift.difference_tiyin)
        .bind(shift.status)
        .bind(&shift.note)
        .bind(shift.opened_at)
        .bind(shift.closed_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// `open → closed`. Returns `false` when the shift is missing or already
    /// closed.
    pub async fn close(
        conn: &mut SqliteConnection,
        id: &str,
        closing: &ShiftClosing,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shifts SET
                status = 'closed',
                closing_balance_tiyin = ?2,
                expected_balance_tiyin = ?3,
                difference_tiyin = ?4,
                note = ?5,
                closed_at = ?6
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(closing.closing_balance.tiyin())
        .bind(closing.expected_balance.tiyin())
        .bind(closing.difference.tiyin())
        .bind(&closing.note)
        .bind(closing.closed_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Aggregates sales, client payments and expenses for a cashier window.
    pub async fn window_totals(
        conn: &mut SqliteConnection,
        cashier_id: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<ShiftTotals> {
        let (sales_count, sales_total, sales_cash, sales_card, sales_transfer, sales_debt): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(total_tiyin), 0),
                COALESCE(SUM(cash_tiyin), 0),
                COALESCE(SUM(card_tiyin), 0),
                COALESCE(SUM(transfer_tiyin), 0),
                COALESCE(SUM(debt_tiyin), 0)
            FROM sales
            WHERE cashier_id = ?1 AND status = 'completed'
              AND created_at >= ?2 AND created_at <= ?3
            "#,
        )
        .bind(cashier_id)
        .bind(from)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;

        let (refunds_count, refunds_total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(total_tiyin), 0)
            FROM sales
            WHERE cashier_id = ?1 AND status = 'refunded'
              AND created_at >= ?2 AND created_at <= ?3
            "#,
        )
        .bind(cashier_id)
        .bind(from)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;

        let (payments_total, payments_cash, payments_card, payments_transfer): (i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COALESCE(SUM(amount_tiyin), 0),
                    COALESCE(SUM(CASE WHEN method = 'cash' THEN amount_tiyin ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN method = 'card' THEN amount_tiyin ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN method = 'transfer' THEN amount_tiyin ELSE 0 END), 0)
                FROM payments
                WHERE created_by = ?1 AND amount_tiyin > 0
                  AND created_at >= ?2 AND created_at <= ?3
                "#,
            )
            .bind(cashier_id)
            .bind(from)
            .bind(until)
            .fetch_one(&mut *conn)
            .await?;

        let expenses_total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_tiyin), 0)
            FROM expenses
            WHERE created_by = ?1
              AND created_at >= ?2 AND created_at <= ?3
            "#,
        )
        .bind(cashier_id)
        .bind(from)
        .bind(until)
        .fetch_one(&mut *conn)
        .await?;

        Ok(ShiftTotals {
            sales_count,
            sales_total: Money::from_tiyin(sales_total),
            sales_cash: Money::from_tiyin(sales_cash),
            sales_card: Money::from_tiyin(sales_card),
            sales_transfer: Money::from_tiyin(sales_transfer),
            sales_debt: Money::from_tiyin(sales_debt),
            refunds_count,
            refunds_total: Money::from_tiyin(refunds_total),
            payments_total: Money::from_tiyin(payments_total),
            payments_cash: Money::from_tiyin(payments_cash),
            payments_card: Money::from_tiyin(payments_card),
            payments_transfer: Money::from_tiyin(payments_transfer),
            expenses_total: Money::from_tiyin(expenses_total),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
