//! # Expense Repository

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use kassa_core::Expense;

#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    pub async fn list_for_shift(&self, shift_id: &str) -> DbResult<Vec<Expense>> {
        let expenses = sqlx::query_as::<_, Expense>(
            "SELECT * FROM expenses WHERE shift_id = ?1 ORDER BY created_at",
        )
        .bind(shift_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(expenses)
    }

    pub async fn insert(conn: &mut SqliteConnection, expense: &Expense) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, amount_tiyin, category, note, created_by, shift_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(expense.amount_tiyin)
        .bind(&expense.category)
        .bind(&expense.note)
        .bind(&expense.created_by)
        .bind(&expense.shift_id)
        .bind(expense.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
