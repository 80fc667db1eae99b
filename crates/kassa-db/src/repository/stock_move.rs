//! # Stock Move Repository
//!
//! The append-only inventory ledger. Rows are inserted, never updated or
//! deleted, so for every product:
//!
//! ```text
//! Σ quantity_milli (all moves) = current stock − stock at creation
//! ```

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use kassa_core::{Quantity, StockMove};

#[derive(Debug, Clone)]
pub struct StockMoveRepository {
    pool: SqlitePool,
}

impl StockMoveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockMoveRepository { pool }
    }

    /// Newest first.
    pub async fn list_for_product(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockMove>> {
        let moves = sqlx::query_as::<_, StockMove>(
            r#"
            SELECT * FROM stock_moves
            WHERE product_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(moves)
    }

    /// Moves caused by one sale or supply receipt.
    pub async fn list_for_reference(&self, reference_id: &str) -> DbResult<Vec<StockMove>> {
        let moves = sqlx::query_as::<_, StockMove>(
            "SELECT * FROM stock_moves WHERE reference_id = ?1 ORDER BY created_at",
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(moves)
    }

    /// Net movement of a product over its whole history.
    pub async fn net_quantity(&self, product_id: &str) -> DbResult<Quantity> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_milli), 0) FROM stock_moves WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Quantity::from_milli(total))
    }

    pub async fn insert(conn: &mut SqliteConnection, mv: &StockMove) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_moves (
                id, product_id, quantity_milli, move_type,
                reason, reference_id, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&mv.id)
        .bind(&mv.product_id)
        .bind(mv.quantity_milli)
        .bind(mv.move_type)
        .bind(&mv.reason)
        .bind(&mv.reference_id)
        .bind(&mv.actor_id)
        .bind(mv.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
