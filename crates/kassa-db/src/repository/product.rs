//! # Product Repository
//!
//! Catalog rows and the guarded stock updates the Stock Engine is built on.
//!
//! ## Guarded Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                        │
//! │     SET stock_milli = stock_milli - :qty                                │
//! │   WHERE id = :id AND stock_milli >= :qty                                │
//! │                                                                         │
//! │  rows_affected = 1 → applied                                            │
//! │  rows_affected = 0 → missing product OR not enough stock                │
//! │                      (caller re-reads the row to tell which)            │
//! │                                                                         │
//! │  The comparison and the write are one statement, so two cashiers        │
//! │  selling the last units can never both succeed.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use kassa_core::{Money, Product, Quantity};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE barcode = ?1 AND is_archived = 0")
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Substring search over name and barcode. Favorites first, then by name.
    /// An empty query lists the catalog.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let pattern = format!("%{}%", query);
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_archived = 0 AND (?1 = '' OR name LIKE ?2 OR barcode LIKE ?2)
            ORDER BY is_favorite DESC, name
            LIMIT ?3
            "#,
        )
        .bind(query)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    pub async fn list_favorites(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE is_favorite = 1 AND is_archived = 0 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    /// Products with stock strictly below `threshold`, emptiest first.
    pub async fn low_stock(&self, threshold: Quantity) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE stock_milli < ?1 AND is_archived = 0 ORDER BY stock_milli, name",
        )
        .bind(threshold.milli())
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Transactional
    // =========================================================================

    /// Reads a product on the transaction's connection.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(product)
    }

    pub async fn insert(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, barcode, buy_price_tiyin, sell_price_tiyin,
                stock_milli, unit, category_id, is_favorite, is_archived,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(product.buy_price_tiyin)
        .bind(product.sell_price_tiyin)
        .bind(product.stock_milli)
        .bind(&product.unit)
        .bind(&product.category_id)
        .bind(product.is_favorite)
        .bind(product.is_archived)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Writes every catalog field except stock.
    pub async fn update_details(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                barcode = ?3,
                buy_price_tiyin = ?4,
                sell_price_tiyin = ?5,
                unit = ?6,
                category_id = ?7,
                is_favorite = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(product.buy_price_tiyin)
        .bind(product.sell_price_tiyin)
        .bind(&product.unit)
        .bind(&product.category_id)
        .bind(product.is_favorite)
        .bind(product.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }
        Ok(())
    }

    /// Flips the favorite flag and returns the new value.
    pub async fn toggle_favorite(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let flag: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE products SET is_favorite = NOT is_favorite, updated_at = ?2
            WHERE id = ?1
            RETURNING is_favorite
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        flag.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Retires or reinstates a product and returns the row.
    pub async fn set_archived(
        conn: &mut SqliteConnection,
        id: &str,
        archived: bool,
    ) -> DbResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET is_archived = ?2, updated_at = ?3
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(archived)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        product.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Guarded decrement. `false` means missing product or short stock.
    pub async fn decrement_stock(
        conn: &mut SqliteConnection,
        id: &str,
        quantity: Quantity,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products SET stock_milli = stock_milli - ?2, updated_at = ?3
            WHERE id = ?1 AND stock_milli >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity.milli())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Applies a signed delta unless the result would be negative.
    /// `false` means missing product or a result below zero.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        id: &str,
        delta: Quantity,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products SET stock_milli = stock_milli + ?2, updated_at = ?3
            WHERE id = ?1 AND stock_milli + ?2 >= 0
            "#,
        )
        .bind(id)
        .bind(delta.milli())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// "Last buy price wins".
    pub async fn set_buy_price(
        conn: &mut SqliteConnection,
        id: &str,
        price: Money,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET buy_price_tiyin = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(price.tiyin())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
