//! # kassa-db: Ledger Store for Kassa POS
//!
//! SQLite persistence for the POS core: mutable balances (stock, client and
//! supplier balances) and the append-only history behind them.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Data Flow                                  │
//! │                                                                         │
//! │  kassa-pos service (create_sale, refund_sale, ...)                      │
//! │       │  owns the transaction                                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ ProductRepo   │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ 001_initial_ │   │   │
//! │  │   │ begin()       │    │ ClientRepo    │    │   schema.sql │   │   │
//! │  │   │ busy_timeout  │    │ ShiftRepo ... │    │              │   │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per table group
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_db::{Database, DbConfig, ProductRepository};
//!
//! let db = Database::new(DbConfig::new("kassa.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let ok = ProductRepository::decrement_stock(&mut *tx, &product_id, qty).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    AuditRepository, CategoryRepository, ClientRepository, ExpenseRepository,
    PaymentRepository, ProductRepository, SaleRepository, SettingsRepository,
    ShiftClosing, ShiftRepository, StockMoveRepository, SupplierRepository,
};
