//! # Repository Module
//!
//! SQL for every table of the ledger store.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Reads outside a transaction            Writes inside a transaction     │
//! │  ─────────────────────────────          ───────────────────────────     │
//! │  db.products().get_by_id(id)            let mut tx = db.begin().await?; │
//! │  db.sales().list_recent(20)             ProductRepository::             │
//! │       │                                     decrement_stock(&mut *tx,   │
//! │       │ &self, uses the pool                  id, qty)                  │
//! │       ▼                                 SaleRepository::insert(         │
//! │  SqlitePool                                 &mut *tx, &sale)            │
//! │                                         tx.commit().await?;             │
//! │                                              │                          │
//! │                                              │ associated fns taking    │
//! │                                              ▼ &mut SqliteConnection    │
//! │                                         one atomic unit                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transaction boundaries belong to the POS services; repositories never
//! begin or commit.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`] - Catalog rows, guarded stock updates
//! - [`CategoryRepository`] - Product categories
//! - [`StockMoveRepository`] - Append-only inventory ledger
//! - [`SaleRepository`] - Sales, items, receipt counter
//! - [`ClientRepository`] - Client balances
//! - [`PaymentRepository`] - Client payments and debt grants
//! - [`ShiftRepository`] - Cash-drawer sessions and shift totals
//! - [`ExpenseRepository`] - Drawer expenses
//! - [`SupplierRepository`] - Supplier balances, receipts, payments
//! - [`SettingsRepository`] - Single-row store settings
//! - [`AuditRepository`] - Audit log

pub mod audit;
pub mod category;
pub mod client;
pub mod expense;
pub mod payment;
pub mod product;
pub mod sale;
pub mod settings;
pub mod shift;
pub mod stock_move;
pub mod supplier;

pub use audit::AuditRepository;
pub use category::CategoryRepository;
pub use client::ClientRepository;
pub use expense::ExpenseRepository;
pub use payment::PaymentRepository;
pub use product::ProductRepository;
pub use sale::SaleRepository;
pub use settings::SettingsRepository;
pub use shift::{ShiftClosing, ShiftRepository};
pub use stock_move::StockMoveRepository;
pub use supplier::SupplierRepository;
