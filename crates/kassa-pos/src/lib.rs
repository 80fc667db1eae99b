//! # kassa-pos: Transactional Services for Kassa POS
//!
//! Every operation that moves stock, money or client credit runs here as a
//! single SQLite transaction: all of its writes commit together or none do.
//!
//! ## Service Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Pos                                       │
//! │                                                                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌───────────┐ ┌────────────┐           │
//! │  │ SaleCoord.  │ │ StockEngine │ │ ShiftGate │ │CreditLedger│  ...      │
//! │  └──────┬──────┘ └──────┬──────┘ └─────┬─────┘ └─────┬──────┘           │
//! │         └───────────────┴──────┬───────┴─────────────┘                  │
//! │                                ▼                                        │
//! │                         ServiceContext                                  │
//! │        Database (pool) • PosConfig • EventPublisher • closed flag       │
//! │                                │                                        │
//! │             ┌──────────────────┼────────────────────┐                   │
//! │             ▼                  ▼                    ▼                   │
//! │       kassa-db repos     with_retry (busy)    EventDispatcher task      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Operation Shape
//!
//! 1. `ensure_open`, capability check, input validation (no I/O)
//! 2. `with_retry`: begin, first statement is a write, reads, writes, commit
//! 3. publish events (never fails the operation)
//!
//! ## Example
//!
//! ```rust,no_run
//! use kassa_core::{Actor, Role, SaleLine, SaleRequest, Money, Quantity};
//! use kassa_pos::{Pos, PosConfig};
//!
//! # async fn run() -> kassa_pos::PosResult<()> {
//! let pos = Pos::open(PosConfig::load_or_default(None)).await?;
//! let cashier = Actor::new("u-7", "Aziz", Role::Cashier);
//!
//! pos.shifts().open_shift(&cashier, Money::from_som(200_000), None).await?;
//! let receipt = pos
//!     .sales()
//!     .create_sale(
//!         &cashier,
//!         &SaleRequest::cash(vec![SaleLine::new("p-1", Quantity::from_units(2), Money::from_som(4_000))]),
//!     )
//!     .await?;
//! println!("{}", receipt.sale.receipt_number);
//!
//! pos.shutdown().await;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod credit;
pub mod error;
pub mod events;
pub mod retry;
pub mod sale;
pub mod shift;
pub mod stock;
pub mod supplier;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{Catalog, NewProduct, ProductUpdate};
pub use config::{BonusRefundPolicy, PosConfig, PricePolicy};
pub use credit::{BalanceChange, ClientHistory, CreditLedger, NewClient};
pub use error::{ErrorCode, PosError, PosResult};
pub use events::{
    AuditLogSink, EventSink, MemorySink, NotificationKind, PosEvent, Recipient, TracingSink,
};
pub use sale::SaleCoordinator;
pub use shift::ShiftGate;
pub use stock::StockEngine;
pub use supplier::{SupplierEntry, SupplierHistory, SupplierLedger, SupplyLine};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::info;

use kassa_core::DebtTerms;
use kassa_db::Database;

use events::{DispatcherHandle, EventDispatcher, EventPublisher};

// =============================================================================
// Service Context
// =============================================================================

/// What every service holds. Cheap to clone.
#[derive(Clone)]
pub(crate) struct ServiceContext {
    pub(crate) db: Database,
    pub(crate) config: Arc<PosConfig>,
    pub(crate) events: EventPublisher,
    closed: Arc<AtomicBool>,
}

impl ServiceContext {
    pub(crate) fn ensure_open(&self) -> PosResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PosError::ShuttingDown);
        }
        Ok(())
    }

    pub(crate) fn debt_terms(&self, today: NaiveDate) -> DebtTerms {
        DebtTerms::new(today, self.config.sales.default_debt_term_days)
    }

    pub(crate) async fn retry<T, F, Fut>(&self, operation: &str, attempt_fn: F) -> PosResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PosResult<T>>,
    {
        retry::with_retry(&self.config.retry, operation, attempt_fn).await
    }
}

/// Trimmed note, `None` when blank.
pub(crate) fn clean_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

// =============================================================================
// Pos Facade
// =============================================================================

/// Entry point: owns the database pool and the event dispatcher.
pub struct Pos {
    ctx: ServiceContext,
    dispatcher: Mutex<Option<DispatcherHandle>>,
}

impl Pos {
    /// Opens the store with the default sinks (tracing log + audit table).
    pub async fn open(config: PosConfig) -> PosResult<Self> {
        Self::open_with_sinks(config, Vec::new()).await
    }

    /// Opens the store with extra sinks next to the default ones.
    pub async fn open_with_sinks(
        config: PosConfig,
        extra_sinks: Vec<Arc<dyn EventSink>>,
    ) -> PosResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;

        let mut sinks: Vec<Arc<dyn EventSink>> = vec![
            Arc::new(TracingSink),
            Arc::new(AuditLogSink::new(db.clone())),
        ];
        sinks.extend(extra_sinks);

        let (publisher, handle) = EventDispatcher::spawn(config.events.channel_capacity, sinks);

        info!(
            path = %config.database.path.display(),
            in_memory = config.database.in_memory,
            price_policy = %config.sales.price_policy,
            "POS opened"
        );

        Ok(Pos {
            ctx: ServiceContext {
                db,
                config: Arc::new(config),
                events: publisher,
                closed: Arc::new(AtomicBool::new(false)),
            },
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub fn stock(&self) -> StockEngine {
        StockEngine::new(self.ctx.clone())
    }

    pub fn sales(&self) -> SaleCoordinator {
        SaleCoordinator::new(self.ctx.clone())
    }

    pub fn shifts(&self) -> ShiftGate {
        ShiftGate::new(self.ctx.clone())
    }

    pub fn credit(&self) -> CreditLedger {
        CreditLedger::new(self.ctx.clone())
    }

    pub fn suppliers(&self) -> SupplierLedger {
        SupplierLedger::new(self.ctx.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.ctx.clone())
    }

    /// Direct read access for reports.
    pub fn database(&self) -> &Database {
        &self.ctx.db
    }

    pub fn config(&self) -> &PosConfig {
        &self.ctx.config
    }

    /// Stops accepting operations, drains pending events, closes the pool.
    ///
    /// Idempotent. Operations started afterwards fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        if self.ctx.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(handle) = self.dispatcher.lock().await.take() {
            handle.shutdown().await;
        }
        self.ctx.db.close().await;
        info!("POS shut down");
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use kassa_core::{Actor, Client, Money, Product, Quantity, Role, Shift};

    use crate::catalog::NewProduct;
    use crate::config::PosConfig;
    use crate::credit::NewClient;
    use crate::events::MemorySink;
    use crate::Pos;

    pub async fn pos() -> (Pos, MemorySink) {
        pos_with(PosConfig::in_memory()).await
    }

    pub async fn pos_with(config: PosConfig) -> (Pos, MemorySink) {
        let sink = MemorySink::new();
        let pos = Pos::open_with_sinks(config, vec![Arc::new(sink.clone())])
            .await
            .unwrap();
        (pos, sink)
    }

    pub fn admin() -> Actor {
        Actor::new("u-admin", "Dilnoza", Role::Admin)
    }

    pub fn manager() -> Actor {
        Actor::new("u-manager", "Bekzod", Role::Manager)
    }

    pub fn cashier() -> Actor {
        Actor::new("u-cashier", "Aziz", Role::Cashier)
    }

    pub fn warehouse() -> Actor {
        Actor::new("u-store", "Sardor", Role::Warehouse)
    }

    /// Product with `stock_units` on the shelf, sold at `price_som`.
    pub async fn product(pos: &Pos, name: &str, stock_units: i64, price_som: i64) -> Product {
        pos.catalog()
            .create_product(
                &admin(),
                NewProduct::new(name, Money::from_som(price_som))
                    .with_buy_price(Money::from_som(price_som * 3 / 4))
                    .with_stock(Quantity::from_units(stock_units)),
            )
            .await
            .unwrap()
    }

    pub async fn client(pos: &Pos, name: &str) -> Client {
        pos.credit()
            .create_client(&admin(), NewClient::new(name))
            .await
            .unwrap()
    }

    pub async fn open_shift(pos: &Pos, actor: &Actor) -> Shift {
        pos.shifts()
            .open_shift(actor, Money::from_som(100_000), None)
            .await
            .unwrap()
    }
}
