//! # Stock Engine
//!
//! Validates and applies inventory deltas, writing one `StockMove` per change.
//!
//! ## Guarded Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Sale Line: Non x6, stock 10                         │
//! │                                                                         │
//! │  UPDATE products SET stock_milli = stock_milli - 6000                   │
//! │  WHERE id = ? AND stock_milli >= 6000                                   │
//! │       │                                                                 │
//! │       ├── 1 row  ──► INSERT stock_moves (sale, -6000, ref = sale id)    │
//! │       │                                                                 │
//! │       └── 0 rows ──► re-read the row                                    │
//! │                        missing  → ProductNotFound                       │
//! │                        short    → InsufficientStock { available: 4 }    │
//! │                        (caller drops the tx: earlier lines roll back)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The transactional functions (`reserve_and_apply`, `restore`, `receive`)
//! run inside a caller's transaction. The `StockEngine` methods own their
//! transaction and publish events after commit.
//!
//! ## Conservation
//! Opening stock is written at product creation without a move, so for every
//! product `Σ stock_moves.quantity = stock - opening stock`.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use kassa_core::validation::validate_name;
use kassa_core::{
    Actor, Capability, CoreError, Money, MoveType, Product, Quantity, Role, SaleItem, StockMove,
    ValidationError,
};
use kassa_db::{ProductRepository, SettingsRepository, StockMoveRepository};

use crate::error::PosResult;
use crate::events::{NotificationKind, PosEvent, Recipient};
use crate::ServiceContext;

// =============================================================================
// Transactional Primitives
// =============================================================================

/// Decrements every line or fails on the first one that cannot be covered.
///
/// `lines` must already have duplicate products merged. Returns the products
/// as they stand after the decrement, in line order.
pub async fn reserve_and_apply(
    conn: &mut SqliteConnection,
    lines: &[(String, Quantity)],
    reference_id: &str,
    actor_id: &str,
) -> PosResult<Vec<Product>> {
    let mut products = Vec::with_capacity(lines.len());

    for (product_id, quantity) in lines {
        if !ProductRepository::decrement_stock(&mut *conn, product_id, *quantity).await? {
            return Err(shortfall(&mut *conn, product_id, *quantity).await);
        }

        let product = ProductRepository::fetch(&mut *conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.clone()))?;
        if product.is_archived {
            return Err(CoreError::ProductArchived(product.name).into());
        }

        StockMoveRepository::insert(
            &mut *conn,
            &new_move(product_id, -*quantity, MoveType::Sale, None, Some(reference_id), actor_id),
        )
        .await?;

        debug!(product_id = %product_id, quantity = %quantity, stock = %product.stock(), "Stock reserved");
        products.push(product);
    }

    Ok(products)
}

/// Puts refunded sale lines back on the shelf.
pub async fn restore(
    conn: &mut SqliteConnection,
    items: &[SaleItem],
    reference_id: &str,
    actor_id: &str,
) -> PosResult<()> {
    for item in items {
        let quantity = item.quantity();
        if !ProductRepository::apply_delta(&mut *conn, &item.product_id, quantity).await? {
            return Err(CoreError::ProductNotFound(item.product_id.clone()).into());
        }

        StockMoveRepository::insert(
            &mut *conn,
            &new_move(
                &item.product_id,
                quantity,
                MoveType::Refund,
                None,
                Some(reference_id),
                actor_id,
            ),
        )
        .await?;
    }
    Ok(())
}

/// Goods received: stock up, buy price replaced when given.
pub async fn receive(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: Quantity,
    buy_price: Option<Money>,
    reference_id: Option<&str>,
    actor_id: &str,
) -> PosResult<Product> {
    if !ProductRepository::apply_delta(&mut *conn, product_id, quantity).await? {
        return Err(CoreError::ProductNotFound(product_id.to_string()).into());
    }
    if let Some(price) = buy_price {
        ProductRepository::set_buy_price(&mut *conn, product_id, price).await?;
    }

    StockMoveRepository::insert(
        &mut *conn,
        &new_move(product_id, quantity, MoveType::Restock, None, reference_id, actor_id),
    )
    .await?;

    fetch_product(conn, product_id).await
}

/// Signed correction that may not take stock below zero.
async fn correct(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: Quantity,
    move_type: MoveType,
    reason: &str,
    actor_id: &str,
) -> PosResult<Product> {
    if !ProductRepository::apply_delta(&mut *conn, product_id, delta).await? {
        let product = ProductRepository::fetch(&mut *conn, product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;
        return Err(CoreError::NegativeStock {
            product: product.name.clone(),
            current: product.stock(),
            delta,
        }
        .into());
    }

    StockMoveRepository::insert(
        &mut *conn,
        &new_move(product_id, delta, move_type, Some(reason), None, actor_id),
    )
    .await?;

    fetch_product(conn, product_id).await
}

/// Explains a failed guarded decrement.
async fn shortfall(conn: &mut SqliteConnection, product_id: &str, requested: Quantity) -> crate::PosError {
    match ProductRepository::fetch(conn, product_id).await {
        Ok(Some(product)) => CoreError::InsufficientStock {
            product: product.name.clone(),
            available: product.stock(),
            requested,
        }
        .into(),
        Ok(None) => CoreError::ProductNotFound(product_id.to_string()).into(),
        Err(e) => e.into(),
    }
}

async fn fetch_product(conn: &mut SqliteConnection, product_id: &str) -> PosResult<Product> {
    Ok(ProductRepository::fetch(conn, product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?)
}

fn new_move(
    product_id: &str,
    delta: Quantity,
    move_type: MoveType,
    reason: Option<&str>,
    reference_id: Option<&str>,
    actor_id: &str,
) -> StockMove {
    StockMove {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        quantity_milli: delta.milli(),
        move_type,
        reason: reason.map(str::to_string),
        reference_id: reference_id.map(str::to_string),
        actor_id: Some(actor_id.to_string()),
        created_at: Utc::now(),
    }
}

/// `LowStock` for a product that went from `>= threshold` to `< threshold`
/// through `delta`.
pub(crate) fn low_stock_crossing(
    product: &Product,
    delta: Quantity,
    threshold: Quantity,
) -> Option<PosEvent> {
    let after = product.stock();
    let before = after - delta;
    if before >= threshold && after < threshold {
        Some(PosEvent::notify(
            Recipient::Role(Role::Admin),
            NotificationKind::LowStock {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                stock: after,
                threshold,
            },
        ))
    } else {
        None
    }
}

// =============================================================================
// Stock Engine Service
// =============================================================================

/// Restock, corrections and counts outside of sales.
#[derive(Clone)]
pub struct StockEngine {
    ctx: ServiceContext,
}

impl StockEngine {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        StockEngine { ctx }
    }

    /// Receives goods without a supplier document.
    pub async fn restock(
        &self,
        actor: &Actor,
        product_id: &str,
        quantity: Quantity,
        buy_price: Option<Money>,
    ) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::Restock)?;
        check_positive_quantity(quantity)?;
        if let Some(price) = buy_price {
            kassa_core::validation::validate_price("buy_price", price)?;
        }

        let product = self
            .ctx
            .retry("restock", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let product =
                    receive(&mut tx, product_id, quantity, buy_price, None, &actor.id).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(product)
            })
            .await?;

        info!(product_id = %product_id, quantity = %quantity, stock = %product.stock(), "Restocked");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "stock.restock",
            format!("{} +{} → {}", product.name, quantity, product.stock()),
        ));
        Ok(product)
    }

    /// Manual correction (damage, loss, found goods).
    pub async fn adjust(
        &self,
        actor: &Actor,
        product_id: &str,
        delta: Quantity,
        reason: &str,
    ) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::AdjustStock)?;
        if delta == Quantity::zero() {
            return Err(ValidationError::InvalidFormat {
                field: "delta".to_string(),
                reason: "must not be zero".to_string(),
            }
            .into());
        }
        let reason = validate_name("reason", reason)?;
        let reason = reason.as_str();

        let (product, threshold) = self
            .ctx
            .retry("adjust_stock", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let product =
                    correct(&mut tx, product_id, delta, MoveType::Adjustment, reason, &actor.id)
                        .await?;
                let threshold = SettingsRepository::fetch(&mut tx).await?.low_stock_threshold();
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok((product, threshold))
            })
            .await?;

        info!(product_id = %product_id, delta = %delta, stock = %product.stock(), "Stock adjusted");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "stock.adjust",
            format!("{} {} ({}) → {}", product.name, delta, reason, product.stock()),
        ));
        if let Some(event) = low_stock_crossing(&product, delta, threshold) {
            self.ctx.events.publish(event);
        }
        Ok(product)
    }

    /// Physical count: records `counted - current` as an `audit` move.
    pub async fn count(
        &self,
        actor: &Actor,
        product_id: &str,
        counted: Quantity,
        reason: &str,
    ) -> PosResult<Product> {
        self.ctx.ensure_open()?;
        actor.require(Capability::AdjustStock)?;
        if counted.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "counted".to_string(),
            }
            .into());
        }
        let reason = validate_name("reason", reason)?;
        let reason = reason.as_str();

        let (product, delta, threshold) = self
            .ctx
            .retry("count_stock", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                // Zero delta: takes the write lock before reading the level.
                if !ProductRepository::apply_delta(&mut tx, product_id, Quantity::zero()).await? {
                    return Err(CoreError::ProductNotFound(product_id.to_string()).into());
                }
                let current = fetch_product(&mut tx, product_id).await?.stock();
                let delta = counted - current;
                let product =
                    correct(&mut tx, product_id, delta, MoveType::Audit, reason, &actor.id).await?;
                let threshold = SettingsRepository::fetch(&mut tx).await?.low_stock_threshold();
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok((product, delta, threshold))
            })
            .await?;

        info!(product_id = %product_id, counted = %counted, delta = %delta, "Stock counted");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "stock.count",
            format!("{} counted {} (delta {})", product.name, counted, delta),
        ));
        if let Some(event) = low_stock_crossing(&product, delta, threshold) {
            self.ctx.events.publish(event);
        }
        Ok(product)
    }

    /// Newest moves first.
    pub async fn history(&self, product_id: &str, limit: u32) -> PosResult<Vec<StockMove>> {
        Ok(self.ctx.db.stock_moves().list_for_product(product_id, limit).await?)
    }

    /// Products under `threshold`, or under the store setting when `None`.
    pub async fn low_stock(&self, threshold: Option<Quantity>) -> PosResult<Vec<Product>> {
        let threshold = match threshold {
            Some(t) => t,
            None => self.ctx.db.settings().get().await?.low_stock_threshold(),
        };
        Ok(self.ctx.db.products().low_stock(threshold).await?)
    }
}

fn check_positive_quantity(quantity: Quantity) -> PosResult<()> {
    kassa_core::validation::validate_quantity(quantity)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
