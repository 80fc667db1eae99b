//! # Supplier Payables
//!
//! What the store owes its suppliers. Receiving goods raises the balance,
//! paying lowers it; a supply document can restock products in the same
//! transaction.
//!
//! ```text
//! receive_supply(total = 900 000, lines = [Sut x24 @ 9 500, ...])
//!   BEGIN
//!     suppliers.balance += 900 000        (first write, SupplierNotFound on miss)
//!     INSERT supply_receipts
//!     per line: stock += qty, buy_price = line price, restock move (ref = receipt)
//!   COMMIT
//!
//! pay_supplier(amount = 500 000)
//!   BEGIN  suppliers.balance −= 500 000; INSERT supplier_payments  COMMIT
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use kassa_core::validation::{
    normalize_phone, validate_name, validate_positive_amount, validate_price, validate_quantity,
};
use kassa_core::{
    Actor, Capability, CoreError, Money, PaymentMethod, Product, Quantity, Supplier,
    SupplierPayment, SupplyReceipt, ValidationError,
};
use kassa_db::SupplierRepository;

use crate::error::PosResult;
use crate::events::PosEvent;
use crate::stock;
use crate::{clean_note, ServiceContext};

/// One product line on a supply document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyLine {
    pub product_id: String,
    pub quantity: Quantity,
    /// Replaces the product's buy price when present.
    pub buy_price: Option<Money>,
}

impl SupplyLine {
    pub fn new(product_id: impl Into<String>, quantity: Quantity) -> Self {
        SupplyLine {
            product_id: product_id.into(),
            quantity,
            buy_price: None,
        }
    }

    pub fn at_price(mut self, buy_price: Money) -> Self {
        self.buy_price = Some(buy_price);
        self
    }
}

/// A supplier document and the supplier after it was booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierEntry<T> {
    pub entry: T,
    pub supplier: Supplier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierHistory {
    pub supplier: Supplier,
    pub receipts: Vec<SupplyReceipt>,
    pub payments: Vec<SupplierPayment>,
}

#[derive(Clone)]
pub struct SupplierLedger {
    ctx: ServiceContext,
}

impl SupplierLedger {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        SupplierLedger { ctx }
    }

    pub async fn create_supplier(
        &self,
        actor: &Actor,
        name: &str,
        phone: Option<&str>,
    ) -> PosResult<Supplier> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageSuppliers)?;

        let supplier = Supplier {
            id: Uuid::new_v4().to_string(),
            name: validate_name("name", name)?,
            phone: normalize_phone(phone)?,
            balance_tiyin: 0,
            created_at: Utc::now(),
        };
        let supplier_ref = &supplier;

        self.ctx
            .retry("create_supplier", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                SupplierRepository::insert(&mut tx, supplier_ref).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(())
            })
            .await?;

        info!(supplier_id = %supplier.id, name = %supplier.name, "Supplier created");
        self.ctx
            .events
            .publish(PosEvent::audit(actor, "supplier.create", supplier.name.clone()));
        Ok(supplier)
    }

    /// Books a delivery; `lines` may be empty for a money-only document.
    pub async fn receive_supply(
        &self,
        actor: &Actor,
        supplier_id: &str,
        total: Money,
        lines: &[SupplyLine],
        note: Option<&str>,
    ) -> PosResult<SupplierEntry<SupplyReceipt>> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageSuppliers)?;
        validate_positive_amount("total", total)?;
        for line in lines {
            validate_quantity(line.quantity)?;
            if let Some(price) = line.buy_price {
                validate_price("buy_price", price)?;
            }
        }
        let note = clean_note(note);
        let note = note.as_deref();

        let (received, products) = self
            .ctx
            .retry("receive_supply", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                if !SupplierRepository::adjust_balance(&mut tx, supplier_id, total).await? {
                    return Err(CoreError::SupplierNotFound(supplier_id.to_string()).into());
                }

                let receipt = SupplyReceipt {
                    id: Uuid::new_v4().to_string(),
                    supplier_id: supplier_id.to_string(),
                    total_tiyin: total.tiyin(),
                    note: note.map(str::to_string),
                    created_by: actor.id.clone(),
                    created_at: Utc::now(),
                };
                SupplierRepository::insert_receipt(&mut tx, &receipt).await?;

                let mut products: Vec<Product> = Vec::with_capacity(lines.len());
                for line in lines {
                    let product = stock::receive(
                        &mut tx,
                        &line.product_id,
                        line.quantity,
                        line.buy_price,
                        Some(&receipt.id),
                        &actor.id,
                    )
                    .await?;
                    products.push(product);
                }

                let supplier = fetch_supplier(&mut tx, supplier_id).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok((
                    SupplierEntry {
                        entry: receipt,
                        supplier,
                    },
                    products,
                ))
            })
            .await?;

        info!(
            supplier_id = %supplier_id,
            receipt_id = %received.entry.id,
            total = %total,
            lines = products.len(),
            balance = %received.supplier.balance(),
            "Supply received"
        );
        let mut detail = format!("{} total {}", received.supplier.name, total);
        for product in &products {
            detail.push_str(&format!("; {} → {}", product.name, product.stock()));
        }
        self.ctx
            .events
            .publish(PosEvent::audit(actor, "supplier.receive", detail));
        Ok(received)
    }

    pub async fn pay_supplier(
        &self,
        actor: &Actor,
        supplier_id: &str,
        amount: Money,
        method: PaymentMethod,
        note: Option<&str>,
    ) -> PosResult<SupplierEntry<SupplierPayment>> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageSuppliers)?;
        validate_positive_amount("amount", amount)?;
        if !matches!(
            method,
            PaymentMethod::Cash | PaymentMethod::Card | PaymentMethod::Transfer
        ) {
            return Err(ValidationError::InvalidFormat {
                field: "method".to_string(),
                reason: "must be cash, card or transfer".to_string(),
            }
            .into());
        }
        let note = clean_note(note);
        let note = note.as_deref();

        let paid = self
            .ctx
            .retry("pay_supplier", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                if !SupplierRepository::adjust_balance(&mut tx, supplier_id, -amount).await? {
                    return Err(CoreError::SupplierNotFound(supplier_id.to_string()).into());
                }

                let payment = SupplierPayment {
                    id: Uuid::new_v4().to_string(),
                    supplier_id: supplier_id.to_string(),
                    amount_tiyin: amount.tiyin(),
                    method,
                    note: note.map(str::to_string),
                    created_by: actor.id.clone(),
                    created_at: Utc::now(),
                };
                SupplierRepository::insert_payment(&mut tx, &payment).await?;

                let supplier = fetch_supplier(&mut tx, supplier_id).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(SupplierEntry {
                    entry: payment,
                    supplier,
                })
            })
            .await?;

        info!(
            supplier_id = %supplier_id,
            amount = %amount,
            method = method.as_str(),
            balance = %paid.supplier.balance(),
            "Supplier paid"
        );
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "supplier.pay",
            format!("{} {} ({})", paid.supplier.name, amount, method.as_str()),
        ));
        Ok(paid)
    }

    pub async fn supplier_history(&self, supplier_id: &str) -> PosResult<SupplierHistory> {
        let suppliers = self.ctx.db.suppliers();
        let supplier = suppliers
            .get_by_id(supplier_id)
            .await?
            .ok_or_else(|| CoreError::SupplierNotFound(supplier_id.to_string()))?;
        Ok(SupplierHistory {
            receipts: suppliers.receipts_for(supplier_id).await?,
            payments: suppliers.payments_for(supplier_id).await?,
            supplier,
        })
    }

    pub async fn list(&self) -> PosResult<Vec<Supplier>> {
        Ok(self.ctx.db.suppliers().list().await?)
    }
}

async fn fetch_supplier(
    conn: &mut sqlx::SqliteConnection,
    supplier_id: &str,
) -> PosResult<Supplier> {
    Ok(SupplierRepository::fetch(conn, supplier_id)
        .await?
        .ok_or_else(|| CoreError::SupplierNotFound(supplier_id.to_string()))?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosError;
    use crate::test_support::{cashier, pos, product, warehouse};
    use kassa_core::MoveType;

    #[tokio::test]
    async fn test_receive_restocks_and_raises_balance() {
        let (pos, sink) = pos().await;
        let milk = product(&pos, "Sut", 4, 11_000).await;
        let supplier = pos
            .suppliers()
            .create_supplier(&warehouse(), "Musaffo Sut MChJ", Some("+998 71 200 00 00"))
            .await
            .unwrap();

        let received = pos
            .suppliers()
            .receive_supply(
                &warehouse(),
                &supplier.id,
                Money::from_som(228_000),
                &[SupplyLine::new(&milk.id, Quantity::from_units(24)).at_price(Money::from_som(9_500))],
                Some("invoice 118"),
            )
            .await
            .unwrap();
        assert_eq!(received.supplier.balance(), Money::from_som(228_000));

        let milk_after = pos.database().products().get_by_id(&milk.id).await.unwrap().unwrap();
        assert_eq!(milk_after.stock(), Quantity::from_units(28));
        assert_eq!(milk_after.buy_price(), Money::from_som(9_500));

        let moves = pos.stock().history(&milk.id, 10).await.unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].move_type, MoveType::Restock);
        assert_eq!(moves[0].reference_id.as_deref(), Some(received.entry.id.as_str()));

        let paid = pos
            .suppliers()
            .pay_supplier(&warehouse(), &supplier.id, Money::from_som(200_000), PaymentMethod::Transfer, None)
            .await
            .unwrap();
        assert_eq!(paid.supplier.balance(), Money::from_som(28_000));

        let history = pos.suppliers().supplier_history(&supplier.id).await.unwrap();
        assert_eq!(history.receipts.len(), 1);
        assert_eq!(history.payments.len(), 1);

        pos.shutdown().await;
        let actions = sink.actions().await;
        assert!(actions.contains(&"supplier.receive".to_string()));
        assert!(actions.contains(&"supplier.pay".to_string()));
    }

    #[tokio::test]
    async fn test_receive_with_unknown_product_rolls_back() {
        let (pos, _sink) = pos().await;
        let supplier = pos
            .suppliers()
            .create_supplier(&warehouse(), "Nonvoy", None)
            .await
            .unwrap();

        let err = pos
            .suppliers()
            .receive_supply(
                &warehouse(),
                &supplier.id,
                Money::from_som(10_000),
                &[SupplyLine::new("missing", Quantity::from_units(1))],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ProductNotFound(_))));

        let history = pos.suppliers().supplier_history(&supplier.id).await.unwrap();
        assert_eq!(history.supplier.balance(), Money::zero());
        assert!(history.receipts.is_empty());
    }

    #[tokio::test]
    async fn test_supplier_errors() {
        let (pos, _sink) = pos().await;

        let err = pos
            .suppliers()
            .create_supplier(&cashier(), "Nonvoy", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));

        let err = pos
            .suppliers()
            .pay_supplier(&warehouse(), "missing", Money::from_som(1), PaymentMethod::Cash, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::SupplierNotFound(_))));

        let err = pos
            .suppliers()
            .receive_supply(&warehouse(), "missing", Money::zero(), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Validation(_))));
    }
}
