//! # Sale Transaction Coordinator
//!
//! Turns a cart into a committed sale, and a committed sale into a refund.
//!
//! ## create_sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sell? ─► cart.validate() ─► split check (policy)         no I/O yet    │
//! │                                                                         │
//! │  BEGIN ─────────────────────────────────────────────────────────────┐   │
//! │  │ 1. receipt counter += 1            (first statement is a write)  │   │
//! │  │ 2. open shift for cashier?         else ShiftNotOpen             │   │
//! │  │ 3. settings, client                else ClientNotFound           │   │
//! │  │ 4. reserve_and_apply(lines)        else InsufficientStock        │   │
//! │  │ 5. strict policy: cart price == shelf price                      │   │
//! │  │ 6. bonus spend ─► debt ─► bonus accrual (in memory)              │   │
//! │  │ 7. INSERT sale, sale_items, UPDATE client balances               │   │
//! │  COMMIT ────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  publish: sale.create audit, DebtSale, LowStock crossings               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error between BEGIN and COMMIT drops the transaction: stock, balances
//! and the sale row roll back together. Busy errors re-run the whole block.
//!
//! ## refund_sale
//!
//! The `completed → refunded` flip is the first write, so two concurrent
//! refunds of one sale serialize on it and the loser sees `AlreadyRefunded`.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use kassa_core::validation::validate_uuid;
use kassa_core::{
    Actor, Capability, Client, CoreError, CreditAccount, Money, Product, Quantity,
    Sale, SaleItem, SaleReceipt, SaleRequest, SaleStatus, ValidationError,
};
use kassa_db::{ClientRepository, SaleRepository, SettingsRepository, ShiftRepository};

use crate::config::{BonusRefundPolicy, PricePolicy};
use crate::error::PosResult;
use crate::events::{NotificationKind, PosEvent, Recipient};
use crate::stock;
use crate::ServiceContext;

#[derive(Clone)]
pub struct SaleCoordinator {
    ctx: ServiceContext,
}

impl SaleCoordinator {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        SaleCoordinator { ctx }
    }

    // =========================================================================
    // Create
    // =========================================================================

    pub async fn create_sale(&self, actor: &Actor, request: &SaleRequest) -> PosResult<SaleReceipt> {
        self.ctx.ensure_open()?;
        actor.require(Capability::Sell)?;
        request.validate()?;

        if !request.split_matches() {
            match self.ctx.config.sales.price_policy {
                PricePolicy::Strict => {
                    return Err(ValidationError::SplitMismatch {
                        split: request.split_total(),
                        total: request.total(),
                    }
                    .into());
                }
                PricePolicy::Lenient => warn!(
                    cashier_id = %actor.id,
                    split = %request.split_total(),
                    total = %request.total(),
                    "Payment split does not match sale total, accepting"
                ),
            }
        }

        let lines = request.quantities_by_product();
        let lines = lines.as_slice();

        let (receipt, events) = self
            .ctx
            .retry("create_sale", move || self.try_create_sale(actor, request, lines))
            .await?;

        info!(
            sale_id = %receipt.sale.id,
            receipt_number = %receipt.sale.receipt_number,
            total = %receipt.sale.total(),
            cashier_id = %actor.id,
            "Sale completed"
        );
        self.ctx.events.publish_all(events);
        Ok(receipt)
    }

    async fn try_create_sale(
        &self,
        actor: &Actor,
        request: &SaleRequest,
        lines: &[(String, Quantity)],
    ) -> PosResult<(SaleReceipt, Vec<PosEvent>)> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut tx = self.ctx.db.begin().await?;

        let receipt_number = SaleRepository::next_receipt_number(&mut tx, today).await?;

        let shift = ShiftRepository::fetch_open_for(&mut tx, &actor.id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotOpen {
                cashier_id: actor.id.clone(),
            })?;
        let settings = SettingsRepository::fetch(&mut tx).await?;

        let client = match &request.client_id {
            Some(id) => Some(
                ClientRepository::fetch(&mut tx, id)
                    .await?
                    .ok_or_else(|| CoreError::ClientNotFound(id.clone()))?,
            ),
            None => None,
        };

        let sale_id = Uuid::new_v4().to_string();
        let products = stock::reserve_and_apply(&mut tx, lines, &sale_id, &actor.id).await?;

        if self.ctx.config.sales.price_policy == PricePolicy::Strict {
            for line in &request.items {
                let product = find_product(&products, &line.product_id)?;
                if line.price != product.sell_price() {
                    return Err(CoreError::PriceMismatch {
                        product: product.name.clone(),
                        cart_price: line.price,
                        shelf_price: product.sell_price(),
                    }
                    .into());
                }
            }
        }

        // Spend is checked against the balance before this sale's accrual.
        let mut account = client.as_ref().map(CreditAccount::from);
        let mut bonus_earned = Money::zero();
        if let Some(account) = account.as_mut() {
            if request.bonus_spent.is_positive() {
                account.spend_bonus(request.bonus_spent)?;
            }
            if request.debt_amount.is_positive() {
                account.debt_sale(
                    request.debt_amount,
                    self.ctx.debt_terms(today),
                    request.due_date,
                );
            }
            bonus_earned = account.accrue_bonus(request.paid_amount(), settings.bonus_rate());
        }

        let sale = Sale {
            id: sale_id.clone(),
            receipt_number,
            status: SaleStatus::Completed,
            subtotal_tiyin: request.subtotal().tiyin(),
            bonus_spent_tiyin: request.bonus_spent.tiyin(),
            total_tiyin: request.total().tiyin(),
            payment_method: request.payment_method,
            cash_tiyin: request.cash_amount.tiyin(),
            card_tiyin: request.card_amount.tiyin(),
            transfer_tiyin: request.transfer_amount.tiyin(),
            debt_tiyin: request.debt_amount.tiyin(),
            bonus_earned_tiyin: bonus_earned.tiyin(),
            cashier_id: actor.id.clone(),
            cashier_name: actor.name.clone(),
            client_id: request.client_id.clone(),
            shift_id: Some(shift.id.clone()),
            created_at: now,
            refunded_at: None,
            refunded_by: None,
        };
        SaleRepository::insert(&mut tx, &sale).await?;

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = find_product(&products, &line.product_id)?;
            let item = SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                name_snapshot: product.name.clone(),
                quantity_milli: line.quantity.milli(),
                unit_price_tiyin: line.price.tiyin(),
                line_total_tiyin: line.line_total().tiyin(),
                created_at: now,
            };
            SaleRepository::insert_item(&mut tx, &item).await?;
            items.push(item);
        }

        let client = match (client, account) {
            (Some(client), Some(account)) => {
                ClientRepository::save_balances(&mut tx, &client.id, &account).await?;
                Some(refetch_client(&mut tx, &client.id).await?)
            }
            _ => None,
        };

        tx.commit().await.map_err(kassa_db::DbError::from)?;

        let mut events = vec![PosEvent::audit(
            actor,
            "sale.create",
            format!(
                "{} total {} ({})",
                sale.receipt_number,
                sale.total(),
                sale.payment_method.as_str()
            ),
        )];
        if let Some(client) = &client {
            if sale.debt().is_positive() {
                events.push(PosEvent::notify(
                    Recipient::Client(client.id.clone()),
                    NotificationKind::DebtSale {
                        sale_id: sale.id.clone(),
                        receipt_number: sale.receipt_number.clone(),
                        amount: sale.debt(),
                        balance: client.balance(),
                        due_date: client.debt_due_date,
                    },
                ));
            }
        }
        let threshold = settings.low_stock_threshold();
        for ((_, quantity), product) in lines.iter().zip(&products) {
            events.extend(stock::low_stock_crossing(product, -*quantity, threshold));
        }

        Ok((SaleReceipt { sale, items, client }, events))
    }

    // =========================================================================
    // Refund
    // =========================================================================

    pub async fn refund_sale(&self, actor: &Actor, sale_id: &str) -> PosResult<SaleReceipt> {
        self.ctx.ensure_open()?;
        actor.require(Capability::Refund)?;
        validate_uuid("sale_id", sale_id)?;

        let receipt = self
            .ctx
            .retry("refund_sale", move || self.try_refund_sale(actor, sale_id))
            .await?;

        info!(
            sale_id = %sale_id,
            receipt_number = %receipt.sale.receipt_number,
            refunded_by = %actor.id,
            "Sale refunded"
        );
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "sale.refund",
            format!("{} total {}", receipt.sale.receipt_number, receipt.sale.total()),
        ));
        Ok(receipt)
    }

    async fn try_refund_sale(&self, actor: &Actor, sale_id: &str) -> PosResult<SaleReceipt> {
        let mut tx = self.ctx.db.begin().await?;

        if !SaleRepository::mark_refunded(&mut tx, sale_id, &actor.id, Utc::now()).await? {
            return Err(match SaleRepository::fetch(&mut tx, sale_id).await? {
                Some(_) => CoreError::AlreadyRefunded(sale_id.to_string()),
                None => CoreError::SaleNotFound(sale_id.to_string()),
            }
            .into());
        }

        let sale = SaleRepository::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        let items = SaleRepository::fetch_items(&mut tx, sale_id).await?;

        stock::restore(&mut tx, &items, &sale.id, &actor.id).await?;

        let client = match &sale.client_id {
            Some(client_id) => {
                let client = refetch_client(&mut tx, client_id).await?;
                let mut account = CreditAccount::from(&client);

                if sale.debt().is_positive() {
                    account.forgive_debt(sale.debt());
                }
                let shortfall = account.claw_back_bonus(sale.bonus_earned());
                if shortfall.is_positive() {
                    warn!(
                        sale_id = %sale.id,
                        client_id = %client_id,
                        earned = %sale.bonus_earned(),
                        shortfall = %shortfall,
                        "Bonus already spent, claw-back stopped at zero"
                    );
                }
                if self.ctx.config.sales.bonus_refund_policy == BonusRefundPolicy::Restore {
                    account.restore_bonus(sale.bonus_spent());
                }

                ClientRepository::save_balances(&mut tx, client_id, &account).await?;
                Some(refetch_client(&mut tx, client_id).await?)
            }
            None => None,
        };

        tx.commit().await.map_err(kassa_db::DbError::from)?;

        Ok(SaleReceipt { sale, items, client })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Sale header, items and current client state.
    pub async fn receipt(&self, sale_id: &str) -> PosResult<SaleReceipt> {
        let sales = self.ctx.db.sales();
        let sale = sales
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;
        let items = sales.get_items(sale_id).await?;
        let client = match &sale.client_id {
            Some(id) => self.ctx.db.clients().get_by_id(id).await?,
            None => None,
        };
        Ok(SaleReceipt { sale, items, client })
    }

    pub async fn find_by_receipt_number(&self, receipt_number: &str) -> PosResult<SaleReceipt> {
        let sale = self
            .ctx
            .db
            .sales()
            .get_by_receipt_number(receipt_number)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(receipt_number.to_string()))?;
        self.receipt(&sale.id).await
    }

    pub async fn recent(&self, limit: u32) -> PosResult<Vec<Sale>> {
        Ok(self.ctx.db.sales().list_recent(limit).await?)
    }
}

fn find_product<'a>(products: &'a [Product], product_id: &str) -> PosResult<&'a Product> {
    Ok(products
        .iter()
        .find(|p| p.id == product_id)
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?)
}

async fn refetch_client(conn: &mut sqlx::SqliteConnection, client_id: &str) -> PosResult<Client> {
    Ok(ClientRepository::fetch(conn, client_id)
        .await?
        .ok_or_else(|| CoreError::ClientNotFound(client_id.to_string()))?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PosConfig;
    use crate::error::PosError;
    use crate::test_support::{admin, cashier, client, manager, open_shift, pos, pos_with, product};
    use chrono::{Duration, NaiveDate};
    use kassa_core::{MoveType, PaymentMethod, SaleLine};

    fn line(product: &Product, units: i64) -> SaleLine {
        SaleLine::new(&product.id, Quantity::from_units(units), product.sell_price())
    }

    async fn stock_of(pos: &crate::Pos, product_id: &str) -> Quantity {
        pos.database()
            .products()
            .get_by_id(product_id)
            .await
            .unwrap()
            .unwrap()
            .stock()
    }

    #[tokio::test]
    async fn test_sell_then_refund_restores_stock() {
        let (pos, sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;
        open_shift(&pos, &cashier()).await;

        let receipt = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&bread, 3)]))
            .await
            .unwrap();
        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].name_snapshot, "Non");
        assert_eq!(receipt.sale.total(), Money::from_som(12_000));
        assert!(receipt.sale.shift_id.is_some());
        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(7));

        let moves = pos.stock().history(&bread.id, 10).await.unwrap();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].move_type, MoveType::Sale);
        assert_eq!(moves[0].delta(), Quantity::from_units(-3));
        assert_eq!(moves[0].reference_id.as_deref(), Some(receipt.sale.id.as_str()));

        let refunded = pos.sales().refund_sale(&manager(), &receipt.sale.id).await.unwrap();
        assert!(refunded.sale.is_refunded());
        assert_eq!(refunded.sale.refunded_by.as_deref(), Some("u-manager"));
        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(10));

        let moves = pos.stock().history(&bread.id, 10).await.unwrap();
        assert_eq!(moves.len(), 2);
        assert!(moves
            .iter()
            .any(|m| m.move_type == MoveType::Refund && m.delta() == Quantity::from_units(3)));

        // Second refund is rejected and changes nothing.
        let err = pos.sales().refund_sale(&admin(), &receipt.sale.id).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::AlreadyRefunded(_))));
        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(10));

        pos.shutdown().await;
        let actions = sink.actions().await;
        assert!(actions.contains(&"sale.create".to_string()));
        assert!(actions.contains(&"sale.refund".to_string()));
    }

    #[tokio::test]
    async fn test_receipt_numbers_are_sequential_per_day() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;
        open_shift(&pos, &cashier()).await;

        let first = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&bread, 1)]))
            .await
            .unwrap();
        let second = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&bread, 1)]))
            .await
            .unwrap();
        assert_ne!(first.sale.receipt_number, second.sale.receipt_number);

        let found = pos
            .sales()
            .find_by_receipt_number(&second.sale.receipt_number)
            .await
            .unwrap();
        assert_eq!(found.sale.id, second.sale.id);
    }

    #[tokio::test]
    async fn test_one_short_line_aborts_whole_sale() {
        let (pos, _sink) = pos().await;
        let rice = product(&pos, "Guruch", 10, 19_000).await;
        let salt = product(&pos, "Tuz", 1, 3_000).await;
        open_shift(&pos, &cashier()).await;

        let err = pos
            .sales()
            .create_sale(
                &cashier(),
                &SaleRequest::cash(vec![line(&rice, 2), line(&salt, 5)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::InsufficientStock { .. })));

        assert_eq!(stock_of(&pos, &rice.id).await, Quantity::from_units(10));
        assert_eq!(pos.database().sales().count().await.unwrap(), 0);
        assert!(pos.stock().history(&rice.id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_checked_together() {
        let (pos, _sink) = pos().await;
        let milk = product(&pos, "Sut", 5, 11_000).await;
        open_shift(&pos, &cashier()).await;

        // 3 + 3 > 5 even though each line alone fits.
        let err = pos
            .sales()
            .create_sale(
                &cashier(),
                &SaleRequest::cash(vec![line(&milk, 3), line(&milk, 3)]),
            )
            .await
            .unwrap_err();
        match err {
            PosError::Core(CoreError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, Quantity::from_units(5));
                assert_eq!(requested, Quantity::from_units(6));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sale_requires_open_shift() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;

        let err = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&bread, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ShiftNotOpen { .. })));
        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(10));
        assert_eq!(pos.database().sales().count().await.unwrap(), 0);

        // The gate applies to admins as well.
        let err = pos
            .sales()
            .create_sale(&admin(), &SaleRequest::cash(vec![line(&bread, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ShiftNotOpen { .. })));
    }

    #[tokio::test]
    async fn test_debt_sale_and_payments() {
        let (pos, sink) = pos().await;
        let tv = product(&pos, "Choynak", 3, 50_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        let mut request = SaleRequest::cash(vec![line(&tv, 1)]).with_client(&anvar.id);
        request.payment_method = PaymentMethod::Debt;
        request.cash_amount = Money::zero();
        request.debt_amount = Money::from_som(50_000);

        let receipt = pos.sales().create_sale(&cashier(), &request).await.unwrap();
        let after_sale = receipt.client.unwrap();
        assert_eq!(after_sale.balance(), Money::from_som(-50_000));
        let due = after_sale.debt_due_date.unwrap();
        assert_eq!(due, Utc::now().date_naive() + Duration::days(30));
        assert_eq!(receipt.sale.bonus_earned(), Money::zero());

        let change = pos
            .credit()
            .record_payment(&cashier(), &anvar.id, Money::from_som(20_000), PaymentMethod::Cash, None)
            .await
            .unwrap();
        assert_eq!(change.client.balance(), Money::from_som(-30_000));
        assert_eq!(change.client.debt_due_date, Some(due));

        let change = pos
            .credit()
            .record_payment(&cashier(), &anvar.id, Money::from_som(30_000), PaymentMethod::Card, None)
            .await
            .unwrap();
        assert_eq!(change.client.balance(), Money::zero());
        assert_eq!(change.client.debt_due_date, None);

        pos.shutdown().await;
        let debt_sales = sink
            .notifications()
            .await
            .into_iter()
            .filter(|n| matches!(n, NotificationKind::DebtSale { .. }))
            .count();
        assert_eq!(debt_sales, 1);
    }

    #[tokio::test]
    async fn test_explicit_due_date_wins() {
        let (pos, _sink) = pos().await;
        let rice = product(&pos, "Guruch", 10, 19_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        let due = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();
        let mut request = SaleRequest::cash(vec![line(&rice, 1)]).with_client(&anvar.id);
        request.payment_method = PaymentMethod::Mixed;
        request.cash_amount = Money::from_som(9_000);
        request.debt_amount = Money::from_som(10_000);
        request.due_date = Some(due);

        let receipt = pos.sales().create_sale(&cashier(), &request).await.unwrap();
        let client = receipt.client.unwrap();
        assert_eq!(client.balance(), Money::from_som(-10_000));
        assert_eq!(client.debt_due_date, Some(due));
        // Bonus only on the 9 000 paid now: 1% default.
        assert_eq!(receipt.sale.bonus_earned(), Money::from_som(90));
    }

    #[tokio::test]
    async fn test_bonus_accrual_one_percent() {
        let (pos, _sink) = pos().await;
        let set = product(&pos, "Gilam", 2, 100_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        let request = SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id);
        let receipt = pos.sales().create_sale(&cashier(), &request).await.unwrap();

        assert_eq!(receipt.sale.bonus_earned(), Money::from_som(1_000));
        assert_eq!(receipt.client.unwrap().bonus_balance(), Money::from_som(1_000));
    }

    #[tokio::test]
    async fn test_bonus_overspend_rejected_without_side_effects() {
        let (pos, _sink) = pos().await;
        let set = product(&pos, "Gilam", 5, 100_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        // Earn 1 000.
        pos.sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id))
            .await
            .unwrap();

        let mut request = SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id);
        request.bonus_spent = Money::from_som(1_500);
        request.cash_amount = request.total();
        let err = pos.sales().create_sale(&cashier(), &request).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::InsufficientBonus { .. })));

        let client = pos.database().clients().get_by_id(&anvar.id).await.unwrap().unwrap();
        assert_eq!(client.bonus_balance(), Money::from_som(1_000));
        assert_eq!(stock_of(&pos, &set.id).await, Quantity::from_units(4));
    }

    #[tokio::test]
    async fn test_refund_reverses_debt_and_bonus() {
        let (pos, _sink) = pos().await;
        let set = product(&pos, "Gilam", 5, 100_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        let mut request = SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id);
        request.payment_method = PaymentMethod::Mixed;
        request.cash_amount = Money::from_som(60_000);
        request.debt_amount = Money::from_som(40_000);
        let receipt = pos.sales().create_sale(&cashier(), &request).await.unwrap();
        assert_eq!(receipt.sale.bonus_earned(), Money::from_som(600));

        let refunded = pos.sales().refund_sale(&admin(), &receipt.sale.id).await.unwrap();
        let client = refunded.client.unwrap();
        assert_eq!(client.balance(), Money::zero());
        assert_eq!(client.debt_due_date, None);
        assert_eq!(client.bonus_balance(), Money::zero());
    }

    #[tokio::test]
    async fn test_refund_claw_back_stops_at_zero() {
        let (pos, _sink) = pos().await;
        let set = product(&pos, "Gilam", 5, 100_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        let first = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id))
            .await
            .unwrap();

        // Spend the 1 000 earned on a second sale.
        let mut spend = SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id);
        spend.bonus_spent = Money::from_som(1_000);
        spend.cash_amount = spend.total();
        pos.sales().create_sale(&cashier(), &spend).await.unwrap();

        let refunded = pos.sales().refund_sale(&admin(), &first.sale.id).await.unwrap();
        // 990 left after the second sale, 1 000 to claw back.
        assert_eq!(refunded.client.unwrap().bonus_balance(), Money::zero());
    }

    #[tokio::test]
    async fn test_restore_policy_returns_spent_bonus() {
        let mut config = PosConfig::in_memory();
        config.sales.bonus_refund_policy = BonusRefundPolicy::Restore;
        let (pos, _sink) = pos_with(config).await;
        let set = product(&pos, "Gilam", 5, 100_000).await;
        let anvar = client(&pos, "Anvar").await;
        open_shift(&pos, &cashier()).await;

        pos.sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id))
            .await
            .unwrap();

        let mut spend = SaleRequest::cash(vec![line(&set, 1)]).with_client(&anvar.id);
        spend.bonus_spent = Money::from_som(500);
        spend.cash_amount = spend.total();
        let second = pos.sales().create_sale(&cashier(), &spend).await.unwrap();
        // 1 000 - 500 + 1% of 99 500
        assert_eq!(second.client.unwrap().bonus_balance(), Money::from_som(1_495));

        let refunded = pos.sales().refund_sale(&admin(), &second.sale.id).await.unwrap();
        // 1 495 - 995 earned + 500 restored
        assert_eq!(refunded.client.unwrap().bonus_balance(), Money::from_som(1_000));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_mismatches() {
        let mut config = PosConfig::in_memory();
        config.sales.price_policy = PricePolicy::Strict;
        let (pos, _sink) = pos_with(config).await;
        let bread = product(&pos, "Non", 10, 4_000).await;
        open_shift(&pos, &cashier()).await;

        let mut short = SaleRequest::cash(vec![line(&bread, 1)]);
        short.cash_amount = Money::from_som(3_000);
        let err = pos.sales().create_sale(&cashier(), &short).await.unwrap_err();
        assert!(matches!(
            err,
            PosError::Core(CoreError::Validation(ValidationError::SplitMismatch { .. }))
        ));

        let cheap = SaleRequest::cash(vec![SaleLine::new(
            &bread.id,
            Quantity::from_units(1),
            Money::from_som(3_500),
        )]);
        let err = pos.sales().create_sale(&cashier(), &cheap).await.unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::PriceMismatch { .. })));
        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(10));
    }

    #[tokio::test]
    async fn test_lenient_policy_accepts_split_mismatch() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;
        open_shift(&pos, &cashier()).await;

        let mut request = SaleRequest::cash(vec![line(&bread, 1)]);
        request.cash_amount = Money::from_som(3_000);
        let receipt = pos.sales().create_sale(&cashier(), &request).await.unwrap();
        assert_eq!(receipt.sale.total(), Money::from_som(4_000));
        assert_eq!(receipt.sale.cash_tiyin, Money::from_som(3_000).tiyin());
    }

    #[tokio::test]
    async fn test_oversized_tender_rejected_before_any_write() {
        let (pos, _sink) = pos().await;
        let bread = product(&pos, "Non", 10, 4_000).await;
        open_shift(&pos, &cashier()).await;

        let mut request = SaleRequest::cash(vec![line(&bread, 1)]);
        request.card_amount = Money::from_tiyin(i64::MAX);
        let err = pos.sales().create_sale(&cashier(), &request).await.unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Validation);

        let huge = SaleLine::new(&bread.id, Quantity::from_units(2), kassa_core::MAX_AMOUNT);
        let err = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![huge]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::Validation);

        assert_eq!(stock_of(&pos, &bread.id).await, Quantity::from_units(10));
        assert_eq!(pos.database().sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sale_crossing_threshold_notifies_admins() {
        let (pos, sink) = pos().await;
        let oil = product(&pos, "Yog'", 6, 23_000).await;
        open_shift(&pos, &cashier()).await;

        pos.sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![line(&oil, 2)]))
            .await
            .unwrap();
        pos.shutdown().await;

        let events = sink.events().await;
        assert!(events.iter().any(|e| matches!(
            e,
            PosEvent::Notification {
                recipient: Recipient::Role(kassa_core::Role::Admin),
                kind: NotificationKind::LowStock { .. },
            }
        )));
    }

    #[tokio::test]
    async fn test_refund_permissions_and_missing_sale() {
        let (pos, _sink) = pos().await;

        let err = pos
            .sales()
            .refund_sale(&cashier(), "6f2c4a9e-1111-4bbb-8ccc-000000000001")
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));

        let err = pos
            .sales()
            .refund_sale(&admin(), "6f2c4a9e-1111-4bbb-8ccc-000000000001")
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::SaleNotFound(_))));
    }

    #[tokio::test]
    async fn test_operations_rejected_after_shutdown() {
        let (pos, _sink) = pos().await;
        pos.shutdown().await;

        let err = pos
            .sales()
            .create_sale(&cashier(), &SaleRequest::cash(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::ShuttingDown));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_sales_never_oversell() {
        let path = std::env::temp_dir().join(format!("kassa-race-{}.db", Uuid::new_v4()));
        let mut config = PosConfig::new();
        config.database.path = path.clone();
        config.database.max_connections = 4;
        let (pos, _sink) = pos_with(config).await;
        let pos = std::sync::Arc::new(pos);

        let phone = product(&pos, "Telefon", 10, 1_200_000).await;
        let first = kassa_core::Actor::new("c-1", "Aziz", kassa_core::Role::Cashier);
        let second = kassa_core::Actor::new("c-2", "Madina", kassa_core::Role::Cashier);
        open_shift(&pos, &first).await;
        open_shift(&pos, &second).await;

        let request = SaleRequest::cash(vec![line(&phone, 6)]);
        let (a, b) = tokio::join!(
            {
                let pos = pos.clone();
                let request = request.clone();
                let actor = first.clone();
                tokio::spawn(async move { pos.sales().create_sale(&actor, &request).await })
            },
            {
                let pos = pos.clone();
                let request = request.clone();
                let actor = second.clone();
                tokio::spawn(async move { pos.sales().create_sale(&actor, &request).await })
            }
        );
        let results = [a.unwrap(), b.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(PosError::Core(CoreError::InsufficientStock { .. }))
        )));
        assert_eq!(stock_of(&pos, &phone.id).await, Quantity::from_units(4));

        pos.shutdown().await;
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }
}
