//! # Shift Gate
//!
//! Opens and closes cash-drawer sessions and reconciles the drawer.
//!
//! ## Lifecycle
//! ```text
//! ┌──────────┐  open_shift    ┌──────────┐  close_shift / close_shift_of  ┌──────────┐
//! │  (none)  │ ─────────────► │   open   │ ─────────────────────────────► │  closed  │
//! └──────────┘                └──────────┘                                └──────────┘
//!                               │  second open_shift → ShiftAlreadyOpen
//!                               │  sales allowed only here
//! ```
//!
//! ## Reconciliation
//! ```text
//! expected   = opening + cash from completed sales + payments collected − expenses
//! difference = closing − expected        (reported, never blocks closing)
//!
//! window: cashier = shift.cashier, opened_at ≤ created_at ≤ closed_at (or now)
//! ```

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use kassa_core::ledger::expected_balance;
use kassa_core::validation::validate_non_negative;
use kassa_core::{Actor, Capability, CoreError, Money, Role, Shift, ShiftReport, ShiftStatus};
use kassa_db::{ShiftClosing, ShiftRepository};
use sqlx::SqliteConnection;

use crate::error::{PosError, PosResult};
use crate::events::{NotificationKind, PosEvent, Recipient};
use crate::{clean_note, ServiceContext};

#[derive(Clone)]
pub struct ShiftGate {
    ctx: ServiceContext,
}

impl ShiftGate {
    pub(crate) fn new(ctx: ServiceContext) -> Self {
        ShiftGate { ctx }
    }

    pub async fn open_shift(
        &self,
        actor: &Actor,
        opening_balance: Money,
        note: Option<&str>,
    ) -> PosResult<Shift> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageShift)?;
        validate_non_negative("opening_balance", opening_balance)?;
        let note = clean_note(note);
        let note = note.as_deref();

        let shift = self
            .ctx
            .retry("open_shift", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let shift = Shift {
                    id: Uuid::new_v4().to_string(),
                    cashier_id: actor.id.clone(),
                    opening_balance_tiyin: opening_balance.tiyin(),
                    closing_balance_tiyin: None,
                    expected_balance_tiyin: None,
                    difference_tiyin: None,
                    status: ShiftStatus::Open,
                    note: note.map(str::to_string),
                    opened_at: Utc::now(),
                    closed_at: None,
                };

                if let Err(err) = ShiftRepository::insert(&mut tx, &shift).await {
                    if err.is_unique_violation_on("shifts.cashier_id") {
                        let existing = ShiftRepository::fetch_open_for(&mut tx, &actor.id).await?;
                        return Err(CoreError::ShiftAlreadyOpen {
                            cashier_id: actor.id.clone(),
                            shift_id: existing.map(|s| s.id).unwrap_or_default(),
                        }
                        .into());
                    }
                    return Err(err.into());
                }

                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(shift)
            })
            .await?;

        info!(shift_id = %shift.id, cashier_id = %actor.id, opening = %opening_balance, "Shift opened");
        self.ctx.events.publish(PosEvent::audit(
            actor,
            "shift.open",
            format!("opening balance {}", opening_balance),
        ));
        Ok(shift)
    }

    /// Closes the actor's own open shift.
    pub async fn close_shift(
        &self,
        actor: &Actor,
        closing_balance: Money,
        note: Option<&str>,
    ) -> PosResult<ShiftReport> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageShift)?;
        validate_non_negative("closing_balance", closing_balance)?;
        let note = clean_note(note);
        let note = note.as_deref();

        let report = self
            .ctx
            .retry("close_shift", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let shift = ShiftRepository::claim_open_for(&mut tx, &actor.id)
                    .await?
                    .ok_or_else(|| CoreError::NoOpenShift {
                        cashier_id: actor.id.clone(),
                    })?;
                let report = finish_close(&mut tx, shift, closing_balance, note).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(report)
            })
            .await?;

        self.after_close(actor, &report);
        Ok(report)
    }

    /// Closes any cashier's shift by id.
    pub async fn close_shift_of(
        &self,
        actor: &Actor,
        shift_id: &str,
        closing_balance: Money,
        note: Option<&str>,
    ) -> PosResult<ShiftReport> {
        self.ctx.ensure_open()?;
        actor.require(Capability::ManageAnyShift)?;
        validate_non_negative("closing_balance", closing_balance)?;
        let note = clean_note(note);
        let note = note.as_deref();

        let report = self
            .ctx
            .retry("close_shift", move || async move {
                let mut tx = self.ctx.db.begin().await?;
                let shift = ShiftRepository::claim(&mut tx, shift_id)
                    .await?
                    .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;
                if !shift.is_open() {
                    return Err(CoreError::ShiftNotOpen {
                        cashier_id: shift.cashier_id,
                    }
                    .into());
                }
                let report = finish_close(&mut tx, shift, closing_balance, note).await?;
                tx.commit().await.map_err(kassa_db::DbError::from)?;
                Ok(report)
            })
            .await?;

        self.after_close(actor, &report);
        Ok(report)
    }

    fn after_close(&self, actor: &Actor, report: &ShiftReport) {
        let difference = report.difference.unwrap_or_default();
        let closing = report.expected_balance + difference;

        if difference.is_zero() {
            info!(shift_id = %report.shift.id, closed_by = %actor.id, "Shift closed");
        } else {
            warn!(
                shift_id = %report.shift.id,
                cashier_id = %report.shift.cashier_id,
                expected = %report.expected_balance,
                difference = %difference,
                "Shift closed with cash discrepancy"
            );
        }

        self.ctx.events.publish_all([
            PosEvent::notify(
                Recipient::Role(Role::Admin),
                NotificationKind::ShiftClosed {
                    shift_id: report.shift.id.clone(),
                    cashier_id: report.shift.cashier_id.clone(),
                    closing_balance: closing,
                    expected_balance: report.expected_balance,
                    difference,
                },
            ),
            PosEvent::audit(
                actor,
                "shift.close",
                format!(
                    "shift {} closing {} expected {}",
                    report.shift.id, closing, report.expected_balance
                ),
            ),
        ]);
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Live report of the actor's open shift.
    pub async fn current_shift(&self, actor: &Actor) -> PosResult<Option<ShiftReport>> {
        let shifts = self.ctx.db.shifts();
        match shifts.current_for(&actor.id).await? {
            Some(shift) => {
                let totals = shifts.totals(&shift.cashier_id, shift.opened_at, Utc::now()).await?;
                Ok(Some(ShiftReport::build(shift, totals)))
            }
            None => Ok(None),
        }
    }

    pub async fn shift_report(&self, shift_id: &str) -> PosResult<ShiftReport> {
        let shifts = self.ctx.db.shifts();
        let shift = shifts
            .get_by_id(shift_id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;
        let until = shift.closed_at.unwrap_or_else(Utc::now);
        let totals = shifts.totals(&shift.cashier_id, shift.opened_at, until).await?;
        Ok(ShiftReport::build(shift, totals))
    }

    pub async fn history(&self, cashier_id: &str, limit: u32) -> PosResult<Vec<Shift>> {
        Ok(self.ctx.db.shifts().list_for_cashier(cashier_id, limit).await?)
    }
}

/// Reconciles and closes an already claimed shift.
async fn finish_close(
    conn: &mut SqliteConnection,
    shift: Shift,
    closing_balance: Money,
    note: Option<&str>,
) -> PosResult<ShiftReport> {
    let closed_at = Utc::now();
    let totals =
        ShiftRepository::window_totals(&mut *conn, &shift.cashier_id, shift.opened_at, closed_at)
            .await?;
    let expected = expected_balance(shift.opening_balance(), &totals);

    let closing = ShiftClosing {
        closing_balance,
        expected_balance: expected,
        difference: closing_balance - expected,
        note: merge_notes(shift.note.as_deref(), note),
        closed_at,
    };
    if !ShiftRepository::close(&mut *conn, &shift.id, &closing).await? {
        return Err(PosError::from(CoreError::ShiftNotOpen {
            cashier_id: shift.cashier_id,
        }));
    }

    let closed = ShiftRepository::fetch(&mut *conn, &shift.id)
        .await?
        .ok_or_else(|| CoreError::ShiftNotFound(shift.id.clone()))?;
    Ok(ShiftReport::build(closed, totals))
}

/// `old; new`
fn merge_notes(existing: Option<&str>, added: Option<&str>) -> Option<String> {
    match (existing, added) {
        (Some(old), Some(new)) => Some(format!("{old}; {new}")),
        (Some(old), None) => Some(old.to_string()),
        (None, Some(new)) => Some(new.to_string()),
        (None, None) => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, cashier, client, manager, open_shift, pos, product, warehouse};
    use kassa_core::{PaymentMethod, Quantity, SaleLine, SaleRequest};

    #[test]
    fn test_merge_notes() {
        assert_eq!(merge_notes(Some("float ok"), Some("short 2k")).as_deref(), Some("float ok; short 2k"));
        assert_eq!(merge_notes(None, Some("x")).as_deref(), Some("x"));
        assert_eq!(merge_notes(Some("x"), None).as_deref(), Some("x"));
        assert_eq!(merge_notes(None, None), None);
        assert_eq!(clean_note(Some("   ")), None);
    }

    #[tokio::test]
    async fn test_second_open_rejected() {
        let (pos, _sink) = pos().await;
        let first = open_shift(&pos, &cashier()).await;

        let err = pos
            .shifts()
            .open_shift(&cashier(), Money::from_som(50_000), None)
            .await
            .unwrap_err();
        match err {
            PosError::Core(CoreError::ShiftAlreadyOpen { shift_id, .. }) => {
                assert_eq!(shift_id, first.id)
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Another cashier is independent.
        open_shift(&pos, &manager()).await;
    }

    #[tokio::test]
    async fn test_close_reconciles_window_only() {
        let (pos, sink) = pos().await;
        let bread = product(&pos, "Non", 20, 4_000).await;
        let anvar = client(&pos, "Anvar").await;

        // Before the shift: outside the window.
        pos.credit()
            .record_payment(&cashier(), &anvar.id, Money::from_som(7_000), PaymentMethod::Cash, None)
            .await
            .unwrap();

        open_shift(&pos, &cashier()).await;
        pos.sales()
            .create_sale(
                &cashier(),
                &SaleRequest::cash(vec![SaleLine::new(
                    &bread.id,
                    Quantity::from_units(3),
                    Money::from_som(4_000),
                )]),
            )
            .await
            .unwrap();
        pos.credit()
            .record_payment(&cashier(), &anvar.id, Money::from_som(5_000), PaymentMethod::Cash, None)
            .await
            .unwrap();
        pos.credit()
            .record_expense(&cashier(), Money::from_som(2_000), "Transport", None)
            .await
            .unwrap();

        // Someone else's sale does not count.
        open_shift(&pos, &manager()).await;
        pos.sales()
            .create_sale(
                &manager(),
                &SaleRequest::cash(vec![SaleLine::new(
                    &bread.id,
                    Quantity::from_units(1),
                    Money::from_som(4_000),
                )]),
            )
            .await
            .unwrap();

        let live = pos.shifts().current_shift(&cashier()).await.unwrap().unwrap();
        assert_eq!(live.expected_balance, Money::from_som(115_000));
        assert_eq!(live.difference, None);

        let report = pos
            .shifts()
            .close_shift(&cashier(), Money::from_som(114_000), Some("short 1k"))
            .await
            .unwrap();
        assert_eq!(report.expected_balance, Money::from_som(115_000));
        assert_eq!(report.difference, Some(Money::from_som(-1_000)));
        assert_eq!(report.totals.sales_count, 1);
        assert_eq!(report.shift.note.as_deref(), Some("short 1k"));
        assert!(!report.shift.is_open());

        let stored = pos.shifts().shift_report(&report.shift.id).await.unwrap();
        assert_eq!(stored.expected_balance, report.expected_balance);
        assert_eq!(stored.difference, report.difference);

        assert!(pos.shifts().current_shift(&cashier()).await.unwrap().is_none());

        let db = pos.database();
        assert_eq!(db.sales().list_for_shift(&report.shift.id).await.unwrap().len(), 1);
        let tagged = db.payments().list_for_shift(&report.shift.id).await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].amount(), Money::from_som(5_000));

        pos.shutdown().await;
        assert!(sink
            .notifications()
            .await
            .iter()
            .any(|n| matches!(n, NotificationKind::ShiftClosed { .. })));
        assert!(sink.actions().await.contains(&"shift.close".to_string()));
    }

    #[tokio::test]
    async fn test_close_without_open_shift() {
        let (pos, _sink) = pos().await;
        let err = pos
            .shifts()
            .close_shift(&cashier(), Money::zero(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::NoOpenShift { .. })));
    }

    #[tokio::test]
    async fn test_admin_closes_other_cashier_shift() {
        let (pos, _sink) = pos().await;
        let shift = pos
            .shifts()
            .open_shift(&cashier(), Money::from_som(100_000), Some("morning"))
            .await
            .unwrap();

        let err = pos
            .shifts()
            .close_shift_of(&manager(), &shift.id, Money::from_som(100_000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));

        let report = pos
            .shifts()
            .close_shift_of(&admin(), &shift.id, Money::from_som(100_000), Some("closed by admin"))
            .await
            .unwrap();
        assert_eq!(report.difference, Some(Money::zero()));
        assert_eq!(report.shift.note.as_deref(), Some("morning; closed by admin"));

        let err = pos
            .shifts()
            .close_shift_of(&admin(), &shift.id, Money::from_som(100_000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ShiftNotOpen { .. })));

        let err = pos
            .shifts()
            .close_shift_of(&admin(), "missing", Money::zero(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::ShiftNotFound(_))));

        // Reopen after close.
        open_shift(&pos, &cashier()).await;
        assert_eq!(pos.shifts().history(&cashier().id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_warehouse_cannot_open_shift() {
        let (pos, _sink) = pos().await;
        let err = pos
            .shifts()
            .open_shift(&warehouse(), Money::zero(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PosError::Core(CoreError::Forbidden { .. })));
    }
}
