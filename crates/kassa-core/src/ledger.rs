//! # Client Credit & Bonus Ledger
//!
//! Pure balance arithmetic for client accounts and shift reconciliation.
//! Storage code loads a [`CreditAccount`] inside the write transaction,
//! applies one of these rules and persists the result.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operation          balance                 debt_due_date               │
//! │  ─────────────────  ──────────────────────  ──────────────────────────  │
//! │  debt sale          -= debt                 set if < 0, else cleared    │
//! │  payment            += amount               cleared once >= 0           │
//! │  manual grant       -= amount               explicit or today + term    │
//! │  refund (debt)      += debt                 cleared once >= 0           │
//! │                                                                         │
//! │  Operation          bonus_balance (never < 0)                           │
//! │  ─────────────────  ──────────────────────────────────────────────────  │
//! │  accrue             += paid × rate                                      │
//! │  spend              -= amount, rejected if insufficient                 │
//! │  claw back          -= earned, clamped at 0                             │
//! │  restore            += spent   (BonusRefundPolicy::Restore only)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{BonusRate, Money};
use crate::types::{Client, Shift};

/// Days until a new debt is due when no date is given.
pub const DEFAULT_DEBT_TERM_DAYS: i64 = 30;

// =============================================================================
// Debt Terms
// =============================================================================

/// How a due date is chosen when a client goes into debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtTerms {
    pub today: NaiveDate,
    pub default_term_days: i64,
}

impl DebtTerms {
    pub fn new(today: NaiveDate, default_term_days: i64) -> Self {
        DebtTerms {
            today,
            default_term_days,
        }
    }

    /// Explicit date wins; otherwise today + the default term.
    pub fn due_date(&self, explicit: Option<NaiveDate>) -> NaiveDate {
        explicit.unwrap_or_else(|| self.today + Duration::days(self.default_term_days))
    }
}

// =============================================================================
// Credit Account
// =============================================================================

/// The mutable balance fields of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditAccount {
    pub balance: Money,
    pub bonus_balance: Money,
    pub debt_due_date: Option<NaiveDate>,
}

impl From<&Client> for CreditAccount {
    fn from(client: &Client) -> Self {
        CreditAccount {
            balance: client.balance(),
            bonus_balance: client.bonus_balance(),
            debt_due_date: client.debt_due_date,
        }
    }
}

impl CreditAccount {
    /// Sale on credit (nasiya).
    pub fn debt_sale(&mut self, debt: Money, terms: DebtTerms, explicit_due: Option<NaiveDate>) {
        self.balance -= debt;
        if self.balance.is_negative() {
            self.debt_due_date = Some(terms.due_date(explicit_due));
        } else {
            self.debt_due_date = None;
        }
    }

    /// Client pays towards their balance.
    pub fn settle(&mut self, amount: Money) {
        self.balance += amount;
        self.clear_due_date_if_settled();
    }

    /// Debt recorded outside a sale. Always (re)sets the due date.
    pub fn grant_debt(&mut self, amount: Money, terms: DebtTerms, explicit_due: Option<NaiveDate>) {
        self.balance -= amount;
        self.debt_due_date = Some(terms.due_date(explicit_due));
    }

    /// Refund of a sale that was partly or fully on credit.
    pub fn forgive_debt(&mut self, debt: Money) {
        self.balance += debt;
        self.clear_due_date_if_settled();
    }

    /// Adds cashback for `paid` and returns the amount credited.
    pub fn accrue_bonus(&mut self, paid: Money, rate: BonusRate) -> Money {
        let earned = bonus_for(paid, rate);
        self.bonus_balance += earned;
        earned
    }

    /// Spends bonus; rejects anything beyond the current bonus balance.
    pub fn spend_bonus(&mut self, amount: Money) -> CoreResult<()> {
        if amount > self.bonus_balance {
            return Err(CoreError::InsufficientBonus {
                available: self.bonus_balance,
                requested: amount,
            });
        }
        self.bonus_balance -= amount;
        Ok(())
    }

    /// Takes back bonus earned on a refunded sale.
    ///
    /// Returns the shortfall that could not be recovered because the client
    /// already spent it; the balance stops at zero.
    pub fn claw_back_bonus(&mut self, earned: Money) -> Money {
        let recovered = earned.min(self.bonus_balance);
        self.bonus_balance -= recovered;
        earned - recovered
    }

    pub fn restore_bonus(&mut self, spent: Money) {
        self.bonus_balance += spent;
    }

    fn clear_due_date_if_settled(&mut self) {
        if !self.balance.is_negative() {
            self.debt_due_date = None;
        }
    }
}

/// `paid × rate`, zero for non-positive payments.
pub fn bonus_for(paid: Money, rate: BonusRate) -> Money {
    if paid.is_positive() {
        paid.percent(rate)
    } else {
        Money::zero()
    }
}

// =============================================================================
// Shift Reconciliation
// =============================================================================

/// Aggregates over one cashier's shift window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftTotals {
    pub sales_count: i64,
    pub sales_total: Money,
    pub sales_cash: Money,
    pub sales_card: Money,
    pub sales_transfer: Money,
    pub sales_debt: Money,
    pub refunds_count: i64,
    pub refunds_total: Money,
    /// Positive client payments collected.
    pub payments_total: Money,
    pub payments_cash: Money,
    pub payments_card: Money,
    pub payments_transfer: Money,
    pub expenses_total: Money,
}

/// Cash the drawer should hold.
///
/// `opening + cash sales + payments collected − expenses`
pub fn expected_balance(opening: Money, totals: &ShiftTotals) -> Money {
    opening + totals.sales_cash + totals.payments_total - totals.expenses_total
}

/// A shift with its reconciliation. `difference` is informational: a
/// discrepancy never blocks closing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftReport {
    pub shift: Shift,
    pub totals: ShiftTotals,
    pub expected_balance: Money,
    /// `closing − expected`, present once the shift is closed.
    pub difference: Option<Money>,
}

impl ShiftReport {
    pub fn build(shift: Shift, totals: ShiftTotals) -> Self {
        let expected = expected_balance(shift.opening_balance(), &totals);
        let difference = shift
            .closing_balance_tiyin
            .map(|closing| Money::from_tiyin(closing) - expected);
        ShiftReport {
            shift,
            totals,
            expected_balance: expected,
            difference,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ShiftStatus;
    use chrono::Utc;

    fn terms() -> DebtTerms {
        DebtTerms::new(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), DEFAULT_DEBT_TERM_DAYS)
    }

    fn empty_account() -> CreditAccount {
        CreditAccount {
            balance: Money::zero(),
            bonus_balance: Money::zero(),
            debt_due_date: None,
        }
    }

    #[test]
    fn test_debt_scenario() {
        let mut acc = empty_account();

        acc.debt_sale(Money::from_som(50_000), terms(), None);
        assert_eq!(acc.balance, Money::from_som(-50_000));
        assert_eq!(acc.debt_due_date, NaiveDate::from_ymd_opt(2026, 3, 31));

        acc.settle(Money::from_som(20_000));
        assert_eq!(acc.balance, Money::from_som(-30_000));
        assert!(acc.debt_due_date.is_some());

        acc.settle(Money::from_som(30_000));
        assert_eq!(acc.balance, Money::zero());
        assert_eq!(acc.debt_due_date, None);
    }

    #[test]
    fn test_debt_sale_against_prepaid_credit_clears_due_date() {
        let mut acc = CreditAccount {
            balance: Money::from_som(50),
            debt_due_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            ..empty_account()
        };
        acc.debt_sale(Money::from_som(20), terms(), None);
        assert_eq!(acc.balance, Money::from_som(30));
        assert_eq!(acc.debt_due_date, None);
    }

    #[test]
    fn test_grant_debt_explicit_due_date() {
        let mut acc = empty_account();
        let due = NaiveDate::from_ymd_opt(2026, 4, 15).unwrap();
        acc.grant_debt(Money::from_som(10_000), terms(), Some(due));
        assert_eq!(acc.balance, Money::from_som(-10_000));
        assert_eq!(acc.debt_due_date, Some(due));
    }

    #[test]
    fn test_bonus_accrual_and_spend() {
        let mut acc = empty_account();
        let earned = acc.accrue_bonus(Money::from_som(100_000), BonusRate::from_bps(100));
        assert_eq!(earned, Money::from_som(1_000));
        assert_eq!(acc.bonus_balance, Money::from_som(1_000));

        let err = acc.spend_bonus(Money::from_som(1_001)).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientBonus { .. }));
        assert_eq!(acc.bonus_balance, Money::from_som(1_000));

        acc.spend_bonus(Money::from_som(1_000)).unwrap();
        assert_eq!(acc.bonus_balance, Money::zero());
    }

    #[test]
    fn test_claw_back_clamps_at_zero() {
        let mut acc = CreditAccount {
            bonus_balance: Money::from_som(300),
            ..empty_account()
        };
        let shortfall = acc.claw_back_bonus(Money::from_som(1_000));
        assert_eq!(acc.bonus_balance, Money::zero());
        assert_eq!(shortfall, Money::from_som(700));
    }

    #[test]
    fn test_no_bonus_on_unpaid_amount() {
        assert_eq!(bonus_for(Money::zero(), BonusRate::from_bps(100)), Money::zero());
        assert_eq!(bonus_for(Money::from_som(-5), BonusRate::from_bps(100)), Money::zero());
    }

    #[test]
    fn test_expected_balance_and_report() {
        let totals = ShiftTotals {
            sales_cash: Money::from_som(250_000),
            sales_card: Money::from_som(80_000),
            payments_total: Money::from_som(40_000),
            expenses_total: Money::from_som(15_000),
            ..ShiftTotals::default()
        };
        let shift = Shift {
            id: "sh1".into(),
            cashier_id: "c1".into(),
            opening_balance_tiyin: Money::from_som(100_000).tiyin(),
            closing_balance_tiyin: Some(Money::from_som(370_000).tiyin()),
            expected_balance_tiyin: None,
            difference_tiyin: None,
            status: ShiftStatus::Closed,
            note: None,
            opened_at: Utc::now(),
            closed_at: Some(Utc::now()),
        };

        let report = ShiftReport::build(shift, totals);
        assert_eq!(report.expected_balance, Money::from_som(375_000));
        assert_eq!(report.difference, Some(Money::from_som(-5_000)));
    }
}
