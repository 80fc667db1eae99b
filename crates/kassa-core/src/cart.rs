//! # Cart
//!
//! The inbound "create sale" request and the pure pricing math over it.
//!
//! ## Amount Relationships
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines ──► subtotal = Σ price × qty                                     │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            total = subtotal − bonus_spent                               │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            cash + card + transfer + debt  ≟ total                       │
//! │                 │                                                       │
//! │                 ▼                                                       │
//! │            paid = total − debt  ──► bonus accrual base                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The getters saturate instead of overflowing. [`SaleRequest::validate`]
//! rejects any line, subtotal or split above [`MAX_AMOUNT`](crate::MAX_AMOUNT),
//! so on a validated request they are exact.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{Money, Quantity};
use crate::types::PaymentMethod;
use crate::validation::{
    validate_amount_bound, validate_cart_size, validate_non_negative, validate_price,
    validate_quantity, ValidationResult,
};

/// One cart line as submitted by the till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: Quantity,
    /// Unit price the till charged.
    pub price: Money,
}

impl SaleLine {
    pub fn new(product_id: impl Into<String>, quantity: Quantity, price: Money) -> Self {
        SaleLine {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> Money {
        self.price.line_total(self.quantity)
    }
}

/// Inbound create-sale request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub items: Vec<SaleLine>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub cash_amount: Money,
    #[serde(default)]
    pub card_amount: Money,
    #[serde(default)]
    pub transfer_amount: Money,
    #[serde(default)]
    pub debt_amount: Money,
    #[serde(default)]
    pub bonus_spent: Money,
    /// Due date for the debt portion; defaults to the store's term.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
}

impl SaleRequest {
    /// A cash sale paying exactly the line total.
    pub fn cash(items: Vec<SaleLine>) -> Self {
        let total = subtotal(&items);
        SaleRequest {
            items,
            payment_method: PaymentMethod::Cash,
            client_id: None,
            cash_amount: total,
            card_amount: Money::zero(),
            transfer_amount: Money::zero(),
            debt_amount: Money::zero(),
            bonus_spent: Money::zero(),
            due_date: None,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Σ line totals before bonus.
    pub fn subtotal(&self) -> Money {
        subtotal(&self.items)
    }

    /// Amount the tenders must cover.
    pub fn total(&self) -> Money {
        self.subtotal().saturating_sub(self.bonus_spent)
    }

    pub fn split_total(&self) -> Money {
        self.tenders().into_iter().fold(Money::zero(), Money::saturating_add)
    }

    /// Part of the total paid now; the base for bonus accrual.
    pub fn paid_amount(&self) -> Money {
        self.total().saturating_sub(self.debt_amount)
    }

    fn tenders(&self) -> [Money; 4] {
        [
            self.cash_amount,
            self.card_amount,
            self.transfer_amount,
            self.debt_amount,
        ]
    }

    pub fn split_matches(&self) -> bool {
        self.split_total() == self.total()
    }

    /// Shape checks that need no storage.
    ///
    /// Does not check the split against the total: whether a mismatch is
    /// fatal depends on the configured price policy.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_cart_size(self.items.len())?;
        for line in &self.items {
            if line.product_id.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: "product_id".to_string(),
                });
            }
            validate_quantity(line.quantity)?;
            validate_price("price", line.price)?;
            validate_amount_bound("line_total", line.price.checked_line_total(line.quantity))?;
        }
        let subtotal = self
            .items
            .iter()
            .try_fold(Money::zero(), |acc, line| {
                acc.checked_add(line.price.checked_line_total(line.quantity)?)
            });
        validate_amount_bound("subtotal", subtotal)?;

        validate_non_negative("cash_amount", self.cash_amount)?;
        validate_non_negative("card_amount", self.card_amount)?;
        validate_non_negative("transfer_amount", self.transfer_amount)?;
        validate_non_negative("debt_amount", self.debt_amount)?;
        validate_non_negative("bonus_spent", self.bonus_spent)?;
        let split = self
            .tenders()
            .into_iter()
            .try_fold(Money::zero(), Money::checked_add);
        validate_amount_bound("split_total", split)?;

        if self.client_id.is_none() {
            if self.debt_amount.is_positive() {
                return Err(ValidationError::ClientRequired {
                    operation: "debt sale".to_string(),
                });
            }
            if self.bonus_spent.is_positive() {
                return Err(ValidationError::ClientRequired {
                    operation: "bonus spend".to_string(),
                });
            }
        }

        if self.bonus_spent > self.subtotal() {
            return Err(ValidationError::OutOfRange {
                field: "bonus_spent".to_string(),
                min: 0,
                max: self.subtotal().tiyin(),
            });
        }

        Ok(())
    }

    /// Quantity per product with duplicates merged, in first-seen order.
    pub fn quantities_by_product(&self) -> Vec<(String, Quantity)> {
        let mut merged: Vec<(String, Quantity)> = Vec::with_capacity(self.items.len());
        for line in &self.items {
            match merged.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => *qty += line.quantity,
                None => merged.push((line.product_id.clone(), line.quantity)),
            }
        }
        merged
    }
}

fn subtotal(items: &[SaleLine]) -> Money {
    items
        .iter()
        .map(SaleLine::line_total)
        .fold(Money::zero(), Money::saturating_add)
}
