//! # Domain Types
//!
//! Entities and enums shared by the ledger store and the POS services.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Shared aggregates (mutable balances)   Append-only history             │
//! │  ─────────────────────────────────────  ──────────────────────────      │
//! │  Product   stock_milli, prices          StockMove   signed delta        │
//! │  Client    balance, bonus_balance       SaleItem    price snapshot      │
//! │  Supplier  balance                      Payment     client settlement   │
//! │                                         SupplyReceipt / SupplierPayment │
//! │  Session                                Expense                         │
//! │  ───────                                AuditEntry                      │
//! │  Shift     open → closed                                                │
//! │                                                                         │
//! │  Sale ──owns──► SaleItem*     status: completed → refunded (one way)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are stored as raw integers (`*_tiyin`, `*_milli`) so rows map
//! straight onto SQLite columns; accessor methods return [`Money`] and
//! [`Quantity`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{BonusRate, Money, Quantity};

// =============================================================================
// Category
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,

    pub name: String,

    /// EAN/UPC barcode. Unique when present.
    pub barcode: Option<String>,

    /// Last purchase price ("last buy price wins").
    pub buy_price_tiyin: i64,

    /// Current shelf price.
    pub sell_price_tiyin: i64,

    /// Stock on hand, never negative.
    pub stock_milli: i64,

    /// Unit label shown on receipts: pcs, kg, l, ...
    pub unit: String,

    pub category_id: Option<String>,

    pub is_favorite: bool,

    /// Retired: hidden from lookups and refused at the till.
    pub is_archived: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn sell_price(&self) -> Money {
        Money::from_tiyin(self.sell_price_tiyin)
    }

    #[inline]
    pub fn buy_price(&self) -> Money {
        Money::from_tiyin(self.buy_price_tiyin)
    }

    #[inline]
    pub fn stock(&self) -> Quantity {
        Quantity::from_milli(self.stock_milli)
    }

    /// True when `quantity` can leave the shelf without going negative.
    pub fn can_sell(&self, quantity: Quantity) -> bool {
        self.stock() >= quantity
    }
}

// =============================================================================
// Stock Move
// =============================================================================

/// Why a stock level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Goods left with a customer.
    Sale,
    /// Goods received from a supplier.
    Restock,
    /// Goods returned by a refunded sale.
    Refund,
    /// Manual correction (damage, loss, found stock).
    Adjustment,
    /// Physical count reconciliation.
    Audit,
}

impl MoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveType::Sale => "sale",
            MoveType::Restock => "restock",
            MoveType::Refund => "refund",
            MoveType::Adjustment => "adjustment",
            MoveType::Audit => "audit",
        }
    }
}

/// Immutable inventory ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMove {
    pub id: String,
    pub product_id: String,
    /// Signed: positive = in, negative = out.
    pub quantity_milli: i64,
    pub move_type: MoveType,
    pub reason: Option<String>,
    /// Sale id or supply receipt id that caused the move.
    pub reference_id: Option<String>,
    pub actor_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockMove {
    #[inline]
    pub fn delta(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }
}

// =============================================================================
// Sale Status / Payment Method
// =============================================================================

/// Terminal states of a sale. The only transition is Completed → Refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "completed",
            SaleStatus::Refunded => "refunded",
        }
    }
}

/// How money moved. `Debt` is nasiya (store credit to the client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Debt,
    /// More than one tender on a single sale.
    Mixed,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Debt => "debt",
            PaymentMethod::Mixed => "mixed",
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A finalized sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Daily counter: `YYYYMMDD-NNNN`.
    pub receipt_number: String,
    pub status: SaleStatus,
    /// Σ line totals before bonus.
    pub subtotal_tiyin: i64,
    pub bonus_spent_tiyin: i64,
    /// subtotal − bonus_spent; the amount the split must cover.
    pub total_tiyin: i64,
    pub payment_method: PaymentMethod,
    pub cash_tiyin: i64,
    pub card_tiyin: i64,
    pub transfer_tiyin: i64,
    pub debt_tiyin: i64,
    pub bonus_earned_tiyin: i64,
    pub cashier_id: String,
    pub cashier_name: String,
    pub client_id: Option<String>,
    pub shift_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_by: Option<String>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_tiyin(self.total_tiyin)
    }

    #[inline]
    pub fn debt(&self) -> Money {
        Money::from_tiyin(self.debt_tiyin)
    }

    #[inline]
    pub fn bonus_earned(&self) -> Money {
        Money::from_tiyin(self.bonus_earned_tiyin)
    }

    #[inline]
    pub fn bonus_spent(&self) -> Money {
        Money::from_tiyin(self.bonus_spent_tiyin)
    }

    /// Money actually received now (everything except the debt portion).
    #[inline]
    pub fn paid_amount(&self) -> Money {
        self.total() - self.debt()
    }

    pub fn is_refunded(&self) -> bool {
        self.status == SaleStatus::Refunded
    }
}

/// A line of a sale. Unit price and name are frozen at sale time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub name_snapshot: String,
    pub quantity_milli: i64,
    pub unit_price_tiyin: i64,
    pub line_total_tiyin: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_tiyin(self.line_total_tiyin)
    }
}

/// Sale header, its lines and the resolved client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleReceipt {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub client: Option<Client>,
}

// =============================================================================
// Client
// =============================================================================

/// A store customer with a credit balance and a cashback bonus balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// Negative: client owes the store. Positive: prepaid credit.
    pub balance_tiyin: i64,
    /// Never negative.
    pub bonus_balance_tiyin: i64,
    /// Set while the client is in debt.
    #[ts(as = "Option<String>")]
    pub debt_due_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Client {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_tiyin(self.balance_tiyin)
    }

    #[inline]
    pub fn bonus_balance(&self) -> Money {
        Money::from_tiyin(self.bonus_balance_tiyin)
    }

    pub fn has_debt(&self) -> bool {
        self.balance_tiyin < 0
    }
}

/// A client balance change outside a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub client_id: String,
    /// Positive = settlement collected, negative = manual debt grant.
    pub amount_tiyin: i64,
    pub method: PaymentMethod,
    pub shift_id: Option<String>,
    pub created_by: String,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_tiyin(self.amount_tiyin)
    }
}

// =============================================================================
// Shift
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Closed,
}

/// A cash-drawer session for one cashier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub cashier_id: String,
    pub opening_balance_tiyin: i64,
    pub closing_balance_tiyin: Option<i64>,
    pub expected_balance_tiyin: Option<i64>,
    pub difference_tiyin: Option<i64>,
    pub status: ShiftStatus,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Shift {
    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_tiyin(self.opening_balance_tiyin)
    }

    pub fn is_open(&self) -> bool {
        self.status == ShiftStatus::Open
    }
}

// =============================================================================
// Expense
// =============================================================================

/// Cash taken out of the drawer for store costs.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub amount_tiyin: i64,
    pub category: String,
    pub note: Option<String>,
    pub created_by: String,
    pub shift_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Supplier Payables
// =============================================================================

/// A goods supplier. Positive balance = the store owes the supplier.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub balance_tiyin: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Supplier {
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_tiyin(self.balance_tiyin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SupplyReceipt {
    pub id: String,
    pub supplier_id: String,
    pub total_tiyin: i64,
    pub note: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SupplierPayment {
    pub id: String,
    pub supplier_id: String,
    pub amount_tiyin: i64,
    pub method: PaymentMethod,
    pub note: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Store Settings
// =============================================================================

/// Store-wide knobs read by the core.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StoreSettings {
    pub low_stock_threshold_milli: i64,
    pub bonus_percentage_bps: i64,
    /// Used by the external reminder job, carried here for completeness.
    pub debt_reminder_days: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StoreSettings {
    #[inline]
    pub fn low_stock_threshold(&self) -> Quantity {
        Quantity::from_milli(self.low_stock_threshold_milli)
    }

    #[inline]
    pub fn bonus_rate(&self) -> BonusRate {
        BonusRate::from_bps(self.bonus_percentage_bps.max(0) as u32)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            low_stock_threshold_milli: Quantity::from_units(5).milli(),
            bonus_percentage_bps: 100,
            debt_reminder_days: 3,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// Audit
// =============================================================================

/// A persisted audit log row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub detail: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
