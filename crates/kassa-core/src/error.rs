//! # Error Types
//!
//! Domain errors for kassa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kassa-core (this file)                                                 │
//! │  ├── CoreError        - Business-rule and not-found failures            │
//! │  └── ValidationError  - Input rejected before any mutation              │
//! │                                                                         │
//! │  kassa-db                                                               │
//! │  └── DbError          - Storage failures, lock conflicts                │
//! │                                                                         │
//! │  kassa-pos                                                              │
//! │  └── PosError         - What callers see, with an ErrorCode             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                   │
//! │                          DbError ───┴→ PosError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::actor::Capability;
use crate::money::{Money, Quantity};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations and missing entities.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Client not found: {0}")]
    ClientNotFound(String),

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Shift not found: {0}")]
    ShiftNotFound(String),

    #[error("Supplier not found: {0}")]
    SupplierNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    /// Selling more than is on the shelf.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: Non x6
    ///      │
    ///      ▼
    /// stock = 4
    ///      │
    ///      ▼
    /// InsufficientStock { product: "Non", available: 4, requested: 6 }
    ///      │
    ///      ▼
    /// Cashier sees: "Only 4 Non left"
    /// ```
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: Quantity,
        requested: Quantity,
    },

    /// A correction would take stock below zero.
    #[error("Stock for {product} cannot go negative: current {current}, change {delta}")]
    NegativeStock {
        product: String,
        current: Quantity,
        delta: Quantity,
    },

    /// The product was retired from the catalog.
    #[error("Product {0} is archived and cannot be sold")]
    ProductArchived(String),

    #[error("Insufficient bonus: available {available}, requested {requested}")]
    InsufficientBonus { available: Money, requested: Money },

    /// Sale attempted without an open cash-drawer session.
    #[error("Cashier {cashier_id} has no open shift")]
    ShiftNotOpen { cashier_id: String },

    #[error("Cashier {cashier_id} already has an open shift ({shift_id})")]
    ShiftAlreadyOpen {
        cashier_id: String,
        shift_id: String,
    },

    /// Close requested with nothing to close.
    #[error("No open shift for cashier {cashier_id}")]
    NoOpenShift { cashier_id: String },

    #[error("Sale {0} is already refunded")]
    AlreadyRefunded(String),

    /// Strict price policy: cart price differs from the shelf price.
    #[error("Price mismatch for {product}: cart {cart_price}, shelf {shelf_price}")]
    PriceMismatch {
        product: String,
        cart_price: Money,
        shelf_price: Money,
    },

    #[error("{actor} is not allowed to {capability}")]
    Forbidden {
        actor: String,
        capability: Capability,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Missing-entity variants, surfaced distinctly from validation.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ProductNotFound(_)
                | CoreError::ClientNotFound(_)
                | CoreError::SaleNotFound(_)
                | CoreError::ShiftNotFound(_)
                | CoreError::SupplierNotFound(_)
                | CoreError::CategoryNotFound(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// cash + card + transfer + debt does not cover the sale total.
    #[error("Payment split {split} does not match total {total}")]
    SplitMismatch { split: Money, total: Money },

    /// Debt and bonus operations need a client on the sale.
    #[error("{operation} requires a client")]
    ClientRequired { operation: String },

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product: "Non".to_string(),
            available: Quantity::from_units(4),
            requested: Quantity::from_units(6),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Non: available 4, requested 6"
        );

        let err = CoreError::Forbidden {
            actor: "Aziz".to_string(),
            capability: Capability::Refund,
        };
        assert_eq!(err.to_string(), "Aziz is not allowed to refund sales");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::ClientRequired {
            operation: "debt sale".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: debt sale requires a client");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CoreError::SaleNotFound("x".into()).is_not_found());
        assert!(!CoreError::AlreadyRefunded("x".into()).is_not_found());
        assert!(!CoreError::ProductArchived("Eski choy".into()).is_not_found());
    }
}
