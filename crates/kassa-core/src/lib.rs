//! # kassa-core: Pure Domain Logic for Kassa POS
//!
//! Every rule that can be stated without touching storage lives here:
//! integer money, stock quantities, entity types, client credit and bonus
//! arithmetic, shift reconciliation, cart pricing and the actor capability
//! gate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Callers (HTTP routes, messaging bot, front end)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Actor + request                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   kassa-pos: stock engine, sale coordinator, shift gate, ...    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │  cart   │ │ ledger  │ │  actor  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 kassa-db (SQLite ledger store)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities (Product, Sale, Client, Shift, ...)
//! - [`money`] - `Money` (tiyin), `Quantity` (milli-units), `BonusRate`
//! - [`cart`] - Create-sale request and pricing
//! - [`ledger`] - Client credit & bonus rules, shift reconciliation
//! - [`actor`] - Roles and capabilities
//! - [`error`] - Domain error types
//! - [`validation`] - Input checks
//!
//! ## Example
//!
//! ```rust
//! use kassa_core::cart::{SaleLine, SaleRequest};
//! use kassa_core::money::{Money, Quantity};
//!
//! let request = SaleRequest::cash(vec![
//!     SaleLine::new("p-1", Quantity::from_units(3), Money::from_som(5_000)),
//! ]);
//! assert_eq!(request.total(), Money::from_som(15_000));
//! assert!(request.split_matches());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod actor;
pub mod cart;
pub mod error;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use actor::{Actor, Capability, Role};
pub use cart::{SaleLine, SaleRequest};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{CreditAccount, DebtTerms, ShiftReport, ShiftTotals};
pub use money::{BonusRate, Money, Quantity};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line (units or kilograms).
pub const MAX_LINE_QUANTITY: Quantity = Quantity::from_units(9_999);

/// Largest amount a single price, tender, line, total or payment may carry
/// (ten billion so'm).
pub const MAX_AMOUNT: Money = Money::from_som(10_000_000_000);
