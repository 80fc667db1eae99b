//! # Validation Module
//!
//! Input checks that run before any storage access.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Caller (front end / bot)                                      │
//! │  └── Format checks, immediate feedback                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── Names, quantities, amounts, barcodes, cart shape                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                        │
//! │  ├── CHECK (stock_milli >= 0), CHECK (bonus_balance_tiyin >= 0)         │
//! │  ├── UNIQUE (barcode), partial UNIQUE (one open shift per cashier)      │
//! │  └── FOREIGN KEY constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::{Money, Quantity};
use crate::{MAX_AMOUNT, MAX_CART_LINES, MAX_LINE_QUANTITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, client, supplier, category).
///
/// ## Rules
/// - Not empty after trimming
/// - At most 200 characters
///
/// Returns the trimmed name.
pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(name.to_string())
}

/// Normalizes an optional barcode.
///
/// Empty or whitespace-only input becomes `None` so the UNIQUE index
/// never sees two empty strings.
///
/// ```rust
/// use kassa_core::validation::normalize_barcode;
///
/// assert_eq!(normalize_barcode(Some("  ")).unwrap(), None);
/// assert_eq!(normalize_barcode(Some("4780000000017")).unwrap().as_deref(), Some("4780000000017"));
/// assert!(normalize_barcode(Some("47 80")).is_err());
/// ```
pub fn normalize_barcode(barcode: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(raw) = barcode else {
        return Ok(None);
    };
    let code = raw.trim();
    if code.is_empty() {
        return Ok(None);
    }

    if code.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 64,
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, digits and hyphens".to_string(),
        });
    }

    Ok(Some(code.to_string()))
}

/// Normalizes an optional phone number (digits, spaces, `+`, `-`, parentheses).
pub fn normalize_phone(phone: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(raw) = phone else {
        return Ok(None);
    };
    let phone = raw.trim();
    if phone.is_empty() {
        return Ok(None);
    }

    let valid = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if !valid || phone.chars().filter(|c| c.is_ascii_digit()).count() < 7 {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "expected a phone number such as +998 90 123 45 67".to_string(),
        });
    }

    Ok(Some(phone.to_string()))
}

/// Validates a unit label (`pcs`, `kg`, `l`, ...).
pub fn validate_unit(unit: &str) -> ValidationResult<String> {
    let unit = unit.trim();
    if unit.is_empty() {
        return Err(ValidationError::Required {
            field: "unit".to_string(),
        });
    }
    if unit.len() > 16 {
        return Err(ValidationError::TooLong {
            field: "unit".to_string(),
            max: 16,
        });
    }
    Ok(unit.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive
/// - Must not exceed [`MAX_LINE_QUANTITY`]
pub fn validate_quantity(qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY.milli(),
        });
    }

    Ok(())
}

/// Prices may be zero (free items) but never negative.
pub fn validate_price(field: &str, price: Money) -> ValidationResult<()> {
    validate_non_negative(field, price)
}

/// Zero or more, up to [`MAX_AMOUNT`].
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    validate_amount_bound(field, amount)
}

/// Payments, expenses, grants and receipts must move a positive amount.
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    validate_amount_bound(field, amount)
}

/// Rejects amounts above [`MAX_AMOUNT`]; a `None` sum (overflow) is
/// rejected the same way.
pub fn validate_amount_bound(
    field: &str,
    amount: impl Into<Option<Money>>,
) -> ValidationResult<()> {
    match amount.into() {
        Some(amount) if amount <= MAX_AMOUNT => Ok(()),
        _ => Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT.tiyin(),
        }),
    }
}

// =============================================================================
// Collection Validators
// =============================================================================

/// A cart has between 1 and [`MAX_CART_LINES`] lines.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("name", "  Non  ").unwrap(), "Non");
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"A".repeat(201)).is_err());
    }

    #[test]
    fn test_normalize_barcode() {
        assert_eq!(normalize_barcode(None).unwrap(), None);
        assert_eq!(normalize_barcode(Some("")).unwrap(), None);
        assert_eq!(
            normalize_barcode(Some(" 4780001 ")).unwrap().as_deref(),
            Some("4780001")
        );
        assert!(normalize_barcode(Some("abc def")).is_err());
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(
            normalize_phone(Some("+998 90 123-45-67")).unwrap().as_deref(),
            Some("+998 90 123-45-67")
        );
        assert_eq!(normalize_phone(Some(" ")).unwrap(), None);
        assert!(normalize_phone(Some("call me")).is_err());
        assert!(normalize_phone(Some("123")).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(Quantity::from_units(1)).is_ok());
        assert!(validate_quantity(Quantity::from_milli(250)).is_ok());
        assert!(validate_quantity(Quantity::zero()).is_err());
        assert!(validate_quantity(Quantity::from_units(-1)).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + Quantity::from_milli(1)).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_price("price", Money::zero()).is_ok());
        assert!(validate_price("price", Money::from_tiyin(-1)).is_err());
        assert!(validate_positive_amount("amount", Money::from_som(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());
    }

    #[test]
    fn test_amounts_are_bounded() {
        assert!(validate_price("price", MAX_AMOUNT).is_ok());
        assert!(matches!(
            validate_price("price", MAX_AMOUNT + Money::from_tiyin(1)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_non_negative("card_amount", Money::from_tiyin(i64::MAX)).is_err());
        assert!(validate_positive_amount("amount", Money::from_tiyin(i64::MAX)).is_err());
        assert!(validate_amount_bound("subtotal", None::<Money>).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_err());
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }
}
