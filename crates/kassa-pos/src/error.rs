//! # POS Error Types
//!
//! The error every `kassa-pos` operation returns.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PosError → ErrorCode                              │
//! │                                                                         │
//! │  Core(Validation(..))              → VALIDATION      bad input          │
//! │  Core(InsufficientStock, ...)      → BUSINESS_RULE   rule rejected it   │
//! │  Core(*NotFound), Db(NotFound)     → NOT_FOUND                          │
//! │  Core(Forbidden)                   → FORBIDDEN       role gate          │
//! │  Conflict, Db(Busy)                → CONFLICT        retry later        │
//! │  Db(..), Config, ShuttingDown      → INFRASTRUCTURE                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any error returned from a mutating operation means nothing was committed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kassa_core::{CoreError, ValidationError};
use kassa_db::DbError;

// =============================================================================
// POS Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PosError {
    /// Business-rule, not-found, capability or validation failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Lock conflicts persisted through every retry attempt.
    #[error("{operation} gave up after {attempts} attempts: database busy")]
    Conflict { operation: String, attempts: u32 },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// The facade is shutting down and no longer accepts work.
    #[error("POS core is shutting down")]
    ShuttingDown,
}

impl From<ValidationError> for PosError {
    fn from(err: ValidationError) -> Self {
        PosError::Core(CoreError::Validation(err))
    }
}

impl From<std::io::Error> for PosError {
    fn from(err: std::io::Error) -> Self {
        PosError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for PosError {
    fn from(err: toml::de::Error) -> Self {
        PosError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for PosError {
    fn from(err: toml::ser::Error) -> Self {
        PosError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Stable category for callers (HTTP layer, front end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input rejected before any mutation (400)
    Validation,

    /// A business rule refused the operation (422)
    BusinessRule,

    /// Referenced entity does not exist (404)
    NotFound,

    /// Actor lacks the capability (403)
    Forbidden,

    /// Concurrent writers kept the database busy (409)
    Conflict,

    /// Storage or configuration failure (500)
    Infrastructure,
}

impl PosError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PosError::Core(err) => match err {
                CoreError::Validation(_) => ErrorCode::Validation,
                CoreError::Forbidden { .. } => ErrorCode::Forbidden,
                e if e.is_not_found() => ErrorCode::NotFound,
                _ => ErrorCode::BusinessRule,
            },
            PosError::Db(err) => match err {
                DbError::NotFound { .. } => ErrorCode::NotFound,
                DbError::UniqueViolation { .. } | DbError::ForeignKeyViolation { .. } => {
                    ErrorCode::Validation
                }
                e if e.is_retryable() => ErrorCode::Conflict,
                _ => ErrorCode::Infrastructure,
            },
            PosError::Conflict { .. } => ErrorCode::Conflict,
            PosError::InvalidConfig(_)
            | PosError::ConfigLoadFailed(_)
            | PosError::ConfigSaveFailed(_)
            | PosError::ShuttingDown => ErrorCode::Infrastructure,
        }
    }

    /// True when the caller may resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        self.is_lock_conflict() || matches!(self, PosError::Conflict { .. })
    }

    /// A storage lock conflict the services retry internally.
    pub(crate) fn is_lock_conflict(&self) -> bool {
        matches!(self, PosError::Db(err) if err.is_retryable())
    }
}

pub type PosResult<T> = Result<T, PosError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::{Capability, Money, Quantity};

    #[test]
    fn test_error_codes() {
        let stock: PosError = CoreError::InsufficientStock {
            product: "Non".into(),
            available: Quantity::from_units(4),
            requested: Quantity::from_units(6),
        }
        .into();
        assert_eq!(stock.code(), ErrorCode::BusinessRule);

        let missing: PosError = CoreError::SaleNotFound("s1".into()).into();
        assert_eq!(missing.code(), ErrorCode::NotFound);

        let forbidden: PosError = CoreError::Forbidden {
            actor: "Aziz".into(),
            capability: Capability::Refund,
        }
        .into();
        assert_eq!(forbidden.code(), ErrorCode::Forbidden);

        let split: PosError = ValidationError::SplitMismatch {
            split: Money::from_som(10),
            total: Money::from_som(12),
        }
        .into();
        assert_eq!(split.code(), ErrorCode::Validation);

        let busy: PosError = DbError::Busy("database is locked".into()).into();
        assert_eq!(busy.code(), ErrorCode::Conflict);
    }

    #[test]
    fn test_retry_classification() {
        assert!(PosError::from(DbError::Busy("locked".into())).is_lock_conflict());
        assert!(PosError::Conflict {
            operation: "create_sale".into(),
            attempts: 5
        }
        .is_retryable());
        assert!(!PosError::Conflict {
            operation: "create_sale".into(),
            attempts: 5
        }
        .is_lock_conflict());
        assert!(!PosError::from(CoreError::AlreadyRefunded("s1".into())).is_retryable());
    }

    #[test]
    fn test_error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::BusinessRule).unwrap(),
            "\"BUSINESS_RULE\""
        );
    }
}
