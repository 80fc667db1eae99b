//! # POS Configuration
//!
//! Runtime settings for the POS services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASSA_DB_PATH=/var/lib/kassa/kassa.db                              │
//! │     KASSA_PRICE_POLICY=strict                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kassa-pos/kassa.toml (Linux)                             │
//! │     ~/Library/Application Support/uz.kassa.pos/kassa.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Lenient prices, forfeit bonus on refund, 5 retry attempts          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # kassa.toml
//! [database]
//! path = "kassa.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [sales]
//! price_policy = "lenient"        # lenient | strict
//! bonus_refund_policy = "forfeit" # forfeit | restore
//! default_debt_term_days = 30
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//!
//! [events]
//! channel_capacity = 256
//! ```

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use kassa_core::ledger::DEFAULT_DEBT_TERM_DAYS;
use kassa_db::DbConfig;

use crate::error::{PosError, PosResult};

// =============================================================================
// Price Policy
// =============================================================================

/// How much the coordinator trusts prices and splits sent by the till.
///
/// ```text
/// LENIENT (Default)                    STRICT
/// ─────────────────                    ──────
/// cart price used as-is                cart price must equal sell_price
/// split ≠ total → warn! and accept     split ≠ total → SplitMismatch
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricePolicy {
    #[default]
    Lenient,
    Strict,
}

impl std::fmt::Display for PricePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricePolicy::Lenient => write!(f, "lenient"),
            PricePolicy::Strict => write!(f, "strict"),
        }
    }
}

impl std::str::FromStr for PricePolicy {
    type Err = PosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" | "trust" => Ok(PricePolicy::Lenient),
            "strict" | "verify" => Ok(PricePolicy::Strict),
            other => Err(PosError::InvalidConfig(format!(
                "Unknown price policy: '{}'. Valid options: lenient, strict",
                other
            ))),
        }
    }
}

// =============================================================================
// Bonus Refund Policy
// =============================================================================

/// What happens to bonus a client spent on a sale that is later refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusRefundPolicy {
    /// Spent bonus stays spent.
    #[default]
    Forfeit,
    /// Spent bonus is credited back to the client.
    Restore,
}

impl std::fmt::Display for BonusRefundPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BonusRefundPolicy::Forfeit => write!(f, "forfeit"),
            BonusRefundPolicy::Restore => write!(f, "restore"),
        }
    }
}

impl std::str::FromStr for BonusRefundPolicy {
    type Err = PosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forfeit" | "keep" => Ok(BonusRefundPolicy::Forfeit),
            "restore" | "return" => Ok(BonusRefundPolicy::Restore),
            other => Err(PosError::InvalidConfig(format!(
                "Unknown bonus refund policy: '{}'. Valid options: forfeit, restore",
                other
            ))),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first start.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the lock before SQLite reports busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Private in-memory database (tests, demos). Ignores `path`.
    #[serde(default)]
    pub in_memory: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("kassa.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            in_memory: false,
        }
    }
}

// =============================================================================
// Sales Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    #[serde(default)]
    pub price_policy: PricePolicy,

    #[serde(default)]
    pub bonus_refund_policy: BonusRefundPolicy,

    /// Due date offset for debt without an explicit date.
    #[serde(default = "default_debt_term")]
    pub default_debt_term_days: i64,
}

fn default_debt_term() -> i64 {
    DEFAULT_DEBT_TERM_DAYS
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            price_policy: PricePolicy::default(),
            bonus_refund_policy: BonusRefundPolicy::default(),
            default_debt_term_days: default_debt_term(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Bounded retry for transactions that hit a locked database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    20
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetrySettings {
    /// Fresh backoff schedule for one operation.
    pub fn backoff(&self) -> ExponentialBackoff {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: self.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Event Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// Queued events before publishers start dropping.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Main POS Configuration
// =============================================================================

/// Complete POS configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub events: EventSettings,
}

impl PosConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with a private in-memory database.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.in_memory = true;
        config
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kassa.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> PosResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading POS config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load POS config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> PosResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| PosError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PosError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| PosError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "POS config saved");
        Ok(())
    }

    pub fn validate(&self) -> PosResult<()> {
        if !self.database.in_memory && self.database.path.as_os_str().is_empty() {
            return Err(PosError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(PosError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.sales.default_debt_term_days < 0 {
            return Err(PosError::InvalidConfig(
                "sales.default_debt_term_days must not be negative".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(PosError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(PosError::InvalidConfig(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(PosError::InvalidConfig(
                "events.channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `KASSA_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("KASSA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("KASSA_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Ok(timeout) = std::env::var("KASSA_DB_BUSY_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.database.busy_timeout_ms = ms;
            }
        }

        if let Ok(policy) = std::env::var("KASSA_PRICE_POLICY") {
            match policy.parse() {
                Ok(parsed) => {
                    debug!(policy = %policy, "Overriding price policy from environment");
                    self.sales.price_policy = parsed;
                }
                Err(_) => warn!(policy = %policy, "Unknown price policy in environment"),
            }
        }

        if let Ok(policy) = std::env::var("KASSA_BONUS_REFUND_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.sales.bonus_refund_policy = parsed,
                Err(_) => warn!(policy = %policy, "Unknown bonus refund policy in environment"),
            }
        }

        if let Ok(days) = std::env::var("KASSA_DEBT_TERM_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.sales.default_debt_term_days = d;
            }
        }

        if let Ok(attempts) = std::env::var("KASSA_RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.retry.max_attempts = n;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("uz", "kassa", "pos")
            .map(|dirs| dirs.config_dir().join("kassa.toml"))
    }

    /// Pool settings for [`kassa_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.in_memory {
            DbConfig::in_memory()
        } else {
            DbConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
        };
        base.busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("lenient".parse::<PricePolicy>().unwrap(), PricePolicy::Lenient);
        assert_eq!("STRICT".parse::<PricePolicy>().unwrap(), PricePolicy::Strict);
        assert!("maybe".parse::<PricePolicy>().is_err());

        assert_eq!(
            "restore".parse::<BonusRefundPolicy>().unwrap(),
            BonusRefundPolicy::Restore
        );
        assert_eq!(
            "keep".parse::<BonusRefundPolicy>().unwrap(),
            BonusRefundPolicy::Forfeit
        );
    }

    #[test]
    fn test_default_config() {
        let config = PosConfig::default();
        assert_eq!(config.sales.price_policy, PricePolicy::Lenient);
        assert_eq!(config.sales.bonus_refund_policy, BonusRefundPolicy::Forfeit);
        assert_eq!(config.sales.default_debt_term_days, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = PosConfig::default();

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        config.retry.max_attempts = 3;
        config.retry.initial_backoff_ms = 1_000;
        config.retry.max_backoff_ms = 10;
        assert!(config.validate().is_err());

        config.retry.max_backoff_ms = 2_000;
        assert!(config.validate().is_ok());

        config.events.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PosConfig = toml::from_str(
            r#"
            [sales]
            price_policy = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.sales.price_policy, PricePolicy::Strict);
        assert_eq!(config.sales.bonus_refund_policy, BonusRefundPolicy::Forfeit);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn test_toml_serialization() {
        let config = PosConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[sales]"));
        assert!(toml_str.contains("price_policy = \"lenient\""));
    }

    #[test]
    fn test_in_memory_db_config() {
        let config = PosConfig::in_memory();
        assert!(config.db_config().is_in_memory());
    }
}
