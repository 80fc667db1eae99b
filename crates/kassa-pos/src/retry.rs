//! # Lock-Conflict Retry
//!
//! Re-runs a whole transaction when SQLite reports the database busy.
//!
//! ```text
//! attempt 1 ──► Db(Busy) ──► sleep 20ms ──► attempt 2 ──► Db(Busy) ──► sleep 40ms
//!     ...
//! attempt N ──► Db(Busy) ──► Conflict { operation, attempts: N }
//!
//! Any other outcome (Ok, InsufficientStock, NotFound, ...) returns at once.
//! ```
//!
//! The closure must build a fresh transaction on every call; a failed
//! attempt has already rolled back when its transaction was dropped.

use backoff::backoff::Backoff;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::RetrySettings;
use crate::error::{PosError, PosResult};

pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    operation: &str,
    mut attempt_fn: F,
) -> PosResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PosResult<T>>,
{
    let mut backoff = settings.backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match attempt_fn().await {
            Err(err) if err.is_lock_conflict() => {
                if attempt >= settings.max_attempts {
                    warn!(operation, attempts = attempt, error = %err, "Giving up on busy database");
                    return Err(PosError::Conflict {
                        operation: operation.to_string(),
                        attempts: attempt,
                    });
                }

                let delay = backoff.next_backoff().unwrap_or_else(|| settings.max_backoff());
                debug!(operation, attempt, ?delay, "Database busy, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
