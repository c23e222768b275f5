//! Transient database error retry.
//!
//! Deadlocks, lock waits, and dropped connections get an exponential
//! backoff with jitter; everything else fails immediately.

use sea_orm::DbErr;
use sea_orm::error::RuntimeErr;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Runs `operation` until it succeeds, exhausts `config.max_retries`, or
/// fails with an error retrying cannot fix.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} recovered on attempt {}", operation_name, attempt + 1);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable_error(&err) || attempt >= config.max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = backoff_delay(attempt, config.base_delay_ms, config.max_delay_ms);
        warn!(
            "{} hit a transient error ({}), retry {}/{} in {}ms",
            operation_name, err, attempt, config.max_retries, delay
        );
        sleep(Duration::from_millis(delay)).await;
    }
}

/// Exponential backoff with up to 25% jitter so concurrent retriers spread
/// out instead of stampeding.
fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    use rand::RngExt;
    let exponential = base_ms.saturating_mul(1u64 << (attempt - 1).min(16));
    let capped = exponential.min(max_ms);
    capped.saturating_add(rand::rng().random_range(0..=capped / 4))
}

pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(inner) | DbErr::Query(inner) => is_transient_runtime_error(inner),
        _ => false,
    }
}

fn is_transient_runtime_error(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            use std::ops::Deref;
            if let Some(db_err) = sqlx_err.deref().as_database_error()
                && let Some(code) = db_err.code()
            {
                return is_lock_error_code(code.as_ref());
            }
            looks_like_lock_error(&sqlx_err.to_string())
        }
        RuntimeErr::Internal(msg) => looks_like_lock_error(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn is_lock_error_code(code: &str) -> bool {
    matches!(
        code,
        // MySQL: deadlock, lock wait timeout
        "1213" | "1205"
        // PostgreSQL: serialization failure, deadlock detected
        | "40001" | "40P01"
        // SQLite: BUSY, LOCKED
        | "5" | "6"
    )
}

/// Fallback for drivers that report locking problems without an error code.
fn looks_like_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    ["deadlock", "lock wait timeout", "database is locked", "serialization failure"]
        .iter()
        .any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 20,
        }
    }

    #[test]
    fn test_connection_loss_is_retryable() {
        assert!(is_retryable_error(&DbErr::ConnectionAcquire(
            sea_orm::error::ConnAcquireErr::Timeout
        )));
        assert!(is_retryable_error(&DbErr::Conn(RuntimeErr::Internal(
            "connection reset".into()
        ))));
    }

    #[test]
    fn test_lock_messages_are_retryable() {
        for msg in [
            "Deadlock found when trying to get lock",
            "database is locked",
            "Lock wait timeout exceeded",
            "could not serialize access: serialization failure",
        ] {
            let err = DbErr::Exec(RuntimeErr::Internal(msg.into()));
            assert!(is_retryable_error(&err), "{msg}");
        }
    }

    #[test]
    fn test_logic_errors_fail_fast() {
        assert!(!is_retryable_error(&DbErr::RecordNotFound("gone".into())));
        assert!(!is_retryable_error(&DbErr::Exec(RuntimeErr::Internal(
            "UNIQUE constraint failed".into()
        ))));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert!((100..=125).contains(&backoff_delay(1, 100, 2000)));
        assert!((200..=250).contains(&backoff_delay(2, 100, 2000)));
        assert!((2000..=2500).contains(&backoff_delay(9, 100, 2000)));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", fast_config(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DbErr::ConnectionAcquire(
                        sea_orm::error::ConnAcquireErr::Timeout,
                    ))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("op", fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(DbErr::ConnectionAcquire(
                    sea_orm::error::ConnAcquireErr::Timeout,
                ))
            }
        })
        .await;

        assert!(result.is_err());
        // Initial call plus max_retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("op", fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::RecordNotFound("gone".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
