//! Bounded retry for blocking store calls.

use crate::config::RetryPolicy;
use crate::store::StoreResult;
use log::warn;

/// Runs `call` until it succeeds, fails permanently, or the policy runs out.
///
/// Only transient errors (`StoreError::is_transient`) are retried. The last
/// error is returned unchanged.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: impl FnMut() -> StoreResult<T>,
) -> StoreResult<T> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "event=store_retry module=retry status=error operation={operation} attempt={attempt} delay_ms={} error={err}",
                    delay.as_millis()
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
