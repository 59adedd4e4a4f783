//! Timeouts and bounded retries around store calls.
//!
//! Reads are idempotent and may be retried on transient failure. Writes are
//! attempted once: a write that times out may or may not have been applied,
//! so it is reported as `WriteOutcomeUnknown` and the caller must re-fetch
//! state before trying again.

use crate::{CoreError, RetryPolicy};
use std::future::Future;
use tracing::warn;

pub async fn read_with_retry<T, F, Fut>(policy: &RetryPolicy, what: &'static str, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let attempts = policy.read_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let res = match tokio::time::timeout(policy.read_timeout, op()).await {
            Ok(r) => r,
            Err(_) => Err(CoreError::Unavailable(what)),
        };
        match res {
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!(what, attempt, error = %e, "read failed, retrying");
                tokio::time::sleep(policy.backoff * attempt).await;
            }
            other => return other,
        }
    }
}

pub async fn write_once<T, Fut>(policy: &RetryPolicy, what: &'static str, fut: Fut) -> Result<T, CoreError>
where
    Fut: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(policy.write_timeout, fut).await {
        Ok(r) => r,
        Err(_) => {
            warn!(what, "write timed out; outcome unknown");
            Err(CoreError::WriteOutcomeUnknown(what))
        }
    }
}
