//! Retry executor driving a fallible call under a `RetryPolicy`.

use std::time::Duration;

use super::domain::RetryPolicy;

/// Why a retried call finally failed.
#[derive(Debug, PartialEq)]
pub enum RetryFailure<E> {
    /// Every allowed attempt failed with a transient error.
    Exhausted { attempts: u32, last: E },
    /// A permanent error stopped the loop early.
    Aborted { attempts: u32, error: E },
}

/// Run `call` until it succeeds, fails permanently, or the policy is exhausted.
///
/// `call` receives the 0-based attempt number. `sleep` is invoked with
/// `policy.delay_for(n)` before retry `n`; it blocks only the calling thread.
pub fn retry_with_backoff<T, E, C, P, S>(
    policy: &RetryPolicy,
    mut sleep: S,
    mut call: C,
    is_transient: P,
) -> Result<T, RetryFailure<E>>
where
    C: FnMut(u32) -> Result<T, E>,
    P: Fn(&E) -> bool,
    S: FnMut(Duration),
{
    let mut attempt = 0;
    loop {
        match call(attempt) {
            Ok(value) => return Ok(value),
            Err(error) if !is_transient(&error) => {
                return Err(RetryFailure::Aborted {
                    attempts: attempt + 1,
                    error,
                })
            }
            Err(last) if attempt >= policy.max_retries => {
                return Err(RetryFailure::Exhausted {
                    attempts: attempt + 1,
                    last,
                })
            }
            Err(_) => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                sleep(delay);
                attempt += 1;
            }
        }
    }
}
