// src/retry.rs — Async retry combinator with pluggable backoff
//
// Two policies live here:
//   - Linear: session saves wait `attempt × base` after each failure.
//   - Exponential: transport reconnects double from `initial` up to `max`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule. `delay(n)` is the wait after the n-th failure (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Linear { base: Duration },
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Backoff::Exponential { initial, max }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Linear { base } => base.saturating_mul(attempt),
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Run `op` up to `max_attempts` times.
///
/// `op` receives the 1-based attempt number. No delay precedes the first
/// attempt. Errors rejected by `should_retry` are returned immediately; once
/// the budget is spent the last error is returned.
pub async fn retry<T, E, F, Fut, P>(
    max_attempts: u32,
    backoff: Backoff,
    should_retry: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts || !should_retry(&e) {
                    return Err(e);
                }

                let delay = backoff.delay(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after error: {e}"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
