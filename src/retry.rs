//! Bounded-attempt retry/backoff helper (spec §4.1, component C1).
//!
//! Deliberately does not classify errors — classification is the caller's
//! responsibility (§4.1, §9 "Error classification by substring"). This
//! mirrors the facilitator's own instinct to keep retry mechanics separate
//! from error semantics (`PaymentError` is built by the caller, not by a
//! generic retry wrapper).

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Wait the same duration between every attempt.
    Constant(Duration),
    /// Wait `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    pub fn constant_secs(secs: u64) -> Self {
        Backoff::Constant(Duration::from_secs(secs))
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Constant(d) => *d,
            Backoff::Exponential { base, max } => {
                let scaled = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
                scaled.min(*max)
            }
        }
    }
}

impl Default for Backoff {
    /// Spec default: constant 5s delay.
    fn default() -> Self {
        Backoff::constant_secs(5)
    }
}

/// The outcome of `run`: either the operation's value, or the last error
/// observed (or a cancellation marker, see `RetryError::Cancelled`).
#[derive(Debug)]
pub enum RetryError<E> {
    Cancelled,
    Exhausted(E),
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "cancelled"),
            RetryError::Exhausted(e) => write!(f, "retries exhausted: {e}"),
        }
    }
}

/// Runs `op` up to `max_retries + 1` times, waiting `backoff` between
/// attempts, and checking `cancel` before every attempt.
pub async fn run<F, Fut, T, E>(
    mut op: F,
    max_retries: u32,
    backoff: Backoff,
    cancel: &CancellationToken,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_error: Option<E> = None;
    for attempt in 0..=max_retries {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
        if attempt < max_retries {
            let delay = backoff.delay_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
        }
    }
    Err(RetryError::Exhausted(last_error.expect("at least one attempt ran")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_sleeping() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = run::<_, _, _, ()>(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            3,
            Backoff::constant_secs(0),
            &cancel,
        )
        .await;
        assert!(matches!(result, Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_plus_one_attempts() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = run::<_, _, (), _>(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            },
            2,
            Backoff::constant_secs(0),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(RetryError::Exhausted("boom"))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result = run::<_, _, (), ()>(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            },
            3,
            Backoff::constant_secs(0),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
