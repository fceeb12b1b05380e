//! The error boundary wrapping every fallible remote operation.

use crate::backoff::{BackoffPolicy, ExponentialBackoff};
use crate::breaker::CircuitBreaker;
use crate::classify::classify;
use crate::metrics::ResilienceMetrics;
use armada_core::OrchestrateError;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Run `operation` under classified retry, optionally guarded by a shared
/// circuit breaker and observed by shared metrics.
///
/// An open breaker fails immediately with [`OrchestrateError::CircuitOpen`]
/// without invoking the operation or consuming a backoff attempt.
/// Non-retryable failures propagate after a single attempt; retryable ones
/// wait out the backoff schedule and propagate once it is exhausted. Every
/// attempt outcome reaches the observer.
pub async fn with_error_boundary<T, F, Fut>(
    mut operation: F,
    label: &str,
    policy: BackoffPolicy,
    breaker: Option<&Mutex<CircuitBreaker>>,
    metrics: Option<&ResilienceMetrics>,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = ExponentialBackoff::new(policy);

    loop {
        if let Some(guard) = breaker {
            let open = match guard.lock() {
                Ok(mut b) => b.is_open(),
                Err(_) => false,
            };
            if open {
                debug!(operation = label, "circuit open, refusing call");
                return Err(OrchestrateError::CircuitOpen {
                    operation: label.to_string(),
                }
                .into());
            }
        }

        match operation().await {
            Ok(value) => {
                if let Some(guard) = breaker {
                    if let Ok(mut b) = guard.lock() {
                        b.record_success();
                    }
                }
                if let Some(m) = metrics {
                    m.record_success(label);
                }
                backoff.reset();
                return Ok(value);
            }
            Err(err) => {
                let class = classify(&err);
                if let Some(m) = metrics {
                    m.record_failure(label, class, &err.to_string());
                }
                if let Some(guard) = breaker {
                    if let Ok(mut b) = guard.lock() {
                        b.record_failure();
                    }
                }

                if !class.is_retryable() {
                    warn!(operation = label, %class, error = %err, "not retryable");
                    return Err(err);
                }

                match backoff.next_delay() {
                    Some(delay) => {
                        warn!(
                            operation = label,
                            %class,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying",
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(operation = label, %class, error = %err, "retries exhausted");
                        return Err(err);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_policy(max_retries: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_passes_through() {
        let metrics = ResilienceMetrics::new();
        let result = with_error_boundary(
            || async { Ok::<_, anyhow::Error>(7) },
            "op",
            fast_policy(3),
            None,
            Some(&metrics),
        )
        .await
        .unwrap();
        assert_eq!(result, 7);

        let stats = metrics.stats_for("op").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_error_boundary(
            move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(anyhow::anyhow!("ECONNRESET mid-stream"))
                    } else {
                        Ok(42)
                    }
                }
            },
            "op",
            fast_policy(3),
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failures_stop_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = with_error_boundary(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::Error::new(OrchestrateError::Validation(
                        "empty prompt".into(),
                    )))
                }
            },
            "op",
            fast_policy(5),
            None,
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("validation"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_propagate_the_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let metrics = ResilienceMetrics::new();
        let err = with_error_boundary(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("network unreachable"))
                }
            },
            "op",
            fast_policy(2),
            None,
            Some(&metrics),
        )
        .await
        .unwrap_err();

        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("network"));
        let stats = metrics.stats_for("op").unwrap();
        assert_eq!(stats.failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_short_circuits_without_invoking() {
        let breaker = Mutex::new(CircuitBreaker::new(1, Duration::from_secs(600)));
        breaker.lock().unwrap().record_failure();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = with_error_boundary(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            },
            "agent",
            fast_policy(3),
            Some(&breaker),
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let orchestrate = err.downcast_ref::<OrchestrateError>().unwrap();
        assert!(matches!(
            orchestrate,
            OrchestrateError::CircuitOpen { operation } if operation == "agent"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_trip_the_breaker() {
        let breaker = Mutex::new(CircuitBreaker::new(2, Duration::from_secs(600)));

        let _ = with_error_boundary(
            || async { Err::<(), _>(anyhow::anyhow!("socket closed")) },
            "agent",
            fast_policy(1),
            Some(&breaker),
            None,
        )
        .await;

        // One initial attempt and one retry both failed.
        assert_eq!(breaker.lock().unwrap().state(), BreakerState::Open);
    }
}
