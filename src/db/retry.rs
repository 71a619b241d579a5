use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Run `op` up to `max_attempts` times, sleeping `delay` between failed attempts.
///
/// No sleep follows the final attempt. Exhaustion yields `Error::ConnectExhausted`
/// carrying the last failure's text. A `max_attempts` of zero still makes one attempt.
pub async fn retry_fixed<T, E, F, Fut>(max_attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                log::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {}s...",
                    attempt,
                    e,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(Error::ConnectExhausted {
                    attempts: max_attempts,
                    last_error: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let value = retry_fixed(5, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let value = retry_fixed(5, Duration::from_millis(1), |attempt| async move {
            if attempt < 3 {
                Err(format!("refused #{}", attempt))
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = retry_fixed(4, Duration::from_millis(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(format!("refused #{}", attempt)) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            Error::ConnectExhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "refused #4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn sleeps_only_between_attempts() {
        let start = Instant::now();
        let _ = retry_fixed(3, Duration::from_millis(40), |_| async {
            Err::<(), _>("down")
        })
        .await;
        let elapsed = start.elapsed();

        // Two gaps for three attempts.
        assert!(elapsed >= Duration::from_millis(80));
        assert!(elapsed < Duration::from_millis(120 + 500));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let err = retry_fixed(0, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("down") }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("after 1 attempts"));
    }
}
