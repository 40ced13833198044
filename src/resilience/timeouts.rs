//! Timeout enforcement.
//!
//! Every network operation in the coordination path carries a deadline.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} timed out after {elapsed:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub elapsed: Duration,
}

/// Run `future` with a deadline, naming the operation in the error.
pub async fn with_deadline<F, T>(operation: &'static str, limit: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future).await.map_err(|_| TimedOut {
        operation,
        elapsed: limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_futures() {
        let value = with_deadline("fast", Duration::from_millis(100), async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn reports_the_operation() {
        let err = with_deadline("probe", Duration::from_millis(10), tokio::time::sleep(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.operation, "probe");
        assert_eq!(err.to_string(), "probe timed out after 10ms");
    }
}
