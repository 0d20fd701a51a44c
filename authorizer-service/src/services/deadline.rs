use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::error::ServiceError;

/// Absolute point in time by which an operation must finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Run `fut` under this deadline. An already-expired deadline fails
    /// without polling the future.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        if self.is_expired() {
            tracing::warn!(operation, "Deadline already expired");
            return Err(ServiceError::Timeout { operation });
        }

        match tokio::time::timeout_at(self.0, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, "Operation exceeded deadline");
                Err(ServiceError::Timeout { operation })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let value = deadline.run("noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_expired_deadline_is_not_polled() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(1));
        let mut polled = false;
        let result = deadline
            .run("expired", async {
                polled = true;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Timeout {
                operation: "expired"
            })
        ));
        assert!(!polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_future_times_out() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let result: Result<(), _> = deadline
            .run("stalled", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ServiceError::Timeout { .. })));
    }
}
