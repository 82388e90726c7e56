use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Periodic maintenance hook. Retention is not implemented; each pass only
/// logs. Returns the number of passes run before cancellation.
pub async fn run_maintenance(every: Duration, shutdown: CancellationToken) -> u64 {
    let mut ticker = interval_at(Instant::now() + every, every);
    let mut passes = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                passes += 1;
                info!(pass = passes, "Running scheduled maintenance");
            }
            _ = shutdown.cancelled() => break,
        }
    }

    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_maintenance_runs_until_cancelled() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_maintenance(Duration::from_millis(10), token.clone()));

        tokio::time::sleep(Duration::from_millis(65)).await;
        token.cancel();

        let passes = handle.await.unwrap();
        assert!(passes >= 2, "expected at least two passes, got {}", passes);
    }

    #[tokio::test]
    async fn test_no_pass_before_first_interval() {
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(run_maintenance(Duration::from_secs(3600), token).await, 0);
    }
}
