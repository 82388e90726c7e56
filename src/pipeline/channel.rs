use crate::record::Record;
use tokio::sync::mpsc;

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Capacity of every producer/consumer queue between pipeline stages.
pub const RECORD_QUEUE_CAPACITY: usize = 1000;

/// Create a bounded channel with the specified buffer size
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size)
}

/// Bounded record queue. A full queue blocks the producer; nothing is dropped.
pub fn record_queue(capacity: usize) -> (Sender<Record>, Receiver<Record>) {
    create_channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TrySendError;

    fn record(n: usize) -> Record {
        Record {
            message: format!("line {}", n),
            container_name: "web".to_string(),
            container_id: "c1".to_string(),
            timestamp: 0,
            hostname: "h".to_string(),
        }
    }

    #[tokio::test]
    async fn test_full_queue_blocks_next_send() {
        let (tx, mut rx) = record_queue(RECORD_QUEUE_CAPACITY);

        for n in 0..RECORD_QUEUE_CAPACITY {
            tx.try_send(record(n)).unwrap();
        }
        assert!(matches!(
            tx.try_send(record(RECORD_QUEUE_CAPACITY)),
            Err(TrySendError::Full(_))
        ));

        // The 1001st send waits instead of failing
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(record(RECORD_QUEUE_CAPACITY)),
        )
        .await;
        assert!(blocked.is_err());

        // Freeing one slot lets it through, and nothing was lost
        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "line 0");
        tx.send(record(RECORD_QUEUE_CAPACITY)).await.unwrap();

        drop(tx);
        let mut received = 1;
        let mut last = String::new();
        while let Some(r) = rx.recv().await {
            received += 1;
            last = r.message;
        }
        assert_eq!(received, RECORD_QUEUE_CAPACITY + 1);
        assert_eq!(last, format!("line {}", RECORD_QUEUE_CAPACITY));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _rx) = record_queue(0);
        assert_eq!(tx.max_capacity(), 1);
    }
}
