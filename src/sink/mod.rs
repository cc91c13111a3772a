//! Record publishing
//!
//! [`PublishSink`] serializes each record to JSON and hands it to a
//! [`MessageQueue`]. The queue connection is created once per run and shared
//! by every publish. The sink never retries: a failed publish is returned to
//! the caller as [`PublishOutcome::Failed`] and the caller decides what to do
//! with the record.

mod nats;
mod recording;

pub use nats::NatsQueue;
pub use recording::{PublishedMessage, RecordingQueue};

use crate::feed::Record;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a message queue
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Broker rejected message: {0}")]
    Publish(String),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of handing one record to the broker
#[derive(Debug)]
pub enum PublishOutcome {
    /// The broker acknowledged the message
    Acked,
    /// The message may not have been stored
    Failed(PublishError),
}

impl PublishOutcome {
    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked)
    }
}

/// Trait for broker publish operations
///
/// Swaps between a real broker connection and test doubles.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Publish a payload to a topic and wait for the broker's acknowledgement
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError>;

    /// Flush and release the connection
    async fn close(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Serializes records and publishes them to one topic
#[derive(Clone)]
pub struct PublishSink {
    queue: Arc<dyn MessageQueue>,
    topic: String,
}

impl PublishSink {
    pub fn new(queue: Arc<dyn MessageQueue>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
        }
    }

    /// Publishes one record
    pub async fn publish(&self, record: &Record) -> PublishOutcome {
        let payload = match serde_json::to_vec(record) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => return PublishOutcome::Failed(PublishError::Serialize(e)),
        };

        match self.queue.publish(&self.topic, payload).await {
            Ok(()) => {
                tracing::debug!("Published {} to {}", record.id, self.topic);
                PublishOutcome::Acked
            }
            Err(e) => PublishOutcome::Failed(e),
        }
    }

    /// Releases the underlying queue connection
    pub async fn close(&self) -> Result<(), PublishError> {
        self.queue.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            identifier: format!("S1A_{}", id),
            metadata: format!("https://catalog.example/odata/v1/Products('{}')/", id),
            download: format!("https://catalog.example/odata/v1/Products('{}')/$value", id),
            footprint: "POLYGON ((2 51,4 51,4 55,2 54,2 51))".to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_serializes_record() {
        let queue = Arc::new(RecordingQueue::new());
        let sink = PublishSink::new(queue.clone(), "crisis_crawl");

        let outcome = sink.publish(&record("a")).await;
        assert!(outcome.is_acked());

        let messages = queue.published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "crisis_crawl");

        let decoded: Record = queue.deserialize_message(&messages[0]).unwrap();
        assert_eq!(decoded, record("a"));
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let queue = Arc::new(RecordingQueue::new());
        queue.fail_next(1);
        let sink = PublishSink::new(queue.clone(), "crisis_crawl");

        let outcome = sink.publish(&record("a")).await;
        assert!(matches!(outcome, PublishOutcome::Failed(PublishError::Publish(_))));
        assert_eq!(queue.attempt_count(), 1);
        assert_eq!(queue.publish_count(), 0);

        assert!(sink.publish(&record("b")).await.is_acked());
        assert_eq!(queue.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_close_reaches_queue() {
        let queue = Arc::new(RecordingQueue::new());
        let sink = PublishSink::new(queue.clone(), "t");
        sink.close().await.unwrap();
        assert!(queue.is_closed());
    }
}
