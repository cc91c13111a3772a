//! NATS JetStream queue
//!
//! Records go to a JetStream stream so they survive consumer downtime. The
//! stream is created on connect when it does not exist yet; its name is
//! derived from the subject.

use crate::config::BrokerConfig;
use crate::sink::{MessageQueue, PublishError};
use async_nats::jetstream::{self, stream};
use async_trait::async_trait;
use bytes::Bytes;

/// Durable queue backed by a JetStream stream
pub struct NatsQueue {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsQueue {
    /// Connects to the broker and declares the stream for `config.subject()`
    ///
    /// # Returns
    ///
    /// * `Ok(NatsQueue)` - Connected, stream available
    /// * `Err(PublishError::Connect)` - Broker unreachable, bad credentials or stream creation refused
    pub async fn connect(config: &BrokerConfig) -> Result<Self, PublishError> {
        let client = if config.username.is_empty() {
            async_nats::connect(config.url.as_str()).await
        } else {
            async_nats::ConnectOptions::with_user_and_password(
                config.username.clone(),
                config.password.clone(),
            )
            .connect(config.url.as_str())
            .await
        }
        .map_err(|e| PublishError::Connect(e.to_string()))?;

        let jetstream = jetstream::new(client.clone());
        let subject = config.subject();
        let name = stream_name(&subject);

        jetstream
            .get_or_create_stream(stream::Config {
                name: name.clone(),
                subjects: vec![subject.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| PublishError::Connect(format!("stream {}: {}", name, e)))?;

        tracing::info!("Connected to {} (stream {} on {})", config.url, name, subject);

        Ok(Self { client, jetstream })
    }
}

#[async_trait]
impl MessageQueue for NatsQueue {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), PublishError> {
        let ack = self
            .jetstream
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        ack.await
            .map_err(|e| PublishError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.client
            .flush()
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))
    }
}

/// Stream names cannot contain `.`, `*`, `>` or whitespace
fn stream_name(subject: &str) -> String {
    subject
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
