use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use companies_core::{DomainEvent, EventPublisher, PublishError};
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use serde::Serialize;
use tracing::debug;

/// Redis pub/sub channel used as the event bus.
#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    publish_timeout: Duration,
}

impl RedisBus {
    pub fn connect(redis_url: &str, publish_timeout: Duration) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            publish_timeout,
        })
    }

    /// Readiness probe.
    pub async fn ping(&self) -> RedisResult<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(())
    }

    /// Publishes `payload` as JSON and returns how many subscribers got it.
    /// The wait for the server's reply is bounded by the publish timeout.
    pub async fn publish_json<T: Serialize>(
        &self,
        channel: &str,
        payload: &T,
    ) -> Result<i64, PublishError> {
        let serialized = serde_json::to_string(payload)?;
        let delivery = async {
            let mut connection = self.client.get_multiplexed_async_connection().await?;
            let receivers: i64 = connection.publish(channel, serialized).await?;
            Ok::<_, RedisError>(receivers)
        };

        match tokio::time::timeout(self.publish_timeout, delivery).await {
            Ok(Ok(receivers)) => Ok(receivers),
            Ok(Err(err)) => Err(PublishError::Delivery {
                topic: channel.to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(PublishError::Timeout {
                topic: channel.to_string(),
                timeout_ms: self.publish_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl EventPublisher for RedisBus {
    async fn publish(&self, topic: &str, event: &DomainEvent) -> Result<(), PublishError> {
        let receivers = self.publish_json(topic, event).await?;
        debug!(
            topic,
            event_id = %event.event_id,
            receivers,
            "event delivered"
        );
        Ok(())
    }
}
