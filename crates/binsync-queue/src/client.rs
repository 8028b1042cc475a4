use std::future::Future;

use binsync_core::ChangeEvent;
use redis::aio::MultiplexedConnection;
use tracing::{debug, info};

use crate::error::QueueResult;

/// Trait for downstream queue clients.
///
/// `send` returns only once the queue has accepted the event; a failure is
/// fatal to the current dispatch attempt and the caller must not checkpoint
/// past the event.
pub trait Broker: Send + Sync {
    fn send(
        &self,
        event: &ChangeEvent,
        routing_key: &str,
    ) -> impl Future<Output = QueueResult<()>> + Send;
}

/// Broker backed by Redis Streams.
///
/// Each routing key (schema name) gets its own stream, which preserves the
/// per-source event order for consumers applying one schema at a time.
#[derive(Clone)]
pub struct RedisBroker {
    conn: MultiplexedConnection,
    stream_prefix: String,
}

impl RedisBroker {
    /// Connect to Redis and prepare a broker publishing under the given
    /// stream prefix.
    pub async fn connect(url: &str, stream_prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let stream_prefix = stream_prefix.into();
        info!(prefix = %stream_prefix, "connected to queue");

        Ok(Self {
            conn,
            stream_prefix,
        })
    }

    fn stream_key(&self, routing_key: &str) -> String {
        format!("{}:{}", self.stream_prefix, routing_key)
    }
}

impl Broker for RedisBroker {
    fn send(
        &self,
        event: &ChangeEvent,
        routing_key: &str,
    ) -> impl Future<Output = QueueResult<()>> + Send {
        let mut conn = self.conn.clone();
        let key = self.stream_key(routing_key);
        let payload = serde_json::to_string(event);

        async move {
            let payload = payload?;
            let id: String = redis::cmd("XADD")
                .arg(&key)
                .arg("*")
                .arg("event")
                .arg(&payload)
                .query_async(&mut conn)
                .await?;
            debug!(stream = %key, id = %id, "event enqueued");
            Ok(())
        }
    }
}
