//! Redis streams backend.
//!
//! `XADD` / `XREADGROUP` / `XPENDING` / `XACK`, one entry per read to
//! bound the blast radius of a bad message.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamPendingCountReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, from_redis_value};

use super::{
    CONSUMER_GROUP, CONSUMER_NAME, DLQ_STREAM, SIGNALS_STREAM, SignalStream, StreamEntry,
    StreamError,
};

/// Default blocking read timeout.
const READ_BLOCK: Duration = Duration::from_secs(5);

/// Redis-backed signal stream.
#[derive(Clone)]
pub struct RedisSignalStream {
    conn: ConnectionManager,
    stream: String,
    group: String,
    consumer: String,
    dlq: String,
    block: Duration,
}

impl RedisSignalStream {
    /// Stream handle with the standard names and a 5 s blocking read.
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            stream: SIGNALS_STREAM.to_string(),
            group: CONSUMER_GROUP.to_string(),
            consumer: CONSUMER_NAME.to_string(),
            dlq: DLQ_STREAM.to_string(),
            block: READ_BLOCK,
        }
    }

    /// Create the consumer group, tolerating one that already exists.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] on backend failures other than BUSYGROUP.
    pub async fn ensure_group(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;

        match created {
            Ok(()) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl SignalStream for RedisSignalStream {
    async fn append(&self, fields: &[(String, String)]) -> Result<String, StreamError> {
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(&self.stream, "*", fields).await?;
        Ok(id)
    }

    async fn read_next(&self) -> Result<Option<StreamEntry>, StreamError> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
            .block(usize::try_from(self.block.as_millis()).unwrap_or(5000));

        let mut conn = self.conn.clone();
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[self.stream.as_str()], &[">"], &options)
            .await?;

        let Some(reply) = reply else {
            return Ok(None);
        };

        let entry = reply
            .keys
            .into_iter()
            .next()
            .and_then(|key| key.ids.into_iter().next());

        Ok(entry.map(|raw| {
            let fields = raw
                .map
                .into_iter()
                .filter_map(|(name, value)| {
                    from_redis_value::<String>(&value)
                        .ok()
                        .map(|text| (name, text))
                })
                .collect();
            StreamEntry { id: raw.id, fields }
        }))
    }

    async fn delivery_count(&self, entry_id: &str) -> Result<u64, StreamError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingCountReply = conn
            .xpending_count(&self.stream, &self.group, entry_id, entry_id, 1)
            .await?;

        Ok(reply
            .ids
            .first()
            .map_or(0, |pending| pending.times_delivered as u64))
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _acked: i64 = conn.xack(&self.stream, &self.group, &[entry_id]).await?;
        Ok(())
    }

    async fn dead_letter(&self, entry: &StreamEntry) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _id: String = conn.xadd(&self.dlq, "*", &entry.fields).await?;
        Ok(())
    }
}
