//! Redis pub/sub-backed event bus (optional).
//!
//! Pub/sub is not durable: a subscriber that is offline misses the message.
//! Role-changed notifications are advisory, so that is acceptable; the next
//! resolution re-reads the store.
//!
//! Each subscription owns a listener thread and connection. The listener wakes
//! every [`LISTENER_POLL_INTERVAL`] to check whether its subscription is still
//! held, and exits once it is dropped.

use std::marker::PhantomData;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use redis::Commands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use rolegate_events::{EventBus, Subscription, SubscriptionLiveness};

pub const LISTENER_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("failed to serialize message: {0}")]
    Serialize(String),
}

/// Redis pub/sub bus for JSON-encoded messages of type `M`.
#[derive(Debug)]
pub struct RedisPubSubEventBus<M> {
    client: redis::Client,
    channel: String,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for RedisPubSubEventBus<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            channel: self.channel.clone(),
            _message: PhantomData,
        }
    }
}

impl<M> RedisPubSubEventBus<M> {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
            _message: PhantomData,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl<M> EventBus<M> for RedisPubSubEventBus<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    type Error = RedisBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        let _: i64 = conn
            .publish(&self.channel, payload)
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        let subscription = Subscription::new(rx);
        let liveness = subscription.liveness();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Background thread that receives pub/sub messages and forwards them.
        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(channel = %channel, error = %err, "redis subscription could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(err) = pubsub.set_read_timeout(Some(LISTENER_POLL_INTERVAL)) {
                tracing::warn!(channel = %channel, error = %err, "redis read timeout not applied");
                return;
            }
            if let Err(err) = pubsub.subscribe(&channel) {
                tracing::warn!(channel = %channel, error = %err, "redis subscribe failed");
                return;
            }

            while liveness.is_open() {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(err) if keep_listening(&err, &liveness) => continue,
                    Err(err) => {
                        if !err.is_timeout() {
                            tracing::debug!(channel = %channel, error = %err, "redis subscription closed");
                        }
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let message: M = match serde_json::from_str(&payload) {
                    Ok(m) => m,
                    Err(err) => {
                        tracing::debug!(channel = %channel, error = %err, "skipping undecodable pub/sub message");
                        continue;
                    }
                };

                if tx.send(message).is_err() {
                    return;
                }
            }
            tracing::debug!(channel = %channel, "redis subscription dropped; listener exiting");
        });

        subscription
    }
}

/// A read timeout is the listener's idle tick; any other error ends it.
fn keep_listening(err: &redis::RedisError, liveness: &SubscriptionLiveness) -> bool {
    err.is_timeout() && liveness.is_open()
}
