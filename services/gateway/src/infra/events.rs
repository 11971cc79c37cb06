use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use deadpool_redis::Pool;
use deadpool_redis::redis::{self, AsyncCommands};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use hooki_domain::event::FlowEvent;

use crate::domain::repository::{EventBus, EventStream};
use crate::error::GatewayError;

pub const CHANNEL_PREFIX: &str = "hooki:events:";

fn channel(topic: &str) -> String {
    format!("{CHANNEL_PREFIX}{topic}")
}

// ── Redis pub/sub ────────────────────────────────────────────────────────────

/// Fan-out across gateway instances. Publishing goes through the pool;
/// each subscription holds its own connection for as long as the stream lives.
#[derive(Clone)]
pub struct RedisEventBus {
    pub pool: Pool,
    pub client: redis::Client,
}

impl EventBus for RedisEventBus {
    async fn publish(&self, topic: &str, event: &FlowEvent) -> Result<(), GatewayError> {
        let payload = serde_json::to_string(event).context("serialize flow event")?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        let _receivers: i64 = conn
            .publish(channel(topic), payload)
            .await
            .map_err(|e: redis::RedisError| GatewayError::Internal(e.into()))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<EventStream, GatewayError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("open pubsub connection")?;
        pubsub
            .subscribe(channel(topic))
            .await
            .context("subscribe to event channel")?;
        let events = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            match serde_json::from_str::<FlowEvent>(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable flow event");
                    None
                }
            }
        });
        Ok(events.boxed())
    }
}

// ── In-process ───────────────────────────────────────────────────────────────

const LOCAL_CHANNEL_CAPACITY: usize = 256;

/// Single-process fan-out over broadcast channels, one per topic.
/// Slow subscribers skip what they missed. A topic is forgotten once it has
/// no subscribers, on the next publish to it or the next subscribe to any topic.
#[derive(Clone, Default)]
pub struct LocalEventBus {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<FlowEvent>>>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBus for LocalEventBus {
    async fn publish(&self, topic: &str, event: &FlowEvent) -> Result<(), GatewayError> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(sender) = topics.get(topic) {
            if sender.send(event.clone()).is_err() {
                // Every subscriber is gone.
                topics.remove(topic);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<EventStream, GatewayError> {
        let mut topics = self
            .topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Topics whose subscribers all left without a publish in between.
        topics.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(LOCAL_CHANNEL_CAPACITY).0)
            .subscribe();
        Ok(BroadcastStream::new(receiver)
            .filter_map(|item| async move { item.ok() })
            .boxed())
    }
}

// ── Backend selection ────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum EventBusBackend {
    Redis(RedisEventBus),
    Local(LocalEventBus),
}

impl EventBus for EventBusBackend {
    async fn publish(&self, topic: &str, event: &FlowEvent) -> Result<(), GatewayError> {
        match self {
            Self::Redis(bus) => bus.publish(topic, event).await,
            Self::Local(bus) => bus.publish(topic, event).await,
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<EventStream, GatewayError> {
        match self {
            Self::Redis(bus) => bus.subscribe(topic).await,
            Self::Local(bus) => bus.subscribe(topic).await,
        }
    }
}
