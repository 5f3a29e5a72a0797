use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tracing::{debug, info, warn};

use hvac_common::MqttConfig;

pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The pub/sub channel the autopilot lives on. Handlers run on the
/// transport's delivery task, concurrently with the tuning passes.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: &[u8], retained: bool) -> anyhow::Result<()>;
    fn subscribe(&self, topic: &str, handler: MessageHandler) -> anyhow::Result<()>;
}

#[derive(Default)]
struct Router {
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
}

impl Router {
    fn add(&self, topic: &str, handler: MessageHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        // Handlers may publish from inside their callback; clone them out so
        // the lock is not held while they run.
        let matched = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for handler in matched {
            handler(payload);
        }
    }
}

/// MQTT-backed transport. Publishes and subscriptions are enqueued without
/// blocking; a background task polls the connection and fans incoming
/// messages out to the subscribed handlers.
pub struct MqttTransport {
    client: AsyncClient,
    router: Arc<Router>,
}

impl MqttTransport {
    pub fn connect(config: &MqttConfig) -> Arc<Self> {
        let mut options =
            MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let router = Arc::new(Router::default());

        let delivery = Arc::clone(&router);
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::Publish(message))) => {
                        debug!(topic = %message.topic, "mqtt message");
                        delivery.dispatch(&message.topic, &message.payload);
                    }
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("mqtt connected");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("mqtt poll error: {err}");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Arc::new(Self { client, router })
    }
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: &[u8], retained: bool) -> anyhow::Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, retained, payload)
            .with_context(|| format!("failed to publish to {topic}"))
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> anyhow::Result<()> {
        self.router.add(topic, handler);
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .with_context(|| format!("failed to subscribe to {topic}"))
    }
}

/// In-process transport: every publish is delivered synchronously to the
/// subscribed handlers. Backs the test suites and broker-less dry runs.
#[derive(Default)]
pub struct MemoryBus {
    router: Router,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Transport for MemoryBus {
    fn publish(&self, topic: &str, payload: &[u8], _retained: bool) -> anyhow::Result<()> {
        self.router.dispatch(topic, payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str, handler: MessageHandler) -> anyhow::Result<()> {
        self.router.add(topic, handler);
        Ok(())
    }
}
