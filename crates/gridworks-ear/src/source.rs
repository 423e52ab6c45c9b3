//! Where heard messages come from.
//!
//! A [`MessageSource`] pushes raw `(topic, payload)` pairs into a channel; the
//! daemon turns them into [`HeardMessage`](crate::message::HeardMessage)s and
//! hands them to the ear. The only production source is the MQTT broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, SubscribeFilter};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MqttConfig;
use crate::error::{Error, Result};
use crate::subscriptions::Subscription;

/// A message as it arrived, before topic decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic exactly as published.
    pub topic: String,
    /// Payload bytes.
    pub payload: Vec<u8>,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    /// A message received now.
    #[must_use]
    pub fn now(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// A producer of raw messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Short name, for logs.
    fn name(&self) -> &'static str;

    /// Whether the source is delivering messages.
    fn is_running(&self) -> bool;

    /// Start delivering messages into `tx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is already running or cannot start.
    async fn start(&mut self, tx: mpsc::Sender<RawMessage>) -> Result<()>;

    /// Ask the source to stop. Safe to call more than once.
    fn stop(&self);
}

/// Cloneable stop signal shared between a source and its task.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    /// A handle that has not been stopped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether stop was signalled.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once stop is signalled.
    pub async fn stopped(&self) {
        while !self.should_stop() {
            self.notify.notified().await;
        }
    }
}

/// Random MQTT client id: a v4 UUID without its last group.
#[must_use]
pub fn random_client_id() -> String {
    let id = Uuid::new_v4().to_string();
    match id.rsplit_once('-') {
        Some((head, _)) => head.to_string(),
        None => id,
    }
}

/// Subscribes to the ear's topics on an MQTT broker.
#[derive(Debug)]
pub struct MqttSource {
    config: MqttConfig,
    subscriptions: Vec<Subscription>,
    handle: StopHandle,
    task: Option<JoinHandle<()>>,
}

impl MqttSource {
    /// A source for `config` that will subscribe to `subscriptions`.
    #[must_use]
    pub fn new(config: MqttConfig, subscriptions: Vec<Subscription>) -> Self {
        Self {
            config,
            subscriptions,
            handle: StopHandle::new(),
            task: None,
        }
    }

    /// The client id to connect with.
    fn client_id(&self) -> String {
        self.config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(random_client_id)
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id(), &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive());
        if !self.config.username.is_empty() {
            options.set_credentials(&self.config.username, &self.config.password);
        }
        options
    }

    fn filters(&self) -> Vec<SubscribeFilter> {
        self.subscriptions
            .iter()
            .map(|s| SubscribeFilter::new(s.topic.clone(), s.qos.into()))
            .collect()
    }
}

#[async_trait]
impl MessageSource for MqttSource {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished()) && !self.handle.should_stop()
    }

    async fn start(&mut self, tx: mpsc::Sender<RawMessage>) -> Result<()> {
        if self.is_running() {
            return Err(Error::SourceAlreadyRunning);
        }
        if self.config.host.trim().is_empty() {
            return Err(Error::Mqtt("no broker host configured".to_string()));
        }

        self.handle = StopHandle::new();
        let (client, eventloop) = AsyncClient::new(self.options(), self.config.channel_capacity.max(1));
        info!(
            "Connecting to MQTT broker {}:{} with {} subscriptions",
            self.config.host,
            self.config.port,
            self.subscriptions.len()
        );

        let task = PollTask {
            client,
            filters: self.filters(),
            tx,
            handle: self.handle.clone(),
            reconnect_delay: self.config.reconnect_delay(),
        };
        self.task = Some(tokio::spawn(task.run(eventloop)));
        Ok(())
    }

    fn stop(&self) {
        self.handle.stop();
    }
}

struct PollTask {
    client: AsyncClient,
    filters: Vec<SubscribeFilter>,
    tx: mpsc::Sender<RawMessage>,
    handle: StopHandle,
    reconnect_delay: Duration,
}

impl PollTask {
    async fn run(self, mut eventloop: EventLoop) {
        loop {
            tokio::select! {
                () = self.handle.stopped() => break,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => self.subscribe(),
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let raw = RawMessage::now(publish.topic, publish.payload.to_vec());
                        if self.tx.send(raw).await.is_err() {
                            debug!("Message receiver dropped; stopping MQTT loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {}; retrying in {:?}", e, self.reconnect_delay);
                        tokio::select! {
                            () = self.handle.stopped() => break,
                            () = tokio::time::sleep(self.reconnect_delay) => {}
                        }
                    }
                },
            }
        }

        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect: {}", e);
        }
        info!("MQTT source stopped");
    }

    fn subscribe(&self) {
        info!("Connected to MQTT broker");
        if self.filters.is_empty() {
            warn!("No topics to subscribe to");
            return;
        }
        match self.client.try_subscribe_many(self.filters.clone()) {
            Ok(()) => info!("Subscribed to {} topics", self.filters.len()),
            Err(e) => warn!("Could not subscribe: {}", e),
        }
    }
}
