use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use domain::{AidConnection, ConnectionError, ConnectionState, Item, MessageHandler, Technology};

use super::base::ConnectionCore;

pub const DEFAULT_PORT: u16 = 1883;

/// Settings for the broker session
#[derive(Debug, Clone, Copy)]
pub struct MqttSettings {
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

/// Publish/subscribe connection to an MQTT broker.
///
/// Values cannot be queried; they arrive through subscriptions set up by
/// [`AidConnection::prepare_continuous_run`] and are handed to the registered
/// message handler as raw strings.
pub struct MqttConnection {
    core: Arc<ConnectionCore>,
    settings: MqttSettings,
    client: Mutex<Option<AsyncClient>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    subscribed: Arc<Mutex<HashSet<String>>>,
    handler: Arc<RwLock<Option<MessageHandler>>>,
}

impl MqttConnection {
    pub fn new(target: Url, settings: MqttSettings) -> Self {
        Self {
            core: Arc::new(ConnectionCore::new(target)),
            settings,
            client: Mutex::new(None),
            event_loop: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            subscribed: Arc::new(Mutex::new(HashSet::new())),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    /// Topics subscribed so far, as sent to the broker.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    fn client(&self) -> Option<AsyncClient> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Topic to subscribe for an item: the href without surrounding slashes.
    pub fn topic_for(item: &Item) -> String {
        item.form().href.trim().trim_matches('/').to_string()
    }

    /// Records the topic; returns false when it was already subscribed.
    fn remember(&self, topic: &str) -> bool {
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(topic.to_string())
    }

    fn forget(&self, topic: &str) {
        self.subscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic);
    }

    fn spawn_event_loop(
        &self,
        client: AsyncClient,
        mut eventloop: rumqttc::EventLoop,
        connack: oneshot::Sender<()>,
    ) -> JoinHandle<()> {
        let connected = self.connected.clone();
        let subscribed = self.subscribed.clone();
        let handler = self.handler.clone();
        let core = self.core.clone();
        let endpoint = self.core.target().to_string();

        tokio::spawn(async move {
            let mut connack = Some(connack);
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload).to_string();
                        let callback = handler
                            .read()
                            .unwrap_or_else(PoisonError::into_inner)
                            .clone();
                        match callback {
                            Some(callback) => {
                                core.touch();
                                callback(&publish.topic, &payload);
                            }
                            None => debug!(topic = %publish.topic, "No handler for MQTT message"),
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(endpoint = %endpoint, "MQTT connected");
                        connected.store(true, Ordering::Release);
                        core.try_transition(ConnectionState::opened);
                        if let Some(tx) = connack.take() {
                            let _ = tx.send(());
                        }

                        // Re-subscribe after a reconnect
                        let topics: Vec<String> = subscribed
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .iter()
                            .cloned()
                            .collect();
                        for topic in topics {
                            if let Err(e) = client.try_subscribe(&topic, QoS::AtLeastOnce) {
                                error!(topic = %topic, "Failed to re-subscribe: {}", e);
                            }
                        }
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        connected.store(false, Ordering::Release);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(endpoint = %endpoint, "MQTT connection error: {}", e);
                        connected.store(false, Ordering::Release);
                        // rumqttc reconnects on the next poll
                        core.try_transition(ConnectionState::lost);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    fn stop_event_loop(&self) {
        if let Some(handle) = self
            .event_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

#[async_trait]
impl AidConnection for MqttConnection {
    fn technology(&self) -> Technology {
        Technology::Mqtt
    }

    fn target_uri(&self) -> &Url {
        self.core.target()
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.core.last_active()
    }

    async fn open(&self) -> Result<(), ConnectionError> {
        if self.is_connected() && self.client().is_some() {
            return Ok(());
        }
        // drop a half-open session before starting over
        self.stop_event_loop();
        self.core.transition(ConnectionState::begin_open);

        let (host, port) = self.core.host_port(DEFAULT_PORT).ok_or_else(|| {
            self.core.transition(ConnectionState::failed);
            ConnectionError::InvalidEndpoint(format!("No host in {}", self.core.target()))
        })?;

        let client_id = format!("aid-{}", uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(self.settings.keep_alive);
        options.set_clean_session(true);
        if let Some(user) = self.user() {
            options.set_credentials(user, self.core.password().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, 100);
        let (tx, rx) = oneshot::channel();
        let handle = self.spawn_event_loop(client.clone(), eventloop, tx);

        match tokio::time::timeout(self.settings.connect_timeout, rx).await {
            Ok(Ok(())) => {
                *self.client.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
                *self.event_loop.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                self.core.try_transition(ConnectionState::opened);
                self.core.touch();
                Ok(())
            }
            _ => {
                handle.abort();
                self.connected.store(false, Ordering::Release);
                self.core.transition(ConnectionState::failed);
                Err(ConnectionError::Timeout(
                    self.settings.connect_timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(client) = client {
            if let Err(e) = client.disconnect().await {
                debug!("MQTT disconnect request failed: {}", e);
            }
        }
        self.stop_event_loop();
        self.connected.store(false, Ordering::Release);
        self.core.transition(ConnectionState::closed);
    }

    /// Nothing can be queried synchronously over MQTT.
    async fn update_item_value(&self, _item: &Item) -> Result<usize, ConnectionError> {
        Ok(0)
    }

    async fn prepare_continuous_run(&self, items: &[Arc<Item>]) -> Result<(), ConnectionError> {
        let client = self.client().ok_or(ConnectionError::NotConnected)?;

        for item in items.iter().filter(|i| i.form().is_mqtt_subscribe()) {
            let topic = Self::topic_for(item);
            if topic.is_empty() || !self.remember(&topic) {
                continue;
            }
            if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                self.forget(&topic);
                return Err(ConnectionError::Transport(format!(
                    "Failed to subscribe to {}: {}",
                    topic, e
                )));
            }
            debug!(topic = %topic, "MQTT subscribed");
        }
        self.core.touch();
        Ok(())
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        self.stop_event_loop();
    }
}
