use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use domain::{
    AidConnection, ConnectionError, ConnectionProvider, InterfaceSource, InterfaceStatus, Item,
    LogColor, MessageHandler, StatusEvent, Technology,
};
use infrastructure::{AgentConfig, ConfigInterfaceSource, DriverFactory};

use crate::registry::{ConnectionRegistries, ConnectionRegistry};

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Open/fail events kept for `drain_events`; older ones are dropped first.
pub const MAX_PENDING_EVENTS: usize = 1024;

type InterfaceList = Arc<Vec<Arc<InterfaceStatus>>>;

/// Holds every discovered interface and drives polling across all of them.
///
/// Connection errors never leave this type: they become red log lines on the
/// interface and zero change counts.
pub struct AllInterfaceStatus {
    registries: ConnectionRegistries,
    interfaces: Arc<RwLock<InterfaceList>>,
    use_tech: [AtomicBool; 4],
    continuous_run: AtomicBool,
    max_concurrency: usize,
    events: Mutex<VecDeque<StatusEvent>>,
}

impl AllInterfaceStatus {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            registries: ConnectionRegistries::new(provider),
            interfaces: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            use_tech: [
                AtomicBool::new(true),
                AtomicBool::new(true),
                AtomicBool::new(true),
                AtomicBool::new(true),
            ],
            continuous_run: AtomicBool::new(false),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Wires drivers, technology switches and interfaces from the configuration.
    pub fn from_config(config: &AgentConfig) -> domain::Result<Self> {
        let factory = DriverFactory::new(config.driver_settings());
        let status = Self::new(Arc::new(factory)).with_max_concurrency(config.max_concurrency);
        for tech in Technology::ALL {
            status.set_use_tech(tech, config.use_tech.is_enabled(tech));
        }
        status.load_from(&ConfigInterfaceSource::new(config.interfaces.clone()))?;
        Ok(status)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn registry(&self, technology: Technology) -> &ConnectionRegistry {
        self.registries.for_technology(technology)
    }

    // ── Interfaces ──────────────────────────────────────────────────

    /// Replaces the interface list wholesale.
    pub fn set_interfaces(&self, interfaces: Vec<InterfaceStatus>) {
        let list: Vec<Arc<InterfaceStatus>> = interfaces.into_iter().map(Arc::new).collect();
        info!(count = list.len(), "Interface list replaced");
        *self.interfaces.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(list);
    }

    /// Runs discovery and installs its result. Returns the number of interfaces.
    pub fn load_from(&self, source: &dyn InterfaceSource) -> domain::Result<usize> {
        let interfaces = source.prepare_information()?;
        let count = interfaces.len();
        self.set_interfaces(interfaces);
        Ok(count)
    }

    pub fn interfaces(&self) -> InterfaceList {
        self.interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Interfaces that take part in polling, technology by technology in
    /// enumeration order, list order within a technology.
    fn active_interfaces(&self) -> Vec<Arc<InterfaceStatus>> {
        let all = self.interfaces();
        Technology::ALL
            .iter()
            .filter(|tech| self.uses_tech(**tech))
            .flat_map(|tech| {
                all.iter()
                    .filter(|i| i.technology() == *tech && i.has_endpoint())
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn set_use_tech(&self, technology: Technology, enabled: bool) {
        self.use_tech[technology.index()].store(enabled, Ordering::Release);
    }

    pub fn uses_tech(&self, technology: Technology) -> bool {
        self.use_tech[technology.index()].load(Ordering::Acquire)
    }

    pub fn is_continuous_run(&self) -> bool {
        self.continuous_run.load(Ordering::Acquire)
    }

    pub fn reset_log_lines(&self) {
        for iface in self.interfaces().iter() {
            iface.reset_log();
        }
    }

    pub fn sum_value_changes(&self) -> u64 {
        self.interfaces().iter().map(|i| i.value_changes()).sum()
    }

    // ── Polling ─────────────────────────────────────────────────────

    /// Opens, reads and closes every active interface once. Does nothing while
    /// a continuous run is active. Returns the number of values written.
    pub async fn update_values_single_shot(&self) -> usize {
        if self.is_continuous_run() {
            debug!("Single-shot update skipped during continuous run");
            return 0;
        }

        let mut changes = 0;
        for iface in self.active_interfaces() {
            if let Some(conn) = self.open_interface(&iface).await {
                changes += self.update_interface(&iface, &conn).await;
            }
        }

        self.close_all_connections().await;
        changes
    }

    /// Opens every active interface and keeps the connections for the ticks
    /// that follow. Interfaces that fail to open are marked and skipped.
    pub async fn start_continuous_run(&self) {
        self.continuous_run.store(false, Ordering::Release);
        self.reset_log_lines();

        let handler = self.message_handler();
        for iface in self.active_interfaces() {
            let Some(conn) = self.open_interface(&iface).await else {
                continue;
            };

            conn.set_message_handler(handler.clone());
            match conn.prepare_continuous_run(&iface.items().all()).await {
                Ok(()) => iface.set_log(
                    LogColor::Blue,
                    format!("Connected to {} (continuous)", conn.target_uri()),
                ),
                Err(e) => {
                    warn!(interface = %iface.display_name(), error = %e, "Continuous setup failed");
                    iface.set_log(
                        LogColor::Red,
                        format!("Cannot prepare {}: {}", conn.target_uri(), e),
                    );
                }
            }
        }

        self.continuous_run.store(true, Ordering::Release);
        info!("Continuous run started");
    }

    pub async fn stop_continuous_run(&self) {
        let was_running = self.continuous_run.swap(false, Ordering::AcqRel);
        self.reset_log_lines();
        self.close_all_connections().await;
        if was_running {
            info!("Continuous run stopped");
        }
    }

    /// One timer tick of the continuous run: polls every connected interface.
    /// Push-based interfaces are updated by their message handler instead.
    pub async fn update_values_continuous_by_tick(&self) -> usize {
        if !self.is_continuous_run() {
            return 0;
        }

        let mut changes = 0;
        for iface in self.active_interfaces() {
            if iface.technology().is_push_based() {
                continue;
            }
            let Some(conn) = iface.connection() else {
                continue;
            };
            if !conn.is_connected() {
                continue;
            }
            changes += self.update_interface(&iface, &conn).await;
        }
        changes
    }

    /// Closes every connection known to the registries and unbinds them.
    pub async fn close_all_connections(&self) {
        for conn in self.registries.all_connections() {
            conn.close().await;
        }
        for iface in self.interfaces().iter() {
            iface.bind_connection(None);
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Items whose value changed since the last call, as events.
    pub fn drain_changed_items(&self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        for iface in self.interfaces().iter() {
            for item in iface.items().all() {
                if item.take_changed() {
                    events.push(StatusEvent::item_value_changed(iface, &item));
                }
            }
        }
        events
    }

    /// Open/fail events followed by changed items. At most
    /// [`MAX_PENDING_EVENTS`] open/fail events are kept between calls.
    pub fn drain_events(&self) -> Vec<StatusEvent> {
        let pending =
            std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner));
        let mut events = Vec::from(pending);
        events.extend(self.drain_changed_items());
        events
    }

    fn record(&self, event: StatusEvent) {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() >= MAX_PENDING_EVENTS {
            events.pop_front();
        }
        events.push_back(event);
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn open_interface(&self, iface: &InterfaceStatus) -> Option<Arc<dyn AidConnection>> {
        let endpoint = iface.endpoint_base();
        let Some(conn) = self
            .registries
            .for_technology(iface.technology())
            .get_or_create(endpoint)
        else {
            iface.bind_connection(None);
            iface.set_log(LogColor::Red, format!("Invalid endpoint {}", endpoint));
            self.record(StatusEvent::interface_failed(iface, "invalid endpoint"));
            return None;
        };

        iface.bind_connection(Some(conn.clone()));
        match conn.open().await {
            Ok(()) => {
                debug!(interface = %iface.display_name(), endpoint = %endpoint, "Connection open");
                iface.set_log(LogColor::Blue, format!("Connected to {}", conn.target_uri()));
                self.record(StatusEvent::interface_opened(iface));
                Some(conn)
            }
            Err(e) => {
                warn!(interface = %iface.display_name(), endpoint = %endpoint, error = %e, "Cannot open connection");
                iface.set_log(
                    LogColor::Red,
                    format!("Cannot open {}: {}", conn.target_uri(), e),
                );
                self.record(StatusEvent::interface_failed(iface, e.to_string()));
                None
            }
        }
    }

    /// Updates all items of an interface through the single pass the
    /// connection supports and adds the result to its change counter.
    async fn update_interface(&self, iface: &InterfaceStatus, conn: &Arc<dyn AidConnection>) -> usize {
        let items = iface.items().all();
        if items.is_empty() {
            return 0;
        }

        if conn.supports_concurrent_updates() {
            stream::iter(items.iter().cloned())
                .map(|item: Arc<Item>| async move {
                    let result = conn.update_item_value_async(&item).await;
                    Self::settle(iface, &item, result)
                })
                .buffer_unordered(self.max_concurrency)
                .fold(0, |acc, n| async move { acc + n })
                .await
        } else {
            let mut changes = 0;
            for item in &items {
                let result = conn.update_item_value(item).await;
                changes += Self::settle(iface, item, result);
            }
            changes
        }
    }

    fn settle(iface: &InterfaceStatus, item: &Item, result: Result<usize, ConnectionError>) -> usize {
        match result {
            Ok(n) => {
                iface.add_value_changes(n);
                n
            }
            Err(e) => {
                if e.is_configuration() {
                    warn!(interface = %iface.display_name(), item = %item.display_name(), error = %e, "Item skipped");
                } else {
                    debug!(interface = %iface.display_name(), item = %item.display_name(), error = %e, "Item update failed");
                }
                iface.set_log(
                    LogColor::Red,
                    format!("Cannot update {}: {}", item.display_name(), e),
                );
                0
            }
        }
    }

    /// Applies pushed messages to the matching items of every push-based
    /// interface, not only the one whose connection received the message.
    fn message_handler(&self) -> MessageHandler {
        let interfaces = self.interfaces.clone();
        Arc::new(move |topic: &str, payload: &str| {
            let list = interfaces
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for iface in list.iter().filter(|i| i.technology().is_push_based()) {
                let items = iface.items().get_items_for(topic);
                for item in items {
                    item.set_value(payload);
                }
                iface.add_value_changes(items.len());
            }
        })
    }
}
