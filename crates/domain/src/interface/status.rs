use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::item::Item;
use super::item_store::ItemStore;
use super::technology::Technology;
use crate::connection::AidConnection;

/// Color of an interface's status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LogColor {
    /// Idle / neutral
    #[default]
    Black,
    /// Connected or working
    Blue,
    /// Failure
    Red,
}

/// Last human-readable status of an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub color: LogColor,
    pub text: String,
}

impl LogLine {
    pub fn idle() -> Self {
        Self {
            color: LogColor::Black,
            text: "Idle".to_string(),
        }
    }

    pub fn new(color: LogColor, text: impl Into<String>) -> Self {
        Self {
            color,
            text: text.into(),
        }
    }
}

impl Default for LogLine {
    fn default() -> Self {
        Self::idle()
    }
}

/// Runtime status of one asset interface: its items, bound connection and counters.
pub struct InterfaceStatus {
    technology: Technology,
    display_name: String,
    info: String,
    endpoint_base: String,
    items: ItemStore,
    log: Mutex<LogLine>,
    connection: Mutex<Option<Arc<dyn AidConnection>>>,
    value_changes: AtomicU64,
}

impl InterfaceStatus {
    pub fn new(
        technology: Technology,
        display_name: impl Into<String>,
        endpoint_base: impl Into<String>,
    ) -> Self {
        Self {
            technology,
            display_name: display_name.into(),
            info: String::new(),
            endpoint_base: endpoint_base.into(),
            items: ItemStore::new(technology),
            log: Mutex::new(LogLine::idle()),
            connection: Mutex::new(None),
            value_changes: AtomicU64::new(0),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Registers an item; only possible while the interface is still being built.
    pub fn add_item(&mut self, item: Item) -> Arc<Item> {
        let item = Arc::new(item);
        self.items.add(item.clone());
        item
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn endpoint_base(&self) -> &str {
        &self.endpoint_base
    }

    pub fn has_endpoint(&self) -> bool {
        !self.endpoint_base.trim().is_empty()
    }

    pub fn items(&self) -> &ItemStore {
        &self.items
    }

    pub fn log_line(&self) -> LogLine {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_log(&self, color: LogColor, text: impl Into<String>) {
        *self.log.lock().unwrap_or_else(PoisonError::into_inner) = LogLine::new(color, text);
    }

    pub fn reset_log(&self) {
        *self.log.lock().unwrap_or_else(PoisonError::into_inner) = LogLine::idle();
    }

    pub fn connection(&self) -> Option<Arc<dyn AidConnection>> {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn bind_connection(&self, connection: Option<Arc<dyn AidConnection>>) {
        *self.connection.lock().unwrap_or_else(PoisonError::into_inner) = connection;
    }

    pub fn value_changes(&self) -> u64 {
        self.value_changes.load(Ordering::Acquire)
    }

    /// Adds confirmed value updates to the counter; the counter only grows.
    pub fn add_value_changes(&self, count: usize) {
        if count > 0 {
            self.value_changes.fetch_add(count as u64, Ordering::AcqRel);
        }
    }
}

impl std::fmt::Debug for InterfaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterfaceStatus")
            .field("technology", &self.technology)
            .field("display_name", &self.display_name)
            .field("endpoint_base", &self.endpoint_base)
            .field("items", &self.items.len())
            .field("log", &self.log_line())
            .field("value_changes", &self.value_changes())
            .finish()
    }
}
