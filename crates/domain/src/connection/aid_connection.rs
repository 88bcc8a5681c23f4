use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

use crate::error::Result;
use crate::interface::{Item, Technology};

/// Callback receiving pushed messages as `(topic, payload)`.
pub type MessageHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Transport session to one endpoint, implemented once per protocol.
///
/// A connection is shared by all items of the interfaces using its endpoint and
/// may be called from several update tasks at once.
#[async_trait]
pub trait AidConnection: Send + Sync {
    fn technology(&self) -> Technology;

    fn target_uri(&self) -> &Url;

    /// User name taken from the endpoint's user-info, if any.
    fn user(&self) -> Option<&str> {
        match self.target_uri().username() {
            "" => None,
            user => Some(user),
        }
    }

    /// Time of the last successful open or update.
    fn last_active(&self) -> Option<DateTime<Utc>>;

    /// Establishes the transport. Calling it on an open connection is harmless.
    async fn open(&self) -> Result<()>;

    /// Cheap, non-blocking liveness check.
    fn is_connected(&self) -> bool;

    /// Releases the transport; harmless when not open.
    async fn close(&self);

    /// Sequential read of one item. Returns how many values were written (0 or 1).
    async fn update_item_value(&self, item: &Item) -> Result<usize>;

    /// Read of one item meant to run concurrently with reads of sibling items.
    /// Protocols without a concurrent read path keep this default.
    async fn update_item_value_async(&self, _item: &Item) -> Result<usize> {
        Ok(0)
    }

    /// Whether [`AidConnection::update_item_value_async`] performs real reads.
    /// Callers use it to pick the single pass that updates an interface.
    fn supports_concurrent_updates(&self) -> bool {
        false
    }

    /// One-time setup when continuous mode starts (e.g. subscriptions).
    async fn prepare_continuous_run(&self, _items: &[Arc<Item>]) -> Result<()> {
        Ok(())
    }

    /// Installs the callback for pushed messages. Polling protocols ignore it.
    fn set_message_handler(&self, _handler: MessageHandler) {}
}

/// Creates unopened connections for an endpoint
pub trait ConnectionProvider: Send + Sync {
    fn create(&self, technology: Technology, uri: &Url) -> Arc<dyn AidConnection>;
}
