use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use url::Url;

use domain::{AidConnection, ConnectionProvider, Technology};

/// One connection per endpoint URI for a single technology.
///
/// Entries are keyed by the exact URI string and never replaced; the first
/// caller creates the connection, later callers share it.
pub struct ConnectionRegistry {
    technology: Technology,
    provider: Arc<dyn ConnectionProvider>,
    connections: DashMap<String, Arc<dyn AidConnection>>,
}

impl ConnectionRegistry {
    pub fn new(technology: Technology, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            technology,
            provider,
            connections: DashMap::new(),
        }
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    /// Returns the connection for `uri`, creating an unopened one on first use.
    /// `None` when the URI does not parse.
    pub fn get_or_create(&self, uri: &str) -> Option<Arc<dyn AidConnection>> {
        if let Some(existing) = self.connections.get(uri) {
            return Some(existing.value().clone());
        }

        let parsed = match Url::parse(uri) {
            Ok(url) => url,
            Err(e) => {
                warn!(technology = %self.technology, endpoint = %uri, "Invalid endpoint URI: {}", e);
                return None;
            }
        };

        let entry = self.connections.entry(uri.to_string()).or_insert_with(|| {
            debug!(technology = %self.technology, endpoint = %uri, "Creating connection");
            self.provider.create(self.technology, &parsed)
        });
        Some(entry.value().clone())
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn AidConnection>> {
        self.connections.get(uri).map(|c| c.value().clone())
    }

    pub fn remove(&self, uri: &str) -> Option<Arc<dyn AidConnection>> {
        self.connections.remove(uri).map(|(_, c)| c)
    }

    pub fn connections(&self) -> Vec<Arc<dyn AidConnection>> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// The four per-technology registries
pub struct ConnectionRegistries {
    registries: Vec<ConnectionRegistry>,
}

impl ConnectionRegistries {
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        let registries = Technology::ALL
            .iter()
            .map(|tech| ConnectionRegistry::new(*tech, provider.clone()))
            .collect();
        Self { registries }
    }

    pub fn for_technology(&self, technology: Technology) -> &ConnectionRegistry {
        &self.registries[technology.index()]
    }

    pub fn all_connections(&self) -> Vec<Arc<dyn AidConnection>> {
        self.registries
            .iter()
            .flat_map(ConnectionRegistry::connections)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use domain::Item;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle {
        technology: Technology,
        uri: Url,
    }

    #[async_trait]
    impl AidConnection for Idle {
        fn technology(&self) -> Technology {
            self.technology
        }
        fn target_uri(&self) -> &Url {
            &self.uri
        }
        fn last_active(&self) -> Option<DateTime<Utc>> {
            None
        }
        async fn open(&self) -> domain::Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            false
        }
        async fn close(&self) {}
        async fn update_item_value(&self, _item: &Item) -> domain::Result<usize> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        created: AtomicUsize,
    }

    impl ConnectionProvider for CountingProvider {
        fn create(&self, technology: Technology, uri: &Url) -> Arc<dyn AidConnection> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(Idle {
                technology,
                uri: uri.clone(),
            })
        }
    }

    #[test]
    fn test_same_uri_returns_same_instance() {
        let provider = Arc::new(CountingProvider::default());
        let registry = ConnectionRegistry::new(Technology::Http, provider.clone());

        let a = registry.get_or_create("http://device.local/").unwrap();
        let b = registry.get_or_create("http://device.local/").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_uri_creates_nothing() {
        let provider = Arc::new(CountingProvider::default());
        let registry = ConnectionRegistry::new(Technology::Modbus, provider.clone());

        assert!(registry.get_or_create("not a uri").is_none());
        assert!(registry.get_or_create("").is_none());
        assert!(registry.is_empty());
        assert_eq!(provider.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keys_are_exact_strings() {
        let registry =
            ConnectionRegistry::new(Technology::Http, Arc::new(CountingProvider::default()));
        let a = registry.get_or_create("http://device.local").unwrap();
        let b = registry.get_or_create("http://device.local/").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);

        assert!(registry.remove("http://device.local").is_some());
        assert!(registry.get("http://device.local").is_none());
    }

    #[test]
    fn test_technologies_are_separate() {
        let registries = ConnectionRegistries::new(Arc::new(CountingProvider::default()));
        let http = registries
            .for_technology(Technology::Http)
            .get_or_create("tcp://10.0.0.5:502")
            .unwrap();
        let modbus = registries
            .for_technology(Technology::Modbus)
            .get_or_create("tcp://10.0.0.5:502")
            .unwrap();

        assert!(!Arc::ptr_eq(&http, &modbus));
        assert_eq!(http.technology(), Technology::Http);
        assert_eq!(modbus.technology(), Technology::Modbus);
        assert_eq!(registries.all_connections().len(), 2);
    }
}
