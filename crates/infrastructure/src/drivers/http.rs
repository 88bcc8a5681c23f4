use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use domain::{AidConnection, ConnectionError, ConnectionState, Item, Technology};

use super::base::ConnectionCore;

/// HTTP connection; each item is a GET on its href relative to the endpoint.
pub struct HttpConnection {
    core: ConnectionCore,
    timeout: Duration,
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpConnection {
    pub fn new(target: Url, timeout: Duration) -> Self {
        Self {
            core: ConnectionCore::new(target),
            timeout,
            client: RwLock::new(None),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    /// Absolute URL of an item, without user-info.
    pub fn resolve(&self, href: &str) -> Result<Url, ConnectionError> {
        let mut url = self
            .core
            .target()
            .join(href.trim())
            .map_err(|e| ConnectionError::InvalidForm(format!("Invalid href {}: {}", href, e)))?;
        // credentials travel in the Authorization header
        let _ = url.set_username("");
        let _ = url.set_password(None);
        Ok(url)
    }

    fn client(&self) -> Option<reqwest::Client> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn get(&self, item: &Item) -> Result<usize, ConnectionError> {
        let method = item.form().http_method_or_get();
        if method != "GET" {
            return Err(ConnectionError::UnsupportedMethod(method));
        }
        let client = self.client().ok_or(ConnectionError::NotConnected)?;
        let url = self.resolve(&item.form().href)?;

        let mut request = client.get(url.clone());
        if let Some(user) = self.user() {
            request = request.basic_auth(user, self.core.password());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectionError::Timeout(self.timeout.as_millis() as u64)
            } else {
                ConnectionError::Transport(format!("GET {} failed: {}", url, e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "HTTP request not successful");
            return Err(ConnectionError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConnectionError::Decode(format!("Unreadable body from {}: {}", url, e)))?;

        item.set_value(body);
        self.core.touch();
        Ok(1)
    }
}

#[async_trait]
impl AidConnection for HttpConnection {
    fn technology(&self) -> Technology {
        Technology::Http
    }

    fn target_uri(&self) -> &Url {
        self.core.target()
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.core.last_active()
    }

    async fn open(&self) -> Result<(), ConnectionError> {
        if self.client().is_some() {
            return Ok(());
        }
        self.core.transition(ConnectionState::begin_open);

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                self.core.transition(ConnectionState::failed);
                ConnectionError::Transport(format!("Cannot build HTTP client: {}", e))
            })?;

        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        self.core.try_transition(ConnectionState::opened);
        self.core.touch();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn close(&self) {
        self.client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.core.transition(ConnectionState::closed);
    }

    async fn update_item_value(&self, item: &Item) -> Result<usize, ConnectionError> {
        self.get(item).await
    }

    async fn update_item_value_async(&self, item: &Item) -> Result<usize, ConnectionError> {
        self.get(item).await
    }

    fn supports_concurrent_updates(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(uri: &str) -> HttpConnection {
        HttpConnection::new(Url::parse(uri).unwrap(), Duration::from_secs(1))
    }

    #[test]
    fn test_resolve_relative_href() {
        let conn = connection("http://device.local:8080/api/");
        assert_eq!(
            conn.resolve("status").unwrap().as_str(),
            "http://device.local:8080/api/status"
        );
        assert_eq!(
            conn.resolve("/status").unwrap().as_str(),
            "http://device.local:8080/status"
        );
    }

    #[test]
    fn test_resolve_strips_credentials() {
        let conn = connection("http://user:pw@device.local/");
        assert_eq!(
            conn.resolve("/temp").unwrap().as_str(),
            "http://device.local/temp"
        );
        assert_eq!(conn.user(), Some("user"));
    }

    #[tokio::test]
    async fn test_open_close_cycle() {
        let conn = connection("http://device.local/");
        assert!(!conn.is_connected());
        conn.open().await.unwrap();
        conn.open().await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.connection_state(), ConnectionState::Connected);
        assert!(conn.last_active().is_some());
        conn.close().await;
        conn.close().await;
        assert!(!conn.is_connected());
    }
}
