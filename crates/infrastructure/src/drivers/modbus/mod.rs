pub mod codec;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as TokioMutex;
use tokio_modbus::Slave;
use tokio_modbus::client::{Context, Reader, tcp};
use url::Url;

use domain::{AidConnection, ConnectionError, ConnectionState, Item, Technology};

use super::base::ConnectionCore;
use codec::{ModbusType, RegisterSpan};

pub const DEFAULT_PORT: u16 = 502;

/// Modbus/TCP connection reading holding registers.
///
/// All items of an endpoint share one client context; requests are serialized
/// through its mutex, so this protocol only implements the sequential read.
pub struct ModbusConnection {
    core: ConnectionCore,
    unit_id: u8,
    timeout: Duration,
    context: TokioMutex<Option<Context>>,
    connected: AtomicBool,
}

impl ModbusConnection {
    /// `unit_id` is used unless the URI carries a `unit` query parameter.
    pub fn new(target: Url, unit_id: u8, timeout: Duration) -> Self {
        let unit_id = target
            .query_pairs()
            .find(|(k, _)| k == "unit")
            .and_then(|(_, v)| v.parse().ok())
            .unwrap_or(unit_id);

        Self {
            core: ConnectionCore::new(target),
            unit_id,
            timeout,
            context: TokioMutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.core.state()
    }

    async fn resolve(&self) -> Result<SocketAddr, ConnectionError> {
        let (host, port) = self.core.host_port(DEFAULT_PORT).ok_or_else(|| {
            ConnectionError::InvalidEndpoint(format!("No host in {}", self.core.target()))
        })?;
        tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| ConnectionError::Transport(format!("Cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| ConnectionError::Transport(format!("No address for {}", host)))
    }

    fn check_function(item: &Item) -> Result<(), ConnectionError> {
        match item.form().modbus_function.as_deref() {
            None => Ok(()),
            Some(f) if f.to_lowercase().contains("holding") => Ok(()),
            Some(f) => Err(ConnectionError::UnsupportedMethod(f.to_string())),
        }
    }

    async fn read_registers(&self, span: RegisterSpan) -> Result<Vec<u16>, ConnectionError> {
        let mut guard = self.context.lock().await;
        let ctx = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        let result = tokio::time::timeout(
            self.timeout,
            ctx.read_holding_registers(span.address, span.quantity),
        )
        .await;

        match result {
            Ok(Ok(Ok(words))) => Ok(words),
            Ok(Ok(Err(exception))) => Err(ConnectionError::Transport(format!(
                "Modbus exception: {}",
                exception
            ))),
            Ok(Err(e)) => {
                // transport is unusable after an I/O error
                *guard = None;
                self.connected.store(false, Ordering::Release);
                self.core.transition(ConnectionState::closed);
                Err(ConnectionError::Transport(format!(
                    "Modbus transport error: {}",
                    e
                )))
            }
            Err(_) => Err(ConnectionError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl AidConnection for ModbusConnection {
    fn technology(&self) -> Technology {
        Technology::Modbus
    }

    fn target_uri(&self) -> &Url {
        self.core.target()
    }

    fn last_active(&self) -> Option<DateTime<Utc>> {
        self.core.last_active()
    }

    async fn open(&self) -> Result<(), ConnectionError> {
        let mut guard = self.context.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        self.core.transition(ConnectionState::begin_open);

        let addr = match self.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                self.core.transition(ConnectionState::failed);
                return Err(e);
            }
        };

        let connect = tcp::connect_slave(addr, Slave(self.unit_id));
        let ctx = match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => {
                self.core.transition(ConnectionState::failed);
                return Err(ConnectionError::Transport(format!(
                    "Failed to connect to {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                self.core.transition(ConnectionState::failed);
                return Err(ConnectionError::Timeout(self.timeout.as_millis() as u64));
            }
        };

        tracing::debug!(endpoint = %addr, unit = self.unit_id, "Modbus connected");
        *guard = Some(ctx);
        self.connected.store(true, Ordering::Release);
        self.core.try_transition(ConnectionState::opened);
        self.core.touch();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        // dropping the context closes the socket
        self.context.lock().await.take();
        self.connected.store(false, Ordering::Release);
        self.core.transition(ConnectionState::closed);
    }

    async fn update_item_value(&self, item: &Item) -> Result<usize, ConnectionError> {
        Self::check_function(item)?;
        let span = codec::parse_href(&item.form().href)?;
        let ty = ModbusType::parse(item.form().modbus_type.as_deref())?;
        codec::check_span(span, ty)?;

        let words = self.read_registers(span).await?;
        let mut bytes = codec::registers_to_bytes(&words);
        bytes.truncate(span.byte_len());
        codec::apply_byte_order(&mut bytes, ty.order);
        let value = codec::decode(&bytes, span, ty)?;

        tracing::trace!(href = %item.form().href, value = %value, "Modbus value");
        item.set_value(value);
        self.core.touch();
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{FormData, ItemKind};

    fn connection(uri: &str) -> ModbusConnection {
        ModbusConnection::new(Url::parse(uri).unwrap(), 255, Duration::from_millis(200))
    }

    #[test]
    fn test_unit_from_query() {
        assert_eq!(connection("modbus+tcp://plc:502?unit=7").unit_id(), 7);
        assert_eq!(connection("modbus+tcp://plc:502").unit_id(), 255);
    }

    #[tokio::test]
    async fn test_update_without_open_is_not_connected() {
        let conn = connection("modbus+tcp://127.0.0.1:1");
        let item = Item::new(ItemKind::Property, "", "x", FormData::new("40001"));
        let err = conn.update_item_value(&item).await.unwrap_err();
        assert_eq!(err, ConnectionError::NotConnected);
        assert_eq!(item.value(), "");
    }

    #[tokio::test]
    async fn test_bad_href_fails_before_io() {
        let conn = connection("modbus+tcp://127.0.0.1:1");
        let item = Item::new(ItemKind::Property, "", "x", FormData::new("abc"));
        let err = conn.update_item_value(&item).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_write_function_is_rejected() {
        let conn = connection("modbus+tcp://127.0.0.1:1");
        let mut form = FormData::new("40001");
        form.modbus_function = Some("writeSingleRegister".into());
        let item = Item::new(ItemKind::Action, "", "x", form);
        assert!(matches!(
            conn.update_item_value(&item).await,
            Err(ConnectionError::UnsupportedMethod(_))
        ));
    }

    #[tokio::test]
    async fn test_close_when_never_opened() {
        let conn = connection("modbus+tcp://127.0.0.1:1");
        conn.close().await;
        assert!(!conn.is_connected());
        assert_eq!(conn.connection_state(), ConnectionState::Disconnected);
    }
}
