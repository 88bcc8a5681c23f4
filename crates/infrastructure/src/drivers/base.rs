use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use url::Url;

use domain::ConnectionState;

/// Bookkeeping shared by every protocol adapter
#[derive(Debug)]
pub(crate) struct ConnectionCore {
    target: Url,
    state: Mutex<ConnectionState>,
    last_active: Mutex<Option<DateTime<Utc>>>,
}

impl ConnectionCore {
    pub(crate) fn new(target: Url) -> Self {
        Self {
            target,
            state: Mutex::new(ConnectionState::Disconnected),
            last_active: Mutex::new(None),
        }
    }

    pub(crate) fn target(&self) -> &Url {
        &self.target
    }

    /// Password from the URI's user-info, percent-decoding left to the caller.
    pub(crate) fn password(&self) -> Option<&str> {
        self.target.password()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(&self, f: impl FnOnce(ConnectionState) -> ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = f(*state);
    }

    /// Applies a guarded transition. A rejected one is logged and leaves the
    /// state unchanged.
    pub(crate) fn try_transition(
        &self,
        f: impl FnOnce(ConnectionState) -> Result<ConnectionState, &'static str>,
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match f(*state) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(reason) => {
                tracing::debug!(endpoint = %self.target, state = ?*state, "{}", reason);
                false
            }
        }
    }

    pub(crate) fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    pub(crate) fn last_active(&self) -> Option<DateTime<Utc>> {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Host and port of the target, with `default_port` when the URI has none.
    pub(crate) fn host_port(&self, default_port: u16) -> Option<(String, u16)> {
        let host = self.target.host_str()?.to_string();
        let port = self.target.port().unwrap_or(default_port);
        Some((host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_defaults() {
        let core = ConnectionCore::new(Url::parse("modbus+tcp://10.0.0.5").unwrap());
        assert_eq!(core.host_port(502), Some(("10.0.0.5".to_string(), 502)));
        let core = ConnectionCore::new(Url::parse("mqtt://broker:1884").unwrap());
        assert_eq!(core.host_port(1883), Some(("broker".to_string(), 1884)));
    }

    #[test]
    fn test_touch_and_state() {
        let core = ConnectionCore::new(Url::parse("http://localhost").unwrap());
        assert!(core.last_active().is_none());
        core.touch();
        assert!(core.last_active().is_some());
        core.transition(ConnectionState::begin_open);
        assert_eq!(core.state(), ConnectionState::Connecting);
        core.transition(ConnectionState::failed);
        assert_eq!(core.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let core = ConnectionCore::new(Url::parse("opc.tcp://server").unwrap());
        assert!(!core.try_transition(ConnectionState::lost));
        assert_eq!(core.state(), ConnectionState::Disconnected);

        core.transition(ConnectionState::begin_open);
        assert!(core.try_transition(ConnectionState::opened));
        assert!(core.try_transition(ConnectionState::lost));
        assert_eq!(core.state(), ConnectionState::Reconnecting);
        assert!(core.try_transition(ConnectionState::opened));
        assert_eq!(core.state(), ConnectionState::Connected);

        core.transition(ConnectionState::closed);
        assert_eq!(core.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_credentials_from_user_info() {
        let core = ConnectionCore::new(Url::parse("mqtt://bob:pw@broker").unwrap());
        assert_eq!(core.password(), Some("pw"));
    }
}
