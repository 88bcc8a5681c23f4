//! Infrastructure layer - Protocol adapters and external integrations

pub mod config;
pub mod drivers;
pub mod messaging;
pub mod repositories;

pub use config::{AgentConfig, InterfaceConfig, ItemConfig, UseTechConfig};
pub use drivers::{DriverFactory, DriverSettings};
pub use messaging::{BroadcastEventPublisher, CompositeEventPublisher, LoggingEventPublisher};
pub use repositories::ConfigInterfaceSource;
