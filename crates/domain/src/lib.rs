//! Domain layer - Asset interface model with no I/O
//!
//! This crate contains:
//! - Interfaces and their items (InterfaceStatus, Item, FormData)
//! - The technology-keyed item multi-map (ItemStore)
//! - The connection capability trait every protocol adapter implements
//! - Status events and the publisher seam
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Shared state is safe to touch from concurrent update tasks
//! - Testable in isolation

pub mod connection;
pub mod error;
pub mod event;
pub mod interface;

// Re-export commonly used types
pub use connection::{AidConnection, ConnectionProvider, ConnectionState, MessageHandler};
pub use error::{ConnectionError, Result};
pub use event::{EventPublisher, StatusEvent};
pub use interface::{
    FormData, InterfaceSource, InterfaceStatus, Item, ItemKind, ItemStore, LogColor, LogLine,
    RenderHandle, Technology,
};
