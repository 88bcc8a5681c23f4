//! Application layer - Polling orchestration over all asset interfaces

pub mod registry;
pub mod service;
pub mod status;

pub use registry::{ConnectionRegistries, ConnectionRegistry};
pub use service::InterfaceService;
pub use status::AllInterfaceStatus;
