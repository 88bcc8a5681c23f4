pub mod all_interfaces;

pub use all_interfaces::{AllInterfaceStatus, DEFAULT_MAX_CONCURRENCY, MAX_PENDING_EVENTS};
