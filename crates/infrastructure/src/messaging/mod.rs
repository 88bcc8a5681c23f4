pub mod broadcast_publisher;
pub mod composite_publisher;
pub mod log_publisher;

pub use broadcast_publisher::BroadcastEventPublisher;
pub use composite_publisher::CompositeEventPublisher;
pub use log_publisher::LoggingEventPublisher;
