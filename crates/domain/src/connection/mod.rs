mod aid_connection;
mod connection_state;

pub use aid_connection::{AidConnection, ConnectionProvider, MessageHandler};
pub use connection_state::ConnectionState;
