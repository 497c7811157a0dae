//! WebSocket session management.

pub mod heartbeat;
pub mod manager;
pub mod session;
pub mod transport;

pub use manager::{ConnectionError, ConnectionManager};
pub use session::{ConnectionStats, SessionState, StatsSnapshot};
pub use transport::{Transport, TransportError, WsTransport};
