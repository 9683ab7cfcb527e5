//! Resilient scoreboard client used by displays and control panels.

/// Reconnect delay policy.
pub mod backoff;
/// Connection lifecycle, operation queueing and event dispatch.
pub mod connection;
/// Lenient decoding of `updateState` payloads.
pub mod normalizer;
/// Operations buffered while disconnected.
pub mod queue;
/// Typed operation front over a connection.
pub mod scoreboard_client;
/// Transport seam and its WebSocket implementation.
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, SendOptions,
    SendOutcome, SubscriptionId,
};
pub use normalizer::{CanonicalState, normalize, normalize_with};
pub use scoreboard_client::{ClientError, ScoreboardClient};
pub use transport::{Connector, StaticToken, TokenProvider, Transport, WebSocketConnector};
