//! Live improv-match scoreboard: a room-based WebSocket server holding the authoritative
//! state and a resilient client that keeps displays and control panels in sync with it.

/// Client side: connection management, queueing and state normalization.
pub mod client;
/// Configuration loaded from the environment.
pub mod config;
/// Snapshot persistence.
pub mod dao;
/// Data exchanged with clients.
pub mod dto;
/// HTTP-facing error types.
pub mod error;
/// Axum routers.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Authoritative in-memory state.
pub mod state;
