//! # ventry-gateway
//!
//! Axum HTTP + `WebSocket` gateway for the Ventry realtime layer.
//!
//! - HTTP endpoints: health check, `WebSocket` upgrade at `/ws`
//! - Connection lifecycle: auth-first handshake, per-connection heartbeat
//! - Session registry: one live connection per authenticated user identity
//! - Delivery API: best-effort broadcast and directed notification
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;
