//! WebSocket connection management, envelope dispatch, and broadcasting.

pub mod broadcast;
pub mod connection;
pub mod envelope;
pub mod handler;
pub mod manager;
pub mod session;
