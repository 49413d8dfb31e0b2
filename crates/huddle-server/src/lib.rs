//! WebSocket gateway and read-only HTTP surface over the room registry.

pub mod bridge;
pub mod handlers;
pub mod peer;
pub mod rpc;
pub mod server;

pub use server::{start, ServerConfig, ServerHandle};
