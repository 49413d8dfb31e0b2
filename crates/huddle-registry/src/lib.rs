//! The room/session state core: all room and membership state behind a
//! single lock, exposed as atomic operations, plus the deferred cleanup of
//! rooms that stay empty past a grace period.

mod cleanup;
mod connections;
mod registry;

pub use registry::{RegistryConfig, RoomRegistry};
