use huddle_core::ids::RoomId;

use crate::registry::RoomRegistry;

/// Schedule a deferred emptiness check for a room that just became empty.
///
/// The task sleeps for the grace period without holding any lock, then
/// re-acquires the registry and re-validates live state. There is no
/// cancellation: a room repopulated (or deleted) in the meantime makes the
/// fired check a no-op, and repeated empty/repopulate cycles may leave
/// several overlapping checks in flight, each of them idempotent.
pub(crate) fn arm(registry: RoomRegistry, room_id: RoomId) {
    let grace = registry.config.empty_room_grace;
    tracing::debug!(room_id = %room_id, grace_secs = grace.as_secs(), "Deferred cleanup armed");
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        registry.sweep_if_empty(&room_id);
    });
}
