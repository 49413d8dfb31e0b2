use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use huddle_core::errors::RegistryError;
use huddle_core::events::{Notification, RoomEvent};
use huddle_core::ids::{ConnectionId, ParticipantId, RoomId};
use huddle_core::model::{Participant, ParticipantUpdate, Room, RoomSummary};

use crate::cleanup;
use crate::connections::ConnectionIndex;

/// Tuning knobs for the registry.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Capacity used when a create request omits it or supplies a
    /// non-positive value.
    pub default_capacity: u32,
    /// How long a room may stay empty before it is deleted.
    pub empty_room_grace: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_capacity: 10,
            empty_room_grace: Duration::from_secs(30),
        }
    }
}

/// Rooms are keyed by their uuidv7-backed id, so iteration (and therefore
/// `list_rooms`) is creation-ordered for free.
#[derive(Default)]
struct RegistryState {
    rooms: BTreeMap<RoomId, Room>,
    index: ConnectionIndex,
}

/// Owner of all room and membership state.
///
/// Every operation acquires the single state lock once, runs to completion
/// without awaiting, and leaves both the room table and the connection
/// index consistent. Notifications describing a mutation are assembled
/// under the same lock and published after it is released.
#[derive(Clone)]
pub struct RoomRegistry {
    state: Arc<Mutex<RegistryState>>,
    events: broadcast::Sender<Notification>,
    pub(crate) config: RegistryConfig,
}

impl RoomRegistry {
    pub fn new(config: RegistryConfig, events: broadcast::Sender<Notification>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            events,
            config,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.events.subscribe()
    }

    /// Create a room with a fresh id and empty membership.
    pub fn create_room(
        &self,
        name: &str,
        created_by: ParticipantId,
        max_participants: Option<i64>,
    ) -> Result<Room, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::InvalidInput(
                "room name must not be blank".into(),
            ));
        }

        let capacity = match max_participants {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(self.config.default_capacity),
            _ => self.config.default_capacity,
        };

        let room = Room::new(name, created_by, capacity);
        let mut batch = Vec::new();
        {
            let mut guard = self.state.lock();
            guard.rooms.insert(room.id.clone(), room.clone());
            batch.push(Notification::all(RoomEvent::RoomCreated {
                room: room.summary(),
            }));
            batch.push(Notification::all(RoomEvent::RoomsUpdated {
                rooms: summaries(&guard),
            }));
        }
        self.publish(batch);

        tracing::info!(room_id = %room.id, created_by = %room.created_by, "Room created");
        Ok(room)
    }

    /// Add a participant to a room, or refresh their connection mapping if
    /// they are already a member. Check order: absent room, locked room,
    /// already-member (exempt from the capacity check), full room.
    pub fn join_room(
        &self,
        room_id: &RoomId,
        participant: Participant,
        connection_id: ConnectionId,
    ) -> Result<Room, RegistryError> {
        let user_id = participant.user_id.clone();
        let mut batch = Vec::new();

        let snapshot = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let room = state
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.clone()))?;

            if room.is_locked {
                return Err(RegistryError::RoomLocked(room_id.clone()));
            }

            let rejoining = room.contains(&user_id);
            if !rejoining {
                if room.is_full() {
                    return Err(RegistryError::RoomFull(room_id.clone()));
                }
                room.participants.push(participant);
            }

            // Always repoint the index, so a reconnect-and-rejoin lands on
            // the new connection even when membership is unchanged.
            state
                .index
                .attach(user_id.clone(), connection_id.clone(), room_id.clone());

            let snapshot = room.clone();
            batch.push(Notification::peer(
                connection_id.clone(),
                RoomEvent::RoomJoined {
                    room: snapshot.clone(),
                    participants: snapshot.participants.clone(),
                },
            ));

            if !rejoining {
                let others = member_connections(state, &snapshot, Some(&user_id));
                if let Some(user) = snapshot.participant(&user_id) {
                    if !others.is_empty() {
                        batch.push(Notification::peers(
                            others,
                            RoomEvent::UserJoined {
                                user: user.clone(),
                                participants: snapshot.participants.clone(),
                            },
                        ));
                    }
                }
                batch.push(Notification::all(RoomEvent::RoomsUpdated {
                    rooms: summaries(state),
                }));
            }
            snapshot
        };
        self.publish(batch);

        tracing::debug!(room_id = %room_id, user_id = %user_id, "Participant joined");
        Ok(snapshot)
    }

    /// Remove a participant from a room. Absent membership is a no-op
    /// success; an absent room is `NotFound`. Arms deferred cleanup when
    /// the room becomes empty.
    pub fn leave_room(
        &self,
        room_id: &RoomId,
        user_id: &ParticipantId,
    ) -> Result<Room, RegistryError> {
        let mut batch = Vec::new();
        let (snapshot, emptied) = {
            let mut guard = self.state.lock();
            remove_member(&mut guard, room_id, user_id, &mut batch)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.clone()))?
        };
        self.publish(batch);

        if emptied {
            cleanup::arm(self.clone(), room_id.clone());
        }
        tracing::debug!(room_id = %room_id, user_id = %user_id, "Participant left");
        Ok(snapshot)
    }

    /// Transport-level disconnect with no explicit leave: resolve the
    /// connection to a participant and room and leave on their behalf.
    /// Stale or unknown connection ids resolve to nothing and do nothing.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<Room> {
        let mut batch = Vec::new();
        let removed = {
            let mut guard = self.state.lock();
            let user_id = guard.index.participant_of(connection_id)?.clone();
            let Some(room_id) = guard.index.room_of(&user_id).cloned() else {
                // A participant with a connection but no room pointer is a
                // broken invariant, not a reachable state.
                debug_assert!(false, "connection index entry without a room");
                guard.index.detach(&user_id);
                return None;
            };
            remove_member(&mut guard, &room_id, &user_id, &mut batch)
                .map(|(room, emptied)| (room, emptied, user_id))
        };
        self.publish(batch);

        let (snapshot, emptied, user_id) = removed?;
        if emptied {
            cleanup::arm(self.clone(), snapshot.id.clone());
        }
        tracing::info!(room_id = %snapshot.id, user_id = %user_id, "Participant disconnected");
        Some(snapshot)
    }

    /// Apply one of the closed participant mutations and return the
    /// updated record.
    pub fn update_participant(
        &self,
        room_id: &RoomId,
        user_id: &ParticipantId,
        update: ParticipantUpdate,
    ) -> Result<Participant, RegistryError> {
        let mut batch = Vec::new();
        let updated = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let room = state
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.clone()))?;
            let participant =
                room.participant_mut(user_id)
                    .ok_or_else(|| RegistryError::ParticipantNotFound {
                        room_id: room_id.clone(),
                        user_id: user_id.clone(),
                    })?;

            update.apply(participant);
            let updated = participant.clone();
            let snapshot = room.clone();

            let members = member_connections(state, &snapshot, None);
            if !members.is_empty() {
                batch.push(Notification::peers(
                    members,
                    RoomEvent::UserUpdated {
                        user_id: user_id.clone(),
                        updates: updated.clone(),
                    },
                ));
            }
            updated
        };
        self.publish(batch);
        Ok(updated)
    }

    /// Remove a room outright. Creator-only; purges every member's
    /// connection index entries together with the room.
    pub fn delete_room(
        &self,
        room_id: &RoomId,
        requester: &ParticipantId,
    ) -> Result<Room, RegistryError> {
        let mut batch = Vec::new();
        let room = {
            let mut guard = self.state.lock();
            match guard.rooms.get(room_id) {
                None => return Err(RegistryError::RoomNotFound(room_id.clone())),
                Some(room) if &room.created_by != requester => {
                    return Err(RegistryError::Forbidden(room_id.clone()))
                }
                Some(_) => {}
            }
            let room = guard
                .rooms
                .remove(room_id)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.clone()))?;

            purge_members(&mut guard, &room);
            batch.push(Notification::all(RoomEvent::RoomDeleted {
                room_id: room_id.clone(),
            }));
            batch.push(Notification::all(RoomEvent::RoomsUpdated {
                rooms: summaries(&guard),
            }));
            room
        };
        self.publish(batch);

        tracing::info!(room_id = %room_id, requester = %requester, "Room deleted");
        Ok(room)
    }

    /// Creator-only lock toggle. A locked room rejects all new joins.
    pub fn set_room_lock(
        &self,
        room_id: &RoomId,
        requester: &ParticipantId,
        locked: bool,
    ) -> Result<Room, RegistryError> {
        let mut batch = Vec::new();
        let snapshot = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let room = state
                .rooms
                .get_mut(room_id)
                .ok_or_else(|| RegistryError::RoomNotFound(room_id.clone()))?;
            if &room.created_by != requester {
                return Err(RegistryError::Forbidden(room_id.clone()));
            }

            room.is_locked = locked;
            let snapshot = room.clone();

            let members = member_connections(state, &snapshot, None);
            if !members.is_empty() {
                batch.push(Notification::peers(
                    members,
                    RoomEvent::RoomLocked {
                        room_id: room_id.clone(),
                        is_locked: locked,
                    },
                ));
            }
            batch.push(Notification::all(RoomEvent::RoomsUpdated {
                rooms: summaries(state),
            }));
            snapshot
        };
        self.publish(batch);

        tracing::info!(room_id = %room_id, locked, "Room lock changed");
        Ok(snapshot)
    }

    /// Consistent snapshot of one room.
    pub fn get_room(&self, room_id: &RoomId) -> Option<Room> {
        self.state.lock().rooms.get(room_id).cloned()
    }

    /// Creation-ordered public summaries of all rooms.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        summaries(&self.state.lock())
    }

    pub fn room_of(&self, user_id: &ParticipantId) -> Option<RoomId> {
        self.state.lock().index.room_of(user_id).cloned()
    }

    pub fn participant_of(&self, connection_id: &ConnectionId) -> Option<ParticipantId> {
        self.state.lock().index.participant_of(connection_id).cloned()
    }

    pub fn connection_of(&self, user_id: &ParticipantId) -> Option<ConnectionId> {
        self.state.lock().index.connection_of(user_id).cloned()
    }

    /// Live members' connection ids, for notification fan-out.
    pub fn room_connections(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let guard = self.state.lock();
        match guard.rooms.get(room_id) {
            Some(room) => member_connections(&guard, room, None),
            None => Vec::new(),
        }
    }

    /// Deferred-cleanup check: delete the room if it still exists and is
    /// still empty. Re-reads live state, so checks armed before a
    /// repopulation or an explicit delete are no-ops.
    pub(crate) fn sweep_if_empty(&self, room_id: &RoomId) {
        let mut batch = Vec::new();
        {
            let mut guard = self.state.lock();
            match guard.rooms.get(room_id) {
                Some(room) if room.is_empty() => {}
                _ => return,
            }
            if let Some(room) = guard.rooms.remove(room_id) {
                purge_members(&mut guard, &room);
            }
            batch.push(Notification::all(RoomEvent::RoomDeleted {
                room_id: room_id.clone(),
            }));
            batch.push(Notification::all(RoomEvent::RoomsUpdated {
                rooms: summaries(&guard),
            }));
        }
        self.publish(batch);
        tracing::info!(room_id = %room_id, "Empty room deleted after grace period");
    }

    fn publish(&self, batch: Vec<Notification>) {
        for notification in batch {
            // Send only fails when nobody subscribes, which is fine.
            let _ = self.events.send(notification);
        }
    }
}

fn summaries(state: &RegistryState) -> Vec<RoomSummary> {
    state.rooms.values().map(Room::summary).collect()
}

fn member_connections(
    state: &RegistryState,
    room: &Room,
    except: Option<&ParticipantId>,
) -> Vec<ConnectionId> {
    room.participants
        .iter()
        .filter(|p| except != Some(&p.user_id))
        .filter_map(|p| state.index.connection_of(&p.user_id).cloned())
        .collect()
}

/// Shared removal path for graceful leaves and disconnects. Returns the
/// room state after removal and whether this removal emptied the room;
/// `None` if the room does not exist.
fn remove_member(
    state: &mut RegistryState,
    room_id: &RoomId,
    user_id: &ParticipantId,
    batch: &mut Vec<Notification>,
) -> Option<(Room, bool)> {
    let room = state.rooms.get_mut(room_id)?;

    let was_member = room.contains(user_id);
    if was_member {
        room.participants.retain(|p| &p.user_id != user_id);
    }
    // Guarded detach: never clear index entries that point at a different
    // room (the participant may have already rejoined elsewhere).
    if state.index.room_of(user_id) == Some(room_id) {
        state.index.detach(user_id);
    }

    let snapshot = room.clone();
    if was_member {
        let remaining = member_connections(state, &snapshot, None);
        if !remaining.is_empty() {
            batch.push(Notification::peers(
                remaining,
                RoomEvent::UserLeft {
                    user_id: user_id.clone(),
                    participants: snapshot.participants.clone(),
                },
            ));
        }
        batch.push(Notification::all(RoomEvent::RoomsUpdated {
            rooms: summaries(state),
        }));
    }

    let emptied = was_member && snapshot.is_empty();
    Some((snapshot, emptied))
}

fn purge_members(state: &mut RegistryState, room: &Room) {
    for participant in &room.participants {
        if state.index.room_of(&participant.user_id) == Some(&room.id) {
            state.index.detach(&participant.user_id);
        }
    }
}
