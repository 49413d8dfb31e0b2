use std::collections::HashMap;

use huddle_core::ids::{ConnectionId, ParticipantId, RoomId};

/// Bidirectional participant↔connection mapping plus the participant→room
/// pointer. One active connection and one active room per participant; the
/// latest attach wins. All lookups are O(1) average.
#[derive(Debug, Default)]
pub(crate) struct ConnectionIndex {
    participant_conn: HashMap<ParticipantId, ConnectionId>,
    conn_participant: HashMap<ConnectionId, ParticipantId>,
    participant_room: HashMap<ParticipantId, RoomId>,
}

impl ConnectionIndex {
    /// Point `user_id` at a new connection and room, overwriting any prior
    /// mapping. The replaced connection's inverse entry is removed so a
    /// later disconnect of the dead socket no longer resolves to this
    /// participant.
    pub(crate) fn attach(&mut self, user_id: ParticipantId, conn: ConnectionId, room: RoomId) {
        if let Some(old) = self.participant_conn.insert(user_id.clone(), conn.clone()) {
            if old != conn {
                self.conn_participant.remove(&old);
            }
        }
        self.conn_participant.insert(conn, user_id.clone());
        self.participant_room.insert(user_id, room);
    }

    /// Clear all entries for `user_id`. Tolerant of missing entries.
    pub(crate) fn detach(&mut self, user_id: &ParticipantId) {
        if let Some(conn) = self.participant_conn.remove(user_id) {
            // Only drop the inverse entry if it still points back at us.
            if self.conn_participant.get(&conn) == Some(user_id) {
                self.conn_participant.remove(&conn);
            }
        }
        self.participant_room.remove(user_id);
    }

    pub(crate) fn room_of(&self, user_id: &ParticipantId) -> Option<&RoomId> {
        self.participant_room.get(user_id)
    }

    pub(crate) fn participant_of(&self, conn: &ConnectionId) -> Option<&ParticipantId> {
        self.conn_participant.get(conn)
    }

    pub(crate) fn connection_of(&self, user_id: &ParticipantId) -> Option<&ConnectionId> {
        self.participant_conn.get(user_id)
    }
}
