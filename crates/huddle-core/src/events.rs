use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, ParticipantId, RoomId};
use crate::model::{Participant, Room, RoomSummary};

/// Outbound events reflected to connected clients after registry mutations.
///
/// Wire names are kebab-case; rosters and summaries embedded here are
/// computed inside the mutation that produced the event, so a `user-joined`
/// roster always contains the joiner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomEvent {
    #[serde(rename = "room-created", rename_all = "camelCase")]
    RoomCreated { room: RoomSummary },

    #[serde(rename = "room-deleted", rename_all = "camelCase")]
    RoomDeleted { room_id: RoomId },

    /// Sent to the joining connection only: the full room plus roster.
    #[serde(rename = "room-joined", rename_all = "camelCase")]
    RoomJoined {
        room: Room,
        participants: Vec<Participant>,
    },

    /// Sent to the other members of the room the user joined.
    #[serde(rename = "user-joined", rename_all = "camelCase")]
    UserJoined {
        user: Participant,
        participants: Vec<Participant>,
    },

    /// Sent to the remaining members after a leave or disconnect.
    #[serde(rename = "user-left", rename_all = "camelCase")]
    UserLeft {
        user_id: ParticipantId,
        participants: Vec<Participant>,
    },

    #[serde(rename = "user-updated", rename_all = "camelCase")]
    UserUpdated {
        user_id: ParticipantId,
        updates: Participant,
    },

    #[serde(rename = "room-locked", rename_all = "camelCase")]
    RoomLocked { room_id: RoomId, is_locked: bool },

    /// Fresh summary list, broadcast after any mutation that changes room
    /// existence or membership.
    #[serde(rename = "rooms-updated", rename_all = "camelCase")]
    RoomsUpdated { rooms: Vec<RoomSummary> },
}

impl RoomEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room-created",
            Self::RoomDeleted { .. } => "room-deleted",
            Self::RoomJoined { .. } => "room-joined",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::UserUpdated { .. } => "user-updated",
            Self::RoomLocked { .. } => "room-locked",
            Self::RoomsUpdated { .. } => "rooms-updated",
        }
    }
}

/// Which connections an event is delivered to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    All,
    Peer(ConnectionId),
    Peers(Vec<ConnectionId>),
}

/// A routed event: what to send and who receives it.
#[derive(Clone, Debug)]
pub struct Notification {
    pub target: Target,
    pub event: RoomEvent,
}

impl Notification {
    pub fn all(event: RoomEvent) -> Self {
        Self {
            target: Target::All,
            event,
        }
    }

    pub fn peer(conn: ConnectionId, event: RoomEvent) -> Self {
        Self {
            target: Target::Peer(conn),
            event,
        }
    }

    pub fn peers(conns: Vec<ConnectionId>, event: RoomEvent) -> Self {
        Self {
            target: Target::Peers(conns),
            event,
        }
    }
}
