use crate::ids::{ParticipantId, RoomId};

/// Expected, recoverable failures of registry operations. Returned to the
/// caller as typed results, never retried internally.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    #[error("participant not found in {room_id}: {user_id}")]
    ParticipantNotFound {
        room_id: RoomId,
        user_id: ParticipantId,
    },

    #[error("room is locked: {0}")]
    RoomLocked(RoomId),

    #[error("room is full: {0}")]
    RoomFull(RoomId),

    #[error("only the creator may modify room {0}")]
    Forbidden(RoomId),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl RegistryError {
    /// Short classification string for wire responses and logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Self::ParticipantNotFound { .. } => "PARTICIPANT_NOT_FOUND",
            Self::RoomLocked(_) => "ROOM_LOCKED",
            Self::RoomFull(_) => "ROOM_FULL",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let room = RoomId::from_raw("room_1");
        assert_eq!(
            RegistryError::RoomNotFound(room.clone()).error_code(),
            "ROOM_NOT_FOUND"
        );
        assert_eq!(
            RegistryError::RoomLocked(room.clone()).error_code(),
            "ROOM_LOCKED"
        );
        assert_eq!(
            RegistryError::RoomFull(room.clone()).error_code(),
            "ROOM_FULL"
        );
        assert_eq!(
            RegistryError::Forbidden(room.clone()).error_code(),
            "FORBIDDEN"
        );
        assert_eq!(
            RegistryError::InvalidInput("empty name".into()).error_code(),
            "INVALID_INPUT"
        );
        assert_eq!(
            RegistryError::ParticipantNotFound {
                room_id: room,
                user_id: ParticipantId::from_raw("u1"),
            }
            .error_code(),
            "PARTICIPANT_NOT_FOUND"
        );
    }

    #[test]
    fn display_names_the_room() {
        let err = RegistryError::RoomFull(RoomId::from_raw("room_9"));
        assert!(err.to_string().contains("room_9"));
    }
}
