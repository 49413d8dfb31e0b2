use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, RoomId};

/// A user's membership record within one room.
///
/// `user_id` is the durable identity joins are deduplicated by; `id` is the
/// transient display identity supplied with each connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub user_id: ParticipantId,
    pub name: String,
    pub is_audio_enabled: bool,
    pub is_video_enabled: bool,
}

/// A bounded group session with a capacity, lock flag, and ordered
/// participant list (insertion order = join order).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub max_participants: u32,
    pub is_locked: bool,
    pub participants: Vec<Participant>,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: impl Into<String>, created_by: ParticipantId, max_participants: u32) -> Self {
        Self {
            id: RoomId::new(),
            name: name.into(),
            max_participants,
            is_locked: false,
            participants: Vec::new(),
            created_by,
            created_at: Utc::now(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, user_id: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.user_id == user_id)
    }

    pub fn participant(&self, user_id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.user_id == user_id)
    }

    /// Public listing view — no participant detail.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            max_participants: self.max_participants,
            is_locked: self.is_locked,
            participant_count: self.participants.len(),
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub max_participants: u32,
    pub is_locked: bool,
    pub participant_count: usize,
    pub created_by: ParticipantId,
    pub created_at: DateTime<Utc>,
}

/// Closed set of participant mutations. Only the participant's own media
/// flags and display name are mutable after joining.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ParticipantUpdate {
    ToggleAudio,
    ToggleVideo,
    Rename { name: String },
}

impl ParticipantUpdate {
    /// Apply the update in place.
    pub fn apply(&self, participant: &mut Participant) {
        match self {
            Self::ToggleAudio => participant.is_audio_enabled = !participant.is_audio_enabled,
            Self::ToggleVideo => participant.is_video_enabled = !participant.is_video_enabled,
            Self::Rename { name } => participant.name = name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(user: &str) -> Participant {
        Participant {
            id: format!("display-{user}"),
            user_id: ParticipantId::from_raw(user),
            name: user.to_string(),
            is_audio_enabled: true,
            is_video_enabled: true,
        }
    }

    #[test]
    fn new_room_is_empty_and_unlocked() {
        let room = Room::new("standup", ParticipantId::from_raw("u1"), 10);
        assert!(room.is_empty());
        assert!(!room.is_locked);
        assert!(!room.is_full());
        assert!(room.id.as_str().starts_with("room_"));
    }

    #[test]
    fn full_at_capacity() {
        let mut room = Room::new("small", ParticipantId::from_raw("u1"), 2);
        room.participants.push(participant("u1"));
        assert!(!room.is_full());
        room.participants.push(participant("u2"));
        assert!(room.is_full());
    }

    #[test]
    fn summary_carries_count_not_roster() {
        let mut room = Room::new("demo", ParticipantId::from_raw("u1"), 5);
        room.participants.push(participant("u1"));
        room.participants.push(participant("u2"));

        let summary = room.summary();
        assert_eq!(summary.participant_count, 2);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("participants").is_none());
        assert_eq!(json["participantCount"], 2);
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let room = Room::new("demo", ParticipantId::from_raw("u1"), 5);
        let json = serde_json::to_value(&room).unwrap();
        assert!(json.get("maxParticipants").is_some());
        assert!(json.get("isLocked").is_some());
        assert!(json.get("createdBy").is_some());
        assert!(json.get("createdAt").is_some());

        let p = serde_json::to_value(participant("u1")).unwrap();
        assert!(p.get("userId").is_some());
        assert!(p.get("isAudioEnabled").is_some());
        assert!(p.get("isVideoEnabled").is_some());
    }

    #[test]
    fn toggle_audio_flips_only_audio() {
        let mut p = participant("u1");
        ParticipantUpdate::ToggleAudio.apply(&mut p);
        assert!(!p.is_audio_enabled);
        assert!(p.is_video_enabled);
        assert_eq!(p.name, "u1");

        ParticipantUpdate::ToggleAudio.apply(&mut p);
        assert!(p.is_audio_enabled);
    }

    #[test]
    fn rename_replaces_name() {
        let mut p = participant("u1");
        ParticipantUpdate::Rename { name: "Ada".into() }.apply(&mut p);
        assert_eq!(p.name, "Ada");
        assert!(p.is_audio_enabled);
    }

    #[test]
    fn update_deserializes_from_tagged_op() {
        let toggle: ParticipantUpdate = serde_json::from_str(r#"{"op":"toggle-audio"}"#).unwrap();
        assert_eq!(toggle, ParticipantUpdate::ToggleAudio);

        let rename: ParticipantUpdate =
            serde_json::from_str(r#"{"op":"rename","name":"Ada"}"#).unwrap();
        assert_eq!(rename, ParticipantUpdate::Rename { name: "Ada".into() });
    }
}
