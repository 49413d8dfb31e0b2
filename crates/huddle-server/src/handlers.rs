//! RPC method handlers for the room gateway.

use std::sync::Arc;

use huddle_core::ids::{ConnectionId, ParticipantId, RoomId};
use huddle_core::model::{Participant, ParticipantUpdate};
use huddle_registry::RoomRegistry;

use crate::rpc::{self, Response};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub registry: RoomRegistry,
}

impl HandlerState {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }
}

/// Dispatch an RPC method to the appropriate handler.
///
/// `connection_id` is the connection the request arrived on; joins bind
/// the participant to that connection, never to a client-supplied one.
pub fn dispatch(
    state: &Arc<HandlerState>,
    connection_id: &ConnectionId,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    match method {
        // Room lifecycle
        "room.create" => room_create(state, params, id),
        "room.join" => room_join(state, connection_id, params, id),
        "room.leave" => room_leave(state, params, id),
        "room.delete" => room_delete(state, params, id),
        "room.setLock" => room_set_lock(state, params, id),

        // Reads
        "room.get" => room_get(state, params, id),
        "room.list" => room_list(state, id),

        // Participant
        "participant.update" => participant_update(state, params, id),

        // System
        "system.ping" => ping(id),

        _ => Response::method_not_found(id, method),
    }
}

// ── Room handlers ──

fn room_create(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let name = match rpc::require_str(params, "name") {
        Ok(n) => n,
        Err(e) => return Response::invalid_params(id, e),
    };
    let creator = match rpc::require_str(params, "creatorId") {
        Ok(c) => ParticipantId::from_raw(c),
        Err(e) => return Response::invalid_params(id, e),
    };
    let capacity = rpc::optional_i64(params, "maxParticipants");

    match state.registry.create_room(name, creator, capacity) {
        Ok(room) => Response::success(id, serde_json::json!({"room": room})),
        Err(e) => Response::registry_error(id, &e),
    }
}

fn room_join(
    state: &Arc<HandlerState>,
    connection_id: &ConnectionId,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };
    let participant = match params.get("participant") {
        Some(value) => match serde_json::from_value::<Participant>(value.clone()) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, format!("Invalid participant: {e}")),
        },
        None => return Response::invalid_params(id, "Missing required parameter: participant"),
    };

    match state
        .registry
        .join_room(&room_id, participant, connection_id.clone())
    {
        Ok(room) => Response::success(id, serde_json::json!({"room": room})),
        Err(e) => Response::registry_error(id, &e),
    }
}

fn room_leave(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };
    let user_id = match rpc::require_str(params, "userId") {
        Ok(u) => ParticipantId::from_raw(u),
        Err(e) => return Response::invalid_params(id, e),
    };

    match state.registry.leave_room(&room_id, &user_id) {
        Ok(room) => Response::success(id, serde_json::json!({"room": room})),
        Err(e) => Response::registry_error(id, &e),
    }
}

fn room_delete(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };
    let requester = match rpc::require_str(params, "requesterId") {
        Ok(u) => ParticipantId::from_raw(u),
        Err(e) => return Response::invalid_params(id, e),
    };

    match state.registry.delete_room(&room_id, &requester) {
        Ok(room) => Response::success(id, serde_json::json!({"room": room})),
        Err(e) => Response::registry_error(id, &e),
    }
}

fn room_set_lock(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };
    let requester = match rpc::require_str(params, "requesterId") {
        Ok(u) => ParticipantId::from_raw(u),
        Err(e) => return Response::invalid_params(id, e),
    };
    let locked = match rpc::require_bool(params, "locked") {
        Ok(l) => l,
        Err(e) => return Response::invalid_params(id, e),
    };

    match state.registry.set_room_lock(&room_id, &requester, locked) {
        Ok(room) => Response::success(id, serde_json::json!({"room": room})),
        Err(e) => Response::registry_error(id, &e),
    }
}

fn room_get(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };

    match state.registry.get_room(&room_id) {
        Some(room) => Response::success(id, serde_json::json!({"room": room})),
        None => Response::registry_error(
            id,
            &huddle_core::errors::RegistryError::RoomNotFound(room_id),
        ),
    }
}

fn room_list(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> Response {
    Response::success(id, serde_json::json!({"rooms": state.registry.list_rooms()}))
}

// ── Participant handlers ──

fn participant_update(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> Response {
    let room_id = match rpc::require_str(params, "roomId") {
        Ok(r) => RoomId::from_raw(r),
        Err(e) => return Response::invalid_params(id, e),
    };
    let user_id = match rpc::require_str(params, "userId") {
        Ok(u) => ParticipantId::from_raw(u),
        Err(e) => return Response::invalid_params(id, e),
    };
    let update = match params.get("update") {
        Some(value) => match serde_json::from_value::<ParticipantUpdate>(value.clone()) {
            Ok(u) => u,
            Err(e) => return Response::invalid_params(id, format!("Invalid update: {e}")),
        },
        None => return Response::invalid_params(id, "Missing required parameter: update"),
    };

    match state.registry.update_participant(&room_id, &user_id, update) {
        Ok(participant) => Response::success(id, serde_json::json!({"participant": participant})),
        Err(e) => Response::registry_error(id, &e),
    }
}

// ── System handlers ──

fn ping(id: Option<serde_json::Value>) -> Response {
    Response::success(
        id,
        serde_json::json!({
            "status": "ok",
            "timestamp": chrono::Utc::now(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_registry::RegistryConfig;
    use tokio::sync::broadcast;

    fn setup() -> Arc<HandlerState> {
        let (tx, _) = broadcast::channel(256);
        Arc::new(HandlerState::new(RoomRegistry::new(
            RegistryConfig::default(),
            tx,
        )))
    }

    fn conn(s: &str) -> ConnectionId {
        ConnectionId::from_raw(s)
    }

    fn participant_json(user: &str) -> serde_json::Value {
        serde_json::json!({
            "id": format!("display-{user}"),
            "userId": user,
            "name": user,
            "isAudioEnabled": true,
            "isVideoEnabled": true,
        })
    }

    /// Create a room via dispatch and return its id.
    fn create_room(state: &Arc<HandlerState>, creator: &str) -> String {
        let resp = dispatch(
            state,
            &conn("c0"),
            "room.create",
            &serde_json::json!({"name": "demo", "creatorId": creator}),
            Some(serde_json::json!(1)),
        );
        assert!(resp.error.is_none());
        resp.result.unwrap()["room"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn dispatch_unknown_method() {
        let state = setup();
        let resp = dispatch(
            &state,
            &conn("c1"),
            "foo.bar",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        );
        assert_eq!(resp.error.unwrap().code, "METHOD_NOT_FOUND");
    }

    #[test]
    fn room_create_returns_wire_shape() {
        let state = setup();
        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.create",
            &serde_json::json!({"name": "standup", "creatorId": "u1", "maxParticipants": 4}),
            Some(serde_json::json!(1)),
        );
        assert!(resp.error.is_none());
        let room = &resp.result.unwrap()["room"];
        assert!(room["id"].as_str().unwrap().starts_with("room_"));
        assert_eq!(room["name"], "standup");
        assert_eq!(room["maxParticipants"], 4);
        assert_eq!(room["isLocked"], false);
        assert_eq!(room["createdBy"], "u1");
        assert!(room["participants"].as_array().unwrap().is_empty());
    }

    #[test]
    fn room_create_requires_name_and_creator() {
        let state = setup();
        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.create",
            &serde_json::json!({"creatorId": "u1"}),
            Some(serde_json::json!(1)),
        );
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.create",
            &serde_json::json!({"name": "demo"}),
            Some(serde_json::json!(2)),
        );
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[test]
    fn room_join_binds_requesting_connection() {
        let state = setup();
        let room_id = create_room(&state, "u1");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": participant_json("u1")}),
            Some(serde_json::json!(2)),
        );
        assert!(resp.error.is_none());
        assert_eq!(
            resp.result.unwrap()["room"]["participants"][0]["userId"],
            "u1"
        );
        assert_eq!(
            state.registry.connection_of(&ParticipantId::from_raw("u1")),
            Some(conn("c1"))
        );
    }

    #[test]
    fn room_join_rejects_malformed_participant() {
        let state = setup();
        let room_id = create_room(&state, "u1");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": {"name": "no ids"}}),
            Some(serde_json::json!(2)),
        );
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
        assert_eq!(
            state.registry.get_room(&RoomId::from_raw(&room_id)).unwrap().participants.len(),
            0
        );
    }

    #[test]
    fn room_join_missing_room_maps_to_wire_code() {
        let state = setup();
        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": "room_ghost", "participant": participant_json("u1")}),
            Some(serde_json::json!(1)),
        );
        assert_eq!(resp.error.unwrap().code, "ROOM_NOT_FOUND");
    }

    #[tokio::test]
    async fn room_leave_roundtrip() {
        let state = setup();
        let room_id = create_room(&state, "u1");
        dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": participant_json("u1")}),
            None,
        );

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.leave",
            &serde_json::json!({"roomId": room_id, "userId": "u1"}),
            Some(serde_json::json!(3)),
        );
        assert!(resp.error.is_none());
        assert!(resp.result.unwrap()["room"]["participants"]
            .as_array()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn room_delete_forbidden_for_non_creator() {
        let state = setup();
        let room_id = create_room(&state, "u1");

        let resp = dispatch(
            &state,
            &conn("c2"),
            "room.delete",
            &serde_json::json!({"roomId": room_id, "requesterId": "u2"}),
            Some(serde_json::json!(2)),
        );
        assert_eq!(resp.error.unwrap().code, "FORBIDDEN");
    }

    #[test]
    fn room_set_lock_then_join_is_locked() {
        let state = setup();
        let room_id = create_room(&state, "u1");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.setLock",
            &serde_json::json!({"roomId": room_id, "requesterId": "u1", "locked": true}),
            Some(serde_json::json!(2)),
        );
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["room"]["isLocked"], true);

        let resp = dispatch(
            &state,
            &conn("c2"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": participant_json("u2")}),
            Some(serde_json::json!(3)),
        );
        assert_eq!(resp.error.unwrap().code, "ROOM_LOCKED");
    }

    #[test]
    fn room_get_and_list() {
        let state = setup();
        let room_id = create_room(&state, "u1");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.get",
            &serde_json::json!({"roomId": room_id}),
            Some(serde_json::json!(2)),
        );
        assert_eq!(resp.result.unwrap()["room"]["id"], room_id.as_str());

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.get",
            &serde_json::json!({"roomId": "room_ghost"}),
            Some(serde_json::json!(3)),
        );
        assert_eq!(resp.error.unwrap().code, "ROOM_NOT_FOUND");

        let resp = dispatch(
            &state,
            &conn("c1"),
            "room.list",
            &serde_json::json!({}),
            Some(serde_json::json!(4)),
        );
        let rooms = resp.result.unwrap();
        let rooms = rooms["rooms"].as_array().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0]["participantCount"], 0);
        assert!(rooms[0].get("participants").is_none());
    }

    #[test]
    fn participant_update_via_dispatch() {
        let state = setup();
        let room_id = create_room(&state, "u1");
        dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": participant_json("u1")}),
            None,
        );

        let resp = dispatch(
            &state,
            &conn("c1"),
            "participant.update",
            &serde_json::json!({
                "roomId": room_id,
                "userId": "u1",
                "update": {"op": "toggle-audio"},
            }),
            Some(serde_json::json!(3)),
        );
        assert!(resp.error.is_none());
        let participant = &resp.result.unwrap()["participant"];
        assert_eq!(participant["isAudioEnabled"], false);
        assert_eq!(participant["isVideoEnabled"], true);
    }

    #[test]
    fn participant_update_rejects_unknown_op() {
        let state = setup();
        let room_id = create_room(&state, "u1");
        dispatch(
            &state,
            &conn("c1"),
            "room.join",
            &serde_json::json!({"roomId": room_id, "participant": participant_json("u1")}),
            None,
        );

        let resp = dispatch(
            &state,
            &conn("c1"),
            "participant.update",
            &serde_json::json!({
                "roomId": room_id,
                "userId": "u1",
                "update": {"op": "become-admin"},
            }),
            Some(serde_json::json!(3)),
        );
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[test]
    fn system_ping() {
        let state = setup();
        let resp = dispatch(
            &state,
            &conn("c1"),
            "system.ping",
            &serde_json::json!({}),
            Some(serde_json::json!(1)),
        );
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "ok");
        assert!(result["timestamp"].is_string());
    }
}
