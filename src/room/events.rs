//! Room wire protocol
//!
//! Externally-tagged JSON envelopes: server-to-client events carry an
//! `event` tag, client-to-server commands an `action` tag, both with their
//! payload under `data`. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::projection::{EntityPatch, PlayerPatch, Projection};
use crate::store::Id;

/// Server-to-client room event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomEvent {
    /// Full room snapshot, sent to a joining subscriber
    #[serde(rename_all = "camelCase")]
    RoomData {
        entity_ids: Vec<Id>,
        entities: Vec<Projection>,
    },
    /// One entity's projection changed
    #[serde(rename_all = "camelCase")]
    EntityUpdated {
        entity_id: Id,
        updated_entity: Projection,
    },
    /// Chat line, also used for generated change-log lines
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        sender: String,
        message: String,
        timestamp: i64,
    },
    /// Scoped to the subscriber whose command failed; never broadcast
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

/// Entity update payload: base attribute patch with an optional player
/// extension section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(flatten)]
    pub entity: EntityPatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_character: Option<PlayerPatch>,
}

/// Client-to-server room command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room: String },
    #[serde(rename_all = "camelCase")]
    AddEntity { room: String, entity_id: Id },
    #[serde(rename_all = "camelCase")]
    RemoveEntity { room: String, entity_id: Id },
    #[serde(rename_all = "camelCase")]
    UpdateEntity {
        room: String,
        entity_id: Id,
        updated_data: UpdatePayload,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        room: String,
        sender: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_envelope_shape() {
        let event = RoomEvent::ChatMessage {
            sender: "gm".into(),
            message: "roll initiative".into(),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "chatMessage");
        assert_eq!(json["data"]["sender"], "gm");
        assert_eq!(json["data"]["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_error_event_omits_empty_details() {
        let event = RoomEvent::Error { message: "nope".into(), details: None };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["data"].get("details").is_none());
    }

    #[test]
    fn test_update_command_parses_flattened_patch() {
        let raw = r#"{
            "action": "updateEntity",
            "data": {
                "room": "table-1",
                "entityId": 7,
                "updatedData": {
                    "hp": 12,
                    "maxHp": 20,
                    "playerCharacter": { "level": 4 }
                }
            }
        }"#;
        let command: ClientCommand = serde_json::from_str(raw).unwrap();
        match command {
            ClientCommand::UpdateEntity { room, entity_id, updated_data } => {
                assert_eq!(room, "table-1");
                assert_eq!(entity_id, 7);
                assert_eq!(updated_data.entity.hp, Some(12));
                assert_eq!(updated_data.entity.max_hp, Some(20));
                assert_eq!(
                    updated_data.player_character.and_then(|p| p.level),
                    Some(4)
                );
            }
            other => panic!("parsed wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_join_command_parses() {
        let raw = r#"{"action":"joinRoom","data":{"room":"table-1"}}"#;
        let command: ClientCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(command, ClientCommand::JoinRoom { room: "table-1".into() });
    }
}
