use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnId, OutboundMessage, RoomId};

/// Events sent from client to server.
///
/// Wire form: `{"event": "joinRoom", "data": {"roomId": "..."}}`.
/// Only `roomId` is checked. Relay payloads are opaque JSON, forwarded
/// untouched, and read as `null` when absent.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Create a new room (becomes the first member)
    CreateRoom,

    /// Join an existing room by id
    JoinRoom { room_id: RoomId },

    Offer {
        room_id: RoomId,
        #[serde(default)]
        offer: Value,
    },

    Answer {
        room_id: RoomId,
        #[serde(default)]
        answer: Value,
    },

    IceCandidate {
        room_id: RoomId,
        #[serde(default)]
        candidate: Value,
    },

    MediaStatusChange {
        room_id: RoomId,
        #[serde(default)]
        media_type: Value,
        #[serde(default)]
        is_enabled: Value,
    },

    /// Free-form chat message
    Message {
        room_id: RoomId,
        #[serde(default)]
        message: Value,
    },

    /// Leave a room explicitly
    LeaveRoom { room_id: RoomId },
}

/// Events sent from server to client
#[derive(Debug, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Identity assigned to a freshly accepted connection
    Connected { socket_id: ConnId },

    RoomCreated { room_id: RoomId },

    RoomJoined { room_id: RoomId },

    /// Another connection joined the room
    PeerConnected { peer_id: ConnId },

    Offer { offer: Value, offer_id: ConnId },

    Answer { answer: Value, answer_id: ConnId },

    IceCandidate { candidate: Value, candidate_id: ConnId },

    PeerMediaStatusChanged {
        peer_id: ConnId,
        media_type: Value,
        is_enabled: Value,
    },

    /// `timestamp` is milliseconds since the Unix epoch
    Message {
        sender_id: ConnId,
        message: Value,
        timestamp: u64,
    },

    PeerLeft { peer_id: ConnId },

    PeerDisconnected { peer_id: ConnId },

    Error { message: String },
}

impl ServerMessage {
    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }
}
