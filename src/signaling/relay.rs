//! Event handlers: translate inbound client events into registry
//! operations and outbound events.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::hub::Hub;
use super::messages::{ClientMessage, ServerMessage};
use super::registry::SessionRegistry;
use super::types::{ConnId, OutboundMessage, RoomId};

#[derive(Debug, Default)]
pub struct Relay {
    pub(crate) registry: SessionRegistry,
    pub(crate) hub: Hub,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn connect(&mut self, conn_id: ConnId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.hub.register(conn_id, tx);
        self.hub.send(&conn_id, &ServerMessage::Connected { socket_id: conn_id });
        info!("Client connected: {}", conn_id);
    }

    pub fn handle(&mut self, conn_id: ConnId, msg: ClientMessage) {
        match msg {
            ClientMessage::CreateRoom => self.create_room(conn_id),

            ClientMessage::JoinRoom { room_id } => self.join_room(conn_id, room_id),

            ClientMessage::Offer { room_id, offer } => self.relay(
                conn_id,
                &room_id,
                ServerMessage::Offer {
                    offer,
                    offer_id: conn_id,
                },
            ),

            ClientMessage::Answer { room_id, answer } => self.relay(
                conn_id,
                &room_id,
                ServerMessage::Answer {
                    answer,
                    answer_id: conn_id,
                },
            ),

            ClientMessage::IceCandidate { room_id, candidate } => self.relay(
                conn_id,
                &room_id,
                ServerMessage::IceCandidate {
                    candidate,
                    candidate_id: conn_id,
                },
            ),

            ClientMessage::MediaStatusChange {
                room_id,
                media_type,
                is_enabled,
            } => self.relay(
                conn_id,
                &room_id,
                ServerMessage::PeerMediaStatusChanged {
                    peer_id: conn_id,
                    media_type,
                    is_enabled,
                },
            ),

            ClientMessage::Message { room_id, message } => self.relay(
                conn_id,
                &room_id,
                ServerMessage::Message {
                    sender_id: conn_id,
                    message,
                    timestamp: now_millis(),
                },
            ),

            ClientMessage::LeaveRoom { room_id } => self.leave_room(conn_id, room_id),
        }
    }

    /// Transport-level termination: clean every room the connection was in.
    pub fn disconnect(&mut self, conn_id: ConnId) {
        for (room_id, remaining) in self.registry.remove_member_from_all_rooms(&conn_id) {
            if !remaining.is_empty() {
                self.hub.broadcast_except(
                    &room_id,
                    &conn_id,
                    &ServerMessage::PeerDisconnected { peer_id: conn_id },
                );
            }
            info!("Peer {} disconnected from room {}", conn_id, room_id);
        }

        self.hub.unregister(&conn_id);
        info!("Client disconnected: {}", conn_id);
    }

    fn create_room(&mut self, conn_id: ConnId) {
        let room_id = self.registry.create_room();
        if let Err(e) = self.registry.add_member(&room_id, conn_id) {
            warn!("Creator {} could not enter room {}: {}", conn_id, room_id, e);
            self.hub.send(&conn_id, &ServerMessage::Error { message: e.to_string() });
            return;
        }
        self.hub.join_group(&room_id, conn_id);

        info!("Room created: {} by peer {}", room_id, conn_id);
        self.hub.send(&conn_id, &ServerMessage::RoomCreated { room_id });
    }

    fn join_room(&mut self, conn_id: ConnId, room_id: RoomId) {
        if let Err(e) = self.registry.add_member(&room_id, conn_id) {
            warn!("Peer {} failed to join room {}: {}", conn_id, room_id, e);
            self.hub.send(&conn_id, &ServerMessage::Error { message: e.to_string() });
            return;
        }
        self.hub.join_group(&room_id, conn_id);

        info!("Peer {} joined room {}", conn_id, room_id);
        self.hub.send(
            &conn_id,
            &ServerMessage::RoomJoined {
                room_id: room_id.clone(),
            },
        );
        self.hub.broadcast_except(
            &room_id,
            &conn_id,
            &ServerMessage::PeerConnected { peer_id: conn_id },
        );
    }

    fn leave_room(&mut self, conn_id: ConnId, room_id: RoomId) {
        let departure = match self.registry.remove_member(&room_id, &conn_id) {
            Ok(departure) => departure,
            Err(e) => {
                debug!("Leave from {} ignored for room {}: {}", conn_id, room_id, e);
                return;
            }
        };
        self.hub.leave_group(&room_id, &conn_id);

        if !departure.removed {
            return;
        }
        if !departure.room_deleted() {
            self.hub.broadcast_except(
                &room_id,
                &conn_id,
                &ServerMessage::PeerLeft { peer_id: conn_id },
            );
        }
        info!("Peer {} left room {}", conn_id, room_id);
    }

    /// Payload-agnostic fan-out to everyone else in the named room.
    fn relay(&self, conn_id: ConnId, room_id: &RoomId, msg: ServerMessage) {
        if !self.registry.is_member(room_id, &conn_id) {
            debug!("Peer {} relaying into room {} without membership", conn_id, room_id);
        }
        self.hub.broadcast_except(room_id, &conn_id, &msg);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    struct Client {
        id: ConnId,
        rx: mpsc::UnboundedReceiver<OutboundMessage>,
    }

    impl Client {
        fn next(&mut self) -> Value {
            let msg = self.rx.try_recv().expect("expected an event");
            serde_json::from_str(msg.as_str()).unwrap()
        }

        fn assert_silent(&mut self) {
            if let Ok(msg) = self.rx.try_recv() {
                panic!("unexpected event: {}", msg.as_str());
            }
        }
    }

    fn connect(relay: &mut Relay, raw: u64) -> Client {
        let id = ConnId::from(raw);
        let (tx, rx) = mpsc::unbounded_channel();
        relay.connect(id, tx);
        let mut client = Client { id, rx };
        let hello = client.next();
        assert_eq!(hello["event"], "connected");
        assert_eq!(hello["data"]["socketId"], id.to_string());
        client
    }

    fn create(relay: &mut Relay, client: &mut Client) -> RoomId {
        relay.handle(client.id, ClientMessage::CreateRoom);
        let created = client.next();
        assert_eq!(created["event"], "roomCreated");
        RoomId::from(created["data"]["roomId"].as_str().unwrap())
    }

    fn join(relay: &mut Relay, client: &Client, room_id: &RoomId) {
        relay.handle(
            client.id,
            ClientMessage::JoinRoom {
                room_id: room_id.clone(),
            },
        );
    }

    /// A and B in the same room, all setup events drained.
    fn pair(relay: &mut Relay) -> (Client, Client, RoomId) {
        let mut a = connect(relay, 1);
        let mut b = connect(relay, 2);
        let room = create(relay, &mut a);
        join(relay, &b, &room);
        b.next();
        a.next();
        (a, b, room)
    }

    #[test]
    fn create_and_join_notifies_both_sides() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);
        let mut b = connect(&mut relay, 2);

        let room = create(&mut relay, &mut a);
        assert_eq!(relay.registry().members(&room).unwrap().len(), 1);

        join(&mut relay, &b, &room);
        let joined = b.next();
        assert_eq!(joined["event"], "roomJoined");
        assert_eq!(joined["data"]["roomId"], room.as_str());

        let peer = a.next();
        assert_eq!(peer["event"], "peerConnected");
        assert_eq!(peer["data"]["peerId"], b.id.to_string());
        b.assert_silent();
    }

    #[test]
    fn join_unknown_room_reports_error() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);

        join(&mut relay, &a, &RoomId::from("missing"));
        let err = a.next();
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["message"], "Room does not exist");
        assert_eq!(relay.registry().room_count(), 0);
    }

    #[test]
    fn third_joiner_gets_room_full() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);
        let mut c = connect(&mut relay, 3);

        join(&mut relay, &c, &room);
        let err = c.next();
        assert_eq!(err["event"], "error");
        assert_eq!(err["data"]["message"], "Room is full");

        let members = relay.registry().members(&room).unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains(&a.id) && members.contains(&b.id));
        a.assert_silent();
        b.assert_silent();
    }

    #[test]
    fn offer_and_answer_reach_only_the_peer() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);

        relay.handle(
            a.id,
            ClientMessage::Offer {
                room_id: room.clone(),
                offer: json!({"type": "offer", "sdp": "O"}),
            },
        );
        let offer = b.next();
        assert_eq!(offer["event"], "offer");
        assert_eq!(offer["data"]["offer"], json!({"type": "offer", "sdp": "O"}));
        assert_eq!(offer["data"]["offerId"], a.id.to_string());
        a.assert_silent();

        relay.handle(
            b.id,
            ClientMessage::Answer {
                room_id: room.clone(),
                answer: json!("Ans"),
            },
        );
        let answer = a.next();
        assert_eq!(answer["event"], "answer");
        assert_eq!(answer["data"]["answer"], "Ans");
        assert_eq!(answer["data"]["answerId"], b.id.to_string());
        b.assert_silent();
    }

    #[test]
    fn candidates_media_and_chat_are_relayed() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);

        relay.handle(
            a.id,
            ClientMessage::IceCandidate {
                room_id: room.clone(),
                candidate: json!({"candidate": "c1"}),
            },
        );
        let candidate = b.next();
        assert_eq!(candidate["event"], "iceCandidate");
        assert_eq!(candidate["data"]["candidateId"], a.id.to_string());

        relay.handle(
            a.id,
            ClientMessage::MediaStatusChange {
                room_id: room.clone(),
                media_type: json!("audio"),
                is_enabled: json!(false),
            },
        );
        let media = b.next();
        assert_eq!(media["event"], "peerMediaStatusChanged");
        assert_eq!(media["data"]["peerId"], a.id.to_string());
        assert_eq!(media["data"]["mediaType"], "audio");
        assert_eq!(media["data"]["isEnabled"], false);

        relay.handle(
            b.id,
            ClientMessage::Message {
                room_id: room.clone(),
                message: json!({"text": "hi"}),
            },
        );
        let chat = a.next();
        assert_eq!(chat["event"], "message");
        assert_eq!(chat["data"]["senderId"], b.id.to_string());
        assert_eq!(chat["data"]["message"]["text"], "hi");
        assert!(chat["data"]["timestamp"].as_u64().unwrap() > 0);

        a.assert_silent();
        b.assert_silent();
    }

    #[test]
    fn absent_payloads_are_relayed_as_null() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);

        let raw = format!(r#"{{"event": "offer", "data": {{"roomId": "{}"}}}}"#, room);
        relay.handle(a.id, serde_json::from_str(&raw).unwrap());
        let offer = b.next();
        assert_eq!(offer["event"], "offer");
        assert_eq!(offer["data"]["offer"], Value::Null);
        assert_eq!(offer["data"]["offerId"], a.id.to_string());

        let raw = format!(
            r#"{{"event": "mediaStatusChange", "data": {{"roomId": "{}", "isEnabled": "off"}}}}"#,
            room
        );
        relay.handle(a.id, serde_json::from_str(&raw).unwrap());
        let media = b.next();
        assert_eq!(media["event"], "peerMediaStatusChanged");
        assert_eq!(media["data"]["mediaType"], Value::Null);
        assert_eq!(media["data"]["isEnabled"], "off");
        a.assert_silent();
    }

    #[test]
    fn relay_to_unknown_room_is_silent() {
        let mut relay = Relay::new();
        let (mut a, mut b, _room) = pair(&mut relay);

        relay.handle(
            a.id,
            ClientMessage::Offer {
                room_id: RoomId::from("elsewhere"),
                offer: json!(null),
            },
        );
        a.assert_silent();
        b.assert_silent();
    }

    #[test]
    fn leave_notifies_remaining_peer_once() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);

        relay.handle(a.id, ClientMessage::LeaveRoom { room_id: room.clone() });
        let left = b.next();
        assert_eq!(left["event"], "peerLeft");
        assert_eq!(left["data"]["peerId"], a.id.to_string());

        relay.handle(a.id, ClientMessage::LeaveRoom { room_id: room.clone() });
        b.assert_silent();
        a.assert_silent();
        assert_eq!(
            relay.registry().members(&room).unwrap().iter().collect::<Vec<_>>(),
            vec![&b.id]
        );
    }

    #[test]
    fn leaving_peer_stops_receiving_relays() {
        let mut relay = Relay::new();
        let (mut a, mut b, room) = pair(&mut relay);

        relay.handle(a.id, ClientMessage::LeaveRoom { room_id: room.clone() });
        b.next();

        relay.handle(
            b.id,
            ClientMessage::Message {
                room_id: room,
                message: json!("anyone?"),
            },
        );
        a.assert_silent();
    }

    #[test]
    fn last_leave_deletes_room() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);
        let mut b = connect(&mut relay, 2);
        let room = create(&mut relay, &mut a);

        relay.handle(a.id, ClientMessage::LeaveRoom { room_id: room.clone() });
        assert!(!relay.registry().contains(&room));

        join(&mut relay, &b, &room);
        assert_eq!(b.next()["data"]["message"], "Room does not exist");
    }

    #[test]
    fn leave_unknown_room_is_silent() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);
        relay.handle(
            a.id,
            ClientMessage::LeaveRoom {
                room_id: RoomId::from("never"),
            },
        );
        a.assert_silent();
    }

    #[test]
    fn disconnect_notifies_peer_once() {
        let mut relay = Relay::new();
        let (a, mut b, room) = pair(&mut relay);

        relay.disconnect(a.id);
        let gone = b.next();
        assert_eq!(gone["event"], "peerDisconnected");
        assert_eq!(gone["data"]["peerId"], a.id.to_string());
        b.assert_silent();
        assert_eq!(relay.registry().members(&room).unwrap().len(), 1);

        relay.disconnect(b.id);
        assert!(!relay.registry().contains(&room));
        assert_eq!(relay.hub.connection_count(), 0);
    }

    #[test]
    fn disconnect_alone_deletes_room_silently() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);
        let mut b = connect(&mut relay, 2);
        let room = create(&mut relay, &mut a);

        relay.disconnect(a.id);
        assert!(!relay.registry().contains(&room));
        b.assert_silent();
    }

    #[test]
    fn disconnect_cleans_every_room() {
        let mut relay = Relay::new();
        let mut a = connect(&mut relay, 1);
        let mut b = connect(&mut relay, 2);
        let mut c = connect(&mut relay, 3);

        let first = create(&mut relay, &mut b);
        let second = create(&mut relay, &mut c);
        join(&mut relay, &a, &first);
        join(&mut relay, &a, &second);
        a.next();
        a.next();
        b.next();
        c.next();

        relay.disconnect(a.id);
        assert_eq!(b.next()["event"], "peerDisconnected");
        assert_eq!(c.next()["event"], "peerDisconnected");
        assert!(relay.registry().contains(&first));
        assert!(relay.registry().contains(&second));
    }
}
