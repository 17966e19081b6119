//! Connection table and per-room broadcast groups.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::messages::ServerMessage;
use super::types::{ConnId, OutboundMessage, RoomId};

#[derive(Debug, Default)]
pub(crate) struct Hub {
    /// Channel for outbound messages to each connection.
    /// OutboundMessage clones are O(1), so fan-out serializes once.
    connections: HashMap<ConnId, mpsc::UnboundedSender<OutboundMessage>>,
    groups: HashMap<RoomId, HashSet<ConnId>>,
}

impl Hub {
    pub fn register(&mut self, conn_id: ConnId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.connections.insert(conn_id, tx);
    }

    /// Drop the connection and remove it from every group.
    pub fn unregister(&mut self, conn_id: &ConnId) {
        self.connections.remove(conn_id);
        self.groups.retain(|_, members| {
            members.remove(conn_id);
            !members.is_empty()
        });
    }

    pub fn join_group(&mut self, room_id: &RoomId, conn_id: ConnId) {
        self.groups.entry(room_id.clone()).or_default().insert(conn_id);
    }

    pub fn leave_group(&mut self, room_id: &RoomId, conn_id: &ConnId) {
        if let Some(members) = self.groups.get_mut(room_id) {
            members.remove(conn_id);
            if members.is_empty() {
                self.groups.remove(room_id);
            }
        }
    }

    pub fn send(&self, conn_id: &ConnId, msg: &ServerMessage) {
        let Some(outbound) = encode(msg) else {
            return;
        };
        if let Some(tx) = self.connections.get(conn_id) {
            let _ = tx.send(outbound);
        }
    }

    /// Send `msg` to every member of the group except `sender`.
    /// Returns the number of recipients.
    pub fn broadcast_except(
        &self,
        room_id: &RoomId,
        sender: &ConnId,
        msg: &ServerMessage,
    ) -> usize {
        let Some(members) = self.groups.get(room_id) else {
            return 0;
        };

        let mut recipients = members.iter().filter(|id| *id != sender).peekable();
        if recipients.peek().is_none() {
            return 0;
        }

        let Some(outbound) = encode(msg) else {
            return 0;
        };

        let mut sent = 0;
        for id in recipients {
            if let Some(tx) = self.connections.get(id) {
                if tx.send(outbound.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        debug!("Relayed to {} peer(s) in room {}", sent, room_id);
        sent
    }

    #[cfg(test)]
    pub fn group(&self, room_id: &RoomId) -> Option<&HashSet<ConnId>> {
        self.groups.get(room_id)
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

fn encode(msg: &ServerMessage) -> Option<OutboundMessage> {
    match msg.to_outbound() {
        Ok(outbound) => Some(outbound),
        Err(e) => {
            error!("Failed to serialize {:?}: {}", msg, e);
            None
        }
    }
}
