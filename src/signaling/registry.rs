//! Room existence and membership.

use std::collections::{HashMap, HashSet};

use tracing::info;

use super::types::{ConnId, Room, RoomId, SignalingError};

/// Maximum number of connections a room admits
pub const MAX_ROOM_MEMBERS: usize = 2;

/// Outcome of removing a connection from a room.
///
/// `remaining` empty means the room was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub removed: bool,
    pub remaining: HashSet<ConnId>,
}

impl Departure {
    pub fn room_deleted(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Sole owner of every room and its member set.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh, empty room and return its id.
    ///
    /// The caller adds the creator in the same step; an empty room is never
    /// observable outside that step.
    pub fn create_room(&mut self) -> RoomId {
        loop {
            let id = RoomId::generate();
            if !self.rooms.contains_key(&id) {
                self.rooms.insert(id.clone(), Room::default());
                return id;
            }
        }
    }

    pub fn add_member(
        &mut self,
        room_id: &RoomId,
        conn_id: ConnId,
    ) -> Result<(), SignalingError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        if room.members.len() >= MAX_ROOM_MEMBERS {
            return Err(SignalingError::RoomFull(room_id.clone()));
        }

        room.members.insert(conn_id);
        Ok(())
    }

    pub fn remove_member(
        &mut self,
        room_id: &RoomId,
        conn_id: &ConnId,
    ) -> Result<Departure, SignalingError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.clone()))?;

        let removed = room.members.remove(conn_id);
        let remaining = room.members.clone();

        if remaining.is_empty() {
            self.rooms.remove(room_id);
            info!("Room {} removed (empty)", room_id);
        }

        Ok(Departure { removed, remaining })
    }

    /// Remove `conn_id` from every room it belongs to, deleting rooms left
    /// empty. Returns each affected room with its remaining members.
    pub fn remove_member_from_all_rooms(
        &mut self,
        conn_id: &ConnId,
    ) -> Vec<(RoomId, HashSet<ConnId>)> {
        let mut affected = Vec::new();

        for (room_id, room) in self.rooms.iter_mut() {
            if room.members.remove(conn_id) {
                affected.push((room_id.clone(), room.members.clone()));
            }
        }

        for (room_id, remaining) in &affected {
            if remaining.is_empty() {
                self.rooms.remove(room_id);
                info!("Room {} removed (empty)", room_id);
            }
        }

        affected
    }

    pub fn members(&self, room_id: &RoomId) -> Option<&HashSet<ConnId>> {
        self.rooms.get(room_id).map(|room| &room.members)
    }

    pub fn is_member(&self, room_id: &RoomId, conn_id: &ConnId) -> bool {
        self.members(room_id)
            .is_some_and(|members| members.contains(conn_id))
    }

    #[cfg(test)]
    pub(crate) fn rooms_of(&self, conn_id: &ConnId) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.members.contains(conn_id))
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
