use dashmap::DashMap;

use super::ConnectionId;

/// Live connections per purchase chat, in join order.
///
/// Rooms are created on first join and never dropped; an emptied room is
/// observably the same as one that never existed.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Vec<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the connection was not already a member.
    pub fn join(&self, room: &str, connection: ConnectionId) -> bool {
        let mut members = self.rooms.entry(room.to_owned()).or_default();
        if members.contains(&connection) {
            return false;
        }
        members.push(connection);
        true
    }

    /// Returns `true` if the connection was a member.
    pub fn leave(&self, room: &str, connection: ConnectionId) -> bool {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return false;
        };
        let before = members.len();
        members.retain(|member| *member != connection);
        members.len() != before
    }

    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    /// Drops the connection from every room it is in and returns those rooms.
    pub fn remove_connection_from_all_rooms(&self, connection: ConnectionId) -> Vec<String> {
        let mut left = Vec::new();
        for mut room in self.rooms.iter_mut() {
            let before = room.len();
            room.retain(|member| *member != connection);
            if room.len() != before {
                left.push(room.key().clone());
            }
        }
        left
    }
}
