use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Instant;
use tchat_common::{RoomId, SessionId};

/// Handle held in the registry for one session attached to a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    /// Connection the handle belongs to.
    pub session_id: SessionId,
    /// Remote address of the connection.
    pub peer: SocketAddr,
    /// Instant when the session joined the room.
    pub joined_at: Instant,
}

/// Concurrent room → active sessions table.
///
/// Each room entry is locked independently, so joins and leaves on
/// different rooms never contend. A reverse session → rooms index lets a
/// closing connection leave everything it joined. Rooms with no sessions
/// are dropped.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashMap<SessionId, SessionHandle>>,
    sessions: DashMap<SessionId, HashSet<RoomId>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session to a room, returning any previous handle the same
    /// session held there.
    pub fn join(&self, room: RoomId, handle: SessionHandle) -> Option<SessionHandle> {
        let session_id = handle.session_id;
        let previous = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(session_id, handle);
        self.sessions.entry(session_id).or_default().insert(room);
        previous
    }

    /// Detach a session from one room. Returns the removed handle.
    pub fn leave(&self, room: &RoomId, session_id: SessionId) -> Option<SessionHandle> {
        let removed = self.detach(room, session_id);
        let mut now_empty = false;
        if let Some(mut rooms) = self.sessions.get_mut(&session_id) {
            rooms.remove(room);
            now_empty = rooms.is_empty();
        }
        if now_empty {
            self.sessions.remove_if(&session_id, |_, rooms| rooms.is_empty());
        }
        removed
    }

    /// Detach a session from every room it joined. Returns the rooms left.
    pub fn leave_all(&self, session_id: SessionId) -> Vec<RoomId> {
        let Some((_, rooms)) = self.sessions.remove(&session_id) else {
            return Vec::new();
        };
        let mut left: Vec<RoomId> = rooms
            .into_iter()
            .filter(|room| self.detach(room, session_id).is_some())
            .collect();
        left.sort();
        left
    }

    /// Handles of every session currently in `room`.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<SessionHandle> {
        self.rooms
            .get(room)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `session_id` is attached to `room`.
    #[must_use]
    pub fn is_member(&self, room: &RoomId, session_id: SessionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|entry| entry.contains_key(&session_id))
    }

    /// Number of rooms with at least one session.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of sessions attached to at least one room.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn detach(&self, room: &RoomId, session_id: SessionId) -> Option<SessionHandle> {
        let mut now_empty = false;
        let removed = self.rooms.get_mut(room).and_then(|mut entry| {
            let removed = entry.remove(&session_id);
            now_empty = entry.is_empty();
            removed
        });
        if now_empty {
            self.rooms.remove_if(room, |_, entry| entry.is_empty());
        }
        removed
    }
}
