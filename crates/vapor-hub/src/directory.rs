//! Room and participant directory.
//!
//! The hub never owns room or participant records; it asks a
//! [`ParticipantDirectory`] whether a room exists and who a participant is.
//! [`MemoryDirectory`] is the in-process implementation the server fills
//! through its internal HTTP API.

use crate::lock;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use vapor_types::{HubError, ParticipantId, ParticipantProfile, RoomId};

/// Read access to room and participant records.
pub trait ParticipantDirectory: Send + Sync {
    /// Returns `true` if the room exists and has not expired.
    fn room_exists(&self, room_id: &RoomId) -> bool;

    /// Looks up a participant's profile.
    fn participant(&self, participant_id: &ParticipantId) -> Option<ParticipantProfile>;
}

#[derive(Default)]
struct DirectoryInner {
    rooms: HashMap<RoomId, HashSet<ParticipantId>>,
    participants: HashMap<ParticipantId, ParticipantProfile>,
}

/// In-memory directory.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryInner> {
        lock::read(&self.inner, "directory")
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryInner> {
        lock::write(&self.inner, "directory")
    }

    /// Registers a room. Returns `true` if it was not known before.
    pub fn insert_room(&self, room_id: RoomId) -> bool {
        let mut inner = self.write();
        if inner.rooms.contains_key(&room_id) {
            return false;
        }
        inner.rooms.insert(room_id, HashSet::new());
        true
    }

    /// Removes a room and all of its participants, returning their ids.
    pub fn remove_room(&self, room_id: &RoomId) -> Option<Vec<ParticipantId>> {
        let mut inner = self.write();
        let members = inner.rooms.remove(room_id)?;
        for participant_id in &members {
            inner.participants.remove(participant_id);
        }
        let mut members: Vec<ParticipantId> = members.into_iter().collect();
        members.sort();
        Some(members)
    }

    /// Inserts or replaces a participant profile. Returns `true` on insert.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomNotFound`] if the profile's room is unknown.
    pub fn upsert_participant(&self, profile: ParticipantProfile) -> Result<bool, HubError> {
        let mut inner = self.write();
        if !inner.rooms.contains_key(&profile.room_id) {
            return Err(HubError::RoomNotFound(profile.room_id));
        }

        let previous_room = inner
            .participants
            .get(&profile.id)
            .map(|p| p.room_id.clone());
        if let Some(old_room) = previous_room.as_ref().filter(|r| **r != profile.room_id) {
            if let Some(members) = inner.rooms.get_mut(old_room) {
                members.remove(&profile.id);
            }
        }
        if let Some(members) = inner.rooms.get_mut(&profile.room_id) {
            members.insert(profile.id.clone());
        }
        inner.participants.insert(profile.id.clone(), profile);
        Ok(previous_room.is_none())
    }

    /// Removes a participant, returning the removed profile.
    pub fn remove_participant(&self, participant_id: &ParticipantId) -> Option<ParticipantProfile> {
        let mut inner = self.write();
        let profile = inner.participants.remove(participant_id)?;
        if let Some(members) = inner.rooms.get_mut(&profile.room_id) {
            members.remove(participant_id);
        }
        Some(profile)
    }

    /// Profiles of every participant in a room, sorted by id.
    pub fn participants_in_room(&self, room_id: &RoomId) -> Vec<ParticipantProfile> {
        let inner = self.read();
        let Some(members) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut profiles: Vec<ParticipantProfile> = members
            .iter()
            .filter_map(|id| inner.participants.get(id).cloned())
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }
}

impl ParticipantDirectory for MemoryDirectory {
    fn room_exists(&self, room_id: &RoomId) -> bool {
        self.read().rooms.contains_key(room_id)
    }

    fn participant(&self, participant_id: &ParticipantId) -> Option<ParticipantProfile> {
        self.read().participants.get(participant_id).cloned()
    }
}
