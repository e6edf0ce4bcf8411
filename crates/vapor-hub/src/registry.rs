//! Room registry: which live sessions are bound to which room.

use crate::lock;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use vapor_types::{OutboundEvent, ParticipantId, RoomId, SessionId};

/// Sending half of a session's outbound queue.
pub type EventSender = mpsc::Sender<Arc<OutboundEvent>>;

/// Receiving half of a session's outbound queue, drained by the transport writer.
pub type EventReceiver = mpsc::Receiver<Arc<OutboundEvent>>;

/// Room and participant a session is bound to after `room:join`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
}

/// Read-only view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub binding: Option<SessionBinding>,
    pub connected_at: DateTime<Utc>,
}

/// Result of [`RoomRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The session was already bound to exactly this room and participant.
    Unchanged,
    /// The session is now bound.
    Bound {
        /// Binding this session held before, if it moved.
        previous: Option<SessionBinding>,
        /// Older sessions of the same participant in the same room that lost
        /// their binding to this one.
        superseded: Vec<SessionId>,
    },
}

struct SessionEntry {
    sender: EventSender,
    connected_at: DateTime<Utc>,
    binding: Option<SessionBinding>,
}

#[derive(Default)]
struct RegistryInner {
    /// Every attached session, bound or not.
    sessions: HashMap<SessionId, SessionEntry>,
    /// Reverse mapping: room -> bound sessions.
    rooms: HashMap<RoomId, HashSet<SessionId>>,
}

impl RegistryInner {
    fn detach_from_room(&mut self, session_id: SessionId, room_id: &RoomId) {
        if let Some(members) = self.rooms.get_mut(room_id) {
            members.remove(&session_id);
            if members.is_empty() {
                self.rooms.remove(room_id);
            }
        }
    }
}

/// Thread-safe registry of live sessions and their room bindings.
///
/// All lock acquisitions are short map operations that never span an
/// `.await`, so a `std::sync::RwLock` is used. Broadcasts copy the target
/// senders out under the read lock and deliver after releasing it.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        lock::read(&self.inner, "room registry")
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        lock::write(&self.inner, "room registry")
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        lock::poison(&self.inner);
    }

    /// Attaches a freshly opened connection. It receives nothing until bound.
    pub fn attach(&self, session_id: SessionId, sender: EventSender) {
        let entry = SessionEntry {
            sender,
            connected_at: Utc::now(),
            binding: None,
        };
        if self.write().sessions.insert(session_id, entry).is_some() {
            tracing::warn!(session_id = %session_id, "session id attached twice; replaced sender");
        }
    }

    /// Removes a session entirely, returning the binding it held.
    pub fn detach(&self, session_id: SessionId) -> Option<SessionBinding> {
        let mut inner = self.write();
        let entry = inner.sessions.remove(&session_id)?;
        let binding = entry.binding?;
        inner.detach_from_room(session_id, &binding.room_id);
        Some(binding)
    }

    /// Binds a session to a room as the given participant.
    ///
    /// Returns `None` if the session is not attached.
    pub fn register(
        &self,
        session_id: SessionId,
        room_id: RoomId,
        participant_id: ParticipantId,
    ) -> Option<Registration> {
        let mut inner = self.write();
        let binding = SessionBinding {
            room_id,
            participant_id,
        };

        let previous = {
            let entry = inner.sessions.get(&session_id)?;
            if entry.binding.as_ref() == Some(&binding) {
                return Some(Registration::Unchanged);
            }
            entry.binding.clone()
        };

        if let Some(ref old) = previous {
            inner.detach_from_room(session_id, &old.room_id);
        }

        // A participant holds at most one bound session per room.
        let superseded: Vec<SessionId> = inner
            .rooms
            .get(&binding.room_id)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|other| {
                        inner
                            .sessions
                            .get(other)
                            .and_then(|e| e.binding.as_ref())
                            .is_some_and(|b| b.participant_id == binding.participant_id)
                    })
                    .collect()
            })
            .unwrap_or_default();

        for other in &superseded {
            if let Some(entry) = inner.sessions.get_mut(other) {
                entry.binding = None;
            }
            inner.detach_from_room(*other, &binding.room_id);
        }

        inner
            .rooms
            .entry(binding.room_id.clone())
            .or_default()
            .insert(session_id);
        if let Some(entry) = inner.sessions.get_mut(&session_id) {
            entry.binding = Some(binding);
        }

        Some(Registration::Bound {
            previous,
            superseded,
        })
    }

    /// Removes a session's room binding but keeps the connection attached.
    pub fn unregister(&self, session_id: SessionId) -> Option<SessionBinding> {
        let mut inner = self.write();
        let binding = inner.sessions.get_mut(&session_id)?.binding.take()?;
        inner.detach_from_room(session_id, &binding.room_id);
        Some(binding)
    }

    /// Unbinds every session of a room, returning the affected sessions.
    pub fn unbind_room(&self, room_id: &RoomId) -> Vec<(SessionId, SessionBinding)> {
        let mut inner = self.write();
        let Some(members) = inner.rooms.remove(room_id) else {
            return Vec::new();
        };
        members
            .into_iter()
            .filter_map(|session_id| {
                let binding = inner.sessions.get_mut(&session_id)?.binding.take()?;
                Some((session_id, binding))
            })
            .collect()
    }

    /// Current binding of a session.
    pub fn binding(&self, session_id: SessionId) -> Option<SessionBinding> {
        self.read()
            .sessions
            .get(&session_id)
            .and_then(|e| e.binding.clone())
    }

    /// Returns `true` if the session is attached.
    pub fn contains(&self, session_id: SessionId) -> bool {
        self.read().sessions.contains_key(&session_id)
    }

    /// Snapshot of the sessions bound to a room.
    pub fn sessions_in_room(&self, room_id: &RoomId) -> Vec<SessionInfo> {
        let inner = self.read();
        let Some(members) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|session_id| {
                inner.sessions.get(session_id).map(|e| SessionInfo {
                    session_id: *session_id,
                    binding: e.binding.clone(),
                    connected_at: e.connected_at,
                })
            })
            .collect()
    }

    /// Distinct participants bound to a room. This is the room membership view.
    pub fn participants_in_room(&self, room_id: &RoomId) -> Vec<ParticipantId> {
        let inner = self.read();
        let Some(members) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        let mut participants: Vec<ParticipantId> = members
            .iter()
            .filter_map(|id| inner.sessions.get(id))
            .filter_map(|e| e.binding.as_ref().map(|b| b.participant_id.clone()))
            .collect();
        participants.sort();
        participants.dedup();
        participants
    }

    /// Number of sessions bound to a room.
    pub fn room_size(&self, room_id: &RoomId) -> usize {
        self.read().rooms.get(room_id).map_or(0, HashSet::len)
    }

    /// Returns `true` if any attached session is bound as this participant.
    pub fn is_participant_connected(&self, participant_id: &ParticipantId) -> bool {
        self.read().sessions.values().any(|e| {
            e.binding
                .as_ref()
                .is_some_and(|b| &b.participant_id == participant_id)
        })
    }

    /// Delivers an event to every session bound to a room, except `exclude`.
    ///
    /// Delivery never waits: a full queue drops the event for that session
    /// only. Returns the number of sessions the event was queued for.
    pub fn broadcast(
        &self,
        room_id: &RoomId,
        event: OutboundEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let targets: Vec<(SessionId, EventSender)> = {
            let inner = self.read();
            let Some(members) = inner.rooms.get(room_id) else {
                tracing::debug!(room_id = %room_id, event = event.name(), "broadcast to empty room");
                return 0;
            };
            members
                .iter()
                .filter(|id| Some(**id) != exclude)
                .filter_map(|id| inner.sessions.get(id).map(|e| (*id, e.sender.clone())))
                .collect()
        };

        let event = Arc::new(event);
        let mut delivered = 0;
        for (session_id, sender) in targets {
            if deliver(session_id, &sender, Arc::clone(&event)) {
                delivered += 1;
            }
        }
        tracing::debug!(room_id = %room_id, event = event.name(), delivered, "broadcast");
        delivered
    }

    /// Delivers an event to a single session.
    pub fn send(&self, session_id: SessionId, event: OutboundEvent) -> bool {
        let sender = self.read().sessions.get(&session_id).map(|e| e.sender.clone());
        match sender {
            Some(sender) => deliver(session_id, &sender, Arc::new(event)),
            None => {
                tracing::debug!(session_id = %session_id, "direct send to unknown session");
                false
            }
        }
    }
}

fn deliver(session_id: SessionId, sender: &EventSender, event: Arc<OutboundEvent>) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            tracing::warn!(
                session_id = %session_id,
                event = event.name(),
                "dropping event for slow consumer"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(session_id = %session_id, "session queue closed");
            false
        }
    }
}
