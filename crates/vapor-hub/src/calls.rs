//! Call state machine: at most one live call per room.
//!
//! Each room owns a slot guarded by its own mutex, so the
//! check-then-create in [`CallStateMachine::start`] is atomic per room and
//! rooms never contend with each other. Lock order is always
//! `rooms map -> room slot -> call index`; the index lock is never held
//! while a slot is being acquired.

use crate::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use vapor_types::{CallId, CallParticipantStatus, CallStatus, HubError, ParticipantId, RoomId};

/// Ended calls remembered per room, so late joiners get `CallEnded`.
pub const MAX_ENDED_CALLS_PER_ROOM: usize = 32;

/// A participant's membership in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    pub participant_id: ParticipantId,
    pub status: CallParticipantStatus,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_muted: bool,
    pub is_video_enabled: bool,
}

impl CallParticipant {
    fn ringing(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            status: CallParticipantStatus::Ringing,
            joined_at: None,
            left_at: None,
            is_muted: false,
            is_video_enabled: true,
        }
    }

    fn joined(participant_id: ParticipantId, now: DateTime<Utc>) -> Self {
        Self {
            participant_id,
            status: CallParticipantStatus::Joined,
            joined_at: Some(now),
            left_at: None,
            is_muted: false,
            is_video_enabled: true,
        }
    }

    fn transition(&mut self, call_id: &CallId, next: CallParticipantStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                call_id = %call_id,
                participant_id = %self.participant_id,
                from = ?self.status,
                to = ?next,
                "ignoring invalid call participant transition"
            );
            return false;
        }
        self.status = next;
        true
    }
}

/// A voice/video call scoped to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    pub room_id: RoomId,
    pub initiator_id: ParticipantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: CallStatus,
    /// External call-room URL; filled in once provisioning completes.
    pub room_url: Option<String>,
    pub participants: Vec<CallParticipant>,
}

impl Call {
    /// Row of a participant, if any.
    pub fn participant(&self, participant_id: &ParticipantId) -> Option<&CallParticipant> {
        self.participants
            .iter()
            .find(|p| &p.participant_id == participant_id)
    }

    fn participant_mut(&mut self, participant_id: &ParticipantId) -> Option<&mut CallParticipant> {
        self.participants
            .iter_mut()
            .find(|p| &p.participant_id == participant_id)
    }

    /// Number of rows currently `joined`.
    pub fn joined_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.status == CallParticipantStatus::Joined)
            .count()
    }

    fn set_status(&mut self, next: CallStatus) {
        if self.status.can_transition_to(next) {
            self.status = next;
        } else {
            tracing::error!(
                call_id = %self.id,
                from = ?self.status,
                to = ?next,
                "refusing backward call status transition"
            );
        }
    }

    fn end(&mut self, now: DateTime<Utc>) {
        self.set_status(CallStatus::Ended);
        self.ended_at = Some(now);
    }
}

/// Result of accepting or joining a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendance {
    pub room_id: RoomId,
    pub room_url: Option<String>,
    /// `false` if the participant was already joined.
    pub newly_joined: bool,
}

/// Result of leaving a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    /// `true` if a joined row moved to `left`.
    pub left: bool,
    /// `true` if this departure ended the call.
    pub ended: bool,
}

/// Result of releasing a disconnecting participant from a room's live call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub call_id: CallId,
    pub left: bool,
    pub declined: bool,
    pub ended: bool,
}

/// Media flag change requested by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaToggle {
    Audio { is_muted: bool },
    Video { is_video_enabled: bool },
}

#[derive(Default)]
struct RoomCalls {
    live: Option<Call>,
    ended: VecDeque<Call>,
}

impl RoomCalls {
    fn find_mut(&mut self, call_id: &CallId) -> Option<&mut Call> {
        if self.live.as_ref().is_some_and(|c| &c.id == call_id) {
            return self.live.as_mut();
        }
        self.ended.iter_mut().find(|c| &c.id == call_id)
    }

    /// Moves the live call into the ended history, returning any call
    /// evicted from the bounded history.
    fn retire_live(&mut self) -> Option<CallId> {
        let call = self.live.take()?;
        self.ended.push_back(call);
        if self.ended.len() > MAX_ENDED_CALLS_PER_ROOM {
            return self.ended.pop_front().map(|c| c.id);
        }
        None
    }
}

type RoomSlot = Arc<Mutex<RoomCalls>>;

#[derive(Default)]
struct CallsInner {
    rooms: RwLock<HashMap<RoomId, RoomSlot>>,
    index: RwLock<HashMap<CallId, RoomId>>,
}

/// Thread-safe call state machine.
#[derive(Clone, Default)]
pub struct CallStateMachine {
    inner: Arc<CallsInner>,
}

fn lock_slot(slot: &RoomSlot) -> MutexGuard<'_, RoomCalls> {
    lock::lock(slot, "call slot")
}

impl CallStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, room_id: &RoomId) -> Option<RoomSlot> {
        lock::read(&self.inner.rooms, "call rooms").get(room_id).cloned()
    }

    fn slot_or_create(&self, room_id: &RoomId) -> RoomSlot {
        if let Some(slot) = self.slot(room_id) {
            return slot;
        }
        let mut rooms = lock::write(&self.inner.rooms, "call rooms");
        Arc::clone(rooms.entry(room_id.clone()).or_default())
    }

    /// Room a remembered call belongs to.
    pub fn room_of(&self, call_id: &CallId) -> Option<RoomId> {
        lock::read(&self.inner.index, "call index").get(call_id).cloned()
    }

    fn index_insert(&self, call_id: CallId, room_id: RoomId) {
        lock::write(&self.inner.index, "call index").insert(call_id, room_id);
    }

    fn index_remove(&self, call_id: &CallId) {
        lock::write(&self.inner.index, "call index").remove(call_id);
    }

    /// Runs `f` against a call under its room's lock.
    fn with_call<T>(
        &self,
        call_id: &CallId,
        f: impl FnOnce(&mut Call) -> Result<T, HubError>,
    ) -> Result<(T, Option<CallId>), HubError> {
        let room_id = self
            .room_of(call_id)
            .ok_or_else(|| HubError::CallNotFound(call_id.clone()))?;
        let slot = self
            .slot(&room_id)
            .ok_or_else(|| HubError::CallNotFound(call_id.clone()))?;
        let mut calls = lock_slot(&slot);
        let call = calls
            .find_mut(call_id)
            .ok_or_else(|| HubError::CallNotFound(call_id.clone()))?;
        let out = f(call)?;
        let evicted = if calls.live.as_ref().is_some_and(|c| !c.status.is_live()) {
            calls.retire_live()
        } else {
            None
        };
        drop(calls);
        if let Some(ref evicted_id) = evicted {
            self.index_remove(evicted_id);
        }
        Ok((out, evicted))
    }

    /// Starts a call in a room.
    ///
    /// The initiator is joined immediately and every participant in `ring`
    /// (other than the initiator) gets a `ringing` row.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::CallAlreadyActive`] if the room already has a live call.
    pub fn start(
        &self,
        room_id: &RoomId,
        initiator: &ParticipantId,
        ring: &[ParticipantId],
    ) -> Result<Call, HubError> {
        let slot = self.slot_or_create(room_id);
        let mut calls = lock_slot(&slot);
        if calls.live.is_some() {
            return Err(HubError::CallAlreadyActive(room_id.clone()));
        }

        let now = Utc::now();
        let mut call = Call {
            id: CallId::generate(),
            room_id: room_id.clone(),
            initiator_id: initiator.clone(),
            started_at: now,
            ended_at: None,
            status: CallStatus::Ringing,
            room_url: None,
            participants: vec![CallParticipant::joined(initiator.clone(), now)],
        };
        for participant_id in ring {
            if call.participant(participant_id).is_none() {
                call.participants
                    .push(CallParticipant::ringing(participant_id.clone()));
            }
        }
        call.set_status(CallStatus::Active);

        // Indexed while the slot is still held so no other start can observe
        // the room as free.
        self.index_insert(call.id.clone(), room_id.clone());
        calls.live = Some(call.clone());
        Ok(call)
    }

    /// Accepts a ringing invitation.
    ///
    /// A participant with no row or a terminal row is handled like
    /// [`CallStateMachine::join`].
    ///
    /// # Errors
    ///
    /// [`HubError::CallNotFound`] for unknown calls, [`HubError::CallEnded`]
    /// once the call is over.
    pub fn accept(&self, call_id: &CallId, participant_id: &ParticipantId) -> Result<Attendance, HubError> {
        self.attend(call_id, participant_id)
    }

    /// Joins a call, creating a fresh `joined` row for late joiners and for
    /// participants who previously declined or left.
    ///
    /// # Errors
    ///
    /// [`HubError::CallNotFound`] for unknown calls, [`HubError::CallEnded`]
    /// once the call is over.
    pub fn join(&self, call_id: &CallId, participant_id: &ParticipantId) -> Result<Attendance, HubError> {
        self.attend(call_id, participant_id)
    }

    fn attend(&self, call_id: &CallId, participant_id: &ParticipantId) -> Result<Attendance, HubError> {
        let (attendance, _) = self.with_call(call_id, |call| {
            if !call.status.is_live() {
                return Err(HubError::CallEnded(call_id.clone()));
            }
            let now = Utc::now();
            let newly_joined = match call.participant_mut(participant_id) {
                Some(row) if row.status == CallParticipantStatus::Joined => false,
                Some(row) if row.status == CallParticipantStatus::Ringing => {
                    row.transition(call_id, CallParticipantStatus::Joined);
                    row.joined_at = Some(now);
                    true
                }
                Some(row) => {
                    *row = CallParticipant::joined(participant_id.clone(), now);
                    true
                }
                None => {
                    call.participants
                        .push(CallParticipant::joined(participant_id.clone(), now));
                    true
                }
            };
            Ok(Attendance {
                room_id: call.room_id.clone(),
                room_url: call.room_url.clone(),
                newly_joined,
            })
        })?;
        Ok(attendance)
    }

    /// Declines a ringing invitation. Returns `true` if a row changed.
    ///
    /// # Errors
    ///
    /// [`HubError::CallNotFound`] for unknown calls.
    pub fn decline(&self, call_id: &CallId, participant_id: &ParticipantId) -> Result<bool, HubError> {
        let (changed, _) = self.with_call(call_id, |call| {
            if !call.status.is_live() {
                return Ok(false);
            }
            Ok(call
                .participant_mut(participant_id)
                .is_some_and(|row| row.transition(call_id, CallParticipantStatus::Declined)))
        })?;
        Ok(changed)
    }

    /// Leaves a call. Ends the call when no joined row remains.
    ///
    /// # Errors
    ///
    /// [`HubError::CallNotFound`] for unknown calls.
    pub fn leave(&self, call_id: &CallId, participant_id: &ParticipantId) -> Result<Departure, HubError> {
        let (departure, _) = self.with_call(call_id, |call| {
            let room_id = call.room_id.clone();
            if !call.status.is_live() {
                return Ok(Departure {
                    room_id,
                    left: false,
                    ended: false,
                });
            }
            let now = Utc::now();
            let left = match call.participant_mut(participant_id) {
                Some(row) => {
                    let moved = row.transition(call_id, CallParticipantStatus::Left);
                    if moved {
                        row.left_at = Some(now);
                    }
                    moved
                }
                None => false,
            };
            let ended = left && call.joined_count() == 0;
            if ended {
                call.end(now);
            }
            Ok(Departure { room_id, left, ended })
        })?;
        Ok(departure)
    }

    /// Applies a mute/video flag change. Returns the call's room.
    ///
    /// # Errors
    ///
    /// [`HubError::CallNotFound`] for unknown calls.
    pub fn toggle(
        &self,
        call_id: &CallId,
        participant_id: &ParticipantId,
        toggle: MediaToggle,
    ) -> Result<RoomId, HubError> {
        let (room_id, _) = self.with_call(call_id, |call| {
            if let Some(row) = call.participant_mut(participant_id) {
                match toggle {
                    MediaToggle::Audio { is_muted } => row.is_muted = is_muted,
                    MediaToggle::Video { is_video_enabled } => row.is_video_enabled = is_video_enabled,
                }
            }
            Ok(call.room_id.clone())
        })?;
        Ok(room_id)
    }

    /// Stores the provisioned call-room URL on a live call.
    ///
    /// Returns the call's room, or `None` if the call is unknown or over.
    pub fn set_room_url(&self, call_id: &CallId, room_url: String) -> Option<RoomId> {
        self.with_call(call_id, |call| {
            if !call.status.is_live() {
                return Ok(None);
            }
            call.room_url = Some(room_url);
            Ok(Some(call.room_id.clone()))
        })
        .ok()
        .and_then(|(room, _)| room)
    }

    /// Releases a participant from the room's live call on disconnect:
    /// a joined row leaves (possibly ending the call) and a ringing row
    /// declines.
    pub fn release_participant(&self, room_id: &RoomId, participant_id: &ParticipantId) -> Option<Release> {
        let slot = self.slot(room_id)?;
        let mut calls = lock_slot(&slot);
        let call = calls.live.as_mut()?;
        let call_id = call.id.clone();
        let row = call.participant_mut(participant_id)?;
        let now = Utc::now();

        let mut release = Release {
            call_id: call_id.clone(),
            left: false,
            declined: false,
            ended: false,
        };
        match row.status {
            CallParticipantStatus::Joined => {
                row.transition(&call_id, CallParticipantStatus::Left);
                row.left_at = Some(now);
                release.left = true;
            }
            CallParticipantStatus::Ringing => {
                row.transition(&call_id, CallParticipantStatus::Declined);
                release.declined = true;
            }
            CallParticipantStatus::Declined | CallParticipantStatus::Left => return None,
        }

        if release.left && call.joined_count() == 0 {
            call.end(now);
            release.ended = true;
        }
        let evicted = if release.ended { calls.retire_live() } else { None };
        drop(calls);
        if let Some(ref evicted_id) = evicted {
            self.index_remove(evicted_id);
        }
        Some(release)
    }

    /// Ends a room's live call regardless of who is still joined.
    ///
    /// Used only when the room itself goes away.
    pub fn force_end(&self, room_id: &RoomId) -> Option<CallId> {
        let slot = self.slot(room_id)?;
        let mut calls = lock_slot(&slot);
        let call = calls.live.as_mut()?;
        let now = Utc::now();
        let call_id = call.id.clone();
        for row in call.participants.iter_mut() {
            if row.status == CallParticipantStatus::Joined {
                row.transition(&call_id, CallParticipantStatus::Left);
                row.left_at = Some(now);
            }
        }
        call.end(now);
        let evicted = calls.retire_live();
        drop(calls);
        if let Some(ref evicted_id) = evicted {
            self.index_remove(evicted_id);
        }
        Some(call_id)
    }

    /// Forgets every call of a room.
    pub fn forget_room(&self, room_id: &RoomId) {
        let slot = {
            lock::write(&self.inner.rooms, "call rooms").remove(room_id)
        };
        let Some(slot) = slot else {
            return;
        };
        let ids: Vec<CallId> = {
            let calls = lock_slot(&slot);
            calls
                .live
                .iter()
                .chain(calls.ended.iter())
                .map(|c| c.id.clone())
                .collect()
        };
        for id in &ids {
            self.index_remove(id);
        }
    }

    /// Snapshot of a room's live call.
    pub fn live_call(&self, room_id: &RoomId) -> Option<Call> {
        let slot = self.slot(room_id)?;
        let calls = lock_slot(&slot);
        calls.live.clone()
    }

    /// Snapshot of any remembered call.
    pub fn call(&self, call_id: &CallId) -> Option<Call> {
        let room_id = self.room_of(call_id)?;
        let slot = self.slot(&room_id)?;
        let mut calls = lock_slot(&slot);
        calls.find_mut(call_id).map(|c| c.clone())
    }
}
