//! The [`Hub`] handle and the fan-out emitters used by the persistence layer.

use crate::calls::{Call, CallStateMachine};
use crate::config::HubConfig;
use crate::directory::ParticipantDirectory;
use crate::presence::{PresenceRecord, PresenceTracker};
use crate::provision::CallRoomProvisioner;
use crate::registry::RoomRegistry;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use vapor_types::{
    CallPeer, HubError, OutboundEvent, ParticipantId, ParticipantPresence, ParticipantProfile,
    Reaction, ReactionRef, RoomId, SessionId,
};

struct HubInner {
    registry: RoomRegistry,
    presence: PresenceTracker,
    calls: CallStateMachine,
    directory: Arc<dyn ParticipantDirectory>,
    provisioner: Arc<dyn CallRoomProvisioner>,
    config: HubConfig,
}

/// Cheaply cloneable handle to the room hub.
///
/// One hub is constructed at startup and shared by the transport adapter,
/// the internal HTTP API and the background sweep.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

/// Point-in-time view of a room, served by the status API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub connected_sessions: usize,
    pub online_participants: Vec<ParticipantId>,
    pub active_call: Option<Call>,
}

impl Hub {
    pub fn new(
        directory: Arc<dyn ParticipantDirectory>,
        provisioner: Arc<dyn CallRoomProvisioner>,
        config: HubConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry: RoomRegistry::new(),
                presence: PresenceTracker::new(config.presence_window),
                calls: CallStateMachine::new(),
                directory,
                provisioner,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.inner.registry
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.inner.presence
    }

    pub fn calls(&self) -> &CallStateMachine {
        &self.inner.calls
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub(crate) fn directory(&self) -> &dyn ParticipantDirectory {
        self.inner.directory.as_ref()
    }

    pub(crate) fn provisioner(&self) -> &Arc<dyn CallRoomProvisioner> {
        &self.inner.provisioner
    }

    pub(crate) fn ensure_room(&self, room_id: &RoomId) -> Result<(), HubError> {
        if self.directory().room_exists(room_id) {
            Ok(())
        } else {
            Err(HubError::RoomNotFound(room_id.clone()))
        }
    }

    /// Profile of a participant that belongs to `room_id`.
    pub(crate) fn member_profile(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> Result<ParticipantProfile, HubError> {
        self.directory()
            .participant(participant_id)
            .filter(|p| &p.room_id == room_id)
            .ok_or_else(|| HubError::ParticipantNotFound(participant_id.clone()))
    }

    pub(crate) fn call_peer(&self, participant_id: &ParticipantId) -> Option<CallPeer> {
        self.directory().participant(participant_id).map(|p| CallPeer {
            id: p.id,
            display_name: p.display_name,
            avatar: p.avatar,
        })
    }

    /// Combines a profile with whatever the tracker knows about it.
    fn presence_view(&self, profile: ParticipantProfile) -> ParticipantPresence {
        let last_seen_at = self
            .presence()
            .record(&profile.id)
            .map_or_else(Utc::now, |r| r.last_seen_at);
        let online = self.presence().is_online(&profile.id);
        ParticipantPresence::new(profile, online, last_seen_at)
    }

    /// Broadcasts `participant:update` for a presence change.
    ///
    /// A participant missing from the directory is logged and skipped.
    pub(crate) fn broadcast_presence(&self, record: &PresenceRecord, exclude: Option<SessionId>) -> usize {
        let Some(profile) = self.directory().participant(&record.participant_id) else {
            tracing::debug!(
                participant_id = %record.participant_id,
                "presence change for participant missing from directory"
            );
            return 0;
        };
        let presence = ParticipantPresence::new(profile, record.online, record.last_seen_at);
        self.registry().broadcast(
            &record.room_id,
            OutboundEvent::ParticipantUpdate(presence),
            exclude,
        )
    }

    fn emit(&self, room_id: &RoomId, event: OutboundEvent) -> Result<usize, HubError> {
        self.ensure_room(room_id)?;
        Ok(self.registry().broadcast(room_id, event, None))
    }

    /// Fans out a newly persisted message.
    pub fn message_new(&self, room_id: &RoomId, message: Value) -> Result<usize, HubError> {
        self.emit(room_id, OutboundEvent::MessageNew(message))
    }

    pub fn message_update(&self, room_id: &RoomId, message: Value) -> Result<usize, HubError> {
        self.emit(room_id, OutboundEvent::MessageUpdate(message))
    }

    pub fn message_delete(&self, room_id: &RoomId, message_id: String) -> Result<usize, HubError> {
        self.emit(room_id, OutboundEvent::MessageDelete(message_id))
    }

    pub fn reaction_add(&self, room_id: &RoomId, reaction: Reaction) -> Result<usize, HubError> {
        self.emit(room_id, OutboundEvent::ReactionAdd(reaction))
    }

    pub fn reaction_remove(&self, room_id: &RoomId, reaction: ReactionRef) -> Result<usize, HubError> {
        self.emit(room_id, OutboundEvent::ReactionRemove(reaction))
    }

    /// Announces a participant record created by the persistence layer.
    pub fn participant_join(&self, profile: ParticipantProfile) -> Result<usize, HubError> {
        let room_id = profile.room_id.clone();
        let presence = self.presence_view(profile);
        self.emit(&room_id, OutboundEvent::ParticipantJoin(presence))
    }

    /// Announces a participant record deleted by the persistence layer.
    ///
    /// Presence for the participant is dropped; a session still bound as that
    /// participant stays connected.
    pub fn participant_leave(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
    ) -> Result<usize, HubError> {
        if self.registry().is_participant_connected(participant_id) {
            tracing::info!(
                participant_id = %participant_id,
                "participant removed while connected; session stays bound until it leaves"
            );
        }
        self.presence().forget(participant_id);
        self.emit(room_id, OutboundEvent::ParticipantLeave(participant_id.clone()))
    }

    /// Announces a changed participant profile.
    ///
    /// # Errors
    ///
    /// [`HubError::ParticipantNotFound`] if the directory has no such participant.
    pub fn participant_update(&self, participant_id: &ParticipantId) -> Result<usize, HubError> {
        let profile = self
            .directory()
            .participant(participant_id)
            .ok_or_else(|| HubError::ParticipantNotFound(participant_id.clone()))?;
        let room_id = profile.room_id.clone();
        let presence = self.presence_view(profile);
        self.emit(&room_id, OutboundEvent::ParticipantUpdate(presence))
    }

    /// Snapshot of a room's live call.
    pub fn active_call(&self, room_id: &RoomId) -> Option<Call> {
        self.calls().live_call(room_id)
    }

    pub fn is_online(&self, participant_id: &ParticipantId) -> bool {
        self.presence().is_online(participant_id)
    }

    /// Connected sessions, online participants and the live call of a room.
    pub fn room_status(&self, room_id: &RoomId) -> Result<RoomStatus, HubError> {
        self.ensure_room(room_id)?;
        Ok(RoomStatus {
            room_id: room_id.clone(),
            connected_sessions: self.registry().room_size(room_id),
            online_participants: self.presence().online_in_room(room_id),
            active_call: self.active_call(room_id),
        })
    }

    /// Flips participants silent for longer than the presence window to
    /// offline and broadcasts the change. Returns how many were flipped.
    pub fn sweep_presence(&self) -> usize {
        let expired = self.presence().sweep(Instant::now());
        for record in &expired {
            tracing::debug!(
                participant_id = %record.participant_id,
                room_id = %record.room_id,
                "participant went quiet; marking offline"
            );
            self.broadcast_presence(record, None);
        }
        expired.len()
    }
}
