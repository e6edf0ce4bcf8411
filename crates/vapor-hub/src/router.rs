//! Inbound event dispatch and the room-scoped handlers.
//!
//! Call handlers live in [`crate::signaling`]; connect/disconnect in
//! [`crate::session`].

use crate::hub::Hub;
use crate::lock;
use crate::presence::Touch;
use crate::registry::Registration;
use vapor_types::{
    Ack, ClientFrame, HubError, InboundEvent, OutboundEvent, ParticipantId, Reply, SessionId,
    TypingIndicator,
};
use vapor_types::events::{RoomTarget, TypingPayload};

impl Hub {
    /// Handles one decoded frame from a session.
    ///
    /// Activity is recorded before the handler runs. Request/response events
    /// are answered with an `ack` on the session's own queue.
    ///
    /// # Errors
    ///
    /// [`HubError::Internal`] if handling the frame ran into a poisoned hub
    /// lock. The session has already been disconnected; the transport should
    /// close it.
    pub fn dispatch(&self, session_id: SessionId, frame: ClientFrame) -> Result<(), HubError> {
        let ClientFrame { request_id, event } = frame;
        tracing::debug!(session_id = %session_id, event = event.name(), "inbound event");
        lock::take_recovered();

        self.record_activity(session_id);

        if let Some(result) = self.handle(session_id, event) {
            if let Err(ref e) = result {
                tracing::debug!(session_id = %session_id, error = %e, "request rejected");
            }
            let ack = Ack::from_result(request_id, result);
            self.registry().send(session_id, OutboundEvent::Ack(ack));
        }

        let recovered = lock::take_recovered();
        if recovered > 0 {
            tracing::error!(
                session_id = %session_id,
                recovered,
                "hub state recovered from a poisoned lock; tearing session down"
            );
            self.disconnect(session_id);
            return Err(HubError::Internal(format!(
                "{recovered} poisoned lock(s) recovered while handling the frame"
            )));
        }
        Ok(())
    }

    /// Runs the handler for one event.
    ///
    /// Returns `Some` with the reply for request/response events and `None`
    /// for fire-and-forget events.
    pub fn handle(&self, session_id: SessionId, event: InboundEvent) -> Option<Result<Reply, HubError>> {
        match event {
            InboundEvent::RoomJoin(target) => Some(self.room_join(session_id, target)),
            InboundEvent::RoomLeave(target) => {
                self.room_leave(session_id, target);
                None
            }
            InboundEvent::TypingStart(payload) => {
                self.typing(session_id, payload, true);
                None
            }
            InboundEvent::TypingStop(payload) => {
                self.typing(session_id, payload, false);
                None
            }
            InboundEvent::UpdateStatus {
                participant_id,
                is_online,
            } => {
                self.update_status(session_id, &participant_id, is_online);
                None
            }
            InboundEvent::CallStart(target) => Some(self.call_start(session_id, target)),
            InboundEvent::CallAccept(target) => Some(self.call_accept(session_id, target)),
            InboundEvent::CallDecline(target) => {
                self.call_decline(session_id, target);
                None
            }
            InboundEvent::CallJoin(target) => Some(self.call_join(session_id, target)),
            InboundEvent::CallLeave(target) => {
                self.call_leave(session_id, target);
                None
            }
            InboundEvent::CallToggleAudio {
                call_id,
                participant_id,
                is_muted,
            } => {
                self.call_toggle_audio(session_id, &call_id, &participant_id, is_muted);
                None
            }
            InboundEvent::CallToggleVideo {
                call_id,
                participant_id,
                is_video_enabled,
            } => {
                self.call_toggle_video(session_id, &call_id, &participant_id, is_video_enabled);
                None
            }
            // Activity was already recorded by `dispatch`.
            InboundEvent::Heartbeat => None,
        }
    }

    /// Refreshes presence for the participant bound to a session, bringing
    /// it back online if the sweep had flipped it offline.
    fn record_activity(&self, session_id: SessionId) {
        let Some(binding) = self.registry().binding(session_id) else {
            return;
        };
        if let Touch::Revived(record) = self.presence().touch(&binding.participant_id) {
            tracing::debug!(participant_id = %binding.participant_id, "participant active again");
            self.broadcast_presence(&record, Some(session_id));
        }
    }

    fn room_join(&self, session_id: SessionId, target: RoomTarget) -> Result<Reply, HubError> {
        let RoomTarget {
            room_id,
            participant_id,
        } = target;
        self.ensure_room(&room_id)?;
        self.member_profile(&room_id, &participant_id)?;

        let registration = self
            .registry()
            .register(session_id, room_id.clone(), participant_id.clone())
            .ok_or(HubError::TransportClosed(session_id))?;

        let reply = Reply::Joined {
            room_id: room_id.clone(),
            participant_id: participant_id.clone(),
        };
        let Registration::Bound {
            previous,
            superseded,
        } = registration
        else {
            return Ok(reply);
        };

        for old in &superseded {
            tracing::warn!(
                session_id = %old,
                participant_id = %participant_id,
                "session superseded by a newer connection"
            );
        }
        if let Some(previous) = previous {
            self.release(session_id, &previous);
        }

        let record = self.presence().mark_online(&participant_id, &room_id, session_id);
        self.broadcast_presence(&record, Some(session_id));
        tracing::info!(
            session_id = %session_id,
            room_id = %room_id,
            participant_id = %participant_id,
            "participant joined room"
        );
        Ok(reply)
    }

    fn room_leave(&self, session_id: SessionId, target: RoomTarget) {
        let bound = self.registry().binding(session_id).filter(|b| {
            b.room_id == target.room_id && b.participant_id == target.participant_id
        });
        if bound.is_none() {
            tracing::debug!(
                session_id = %session_id,
                room_id = %target.room_id,
                "room:leave for a room the session is not bound to"
            );
            return;
        }
        if let Some(binding) = self.registry().unregister(session_id) {
            self.release(session_id, &binding);
            tracing::info!(
                session_id = %session_id,
                room_id = %binding.room_id,
                participant_id = %binding.participant_id,
                "participant left room"
            );
        }
    }

    fn typing(&self, session_id: SessionId, payload: TypingPayload, started: bool) {
        let in_room = self
            .registry()
            .binding(session_id)
            .is_some_and(|b| b.room_id == payload.room_id);
        if !in_room {
            tracing::debug!(
                session_id = %session_id,
                room_id = %payload.room_id,
                "dropping typing indicator from a session outside the room"
            );
            return;
        }
        let indicator = TypingIndicator {
            participant_id: payload.participant_id,
            display_name: payload.display_name,
            avatar: payload.avatar,
        };
        let event = if started {
            OutboundEvent::TypingStart(indicator)
        } else {
            OutboundEvent::TypingStop(indicator)
        };
        self.registry().broadcast(&payload.room_id, event, Some(session_id));
    }

    fn update_status(&self, session_id: SessionId, participant_id: &ParticipantId, is_online: bool) {
        match self.presence().set_status(participant_id, is_online) {
            Some(record) => {
                self.broadcast_presence(&record, Some(session_id));
            }
            None => {
                tracing::debug!(participant_id = %participant_id, "status update for unknown participant");
            }
        }
    }
}
