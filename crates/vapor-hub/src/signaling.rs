//! Call signaling handlers.

use crate::calls::MediaToggle;
use crate::hub::Hub;
use crate::registry::SessionBinding;
use vapor_types::events::{CallTarget, RoomTarget};
use vapor_types::{CallId, CallPeer, HubError, OutboundEvent, ParticipantId, Reply, RoomId, SessionId};

impl Hub {
    /// Binding of a session that is bound as `participant_id`.
    ///
    /// Call events may only speak for the participant their session is
    /// bound as.
    fn acting_as(&self, session_id: SessionId, participant_id: &ParticipantId) -> Result<SessionBinding, HubError> {
        self.registry()
            .binding(session_id)
            .filter(|b| &b.participant_id == participant_id)
            .ok_or_else(|| HubError::ParticipantNotFound(participant_id.clone()))
    }

    /// Checks that the session speaks for `target.participant_id` inside the
    /// room the call belongs to.
    fn call_member(&self, session_id: SessionId, target: &CallTarget) -> Result<SessionBinding, HubError> {
        let binding = self.acting_as(session_id, &target.participant_id)?;
        let room_id = self
            .calls()
            .room_of(&target.call_id)
            .ok_or_else(|| HubError::CallNotFound(target.call_id.clone()))?;
        if room_id != binding.room_id {
            return Err(HubError::ParticipantNotFound(target.participant_id.clone()));
        }
        Ok(binding)
    }

    pub(crate) fn call_start(&self, session_id: SessionId, target: RoomTarget) -> Result<Reply, HubError> {
        let RoomTarget {
            room_id,
            participant_id,
        } = target;
        self.ensure_room(&room_id)?;
        let binding = self.acting_as(session_id, &participant_id)?;
        if binding.room_id != room_id {
            return Err(HubError::ParticipantNotFound(participant_id));
        }
        let initiator = self.member_profile(&room_id, &participant_id)?;

        let ring: Vec<ParticipantId> = self
            .registry()
            .participants_in_room(&room_id)
            .into_iter()
            .filter(|p| p != &participant_id && self.presence().is_online(p))
            .collect();

        let call = self.calls().start(&room_id, &participant_id, &ring)?;
        tracing::info!(
            call_id = %call.id,
            room_id = %room_id,
            initiator = %participant_id,
            ringing = ring.len(),
            "call started"
        );

        self.registry().broadcast(
            &room_id,
            OutboundEvent::CallIncoming {
                call_id: call.id.clone(),
                initiator: CallPeer {
                    id: initiator.id,
                    display_name: initiator.display_name,
                    avatar: initiator.avatar,
                },
            },
            Some(session_id),
        );
        self.spawn_provisioning(call.id.clone());

        Ok(Reply::Call {
            call_id: call.id,
            room_url: call.room_url,
        })
    }

    /// Provisions the external call room in the background.
    ///
    /// The call never waits on this; a failure leaves it without a URL.
    fn spawn_provisioning(&self, call_id: CallId) {
        if !self.provisioner().is_enabled() {
            tracing::debug!(call_id = %call_id, "call room provisioning disabled");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(call_id = %call_id, "no runtime available; skipping call room provisioning");
            return;
        };
        let provisioning = self.provisioner().provision(&call_id);
        let hub = self.clone();
        runtime.spawn(async move {
            match provisioning.await {
                Ok(room_url) => hub.complete_provisioning(&call_id, room_url),
                Err(e) => {
                    tracing::warn!(
                        call_id = %call_id,
                        error = %e,
                        "call room provisioning failed; call continues degraded"
                    );
                }
            }
        });
    }

    fn complete_provisioning(&self, call_id: &CallId, room_url: String) {
        match self.calls().set_room_url(call_id, room_url.clone()) {
            Some(room_id) => {
                tracing::info!(call_id = %call_id, room_url = %room_url, "call room ready");
                self.registry().broadcast(
                    &room_id,
                    OutboundEvent::CallStarted {
                        call_id: call_id.clone(),
                        room_url,
                    },
                    None,
                );
            }
            None => {
                tracing::debug!(call_id = %call_id, "call ended before its room was provisioned");
            }
        }
    }

    pub(crate) fn call_accept(&self, session_id: SessionId, target: CallTarget) -> Result<Reply, HubError> {
        let binding = self.call_member(session_id, &target)?;
        self.member_profile(&binding.room_id, &target.participant_id)?;
        let attendance = self.calls().accept(&target.call_id, &target.participant_id)?;
        if attendance.newly_joined {
            self.announce_join(session_id, &attendance.room_id, &target);
        }
        Ok(Reply::Call {
            call_id: target.call_id,
            room_url: attendance.room_url,
        })
    }

    pub(crate) fn call_join(&self, session_id: SessionId, target: CallTarget) -> Result<Reply, HubError> {
        let binding = self.call_member(session_id, &target)?;
        self.member_profile(&binding.room_id, &target.participant_id)?;
        let attendance = self.calls().join(&target.call_id, &target.participant_id)?;
        if attendance.newly_joined {
            self.announce_join(session_id, &attendance.room_id, &target);
        }
        Ok(Reply::Call {
            call_id: target.call_id,
            room_url: attendance.room_url,
        })
    }

    fn announce_join(&self, session_id: SessionId, room_id: &RoomId, target: &CallTarget) {
        let Some(participant) = self.call_peer(&target.participant_id) else {
            tracing::warn!(
                call_id = %target.call_id,
                participant_id = %target.participant_id,
                "joined call but missing from directory; not announcing"
            );
            return;
        };
        self.registry().broadcast(
            room_id,
            OutboundEvent::CallParticipantJoined {
                call_id: target.call_id.clone(),
                participant,
            },
            Some(session_id),
        );
    }

    pub(crate) fn call_decline(&self, session_id: SessionId, target: CallTarget) {
        if let Err(e) = self.call_member(session_id, &target) {
            tracing::debug!(session_id = %session_id, error = %e, "dropping call:decline");
            return;
        }
        match self.calls().decline(&target.call_id, &target.participant_id) {
            Ok(true) => {
                tracing::debug!(call_id = %target.call_id, participant_id = %target.participant_id, "call declined");
            }
            Ok(false) => {}
            Err(e) => tracing::debug!(error = %e, "dropping call:decline"),
        }
    }

    pub(crate) fn call_leave(&self, session_id: SessionId, target: CallTarget) {
        if let Err(e) = self.call_member(session_id, &target) {
            tracing::debug!(session_id = %session_id, error = %e, "dropping call:leave");
            return;
        }
        let departure = match self.calls().leave(&target.call_id, &target.participant_id) {
            Ok(departure) => departure,
            Err(e) => {
                tracing::debug!(error = %e, "dropping call:leave");
                return;
            }
        };
        if departure.left {
            self.registry().broadcast(
                &departure.room_id,
                OutboundEvent::CallParticipantLeft {
                    call_id: target.call_id.clone(),
                    participant_id: target.participant_id.clone(),
                },
                Some(session_id),
            );
        }
        if departure.ended {
            tracing::info!(call_id = %target.call_id, room_id = %departure.room_id, "call ended");
            self.registry().broadcast(
                &departure.room_id,
                OutboundEvent::CallEnded {
                    call_id: target.call_id,
                },
                None,
            );
        }
    }

    pub(crate) fn call_toggle_audio(
        &self,
        session_id: SessionId,
        call_id: &CallId,
        participant_id: &ParticipantId,
        is_muted: bool,
    ) {
        self.apply_toggle(session_id, call_id, participant_id, MediaToggle::Audio { is_muted });
    }

    pub(crate) fn call_toggle_video(
        &self,
        session_id: SessionId,
        call_id: &CallId,
        participant_id: &ParticipantId,
        is_video_enabled: bool,
    ) {
        self.apply_toggle(
            session_id,
            call_id,
            participant_id,
            MediaToggle::Video { is_video_enabled },
        );
    }

    fn apply_toggle(
        &self,
        session_id: SessionId,
        call_id: &CallId,
        participant_id: &ParticipantId,
        toggle: MediaToggle,
    ) {
        let target = CallTarget {
            call_id: call_id.clone(),
            participant_id: participant_id.clone(),
        };
        if let Err(e) = self.call_member(session_id, &target) {
            tracing::debug!(session_id = %session_id, error = %e, "dropping media toggle");
            return;
        }
        let room_id = match self.calls().toggle(call_id, participant_id, toggle) {
            Ok(room_id) => room_id,
            Err(e) => {
                tracing::debug!(error = %e, "dropping media toggle");
                return;
            }
        };
        let (is_muted, is_video_enabled) = match toggle {
            MediaToggle::Audio { is_muted } => (Some(is_muted), None),
            MediaToggle::Video { is_video_enabled } => (None, Some(is_video_enabled)),
        };
        self.registry().broadcast(
            &room_id,
            OutboundEvent::CallParticipantUpdated {
                call_id: call_id.clone(),
                participant_id: participant_id.clone(),
                is_muted,
                is_video_enabled,
            },
            Some(session_id),
        );
    }
}
