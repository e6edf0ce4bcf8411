//! Session lifecycle: connect, disconnect and room teardown.

use crate::hub::Hub;
use crate::registry::{EventReceiver, EventSender, SessionBinding};
use tokio::sync::mpsc;
use vapor_types::{OutboundEvent, RoomId, SessionId};

impl Hub {
    /// Attaches a transport connection. The session belongs to no room until
    /// it sends `room:join`.
    pub fn connect(&self, sender: EventSender) -> SessionId {
        let session_id = SessionId::generate();
        self.registry().attach(session_id, sender);
        tracing::info!(session_id = %session_id, "session connected");
        session_id
    }

    /// Opens a session with a queue of the configured capacity and returns
    /// the receiving half for the transport writer.
    pub fn open_session(&self) -> (SessionId, EventReceiver) {
        let (tx, rx) = mpsc::channel(self.config().session_queue_capacity);
        (self.connect(tx), rx)
    }

    /// Tears a session down after its transport closed.
    ///
    /// Equivalent to `call:leave` for every joined call followed by
    /// `room:leave`. A session that was superseded by a newer connection has
    /// no binding left, so its teardown affects neither presence nor calls.
    pub fn disconnect(&self, session_id: SessionId) {
        match self.registry().detach(session_id) {
            Some(binding) => {
                self.release(session_id, &binding);
                tracing::info!(
                    session_id = %session_id,
                    room_id = %binding.room_id,
                    participant_id = %binding.participant_id,
                    "session disconnected"
                );
            }
            None => {
                tracing::info!(session_id = %session_id, "unbound session disconnected");
            }
        }
    }

    /// Presence and call cleanup for a binding the session just gave up.
    pub(crate) fn release(&self, session_id: SessionId, binding: &SessionBinding) {
        match self
            .presence()
            .mark_offline(&binding.participant_id, Some(session_id))
        {
            Some(record) => {
                self.broadcast_presence(&record, None);
            }
            None => {
                tracing::debug!(
                    session_id = %session_id,
                    participant_id = %binding.participant_id,
                    "presence owned by another session; leaving it online"
                );
            }
        }

        let Some(release) = self
            .calls()
            .release_participant(&binding.room_id, &binding.participant_id)
        else {
            return;
        };
        if release.left {
            self.registry().broadcast(
                &binding.room_id,
                OutboundEvent::CallParticipantLeft {
                    call_id: release.call_id.clone(),
                    participant_id: binding.participant_id.clone(),
                },
                None,
            );
        }
        if release.ended {
            tracing::info!(
                call_id = %release.call_id,
                room_id = %binding.room_id,
                "last participant gone; call ended"
            );
            self.registry().broadcast(
                &binding.room_id,
                OutboundEvent::CallEnded {
                    call_id: release.call_id,
                },
                None,
            );
        }
    }

    /// Closes a room that expired or was deleted.
    ///
    /// Ends any live call, tells every session `room:expired`, unbinds them
    /// and forgets the room's presence and call state. Connections stay open.
    /// Returns the number of sessions that were bound to the room.
    pub fn close_room(&self, room_id: &RoomId) -> usize {
        if let Some(call_id) = self.calls().force_end(room_id) {
            tracing::info!(call_id = %call_id, room_id = %room_id, "room closed; call ended");
            self.registry()
                .broadcast(room_id, OutboundEvent::CallEnded { call_id }, None);
        }
        self.registry().broadcast(
            room_id,
            OutboundEvent::RoomExpired {
                room_id: room_id.clone(),
            },
            None,
        );

        let unbound = self.registry().unbind_room(room_id);
        for (session_id, binding) in &unbound {
            self.presence()
                .mark_offline(&binding.participant_id, Some(*session_id));
        }
        self.presence().forget_room(room_id);
        self.calls().forget_room(room_id);
        tracing::info!(room_id = %room_id, sessions = unbound.len(), "room closed");
        unbound.len()
    }
}
