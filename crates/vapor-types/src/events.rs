//! Wire event catalogue.
//!
//! Every frame on the wire is a JSON object of the form
//! `{"type": "<event>", "data": {...}}`. Inbound frames may also carry a
//! `requestId`; request/response events are answered with an `ack` frame
//! echoing it back.

use crate::error::{ErrorKind, HubError};
use crate::{CallId, ParticipantId, ParticipantPresence, RoomId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Room and participant addressed by a room-scoped inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTarget {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
}

/// Call and participant addressed by a call-scoped inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTarget {
    pub call_id: CallId,
    pub participant_id: ParticipantId,
}

/// Inbound typing indicator. `typing:stop` usually omits name and avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Events a client may send to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "room:join")]
    RoomJoin(RoomTarget),
    #[serde(rename = "room:leave")]
    RoomLeave(RoomTarget),
    #[serde(rename = "typing:start")]
    TypingStart(TypingPayload),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingPayload),
    #[serde(rename = "participant:update-status", rename_all = "camelCase")]
    UpdateStatus {
        participant_id: ParticipantId,
        is_online: bool,
    },
    #[serde(rename = "call:start")]
    CallStart(RoomTarget),
    #[serde(rename = "call:accept")]
    CallAccept(CallTarget),
    #[serde(rename = "call:decline")]
    CallDecline(CallTarget),
    #[serde(rename = "call:join")]
    CallJoin(CallTarget),
    #[serde(rename = "call:leave")]
    CallLeave(CallTarget),
    #[serde(rename = "call:toggle-audio", rename_all = "camelCase")]
    CallToggleAudio {
        call_id: CallId,
        participant_id: ParticipantId,
        is_muted: bool,
    },
    #[serde(rename = "call:toggle-video", rename_all = "camelCase")]
    CallToggleVideo {
        call_id: CallId,
        participant_id: ParticipantId,
        is_video_enabled: bool,
    },
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl InboundEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomJoin(_) => "room:join",
            Self::RoomLeave(_) => "room:leave",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::UpdateStatus { .. } => "participant:update-status",
            Self::CallStart(_) => "call:start",
            Self::CallAccept(_) => "call:accept",
            Self::CallDecline(_) => "call:decline",
            Self::CallJoin(_) => "call:join",
            Self::CallLeave(_) => "call:leave",
            Self::CallToggleAudio { .. } => "call:toggle-audio",
            Self::CallToggleVideo { .. } => "call:toggle-video",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    /// Correlation id chosen by the client, echoed back in the `ack`.
    pub request_id: Option<Value>,
    pub event: InboundEvent,
}

/// Decodes one inbound text frame.
///
/// # Errors
///
/// Returns a `serde_json::Error` if the text is not JSON or does not match
/// any known event shape.
pub fn decode_client_frame(text: &str) -> Result<ClientFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let request_id = value.get("requestId").filter(|v| !v.is_null()).cloned();
    let event = serde_json::from_value(value)?;
    Ok(ClientFrame { request_id, event })
}

/// Typing indicator fanned out to the rest of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub participant_id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// A reaction added to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
}

/// Identifies a reaction being removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRef {
    pub message_id: String,
    pub user_id: String,
}

/// Public identity of a call member as shown in call events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPeer {
    pub id: ParticipantId,
    pub display_name: String,
    pub avatar: String,
}

/// Events the hub sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundEvent {
    /// Full message object, opaque to the hub.
    #[serde(rename = "message:new")]
    MessageNew(Value),
    #[serde(rename = "message:update")]
    MessageUpdate(Value),
    /// Carries the deleted message id.
    #[serde(rename = "message:delete")]
    MessageDelete(String),
    #[serde(rename = "participant:join")]
    ParticipantJoin(ParticipantPresence),
    #[serde(rename = "participant:leave")]
    ParticipantLeave(ParticipantId),
    #[serde(rename = "participant:update")]
    ParticipantUpdate(ParticipantPresence),
    #[serde(rename = "typing:start")]
    TypingStart(TypingIndicator),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingIndicator),
    #[serde(rename = "reaction:add")]
    ReactionAdd(Reaction),
    #[serde(rename = "reaction:remove")]
    ReactionRemove(ReactionRef),
    #[serde(rename = "call:incoming", rename_all = "camelCase")]
    CallIncoming { call_id: CallId, initiator: CallPeer },
    #[serde(rename = "call:started", rename_all = "camelCase")]
    CallStarted { call_id: CallId, room_url: String },
    #[serde(rename = "call:participant-joined", rename_all = "camelCase")]
    CallParticipantJoined {
        call_id: CallId,
        participant: CallPeer,
    },
    #[serde(rename = "call:participant-left", rename_all = "camelCase")]
    CallParticipantLeft {
        call_id: CallId,
        participant_id: ParticipantId,
    },
    #[serde(rename = "call:participant-updated", rename_all = "camelCase")]
    CallParticipantUpdated {
        call_id: CallId,
        participant_id: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_muted: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_video_enabled: Option<bool>,
    },
    #[serde(rename = "call:ended", rename_all = "camelCase")]
    CallEnded { call_id: CallId },
    #[serde(rename = "room:expired", rename_all = "camelCase")]
    RoomExpired { room_id: RoomId },
    /// Direct answer to a request/response event.
    #[serde(rename = "ack")]
    Ack(Ack),
    /// Direct notice that a frame could not be processed.
    #[serde(rename = "error")]
    Error { message: String },
}

impl OutboundEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageNew(_) => "message:new",
            Self::MessageUpdate(_) => "message:update",
            Self::MessageDelete(_) => "message:delete",
            Self::ParticipantJoin(_) => "participant:join",
            Self::ParticipantLeave(_) => "participant:leave",
            Self::ParticipantUpdate(_) => "participant:update",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::ReactionAdd(_) => "reaction:add",
            Self::ReactionRemove(_) => "reaction:remove",
            Self::CallIncoming { .. } => "call:incoming",
            Self::CallStarted { .. } => "call:started",
            Self::CallParticipantJoined { .. } => "call:participant-joined",
            Self::CallParticipantLeft { .. } => "call:participant-left",
            Self::CallParticipantUpdated { .. } => "call:participant-updated",
            Self::CallEnded { .. } => "call:ended",
            Self::RoomExpired { .. } => "room:expired",
            Self::Ack(_) => "ack",
            Self::Error { .. } => "error",
        }
    }
}

/// Successful result of a request/response event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `room:join` succeeded.
    Joined {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    /// `call:start`, `call:accept` or `call:join` succeeded.
    Call {
        call_id: CallId,
        room_url: Option<String>,
    },
}

/// Payload of an `ack` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    /// Builds the `ack` payload for a handler result.
    pub fn from_result(request_id: Option<Value>, result: Result<Reply, HubError>) -> Self {
        match result {
            Ok(Reply::Joined {
                room_id,
                participant_id,
            }) => Self {
                request_id,
                success: true,
                room_id: Some(room_id),
                participant_id: Some(participant_id),
                ..Self::default()
            },
            Ok(Reply::Call { call_id, room_url }) => Self {
                request_id,
                success: true,
                call_id: Some(call_id),
                room_url,
                ..Self::default()
            },
            Err(e) => Self {
                request_id,
                success: false,
                error: Some(e.kind()),
                message: Some(e.to_string()),
                ..Self::default()
            },
        }
    }
}
