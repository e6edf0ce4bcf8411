//! Internal fan-out API.
//!
//! The persistence layer owns rooms, participants, messages and reactions.
//! After it commits a change it calls these endpoints so the hub can update
//! its directory and fan the change out to every connected session.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use vapor_hub::{ParticipantDirectory, RoomStatus};
use vapor_types::{ErrorKind, HubError, ParticipantId, ParticipantProfile, Reaction, ReactionRef, RoomId};

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Hub(#[from] HubError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BadRequest", msg.clone()),
            ApiError::Hub(e) => {
                let status = match e.kind() {
                    ErrorKind::RoomNotFound
                    | ErrorKind::ParticipantNotFound
                    | ErrorKind::CallNotFound => StatusCode::NOT_FOUND,
                    ErrorKind::CallAlreadyActive | ErrorKind::CallEnded => StatusCode::CONFLICT,
                    ErrorKind::ProvisioningFailed => StatusCode::BAD_GATEWAY,
                    ErrorKind::TransportClosed | ErrorKind::Internal => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.kind().as_str(), e.to_string())
            }
        };

        let body = Json(serde_json::json!({
            "error": kind,
            "message": message
        }));

        (status, body).into_response()
    }
}

/// Number of sessions an event was queued for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutResponse {
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: RoomId,
    pub created: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRoomResponse {
    pub room_id: RoomId,
    /// Sessions that were bound to the room when it closed.
    pub sessions: usize,
    pub removed_participants: Vec<ParticipantId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub participant_id: ParticipantId,
    pub created: bool,
    pub delivered: usize,
}

/// Body of `POST /api/rooms/{roomId}/participants`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertParticipantRequest {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: String,
}

/// Body of `PATCH /api/rooms/{roomId}/participants/{participantId}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParticipantRequest {
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

fn ensure_room(state: &AppState, room_id: &RoomId) -> Result<(), ApiError> {
    if state.directory.room_exists(room_id) {
        Ok(())
    } else {
        Err(HubError::RoomNotFound(room_id.clone()).into())
    }
}

/// Profile of a participant in `room_id`, or `ParticipantNotFound`.
fn room_member(
    state: &AppState,
    room_id: &RoomId,
    participant_id: &ParticipantId,
) -> Result<ParticipantProfile, ApiError> {
    state
        .directory
        .participant(participant_id)
        .filter(|p| &p.room_id == room_id)
        .ok_or_else(|| HubError::ParticipantNotFound(participant_id.clone()).into())
}

/// Handler for `PUT /api/rooms/{roomId}`.
pub async fn register_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    if room_id.trim().is_empty() {
        return Err(ApiError::BadRequest("roomId must not be empty".to_string()));
    }
    let room_id = RoomId(room_id);
    let created = state.directory.insert_room(room_id.clone());
    if created {
        tracing::info!(room_id = %room_id, "room registered");
    }
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RoomResponse { room_id, created })))
}

/// Handler for `DELETE /api/rooms/{roomId}`.
///
/// Ends the room's call, sends `room:expired`, unbinds every session and
/// then drops the room and its participants from the directory.
pub async fn close_room_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<CloseRoomResponse>, ApiError> {
    let room_id = RoomId(room_id);
    ensure_room(&state, &room_id)?;

    let sessions = state.hub.close_room(&room_id);
    let removed_participants = state.directory.remove_room(&room_id).unwrap_or_default();

    Ok(Json(CloseRoomResponse {
        room_id,
        sessions,
        removed_participants,
    }))
}

/// Handler for `GET /api/rooms/{roomId}/status`.
pub async fn room_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatus>, ApiError> {
    let status = state.hub.room_status(&RoomId(room_id))?;
    Ok(Json(status))
}

/// Handler for `POST /api/rooms/{roomId}/participants`.
///
/// A new participant is announced with `participant:join`; an existing one
/// with `participant:update`.
pub async fn upsert_participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(payload): Json<UpsertParticipantRequest>,
) -> Result<(StatusCode, Json<ParticipantResponse>), ApiError> {
    if payload.id.trim().is_empty() {
        return Err(ApiError::BadRequest("participant id must not be empty".to_string()));
    }
    let profile = ParticipantProfile {
        id: ParticipantId(payload.id),
        room_id: RoomId(room_id),
        display_name: payload.display_name,
        avatar: payload.avatar,
    };
    let participant_id = profile.id.clone();

    let created = state.directory.upsert_participant(profile.clone())?;
    let delivered = if created {
        state.hub.participant_join(profile)?
    } else {
        state.hub.participant_update(&participant_id)?
    };

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ParticipantResponse {
            participant_id,
            created,
            delivered,
        }),
    ))
}

/// Handler for `PATCH /api/rooms/{roomId}/participants/{participantId}`.
pub async fn update_participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((room_id, participant_id)): Path<(String, String)>,
    Json(payload): Json<UpdateParticipantRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let room_id = RoomId(room_id);
    let participant_id = ParticipantId(participant_id);
    ensure_room(&state, &room_id)?;

    let mut profile = room_member(&state, &room_id, &participant_id)?;
    if let Some(display_name) = payload.display_name {
        profile.display_name = display_name;
    }
    if let Some(avatar) = payload.avatar {
        profile.avatar = avatar;
    }
    state.directory.upsert_participant(profile)?;
    let delivered = state.hub.participant_update(&participant_id)?;

    Ok(Json(ParticipantResponse {
        participant_id,
        created: false,
        delivered,
    }))
}

/// Handler for `DELETE /api/rooms/{roomId}/participants/{participantId}`.
pub async fn remove_participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((room_id, participant_id)): Path<(String, String)>,
) -> Result<Json<FanOutResponse>, ApiError> {
    let room_id = RoomId(room_id);
    let participant_id = ParticipantId(participant_id);
    ensure_room(&state, &room_id)?;
    room_member(&state, &room_id, &participant_id)?;

    state.directory.remove_participant(&participant_id);
    let delivered = state.hub.participant_leave(&room_id, &participant_id)?;
    Ok(Json(FanOutResponse { delivered }))
}

/// Handler for `POST /api/rooms/{roomId}/messages`.
pub async fn message_new_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(message): Json<Value>,
) -> Result<Json<FanOutResponse>, ApiError> {
    let delivered = state.hub.message_new(&RoomId(room_id), message)?;
    Ok(Json(FanOutResponse { delivered }))
}

/// Handler for `PUT /api/rooms/{roomId}/messages/{messageId}`.
pub async fn message_update_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((room_id, message_id)): Path<(String, String)>,
    Json(message): Json<Value>,
) -> Result<Json<FanOutResponse>, ApiError> {
    if !message.is_object() {
        return Err(ApiError::BadRequest("message must be a JSON object".to_string()));
    }
    tracing::debug!(room_id = %room_id, message_id = %message_id, "fanning out message update");
    let delivered = state.hub.message_update(&RoomId(room_id), message)?;
    Ok(Json(FanOutResponse { delivered }))
}

/// Handler for `DELETE /api/rooms/{roomId}/messages/{messageId}`.
pub async fn message_delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((room_id, message_id)): Path<(String, String)>,
) -> Result<Json<FanOutResponse>, ApiError> {
    let delivered = state.hub.message_delete(&RoomId(room_id), message_id)?;
    Ok(Json(FanOutResponse { delivered }))
}

/// Handler for `POST /api/rooms/{roomId}/reactions`.
pub async fn reaction_add_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(reaction): Json<Reaction>,
) -> Result<Json<FanOutResponse>, ApiError> {
    let delivered = state.hub.reaction_add(&RoomId(room_id), reaction)?;
    Ok(Json(FanOutResponse { delivered }))
}

/// Handler for `DELETE /api/rooms/{roomId}/reactions`.
pub async fn reaction_remove_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(reaction): Json<ReactionRef>,
) -> Result<Json<FanOutResponse>, ApiError> {
    let delivered = state.hub.reaction_remove(&RoomId(room_id), reaction)?;
    Ok(Json(FanOutResponse { delivered }))
}
