//! VaporLink server library logic.

pub mod api_rooms;
pub mod api_ws;
pub mod background;
pub mod config;
pub mod provisioning;

use crate::config::{Config, TransportConfig};
use crate::provisioning::DailyProvisioner;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vapor_hub::{CallRoomProvisioner, DisabledProvisioner, Hub, HubConfig, MemoryDirectory};
use vapor_voice::CallRoomService;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The room hub.
    pub hub: Hub,
    /// Room and participant records, shared with the hub.
    pub directory: MemoryDirectory,
    /// Keepalive settings for WebSocket connections.
    pub transport: TransportConfig,
}

impl AppState {
    /// Builds the state from loaded configuration.
    ///
    /// Call-room provisioning is wired to the provider only when an API key
    /// is configured.
    pub fn from_config(config: &Config) -> Self {
        let service = CallRoomService::new(config.calls.clone());
        let provisioner: Arc<dyn CallRoomProvisioner> = if service.is_enabled() {
            tracing::info!(api_url = %config.calls.api_url, "call room provisioning enabled");
            Arc::new(DailyProvisioner::new(service))
        } else {
            tracing::warn!("no call room API key configured; calls will run without a room url");
            Arc::new(DisabledProvisioner)
        };
        Self::new(
            provisioner,
            config.hub.hub_config(),
            config.transport.clone(),
        )
    }

    pub fn new(
        provisioner: Arc<dyn CallRoomProvisioner>,
        hub_config: HubConfig,
        transport: TransportConfig,
    ) -> Self {
        let directory = MemoryDirectory::new();
        let hub = Hub::new(Arc::new(directory.clone()), provisioner, hub_config);
        Self {
            hub,
            directory,
            transport,
        }
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api_ws::ws_handler))
        .route(
            "/api/rooms/{roomId}",
            put(api_rooms::register_room_handler).delete(api_rooms::close_room_handler),
        )
        .route(
            "/api/rooms/{roomId}/status",
            get(api_rooms::room_status_handler),
        )
        .route(
            "/api/rooms/{roomId}/participants",
            post(api_rooms::upsert_participant_handler),
        )
        .route(
            "/api/rooms/{roomId}/participants/{participantId}",
            patch(api_rooms::update_participant_handler)
                .delete(api_rooms::remove_participant_handler),
        )
        .route(
            "/api/rooms/{roomId}/messages",
            post(api_rooms::message_new_handler),
        )
        .route(
            "/api/rooms/{roomId}/messages/{messageId}",
            put(api_rooms::message_update_handler).delete(api_rooms::message_delete_handler),
        )
        .route(
            "/api/rooms/{roomId}/reactions",
            post(api_rooms::reaction_add_handler).delete(api_rooms::reaction_remove_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
