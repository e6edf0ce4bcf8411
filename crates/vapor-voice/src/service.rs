use crate::config::DailyConfig;
use crate::error::VoiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vapor_types::CallId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Room properties sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomProperties {
    pub enable_screenshare: bool,
    pub enable_chat: bool,
    pub enable_knocking: bool,
    pub enable_prejoin_ui: bool,
    pub max_participants: u32,
    /// Unix timestamp after which the provider deletes the room.
    pub exp: i64,
}

/// Body of `POST /rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub privacy: String,
    pub properties: RoomProperties,
}

/// A provisioned call room.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallRoom {
    pub name: String,
    pub url: String,
}

#[derive(Debug)]
pub struct CallRoomService {
    config: DailyConfig,
    client: reqwest::Client,
}

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent("VaporLink/0.1 (call-rooms)")
        .build()
        .unwrap_or_default()
}

impl CallRoomService {
    pub fn new(config: DailyConfig) -> Self {
        Self {
            config,
            client: build_http_client(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn config(&self) -> &DailyConfig {
        &self.config
    }

    /// Provider room name for a call.
    pub fn room_name(&self, call_id: &CallId) -> String {
        format!("{}{}", self.config.room_prefix, call_id)
    }

    pub fn room_request(&self, call_id: &CallId, now: DateTime<Utc>) -> CreateRoomRequest {
        CreateRoomRequest {
            name: self.room_name(call_id),
            privacy: "public".to_string(),
            properties: RoomProperties {
                enable_screenshare: true,
                enable_chat: false,
                enable_knocking: false,
                enable_prejoin_ui: false,
                max_participants: self.config.max_participants,
                exp: now.timestamp() + self.config.room_ttl_secs,
            },
        }
    }

    /// Creates the provider room for a call and returns its join URL.
    pub async fn create_room(&self, call_id: &CallId) -> Result<CallRoom, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::Config("no call room API key configured".to_string()));
        }

        let url = format!("{}/rooms", self.config.api_url.trim_end_matches('/'));
        let body = self.room_request(call_id, Utc::now());
        tracing::debug!(call_id = %call_id, room = %body.name, "creating call room");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VoiceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let room: CallRoom = resp.json().await?;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn request_body_matches_provider_shape() {
        let service = CallRoomService::new(DailyConfig::new("https://api.daily.co/v1", "key"));
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid date");
        let request = service.room_request(&CallId::from("c1"), now);

        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["name"], "vaporlink-c1");
        assert_eq!(json["privacy"], "public");
        assert_eq!(json["properties"]["enable_screenshare"], true);
        assert_eq!(json["properties"]["enable_chat"], false);
        assert_eq!(json["properties"]["max_participants"], 10);
        assert_eq!(json["properties"]["exp"], now.timestamp() + 86_400);
    }

    #[tokio::test]
    async fn disabled_without_api_key() {
        let service = CallRoomService::new(DailyConfig::default());
        assert!(!service.is_enabled());
        let err = service
            .create_room(&CallId::from("c1"))
            .await
            .expect_err("no key configured");
        assert!(matches!(err, VoiceError::Config(_)));
    }
}
