use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_DAILY_API_URL: &str = "https://api.daily.co/v1";

fn default_api_url() -> String {
    DEFAULT_DAILY_API_URL.to_string()
}

fn default_room_prefix() -> String {
    "vaporlink-".to_string()
}

fn default_max_participants() -> u32 {
    10
}

fn default_room_ttl_secs() -> i64 {
    86_400
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DailyConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Empty disables provisioning.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Prepended to the call id to form the provider room name.
    #[serde(default = "default_room_prefix")]
    pub room_prefix: String,
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
    /// Lifetime of a provisioned room in seconds. Default: 86400 (24 hours).
    #[serde(default = "default_room_ttl_secs")]
    pub room_ttl_secs: i64,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            room_prefix: default_room_prefix(),
            max_participants: default_max_participants(),
            room_ttl_secs: default_room_ttl_secs(),
        }
    }
}

impl fmt::Debug for DailyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DailyConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("room_prefix", &self.room_prefix)
            .field("max_participants", &self.max_participants)
            .field("room_ttl_secs", &self.room_ttl_secs)
            .finish()
    }
}

impl DailyConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }
}
