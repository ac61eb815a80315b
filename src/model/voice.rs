use serde::{Deserialize, Serialize};

use super::{Member, Snowflake};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceState {
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
    pub member: Option<Member>,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub self_deaf: bool,
    #[serde(default)]
    pub self_mute: bool,
    pub self_stream: Option<bool>,
    #[serde(default)]
    pub self_video: bool,
    #[serde(default)]
    pub suppress: bool,
    pub request_to_speak_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    pub guild_id: Snowflake,
    pub token: String,
    /// `None` while the voice server is being reallocated.
    pub endpoint: Option<String>,
}

/// Which voice channel a member currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateLight {
    pub guild_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub user_id: Snowflake,
}

/// Everything needed to open a voice connection, joined from a
/// `VOICE_SERVER_UPDATE` and a `VOICE_STATE_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConnectionData {
    pub endpoint: String,
    pub token: String,
    pub session_id: String,
}
