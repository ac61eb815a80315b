pub mod snowflake;
pub mod voice;

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CacheError;

pub use snowflake::Snowflake;
pub use voice::{VoiceConnectionData, VoiceServerUpdate, VoiceState, VoiceStateLight};

/// Decodes an array element by element, dropping the elements that fail.
///
/// Guild snapshots carry thousands of members; one malformed record must not
/// cost the rest of the snapshot.
pub(crate) fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut items = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(item) => items.push(item),
            Err(e) => log::warn!(
                "skipping malformed {} at index {}: {}",
                std::any::type_name::<T>(),
                index,
                e
            ),
        }
    }
    Ok(items)
}

/// An update event together with what the cache held before it was applied.
#[derive(Debug, Clone)]
pub struct Updated<T, O = T> {
    pub old: Option<O>,
    pub new: T,
}

impl<T, O> Updated<T, O> {
    pub fn new(new: T) -> Self {
        Self { old: None, new }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    pub discriminator: Option<String>,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
    pub banner: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
    #[serde(default)]
    pub system: Option<bool>,
    pub public_flags: Option<u64>,
}

/// A guild member as it appears inside other payloads, where the guild is
/// implied by the surrounding object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user: Option<User>,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<String>,
    pub deaf: Option<bool>,
    pub mute: Option<bool>,
    pub pending: Option<bool>,
    pub permissions: Option<String>,
    pub communication_disabled_until: Option<String>,
}

/// A guild member as the cache stores it: always tied to one guild and one user.
///
/// `GUILD_MEMBER_ADD` and `GUILD_MEMBER_UPDATE` decode straight into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMember {
    pub guild_id: Snowflake,
    pub user: User,
    pub nick: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<String>,
    pub deaf: Option<bool>,
    pub mute: Option<bool>,
    pub pending: Option<bool>,
    pub communication_disabled_until: Option<String>,
}

impl GuildMember {
    /// Attaches a member from a guild snapshot to its guild.
    pub fn from_member(guild_id: Snowflake, member: Member) -> Result<Self, CacheError> {
        let user = member.user.ok_or(CacheError::MissingUser { guild_id })?;
        Ok(Self {
            guild_id,
            user,
            nick: member.nick,
            avatar: member.avatar,
            roles: member.roles,
            joined_at: member.joined_at,
            deaf: member.deaf,
            mute: member.mute,
            pending: member.pending,
            communication_disabled_until: member.communication_disabled_until,
        })
    }

    pub fn user_id(&self) -> Snowflake {
        self.user.id
    }

    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    /// Not sent by the gateway; filled in from the surrounding payload.
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub name: String,
    pub color: Option<u64>,
    pub hoist: Option<bool>,
    pub icon: Option<String>,
    pub position: Option<i64>,
    pub permissions: Option<String>,
    pub managed: Option<bool>,
    pub mentionable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    pub roles: Option<Vec<Snowflake>>,
    pub user: Option<User>,
    pub require_colons: Option<bool>,
    pub managed: Option<bool>,
    pub animated: Option<bool>,
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    pub guild_id: Option<Snowflake>,
    pub position: Option<i64>,
    pub permission_overwrites: Option<Vec<PermissionOverwrite>>,
    pub name: Option<String>,
    pub topic: Option<String>,
    pub nsfw: Option<bool>,
    pub last_message_id: Option<Snowflake>,
    pub bitrate: Option<u64>,
    pub user_limit: Option<u64>,
    pub rate_limit_per_user: Option<u64>,
    pub recipients: Option<Vec<User>>,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub parent_id: Option<Snowflake>,
    pub last_pin_timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub allow: Option<String>,
    pub deny: Option<String>,
}

/// The full guild object sent in `GUILD_CREATE`, and the partial one in
/// `GUILD_UPDATE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub banner: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub afk_channel_id: Option<Snowflake>,
    pub afk_timeout: Option<u64>,
    pub verification_level: Option<u64>,
    pub features: Option<Vec<String>>,
    pub member_count: Option<u64>,
    pub max_members: Option<u64>,
    pub description: Option<String>,
    pub preferred_locale: Option<String>,
    pub unavailable: Option<bool>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub roles: Vec<Role>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub emojis: Vec<Emoji>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub channels: Vec<Channel>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub members: Vec<Member>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub voice_states: Vec<VoiceState>,
}

/// The guild record kept in the cache. It references its children by id only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedGuild {
    pub id: Snowflake,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub member_count: u64,
    pub members: HashSet<Snowflake>,
    pub channels: HashSet<Snowflake>,
    pub roles: HashSet<Snowflake>,
    pub emoji: HashSet<Snowflake>,
}

impl CachedGuild {
    /// Copies scalar fields and the collections a partial guild carries.
    ///
    /// `GUILD_UPDATE` never lists members or channels, so those sets are left
    /// alone; roles and emoji are only replaced when the payload has them.
    pub fn apply_update(&mut self, guild: &Guild) {
        self.name = guild.name.clone();
        self.icon = guild.icon.clone();
        self.owner_id = guild.owner_id;
        if let Some(count) = guild.member_count {
            self.member_count = count;
        }
        if !guild.roles.is_empty() {
            self.roles = guild.roles.iter().map(|r| r.id).collect();
        }
        if !guild.emojis.is_empty() {
            self.emoji = guild.emojis.iter().filter_map(|e| e.id).collect();
        }
    }
}

impl From<&Guild> for CachedGuild {
    fn from(guild: &Guild) -> Self {
        let members: HashSet<Snowflake> = guild
            .members
            .iter()
            .filter_map(|m| m.user.as_ref().map(|u| u.id))
            .collect();
        Self {
            id: guild.id,
            name: guild.name.clone(),
            icon: guild.icon.clone(),
            owner_id: guild.owner_id,
            member_count: guild.member_count.unwrap_or(members.len() as u64),
            members,
            channels: guild.channels.iter().map(|c| c.id).collect(),
            roles: guild.roles.iter().map(|r| r.id).collect(),
            emoji: guild.emojis.iter().filter_map(|e| e.id).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildDelete {
    pub id: Snowflake,
    pub unavailable: Option<bool>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub members: Vec<Member>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub channels: Vec<Channel>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub roles: Vec<Role>,
    /// The guild as cached right before removal.
    #[serde(skip)]
    pub old: Option<CachedGuild>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildBan {
    pub guild_id: Snowflake,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildEmojisUpdate {
    pub guild_id: Snowflake,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub emojis: Vec<Emoji>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildStickersUpdate {
    pub guild_id: Snowflake,
    pub stickers: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildIntegrationsUpdate {
    pub guild_id: Snowflake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMemberRemove {
    pub guild_id: Snowflake,
    pub user: User,
    /// The member as cached right before removal.
    #[serde(skip)]
    pub old: Option<GuildMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMembersChunk {
    pub guild_id: Snowflake,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub members: Vec<Member>,
    pub chunk_index: u32,
    pub chunk_count: u32,
    #[serde(default)]
    pub not_found: Vec<serde_json::Value>,
    #[serde(default)]
    pub presences: Vec<serde_json::Value>,
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRole {
    pub guild_id: Snowflake,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRoleDelete {
    pub guild_id: Snowflake,
    pub role_id: Snowflake,
    #[serde(skip)]
    pub old: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildScheduledEventUser {
    pub guild_scheduled_event_id: Snowflake,
    pub user_id: Snowflake,
    pub guild_id: Snowflake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationDelete {
    pub id: Snowflake,
    pub guild_id: Snowflake,
    pub application_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoModerationActionExecution {
    pub guild_id: Snowflake,
    pub action: serde_json::Value,
    pub rule_id: Snowflake,
    pub rule_trigger_type: u8,
    pub user_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub message_id: Option<Snowflake>,
    pub alert_system_message_id: Option<Snowflake>,
    #[serde(default)]
    pub content: String,
    pub matched_keyword: Option<String>,
    pub matched_content: Option<String>,
}

pub mod interaction_type {
    pub const PING: u8 = 1;
    pub const APPLICATION_COMMAND: u8 = 2;
    pub const MESSAGE_COMPONENT: u8 = 3;
    pub const APPLICATION_COMMAND_AUTOCOMPLETE: u8 = 4;
    pub const MODAL_SUBMIT: u8 = 5;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub data: Option<serde_json::Value>,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub member: Option<Member>,
    pub user: Option<User>,
    pub token: String,
    pub version: Option<u8>,
    pub message: Option<serde_json::Value>,
}

impl Interaction {
    /// Slash commands and modal submissions are user input a bot answers.
    pub fn is_input_event(&self) -> bool {
        matches!(
            self.kind,
            interaction_type::APPLICATION_COMMAND | interaction_type::MODAL_SUBMIT
        )
    }

    pub fn is_autocomplete(&self) -> bool {
        self.kind == interaction_type::APPLICATION_COMMAND_AUTOCOMPLETE
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub author: User,
    pub member: Option<Member>,
    pub content: Option<String>,
    pub timestamp: Option<String>,
    pub edited_timestamp: Option<String>,
    pub tts: Option<bool>,
    pub mention_everyone: Option<bool>,
    pub mentions: Option<Vec<User>>,
    pub mention_roles: Option<Vec<Snowflake>>,
    pub attachments: Option<Vec<Attachment>>,
    pub embeds: Option<Vec<Embed>>,
    pub reactions: Option<Vec<Reaction>>,
    pub pinned: Option<bool>,
    pub webhook_id: Option<Snowflake>,
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    pub referenced_message: Option<Box<Message>>,
    pub flags: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Snowflake,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub url: Option<String>,
    pub proxy_url: Option<String>,
    pub height: Option<u64>,
    pub width: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Embed {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<String>,
    pub color: Option<u64>,
    pub fields: Option<Vec<EmbedField>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub count: u64,
    pub me: bool,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingStart {
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub user_id: Snowflake,
    pub timestamp: u64,
    pub member: Option<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionAdd {
    pub user_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub message_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub member: Option<Member>,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRemove {
    pub user_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub message_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRemoveAll {
    pub channel_id: Option<Snowflake>,
    pub message_id: Snowflake,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRemoveEmoji {
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub message_id: Snowflake,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub author: Option<User>,
    pub content: Option<String>,
    pub edited_timestamp: Option<String>,
    pub embeds: Option<Vec<Embed>>,
    pub attachments: Option<Vec<Attachment>>,
    pub pinned: Option<bool>,
    pub flags: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDelete {
    pub id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeleteBulk {
    pub ids: Vec<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPinsUpdate {
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub last_pin_timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCreate {
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub code: Option<String>,
    pub inviter: Option<User>,
    pub max_age: Option<u64>,
    pub max_uses: Option<u64>,
    pub temporary: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteDelete {
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksUpdate {
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    pub v: Option<u64>,
    pub session_id: String,
    pub resume_gateway_url: Option<String>,
    pub user: User,
    pub guilds: Option<Vec<UnavailableGuild>>,
    pub shard: Option<[u32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    pub unavailable: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GatewayBotResponse {
    pub url: String,
    pub shards: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guild_snapshot_skips_malformed_members() {
        let guild: Guild = serde_json::from_value(json!({
            "id": "10",
            "members": [
                { "user": { "id": "1", "username": "a" }, "roles": [] },
                { "user": { "id": "2", "username": "b" }, "roles": "not-a-list" },
                { "user": { "id": "3", "username": "c" } }
            ]
        }))
        .unwrap();

        assert_eq!(guild.members.len(), 2);
        let cached = CachedGuild::from(&guild);
        assert_eq!(cached.member_count, 2);
        assert!(cached.members.contains(&Snowflake(1)));
        assert!(cached.members.contains(&Snowflake(3)));
    }

    #[test]
    fn member_without_user_cannot_be_cached() {
        let member: Member = serde_json::from_value(json!({ "nick": "ghost" })).unwrap();
        let err = GuildMember::from_member(Snowflake(7), member).unwrap_err();
        assert_eq!(err, CacheError::MissingUser { guild_id: Snowflake(7) });
    }

    #[test]
    fn partial_guild_update_keeps_children() {
        let mut cached = CachedGuild {
            id: Snowflake(1),
            member_count: 2,
            members: [Snowflake(5), Snowflake(6)].into_iter().collect(),
            channels: [Snowflake(9)].into_iter().collect(),
            ..Default::default()
        };
        let update: Guild = serde_json::from_value(json!({ "id": "1", "name": "renamed" })).unwrap();
        cached.apply_update(&update);

        assert_eq!(cached.name.as_deref(), Some("renamed"));
        assert_eq!(cached.member_count, 2);
        assert_eq!(cached.members.len(), 2);
        assert!(cached.channels.contains(&Snowflake(9)));
    }
}
