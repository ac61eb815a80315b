//! The local mirror of server-side entities.
//!
//! [`Cache`] is built once and shared by every shard; the router is the only
//! writer. Application code reads it through the typed lookups or through the
//! per-kind [`EntityCache`] accessors.

mod entity;

pub use entity::{CacheEntity, EntityCache, MemberKey};

use crate::model::{CachedGuild, Channel, GuildMember, Role, Snowflake, User, VoiceStateLight};

/// Which entity kinds get cached. Everything is cached by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub guilds: bool,
    pub channels: bool,
    pub roles: bool,
    pub members: bool,
    pub users: bool,
    pub voice_states: bool,
}

impl CacheConfig {
    /// Caches nothing; enable kinds one by one.
    pub fn none() -> Self {
        Self {
            guilds: false,
            channels: false,
            roles: false,
            members: false,
            users: false,
            voice_states: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            guilds: true,
            channels: true,
            roles: true,
            members: true,
            users: true,
            voice_states: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct Cache {
    config: CacheConfig,
    guilds: EntityCache<CachedGuild>,
    channels: EntityCache<Channel>,
    roles: EntityCache<Role>,
    members: EntityCache<GuildMember>,
    users: EntityCache<User>,
    voice_states: EntityCache<VoiceStateLight>,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn guilds(&self) -> &EntityCache<CachedGuild> {
        &self.guilds
    }

    pub fn channels(&self) -> &EntityCache<Channel> {
        &self.channels
    }

    pub fn roles(&self) -> &EntityCache<Role> {
        &self.roles
    }

    pub fn members(&self) -> &EntityCache<GuildMember> {
        &self.members
    }

    pub fn users(&self) -> &EntityCache<User> {
        &self.users
    }

    pub fn voice_states(&self) -> &EntityCache<VoiceStateLight> {
        &self.voice_states
    }

    pub fn guild(&self, guild_id: Snowflake) -> Option<CachedGuild> {
        self.guilds.get(&guild_id)
    }

    pub fn channel(&self, channel_id: Snowflake) -> Option<Channel> {
        self.channels.get(&channel_id)
    }

    pub fn role(&self, role_id: Snowflake) -> Option<Role> {
        self.roles.get(&role_id)
    }

    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<GuildMember> {
        self.members.get(&MemberKey::new(guild_id, user_id))
    }

    pub fn user(&self, user_id: Snowflake) -> Option<User> {
        self.users.get(&user_id)
    }

    pub fn voice_state(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<VoiceStateLight> {
        self.voice_states.get(&MemberKey::new(guild_id, user_id))
    }

    /// Members of a cached guild that the member cache also knows about.
    pub fn guild_members(&self, guild_id: Snowflake) -> Vec<GuildMember> {
        let Some(guild) = self.guild(guild_id) else {
            return Vec::new();
        };
        guild
            .members
            .iter()
            .filter_map(|user_id| self.member(guild_id, *user_id))
            .collect()
    }
}
