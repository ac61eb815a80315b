//! Decodes dispatches, keeps the cache in step with them, and publishes the
//! result on the bus.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bus::EventBus;
use crate::cache::{Cache, MemberKey};
use crate::error::{CacheError, ClientError};
use crate::event::{Event, EventKind};
use crate::model::*;
use crate::voice::VoiceNegotiation;

/// Shared by every shard. Holds no state of its own beyond the cache and bus
/// it writes to.
#[derive(Debug, Clone)]
pub struct GatewayEventRouter {
    cache: Arc<Cache>,
    bus: Arc<EventBus>,
}

impl GatewayEventRouter {
    pub fn new(cache: Arc<Cache>, bus: Arc<EventBus>) -> Self {
        Self { cache, bus }
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Routes a dispatch by its `t` name. Unknown names are skipped with
    /// `Ok(None)`.
    pub fn dispatch(
        &self,
        name: &str,
        data: &[u8],
        voice: Option<&VoiceNegotiation>,
    ) -> Result<Option<Arc<Event>>, ClientError> {
        let Some(kind) = EventKind::from_dispatch_name(name) else {
            log::debug!("ignoring unknown dispatch {}", name);
            return Ok(None);
        };
        self.route(kind, data, voice).map(Some)
    }

    /// Decodes `data` as `kind`, applies it to the cache, then publishes.
    ///
    /// `voice` is the negotiation of the connection the event arrived on;
    /// voice updates are fed into it after the cache is written.
    pub fn route(
        &self,
        kind: EventKind,
        data: &[u8],
        voice: Option<&VoiceNegotiation>,
    ) -> Result<Arc<Event>, ClientError> {
        let event = Event::decode(kind, data).map_err(|source| {
            log::warn!("failed to decode {:?}: {}", kind, source);
            ClientError::Decode { kind, source }
        })?;
        log::trace!("routing {:?}", kind);

        let event = Arc::new(self.synchronize(event, voice));
        self.bus.publish(event.clone());

        if let Event::InteractionCreate(interaction) = event.as_ref() {
            if interaction.is_input_event() {
                self.bus
                    .publish(Arc::new(Event::InputEventCreate(interaction.clone())));
            } else if interaction.is_autocomplete() {
                self.bus
                    .publish(Arc::new(Event::AutoCompleteEntry(interaction.clone())));
            }
        }
        Ok(event)
    }

    /// Applies one event to the cache and returns it with its old values
    /// filled in. Events that carry no cacheable state pass through untouched.
    pub fn synchronize(&self, mut event: Event, voice: Option<&VoiceNegotiation>) -> Event {
        match &mut event {
            Event::Ready(ready) => {
                if self.cache.config().users {
                    self.cache.users().insert(ready.user.clone());
                }
                if let Some(voice) = voice {
                    voice.set_user_id(ready.user.id);
                }
            }
            Event::ChannelCreate(channel) => self.put_channel(channel),
            Event::ChannelUpdate(update) => {
                update.old = self.cache.channel(update.new.id);
                self.put_channel(&update.new);
            }
            Event::ChannelDelete(channel) => self.channel_delete(channel),
            Event::GuildCreate(guild) => self.guild_create(guild),
            Event::GuildUpdate(update) => {
                update.old = self.cache.guild(update.new.id);
                self.guild_update(&update.new);
            }
            Event::GuildDelete(delete) => {
                delete.old = self.cache.guild(delete.id);
                self.guild_delete(delete);
            }
            Event::GuildBanAdd(ban) => self.guild_ban_add(ban),
            Event::GuildEmojisUpdate(update) => {
                if self.cache.config().guilds {
                    let emoji: HashSet<Snowflake> = update.emojis.iter().filter_map(|e| e.id).collect();
                    self.cache.guilds().modify(&update.guild_id, |g| g.emoji = emoji);
                }
            }
            Event::GuildMemberAdd(member) => self.member_add(member),
            Event::GuildMemberRemove(remove) => {
                remove.old = self.cache.member(remove.guild_id, remove.user.id);
                self.member_remove(remove.guild_id, remove.user.id);
            }
            Event::GuildMemberUpdate(update) => {
                update.old = self.cache.member(update.new.guild_id, update.new.user_id());
                self.member_update(&update.new);
            }
            Event::GuildMembersChunk(chunk) => {
                let errors = self.cache_members(chunk.guild_id, &chunk.members);
                if !errors.is_empty() {
                    log::warn!(
                        "guild {} member chunk {}/{}: {} members not cached",
                        chunk.guild_id,
                        chunk.chunk_index + 1,
                        chunk.chunk_count,
                        errors.len()
                    );
                }
            }
            Event::GuildRoleCreate(role) => self.put_role(role),
            Event::GuildRoleUpdate(update) => {
                update.old = self.cache.role(update.new.role.id);
                self.put_role(&mut update.new);
            }
            Event::GuildRoleDelete(delete) => {
                delete.old = self.cache.role(delete.role_id);
                self.role_delete(delete);
            }
            Event::UserUpdate(update) => {
                update.old = self.cache.user(update.new.id);
                if self.cache.config().users {
                    self.cache.users().insert(update.new.clone());
                }
            }
            Event::VoiceStateUpdate(state) => {
                self.put_voice_state(state);
                if let Some(voice) = voice {
                    let step = voice.on_state_update(state);
                    log::trace!("voice state update: {:?}", step);
                }
            }
            Event::VoiceServerUpdate(update) => {
                if let Some(voice) = voice {
                    let step = voice.on_server_update(update);
                    log::trace!("voice server update: {:?}", step);
                }
            }
            _ => {}
        }
        event
    }

    fn put_channel(&self, channel: &Channel) {
        let config = self.cache.config();
        if config.guilds {
            if let Some(guild_id) = channel.guild_id {
                self.cache.guilds().modify(&guild_id, |g| {
                    g.channels.insert(channel.id);
                });
            }
        }
        if config.channels {
            self.cache.channels().insert(channel.clone());
        }
    }

    fn channel_delete(&self, channel: &Channel) {
        let config = self.cache.config();
        if config.guilds {
            if let Some(guild_id) = channel.guild_id {
                self.cache.guilds().modify(&guild_id, |g| {
                    g.channels.remove(&channel.id);
                });
            }
        }
        if config.channels {
            self.cache.channels().remove(&channel.id);
        }
    }

    /// Caches each member with a user object; returns one error per member
    /// that could not be cached.
    fn cache_members(&self, guild_id: Snowflake, members: &[Member]) -> Vec<CacheError> {
        let config = self.cache.config();
        let mut errors = Vec::new();
        let mut cached = Vec::with_capacity(members.len());
        for member in members {
            match GuildMember::from_member(guild_id, member.clone()) {
                Ok(member) => {
                    cached.push(member.user_id());
                    if config.users {
                        self.cache.users().insert(member.user.clone());
                    }
                    if config.members {
                        self.cache.members().insert(member);
                    }
                }
                Err(e) => {
                    log::warn!("{}", e);
                    errors.push(e);
                }
            }
        }
        if config.guilds {
            self.cache.guilds().modify(&guild_id, |g| g.members.extend(cached));
        }
        errors
    }

    fn guild_create(&self, guild: &Guild) {
        let config = self.cache.config();
        if config.members {
            self.cache.members().reserve(guild.members.len());
        }
        if config.users {
            self.cache.users().reserve(guild.members.len());
        }
        if config.channels {
            self.cache.channels().reserve(guild.channels.len());
        }
        if config.roles {
            self.cache.roles().reserve(guild.roles.len());
        }

        let errors = self.cache_members(guild.id, &guild.members);
        if !errors.is_empty() {
            log::warn!("guild {}: {} members not cached", guild.id, errors.len());
        }

        if config.voice_states {
            for state in &guild.voice_states {
                self.cache.voice_states().insert(VoiceStateLight {
                    guild_id: guild.id,
                    channel_id: state.channel_id,
                    user_id: state.user_id,
                });
            }
        }
        if config.channels {
            for channel in &guild.channels {
                let mut channel = channel.clone();
                channel.guild_id = Some(guild.id);
                self.cache.channels().insert(channel);
            }
        }
        if config.roles {
            for role in &guild.roles {
                let mut role = role.clone();
                role.guild_id = Some(guild.id);
                self.cache.roles().insert(role);
            }
        }
        if config.guilds {
            self.cache.guilds().insert(CachedGuild::from(guild));
        }
    }

    fn guild_update(&self, guild: &Guild) {
        let config = self.cache.config();
        if config.roles {
            for role in &guild.roles {
                let mut role = role.clone();
                role.guild_id = Some(guild.id);
                self.cache.roles().insert(role);
            }
        }
        if config.guilds && self.cache.guilds().modify(&guild.id, |g| g.apply_update(guild)).is_none() {
            self.cache.guilds().insert(CachedGuild::from(guild));
        }
    }

    fn guild_delete(&self, delete: &GuildDelete) {
        let config = self.cache.config();
        let mut members: HashSet<Snowflake> = delete
            .members
            .iter()
            .filter_map(|m| m.user.as_ref().map(|u| u.id))
            .collect();
        let mut channels: HashSet<Snowflake> = delete.channels.iter().map(|c| c.id).collect();
        let mut roles: HashSet<Snowflake> = delete.roles.iter().map(|r| r.id).collect();
        if let Some(old) = &delete.old {
            members.extend(old.members.iter().copied());
            channels.extend(old.channels.iter().copied());
            roles.extend(old.roles.iter().copied());
        }

        if config.members {
            for user_id in &members {
                self.cache.members().remove(&MemberKey::new(delete.id, *user_id));
            }
        }
        if config.channels {
            for channel_id in &channels {
                self.cache.channels().remove(channel_id);
            }
        }
        if config.roles {
            for role_id in &roles {
                self.cache.roles().remove(role_id);
            }
        }
        if config.voice_states {
            self.cache.voice_states().retain(|s| s.guild_id != delete.id);
        }
        if config.guilds {
            self.cache.guilds().remove(&delete.id);
        }
        log::debug!(
            "guild {} removed with {} members, {} channels, {} roles",
            delete.id,
            members.len(),
            channels.len(),
            roles.len()
        );
    }

    fn guild_ban_add(&self, ban: &GuildBan) {
        if !self.cache.config().guilds {
            return;
        }
        self.cache.guilds().modify(&ban.guild_id, |g| {
            if g.members.remove(&ban.user.id) {
                g.member_count = g.member_count.saturating_sub(1);
            }
        });
    }

    fn member_add(&self, member: &GuildMember) {
        let config = self.cache.config();
        if config.users {
            self.cache.users().insert(member.user.clone());
        }
        if config.members {
            self.cache.members().insert(member.clone());
        }
        if config.guilds {
            self.cache.guilds().modify(&member.guild_id, |g| {
                if g.members.insert(member.user_id()) {
                    g.member_count += 1;
                }
            });
        }
    }

    fn member_remove(&self, guild_id: Snowflake, user_id: Snowflake) {
        let config = self.cache.config();
        if config.guilds {
            self.cache.guilds().modify(&guild_id, |g| {
                if g.members.remove(&user_id) {
                    g.member_count = g.member_count.saturating_sub(1);
                }
            });
        }
        let key = MemberKey::new(guild_id, user_id);
        if config.members {
            self.cache.members().remove(&key);
        }
        if config.voice_states {
            self.cache.voice_states().remove(&key);
        }
    }

    fn member_update(&self, member: &GuildMember) {
        let config = self.cache.config();
        if config.users {
            self.cache.users().insert(member.user.clone());
        }
        if config.members {
            self.cache.members().insert(member.clone());
        }
        if config.guilds {
            self.cache.guilds().modify(&member.guild_id, |g| {
                g.members.insert(member.user_id());
            });
        }
    }

    fn put_role(&self, event: &mut GuildRole) {
        let config = self.cache.config();
        event.role.guild_id = Some(event.guild_id);
        if config.roles {
            self.cache.roles().insert(event.role.clone());
        }
        if config.guilds {
            let role_id = event.role.id;
            self.cache.guilds().modify(&event.guild_id, |g| {
                g.roles.insert(role_id);
            });
        }
    }

    fn role_delete(&self, delete: &GuildRoleDelete) {
        let config = self.cache.config();
        if config.roles {
            self.cache.roles().remove(&delete.role_id);
        }
        if config.guilds {
            self.cache.guilds().modify(&delete.guild_id, |g| {
                g.roles.remove(&delete.role_id);
            });
        }
    }

    fn put_voice_state(&self, state: &VoiceState) {
        if !self.cache.config().voice_states {
            return;
        }
        let Some(guild_id) = state.guild_id else {
            return;
        };
        self.cache.voice_states().insert(VoiceStateLight {
            guild_id,
            channel_id: state.channel_id,
            user_id: state.user_id,
        });
    }
}
