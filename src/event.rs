//! Gateway event kinds, the typed records they decode into, and the async
//! handler trait applications implement.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{from_slice, Value};

use crate::client::Context;
use crate::model::*;

macro_rules! event_kinds {
    ($($kind:ident => $name:literal,)*) => {
        /// Every event kind the bus can carry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($kind,)*
        }

        impl EventKind {
            pub const ALL: &'static [EventKind] = &[$(EventKind::$kind,)*];

            /// The `t` field of the dispatch carrying this event.
            pub fn name(self) -> &'static str {
                match self {
                    $(EventKind::$kind => $name,)*
                }
            }

            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EventKind::$kind),)*
                    _ => None,
                }
            }
        }
    };
}

event_kinds! {
    Ready => "READY",
    Resumed => "RESUMED",
    ApplicationCommandPermissionsUpdate => "APPLICATION_COMMAND_PERMISSIONS_UPDATE",
    AutoModerationRuleCreate => "AUTO_MODERATION_RULE_CREATE",
    AutoModerationRuleUpdate => "AUTO_MODERATION_RULE_UPDATE",
    AutoModerationRuleDelete => "AUTO_MODERATION_RULE_DELETE",
    AutoModerationActionExecution => "AUTO_MODERATION_ACTION_EXECUTION",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelUpdate => "CHANNEL_UPDATE",
    ChannelDelete => "CHANNEL_DELETE",
    ChannelPinsUpdate => "CHANNEL_PINS_UPDATE",
    ThreadCreate => "THREAD_CREATE",
    ThreadUpdate => "THREAD_UPDATE",
    ThreadDelete => "THREAD_DELETE",
    ThreadListSync => "THREAD_LIST_SYNC",
    ThreadMemberUpdate => "THREAD_MEMBER_UPDATE",
    ThreadMembersUpdate => "THREAD_MEMBERS_UPDATE",
    GuildCreate => "GUILD_CREATE",
    GuildUpdate => "GUILD_UPDATE",
    GuildDelete => "GUILD_DELETE",
    GuildBanAdd => "GUILD_BAN_ADD",
    GuildBanRemove => "GUILD_BAN_REMOVE",
    GuildEmojisUpdate => "GUILD_EMOJIS_UPDATE",
    GuildStickersUpdate => "GUILD_STICKERS_UPDATE",
    GuildIntegrationsUpdate => "GUILD_INTEGRATIONS_UPDATE",
    GuildMemberAdd => "GUILD_MEMBER_ADD",
    GuildMemberRemove => "GUILD_MEMBER_REMOVE",
    GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
    GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
    GuildRoleCreate => "GUILD_ROLE_CREATE",
    GuildRoleUpdate => "GUILD_ROLE_UPDATE",
    GuildRoleDelete => "GUILD_ROLE_DELETE",
    GuildScheduledEventCreate => "GUILD_SCHEDULED_EVENT_CREATE",
    GuildScheduledEventUpdate => "GUILD_SCHEDULED_EVENT_UPDATE",
    GuildScheduledEventDelete => "GUILD_SCHEDULED_EVENT_DELETE",
    GuildScheduledEventUserAdd => "GUILD_SCHEDULED_EVENT_USER_ADD",
    GuildScheduledEventUserRemove => "GUILD_SCHEDULED_EVENT_USER_REMOVE",
    IntegrationCreate => "INTEGRATION_CREATE",
    IntegrationUpdate => "INTEGRATION_UPDATE",
    IntegrationDelete => "INTEGRATION_DELETE",
    InteractionCreate => "INTERACTION_CREATE",
    InputEventCreate => "INPUT_EVENT_CREATE",
    AutoCompleteEntry => "AUTOCOMPLETE_ENTRY",
    InviteCreate => "INVITE_CREATE",
    InviteDelete => "INVITE_DELETE",
    MessageCreate => "MESSAGE_CREATE",
    MessageUpdate => "MESSAGE_UPDATE",
    MessageDelete => "MESSAGE_DELETE",
    MessageDeleteBulk => "MESSAGE_DELETE_BULK",
    MessageReactionAdd => "MESSAGE_REACTION_ADD",
    MessageReactionRemove => "MESSAGE_REACTION_REMOVE",
    MessageReactionRemoveAll => "MESSAGE_REACTION_REMOVE_ALL",
    MessageReactionRemoveEmoji => "MESSAGE_REACTION_REMOVE_EMOJI",
    PresenceUpdate => "PRESENCE_UPDATE",
    StageInstanceCreate => "STAGE_INSTANCE_CREATE",
    StageInstanceUpdate => "STAGE_INSTANCE_UPDATE",
    StageInstanceDelete => "STAGE_INSTANCE_DELETE",
    TypingStart => "TYPING_START",
    UserUpdate => "USER_UPDATE",
    VoiceStateUpdate => "VOICE_STATE_UPDATE",
    VoiceServerUpdate => "VOICE_SERVER_UPDATE",
    WebhooksUpdate => "WEBHOOKS_UPDATE",
}

impl EventKind {
    pub const COUNT: usize = Self::ALL.len();

    /// Position in [`EventKind::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kinds raised by the library itself, never sent by the gateway.
    pub fn is_synthetic(self) -> bool {
        matches!(self, EventKind::InputEventCreate | EventKind::AutoCompleteEntry)
    }

    /// Maps the `t` field of a dispatch to its kind.
    pub fn from_dispatch_name(name: &str) -> Option<Self> {
        Self::from_name(name).filter(|kind| !kind.is_synthetic())
    }
}

/// A decoded gateway event.
///
/// Update and removal records carry what the cache held before the event was
/// applied; the router fills that in, [`Event::decode`] leaves it empty.
#[derive(Debug, Clone)]
pub enum Event {
    Ready(Ready),
    Resumed,
    ApplicationCommandPermissionsUpdate(Value),
    AutoModerationRuleCreate(Value),
    AutoModerationRuleUpdate(Value),
    AutoModerationRuleDelete(Value),
    AutoModerationActionExecution(AutoModerationActionExecution),
    ChannelCreate(Channel),
    ChannelUpdate(Updated<Channel>),
    ChannelDelete(Channel),
    ChannelPinsUpdate(ChannelPinsUpdate),
    ThreadCreate(Channel),
    ThreadUpdate(Channel),
    ThreadDelete(Value),
    ThreadListSync(Value),
    ThreadMemberUpdate(Value),
    ThreadMembersUpdate(Value),
    GuildCreate(Guild),
    GuildUpdate(Updated<Guild, CachedGuild>),
    GuildDelete(GuildDelete),
    GuildBanAdd(GuildBan),
    GuildBanRemove(GuildBan),
    GuildEmojisUpdate(GuildEmojisUpdate),
    GuildStickersUpdate(GuildStickersUpdate),
    GuildIntegrationsUpdate(GuildIntegrationsUpdate),
    GuildMemberAdd(GuildMember),
    GuildMemberRemove(GuildMemberRemove),
    GuildMemberUpdate(Updated<GuildMember>),
    GuildMembersChunk(GuildMembersChunk),
    GuildRoleCreate(GuildRole),
    GuildRoleUpdate(Updated<GuildRole, Role>),
    GuildRoleDelete(GuildRoleDelete),
    GuildScheduledEventCreate(Value),
    GuildScheduledEventUpdate(Value),
    GuildScheduledEventDelete(Value),
    GuildScheduledEventUserAdd(GuildScheduledEventUser),
    GuildScheduledEventUserRemove(GuildScheduledEventUser),
    IntegrationCreate(Value),
    IntegrationUpdate(Value),
    IntegrationDelete(IntegrationDelete),
    InteractionCreate(Interaction),
    InputEventCreate(Interaction),
    AutoCompleteEntry(Interaction),
    InviteCreate(InviteCreate),
    InviteDelete(InviteDelete),
    MessageCreate(Message),
    MessageUpdate(MessageUpdate),
    MessageDelete(MessageDelete),
    MessageDeleteBulk(MessageDeleteBulk),
    MessageReactionAdd(ReactionAdd),
    MessageReactionRemove(ReactionRemove),
    MessageReactionRemoveAll(ReactionRemoveAll),
    MessageReactionRemoveEmoji(ReactionRemoveEmoji),
    PresenceUpdate(Value),
    StageInstanceCreate(Value),
    StageInstanceUpdate(Value),
    StageInstanceDelete(Value),
    TypingStart(TypingStart),
    UserUpdate(Updated<User>),
    VoiceStateUpdate(VoiceState),
    VoiceServerUpdate(VoiceServerUpdate),
    WebhooksUpdate(WebhooksUpdate),
}

impl Event {
    /// Decodes the `d` field of a dispatch.
    pub fn decode(kind: EventKind, data: &[u8]) -> Result<Self, serde_json::Error> {
        let event = match kind {
            EventKind::Ready => Event::Ready(from_slice(data)?),
            EventKind::Resumed => Event::Resumed,
            EventKind::ApplicationCommandPermissionsUpdate => {
                Event::ApplicationCommandPermissionsUpdate(from_slice(data)?)
            }
            EventKind::AutoModerationRuleCreate => Event::AutoModerationRuleCreate(from_slice(data)?),
            EventKind::AutoModerationRuleUpdate => Event::AutoModerationRuleUpdate(from_slice(data)?),
            EventKind::AutoModerationRuleDelete => Event::AutoModerationRuleDelete(from_slice(data)?),
            EventKind::AutoModerationActionExecution => {
                Event::AutoModerationActionExecution(from_slice(data)?)
            }
            EventKind::ChannelCreate => Event::ChannelCreate(from_slice(data)?),
            EventKind::ChannelUpdate => Event::ChannelUpdate(Updated::new(from_slice(data)?)),
            EventKind::ChannelDelete => Event::ChannelDelete(from_slice(data)?),
            EventKind::ChannelPinsUpdate => Event::ChannelPinsUpdate(from_slice(data)?),
            EventKind::ThreadCreate => Event::ThreadCreate(from_slice(data)?),
            EventKind::ThreadUpdate => Event::ThreadUpdate(from_slice(data)?),
            EventKind::ThreadDelete => Event::ThreadDelete(from_slice(data)?),
            EventKind::ThreadListSync => Event::ThreadListSync(from_slice(data)?),
            EventKind::ThreadMemberUpdate => Event::ThreadMemberUpdate(from_slice(data)?),
            EventKind::ThreadMembersUpdate => Event::ThreadMembersUpdate(from_slice(data)?),
            EventKind::GuildCreate => Event::GuildCreate(from_slice(data)?),
            EventKind::GuildUpdate => Event::GuildUpdate(Updated::new(from_slice(data)?)),
            EventKind::GuildDelete => Event::GuildDelete(from_slice(data)?),
            EventKind::GuildBanAdd => Event::GuildBanAdd(from_slice(data)?),
            EventKind::GuildBanRemove => Event::GuildBanRemove(from_slice(data)?),
            EventKind::GuildEmojisUpdate => Event::GuildEmojisUpdate(from_slice(data)?),
            EventKind::GuildStickersUpdate => Event::GuildStickersUpdate(from_slice(data)?),
            EventKind::GuildIntegrationsUpdate => Event::GuildIntegrationsUpdate(from_slice(data)?),
            EventKind::GuildMemberAdd => Event::GuildMemberAdd(from_slice(data)?),
            EventKind::GuildMemberRemove => Event::GuildMemberRemove(from_slice(data)?),
            EventKind::GuildMemberUpdate => Event::GuildMemberUpdate(Updated::new(from_slice(data)?)),
            EventKind::GuildMembersChunk => Event::GuildMembersChunk(from_slice(data)?),
            EventKind::GuildRoleCreate => Event::GuildRoleCreate(from_slice(data)?),
            EventKind::GuildRoleUpdate => Event::GuildRoleUpdate(Updated::new(from_slice(data)?)),
            EventKind::GuildRoleDelete => Event::GuildRoleDelete(from_slice(data)?),
            EventKind::GuildScheduledEventCreate => Event::GuildScheduledEventCreate(from_slice(data)?),
            EventKind::GuildScheduledEventUpdate => Event::GuildScheduledEventUpdate(from_slice(data)?),
            EventKind::GuildScheduledEventDelete => Event::GuildScheduledEventDelete(from_slice(data)?),
            EventKind::GuildScheduledEventUserAdd => Event::GuildScheduledEventUserAdd(from_slice(data)?),
            EventKind::GuildScheduledEventUserRemove => {
                Event::GuildScheduledEventUserRemove(from_slice(data)?)
            }
            EventKind::IntegrationCreate => Event::IntegrationCreate(from_slice(data)?),
            EventKind::IntegrationUpdate => Event::IntegrationUpdate(from_slice(data)?),
            EventKind::IntegrationDelete => Event::IntegrationDelete(from_slice(data)?),
            EventKind::InteractionCreate => Event::InteractionCreate(from_slice(data)?),
            EventKind::InputEventCreate => Event::InputEventCreate(from_slice(data)?),
            EventKind::AutoCompleteEntry => Event::AutoCompleteEntry(from_slice(data)?),
            EventKind::InviteCreate => Event::InviteCreate(from_slice(data)?),
            EventKind::InviteDelete => Event::InviteDelete(from_slice(data)?),
            EventKind::MessageCreate => Event::MessageCreate(from_slice(data)?),
            EventKind::MessageUpdate => Event::MessageUpdate(from_slice(data)?),
            EventKind::MessageDelete => Event::MessageDelete(from_slice(data)?),
            EventKind::MessageDeleteBulk => Event::MessageDeleteBulk(from_slice(data)?),
            EventKind::MessageReactionAdd => Event::MessageReactionAdd(from_slice(data)?),
            EventKind::MessageReactionRemove => Event::MessageReactionRemove(from_slice(data)?),
            EventKind::MessageReactionRemoveAll => Event::MessageReactionRemoveAll(from_slice(data)?),
            EventKind::MessageReactionRemoveEmoji => Event::MessageReactionRemoveEmoji(from_slice(data)?),
            EventKind::PresenceUpdate => Event::PresenceUpdate(from_slice(data)?),
            EventKind::StageInstanceCreate => Event::StageInstanceCreate(from_slice(data)?),
            EventKind::StageInstanceUpdate => Event::StageInstanceUpdate(from_slice(data)?),
            EventKind::StageInstanceDelete => Event::StageInstanceDelete(from_slice(data)?),
            EventKind::TypingStart => Event::TypingStart(from_slice(data)?),
            EventKind::UserUpdate => Event::UserUpdate(Updated::new(from_slice(data)?)),
            EventKind::VoiceStateUpdate => Event::VoiceStateUpdate(from_slice(data)?),
            EventKind::VoiceServerUpdate => Event::VoiceServerUpdate(from_slice(data)?),
            EventKind::WebhooksUpdate => Event::WebhooksUpdate(from_slice(data)?),
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Ready(_) => EventKind::Ready,
            Event::Resumed => EventKind::Resumed,
            Event::ApplicationCommandPermissionsUpdate(_) => EventKind::ApplicationCommandPermissionsUpdate,
            Event::AutoModerationRuleCreate(_) => EventKind::AutoModerationRuleCreate,
            Event::AutoModerationRuleUpdate(_) => EventKind::AutoModerationRuleUpdate,
            Event::AutoModerationRuleDelete(_) => EventKind::AutoModerationRuleDelete,
            Event::AutoModerationActionExecution(_) => EventKind::AutoModerationActionExecution,
            Event::ChannelCreate(_) => EventKind::ChannelCreate,
            Event::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Event::ChannelDelete(_) => EventKind::ChannelDelete,
            Event::ChannelPinsUpdate(_) => EventKind::ChannelPinsUpdate,
            Event::ThreadCreate(_) => EventKind::ThreadCreate,
            Event::ThreadUpdate(_) => EventKind::ThreadUpdate,
            Event::ThreadDelete(_) => EventKind::ThreadDelete,
            Event::ThreadListSync(_) => EventKind::ThreadListSync,
            Event::ThreadMemberUpdate(_) => EventKind::ThreadMemberUpdate,
            Event::ThreadMembersUpdate(_) => EventKind::ThreadMembersUpdate,
            Event::GuildCreate(_) => EventKind::GuildCreate,
            Event::GuildUpdate(_) => EventKind::GuildUpdate,
            Event::GuildDelete(_) => EventKind::GuildDelete,
            Event::GuildBanAdd(_) => EventKind::GuildBanAdd,
            Event::GuildBanRemove(_) => EventKind::GuildBanRemove,
            Event::GuildEmojisUpdate(_) => EventKind::GuildEmojisUpdate,
            Event::GuildStickersUpdate(_) => EventKind::GuildStickersUpdate,
            Event::GuildIntegrationsUpdate(_) => EventKind::GuildIntegrationsUpdate,
            Event::GuildMemberAdd(_) => EventKind::GuildMemberAdd,
            Event::GuildMemberRemove(_) => EventKind::GuildMemberRemove,
            Event::GuildMemberUpdate(_) => EventKind::GuildMemberUpdate,
            Event::GuildMembersChunk(_) => EventKind::GuildMembersChunk,
            Event::GuildRoleCreate(_) => EventKind::GuildRoleCreate,
            Event::GuildRoleUpdate(_) => EventKind::GuildRoleUpdate,
            Event::GuildRoleDelete(_) => EventKind::GuildRoleDelete,
            Event::GuildScheduledEventCreate(_) => EventKind::GuildScheduledEventCreate,
            Event::GuildScheduledEventUpdate(_) => EventKind::GuildScheduledEventUpdate,
            Event::GuildScheduledEventDelete(_) => EventKind::GuildScheduledEventDelete,
            Event::GuildScheduledEventUserAdd(_) => EventKind::GuildScheduledEventUserAdd,
            Event::GuildScheduledEventUserRemove(_) => EventKind::GuildScheduledEventUserRemove,
            Event::IntegrationCreate(_) => EventKind::IntegrationCreate,
            Event::IntegrationUpdate(_) => EventKind::IntegrationUpdate,
            Event::IntegrationDelete(_) => EventKind::IntegrationDelete,
            Event::InteractionCreate(_) => EventKind::InteractionCreate,
            Event::InputEventCreate(_) => EventKind::InputEventCreate,
            Event::AutoCompleteEntry(_) => EventKind::AutoCompleteEntry,
            Event::InviteCreate(_) => EventKind::InviteCreate,
            Event::InviteDelete(_) => EventKind::InviteDelete,
            Event::MessageCreate(_) => EventKind::MessageCreate,
            Event::MessageUpdate(_) => EventKind::MessageUpdate,
            Event::MessageDelete(_) => EventKind::MessageDelete,
            Event::MessageDeleteBulk(_) => EventKind::MessageDeleteBulk,
            Event::MessageReactionAdd(_) => EventKind::MessageReactionAdd,
            Event::MessageReactionRemove(_) => EventKind::MessageReactionRemove,
            Event::MessageReactionRemoveAll(_) => EventKind::MessageReactionRemoveAll,
            Event::MessageReactionRemoveEmoji(_) => EventKind::MessageReactionRemoveEmoji,
            Event::PresenceUpdate(_) => EventKind::PresenceUpdate,
            Event::StageInstanceCreate(_) => EventKind::StageInstanceCreate,
            Event::StageInstanceUpdate(_) => EventKind::StageInstanceUpdate,
            Event::StageInstanceDelete(_) => EventKind::StageInstanceDelete,
            Event::TypingStart(_) => EventKind::TypingStart,
            Event::UserUpdate(_) => EventKind::UserUpdate,
            Event::VoiceStateUpdate(_) => EventKind::VoiceStateUpdate,
            Event::VoiceServerUpdate(_) => EventKind::VoiceServerUpdate,
            Event::WebhooksUpdate(_) => EventKind::WebhooksUpdate,
        }
    }
}

/// Async callbacks for applications that prefer a trait over bus closures.
///
/// Every method has an empty default, so implement only what you need. Each
/// event runs in its own spawned task; a slow handler never holds up the
/// gateway. [`on_event`](EventHandler::on_event) sees every event after the
/// typed method for it.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_ready(&self, ctx: Context, ready: Ready) {
        let _ = (ctx, ready);
    }

    async fn on_message(&self, ctx: Context, msg: Message) {
        let _ = (ctx, msg);
    }

    async fn on_guild_create(&self, ctx: Context, guild: Guild) {
        let _ = (ctx, guild);
    }

    async fn on_member_add(&self, ctx: Context, member: GuildMember) {
        let _ = (ctx, member);
    }

    async fn on_interaction(&self, ctx: Context, interaction: Interaction) {
        let _ = (ctx, interaction);
    }

    async fn on_voice_state_update(&self, ctx: Context, state: VoiceState) {
        let _ = (ctx, state);
    }

    async fn on_event(&self, ctx: Context, event: Arc<Event>) {
        let _ = (ctx, event);
    }
}

pub(crate) async fn dispatch_to_handler(handler: &dyn EventHandler, ctx: Context, event: Arc<Event>) {
    match event.as_ref() {
        Event::Ready(ready) => handler.on_ready(ctx.clone(), ready.clone()).await,
        Event::MessageCreate(msg) => handler.on_message(ctx.clone(), msg.clone()).await,
        Event::GuildCreate(guild) => handler.on_guild_create(ctx.clone(), guild.clone()).await,
        Event::GuildMemberAdd(member) => handler.on_member_add(ctx.clone(), member.clone()).await,
        Event::InteractionCreate(interaction) => {
            handler.on_interaction(ctx.clone(), interaction.clone()).await
        }
        Event::VoiceStateUpdate(state) => {
            handler.on_voice_state_update(ctx.clone(), state.clone()).await
        }
        _ => {}
    }
    handler.on_event(ctx, event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in EventKind::ALL {
            if kind.is_synthetic() {
                assert_eq!(EventKind::from_dispatch_name(kind.name()), None);
            } else {
                assert_eq!(EventKind::from_dispatch_name(kind.name()), Some(*kind));
            }
        }
        assert_eq!(EventKind::from_dispatch_name("NOT_A_THING"), None);
    }

    #[test]
    fn index_matches_table_position() {
        for (position, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
        assert!(EventKind::COUNT >= 60);
    }

    #[test]
    fn decode_tags_the_right_kind() {
        let data = br#"{"id":"5","type":0,"guild_id":"1","name":"general"}"#;
        let event = Event::decode(EventKind::ChannelCreate, data).unwrap();
        assert_eq!(event.kind(), EventKind::ChannelCreate);
        let update = Event::decode(EventKind::ChannelUpdate, data).unwrap();
        match update {
            Event::ChannelUpdate(update) => {
                assert!(update.old.is_none());
                assert_eq!(update.new.id, Snowflake(5));
            }
            other => panic!("unexpected {:?}", other.kind()),
        }
    }

    #[test]
    fn decode_reports_malformed_payloads() {
        assert!(Event::decode(EventKind::GuildMemberRemove, br#"{"guild_id":"1"}"#).is_err());
        assert!(Event::decode(EventKind::MessageCreate, b"not json").is_err());
    }
}
