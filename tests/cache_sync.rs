use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fluxer_gateway::prelude::*;
use serde_json::{json, Value};

fn router(config: CacheConfig) -> GatewayEventRouter {
    GatewayEventRouter::new(Arc::new(Cache::new(config)), Arc::new(EventBus::new()))
}

fn send(router: &GatewayEventRouter, name: &str, data: Value) -> Arc<Event> {
    router
        .dispatch(name, data.to_string().as_bytes(), None)
        .unwrap()
        .unwrap()
}

fn user(id: u64) -> Value {
    json!({ "id": id.to_string(), "username": format!("user{}", id) })
}

fn guild_with_members(ids: &[u64]) -> Value {
    let members: Vec<Value> = ids.iter().map(|id| json!({ "user": user(*id), "roles": [] })).collect();
    json!({
        "id": "1",
        "name": "test guild",
        "members": members,
        "channels": [{ "id": "10", "type": 0, "name": "general" }],
        "roles": [{ "id": "20", "name": "@everyone" }],
        "voice_states": [{ "user_id": ids.first().copied().unwrap_or(0).to_string(), "channel_id": "11" }]
    })
}

#[test]
fn guild_create_populates_every_cache() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3, 4]));
    let cache = router.cache();

    assert_eq!(cache.users().len(), 3);
    assert_eq!(cache.members().len(), 3);
    let guild = cache.guild(Snowflake(1)).unwrap();
    assert_eq!(guild.member_count, 3);
    assert_eq!(guild.members.len(), 3);
    assert_eq!(cache.guild_members(Snowflake(1)).len(), 3);

    assert_eq!(cache.channel(Snowflake(10)).unwrap().guild_id, Some(Snowflake(1)));
    assert_eq!(cache.role(Snowflake(20)).unwrap().guild_id, Some(Snowflake(1)));
    let state = cache.voice_state(Snowflake(1), Snowflake(2)).unwrap();
    assert_eq!(state.channel_id, Some(Snowflake(11)));
}

#[test]
fn malformed_members_are_skipped_individually() {
    let router = router(CacheConfig::default());
    send(
        &router,
        "GUILD_CREATE",
        json!({
            "id": "1",
            "members": [
                { "user": user(2) },
                { "nick": "no user object" },
                { "user": { "id": "not a snowflake" } },
                { "user": user(3) }
            ]
        }),
    );
    let cache = router.cache();
    assert_eq!(cache.members().len(), 2);
    assert!(cache.member(Snowflake(1), Snowflake(2)).is_some());
    assert!(cache.member(Snowflake(1), Snowflake(3)).is_some());
    assert_eq!(cache.guild(Snowflake(1)).unwrap().member_count, 2);
}

#[test]
fn channel_create_links_to_cached_guild() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", json!({ "id": "1" }));
    send(
        &router,
        "CHANNEL_CREATE",
        json!({ "id": "30", "type": 0, "guild_id": "1", "name": "new" }),
    );

    let cache = router.cache();
    assert!(cache.channel(Snowflake(30)).is_some());
    assert!(cache.guild(Snowflake(1)).unwrap().channels.contains(&Snowflake(30)));

    send(&router, "CHANNEL_DELETE", json!({ "id": "30", "type": 0, "guild_id": "1" }));
    assert!(cache.channel(Snowflake(30)).is_none());
    assert!(!cache.guild(Snowflake(1)).unwrap().channels.contains(&Snowflake(30)));
}

#[test]
fn channel_update_reports_previous_value() {
    let router = router(CacheConfig::default());
    send(&router, "CHANNEL_CREATE", json!({ "id": "30", "name": "before" }));
    let event = send(&router, "CHANNEL_UPDATE", json!({ "id": "30", "name": "after" }));

    match event.as_ref() {
        Event::ChannelUpdate(update) => {
            assert_eq!(update.old.as_ref().unwrap().name.as_deref(), Some("before"));
            assert_eq!(update.new.name.as_deref(), Some("after"));
        }
        other => panic!("unexpected {:?}", other.kind()),
    }
    assert_eq!(
        router.cache().channel(Snowflake(30)).unwrap().name.as_deref(),
        Some("after")
    );
}

#[test]
fn member_removal_decrements_once() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3, 4]));
    let removal = json!({ "guild_id": "1", "user": user(3) });

    let event = send(&router, "GUILD_MEMBER_REMOVE", removal.clone());
    match event.as_ref() {
        Event::GuildMemberRemove(remove) => assert_eq!(remove.old.as_ref().unwrap().user_id(), Snowflake(3)),
        other => panic!("unexpected {:?}", other.kind()),
    }
    let guild = router.cache().guild(Snowflake(1)).unwrap();
    assert_eq!(guild.member_count, 2);
    assert!(!guild.members.contains(&Snowflake(3)));
    assert!(router.cache().member(Snowflake(1), Snowflake(3)).is_none());

    let event = send(&router, "GUILD_MEMBER_REMOVE", removal);
    match event.as_ref() {
        Event::GuildMemberRemove(remove) => assert!(remove.old.is_none()),
        other => panic!("unexpected {:?}", other.kind()),
    }
    assert_eq!(router.cache().guild(Snowflake(1)).unwrap().member_count, 2);
}

#[test]
fn member_count_never_goes_negative() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", json!({ "id": "1", "member_count": 0 }));
    send(&router, "GUILD_MEMBER_REMOVE", json!({ "guild_id": "1", "user": user(9) }));
    assert_eq!(router.cache().guild(Snowflake(1)).unwrap().member_count, 0);
}

#[test]
fn member_add_and_update() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2]));
    let member = json!({ "guild_id": "1", "user": user(5), "roles": [] });

    send(&router, "GUILD_MEMBER_ADD", member.clone());
    send(&router, "GUILD_MEMBER_ADD", member);
    let guild = router.cache().guild(Snowflake(1)).unwrap();
    assert_eq!(guild.member_count, 2);
    assert!(guild.members.contains(&Snowflake(5)));
    assert!(router.cache().user(Snowflake(5)).is_some());

    let event = send(
        &router,
        "GUILD_MEMBER_UPDATE",
        json!({ "guild_id": "1", "user": user(5), "nick": "fiver", "roles": ["20"] }),
    );
    match event.as_ref() {
        Event::GuildMemberUpdate(update) => {
            assert!(update.old.as_ref().unwrap().nick.is_none());
            assert_eq!(update.new.display_name(), "fiver");
        }
        other => panic!("unexpected {:?}", other.kind()),
    }
    let cached = router.cache().member(Snowflake(1), Snowflake(5)).unwrap();
    assert_eq!(cached.roles, vec![Snowflake(20)]);
}

#[test]
fn members_chunk_fills_member_set() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", json!({ "id": "1", "member_count": 3 }));
    send(
        &router,
        "GUILD_MEMBERS_CHUNK",
        json!({
            "guild_id": "1",
            "members": [{ "user": user(2) }, { "user": user(3) }, { "nick": "broken" }],
            "chunk_index": 0,
            "chunk_count": 1
        }),
    );
    let guild = router.cache().guild(Snowflake(1)).unwrap();
    assert_eq!(guild.members.len(), 2);
    assert_eq!(guild.member_count, 3);
    assert_eq!(router.cache().members().len(), 2);
}

#[test]
fn ban_drops_membership_but_keeps_record() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3]));
    send(&router, "GUILD_BAN_ADD", json!({ "guild_id": "1", "user": user(3) }));
    send(&router, "GUILD_BAN_ADD", json!({ "guild_id": "1", "user": user(3) }));

    let guild = router.cache().guild(Snowflake(1)).unwrap();
    assert_eq!(guild.member_count, 1);
    assert!(!guild.members.contains(&Snowflake(3)));
    assert!(router.cache().member(Snowflake(1), Snowflake(3)).is_some());
}

#[test]
fn removal_after_ban_counts_the_member_once() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3]));
    send(&router, "GUILD_BAN_ADD", json!({ "guild_id": "1", "user": user(3) }));
    let event = send(&router, "GUILD_MEMBER_REMOVE", json!({ "guild_id": "1", "user": user(3) }));

    match event.as_ref() {
        Event::GuildMemberRemove(remove) => assert!(remove.old.is_some()),
        other => panic!("unexpected event {:?}", other),
    }
    let cache = router.cache();
    let guild = cache.guild(Snowflake(1)).unwrap();
    assert_eq!(guild.member_count, 1);
    assert_eq!(guild.members.len(), 1);
    assert!(cache.member(Snowflake(1), Snowflake(3)).is_none());
    assert!(cache.member(Snowflake(1), Snowflake(2)).is_some());
}

#[test]
fn roles_stay_in_lockstep_with_guild() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", json!({ "id": "1" }));
    send(
        &router,
        "GUILD_ROLE_CREATE",
        json!({ "guild_id": "1", "role": { "id": "21", "name": "mod" } }),
    );
    let cache = router.cache();
    assert_eq!(cache.role(Snowflake(21)).unwrap().guild_id, Some(Snowflake(1)));
    assert!(cache.guild(Snowflake(1)).unwrap().roles.contains(&Snowflake(21)));

    let event = send(
        &router,
        "GUILD_ROLE_UPDATE",
        json!({ "guild_id": "1", "role": { "id": "21", "name": "admin" } }),
    );
    match event.as_ref() {
        Event::GuildRoleUpdate(update) => {
            assert_eq!(update.old.as_ref().unwrap().name, "mod");
            assert_eq!(update.new.role.guild_id, Some(Snowflake(1)));
        }
        other => panic!("unexpected {:?}", other.kind()),
    }

    let event = send(&router, "GUILD_ROLE_DELETE", json!({ "guild_id": "1", "role_id": "21" }));
    match event.as_ref() {
        Event::GuildRoleDelete(delete) => assert_eq!(delete.old.as_ref().unwrap().name, "admin"),
        other => panic!("unexpected {:?}", other.kind()),
    }
    assert!(cache.role(Snowflake(21)).is_none());
    assert!(!cache.guild(Snowflake(1)).unwrap().roles.contains(&Snowflake(21)));
}

#[test]
fn guild_update_keeps_children_and_reports_old() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3]));
    let event = send(&router, "GUILD_UPDATE", json!({ "id": "1", "name": "renamed" }));

    match event.as_ref() {
        Event::GuildUpdate(update) => {
            assert_eq!(update.old.as_ref().unwrap().name.as_deref(), Some("test guild"));
        }
        other => panic!("unexpected {:?}", other.kind()),
    }
    let guild = router.cache().guild(Snowflake(1)).unwrap();
    assert_eq!(guild.name.as_deref(), Some("renamed"));
    assert_eq!(guild.members.len(), 2);
    assert!(guild.channels.contains(&Snowflake(10)));
}

#[test]
fn guild_delete_removes_dependents() {
    let router = router(CacheConfig::default());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3]));
    let event = send(&router, "GUILD_DELETE", json!({ "id": "1", "unavailable": false }));

    match event.as_ref() {
        Event::GuildDelete(delete) => assert_eq!(delete.old.as_ref().unwrap().member_count, 2),
        other => panic!("unexpected {:?}", other.kind()),
    }
    let cache = router.cache();
    assert!(cache.guild(Snowflake(1)).is_none());
    assert!(cache.members().is_empty());
    assert!(cache.channel(Snowflake(10)).is_none());
    assert!(cache.role(Snowflake(20)).is_none());
    assert!(cache.voice_states().is_empty());
    // Users outlive their memberships.
    assert_eq!(cache.users().len(), 2);
}

#[test]
fn emoji_update_replaces_the_set() {
    let router = router(CacheConfig::default());
    send(
        &router,
        "GUILD_CREATE",
        json!({ "id": "1", "emojis": [{ "id": "40", "name": "old" }] }),
    );
    send(
        &router,
        "GUILD_EMOJIS_UPDATE",
        json!({ "guild_id": "1", "emojis": [{ "id": "41", "name": "a" }, { "id": "42", "name": "b" }] }),
    );
    let emoji = router.cache().guild(Snowflake(1)).unwrap().emoji;
    assert_eq!(emoji.len(), 2);
    assert!(!emoji.contains(&Snowflake(40)));
}

#[test]
fn disabled_kinds_are_never_written() {
    let config = CacheConfig {
        members: false,
        ..CacheConfig::default()
    };
    let router = router(config);
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3, 4]));
    assert!(router.cache().members().is_empty());
    assert_eq!(router.cache().users().len(), 3);

    let router = self::router(CacheConfig::none());
    send(&router, "GUILD_CREATE", guild_with_members(&[2, 3, 4]));
    send(&router, "USER_UPDATE", user(2));
    let cache = router.cache();
    assert!(cache.guilds().is_empty());
    assert!(cache.users().is_empty());
    assert!(cache.channels().is_empty());
    assert!(cache.roles().is_empty());
    assert!(cache.voice_states().is_empty());
}

#[test]
fn interactions_raise_secondary_events() {
    let router = router(CacheConfig::default());
    let inputs = Arc::new(AtomicUsize::new(0));
    let completions = Arc::new(AtomicUsize::new(0));
    let all = Arc::new(AtomicUsize::new(0));
    for (kind, counter) in [
        (EventKind::InputEventCreate, inputs.clone()),
        (EventKind::AutoCompleteEntry, completions.clone()),
        (EventKind::InteractionCreate, all.clone()),
    ] {
        router.bus().subscribe(kind, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    for kind in [2, 4, 3, 5] {
        send(
            &router,
            "INTERACTION_CREATE",
            json!({ "id": "1", "application_id": "2", "type": kind, "token": "t" }),
        );
    }
    assert_eq!(all.load(Ordering::SeqCst), 4);
    assert_eq!(inputs.load(Ordering::SeqCst), 2);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[test]
fn subscribers_see_events_until_unsubscribed() {
    let router = router(CacheConfig::default());
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let token = router.bus().subscribe(EventKind::UserUpdate, move |event| {
        assert!(matches!(event.as_ref(), Event::UserUpdate(_)));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    send(&router, "USER_UPDATE", user(2));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(router.bus().unsubscribe(token));
    send(&router, "USER_UPDATE", user(2));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_and_malformed_dispatches() {
    let router = router(CacheConfig::default());
    assert!(router.dispatch("SOMETHING_NEW", b"{}", None).unwrap().is_none());
    assert!(router.dispatch("INPUT_EVENT_CREATE", b"{}", None).unwrap().is_none());

    let err = router
        .dispatch("GUILD_MEMBER_ADD", br#"{"guild_id":"1"}"#, None)
        .unwrap_err();
    assert!(matches!(err, ClientError::Decode { kind: EventKind::GuildMemberAdd, .. }));
}
