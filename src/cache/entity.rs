use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use parking_lot::RwLock;

use crate::model::{CachedGuild, Channel, GuildMember, Role, Snowflake, User, VoiceStateLight};

/// Key for records scoped to a guild and a user: members and voice states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberKey {
    pub guild_id: Snowflake,
    pub user_id: Snowflake,
}

impl MemberKey {
    pub fn new(guild_id: Snowflake, user_id: Snowflake) -> Self {
        Self { guild_id, user_id }
    }
}

/// A record that knows its own cache key.
pub trait CacheEntity: Clone + Send + Sync + 'static {
    type Key: Copy + Eq + Hash + Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

impl CacheEntity for CachedGuild {
    type Key = Snowflake;

    fn key(&self) -> Snowflake {
        self.id
    }
}

impl CacheEntity for Channel {
    type Key = Snowflake;

    fn key(&self) -> Snowflake {
        self.id
    }
}

impl CacheEntity for Role {
    type Key = Snowflake;

    fn key(&self) -> Snowflake {
        self.id
    }
}

impl CacheEntity for User {
    type Key = Snowflake;

    fn key(&self) -> Snowflake {
        self.id
    }
}

impl CacheEntity for GuildMember {
    type Key = MemberKey;

    fn key(&self) -> MemberKey {
        MemberKey::new(self.guild_id, self.user.id)
    }
}

impl CacheEntity for VoiceStateLight {
    type Key = MemberKey;

    fn key(&self) -> MemberKey {
        MemberKey::new(self.guild_id, self.user_id)
    }
}

/// A concurrent map holding one kind of entity.
///
/// Every kind has its own lock, so events touching different kinds never
/// contend. Lookups hand out clones; nothing borrowed escapes the lock.
#[derive(Debug)]
pub struct EntityCache<T: CacheEntity> {
    entries: RwLock<HashMap<T::Key, T>>,
}

impl<T: CacheEntity> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces, returning the previous record.
    pub fn insert(&self, value: T) -> Option<T> {
        self.entries.write().insert(value.key(), value)
    }

    pub fn get(&self, key: &T::Key) -> Option<T> {
        self.entries.read().get(key).cloned()
    }

    pub fn remove(&self, key: &T::Key) -> Option<T> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Mutates a record in place under the write lock.
    ///
    /// Returns `None` when the key is absent.
    pub fn modify<R>(&self, key: &T::Key, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.entries.write().get_mut(key).map(f)
    }

    /// Makes room for `additional` more records ahead of a bulk insert.
    pub fn reserve(&self, additional: usize) {
        self.entries.write().reserve(additional);
    }

    pub fn retain(&self, mut f: impl FnMut(&T) -> bool) {
        self.entries.write().retain(|_, value| f(value));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().capacity()
    }

    pub fn values(&self) -> Vec<T> {
        self.entries.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl<T: CacheEntity> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
