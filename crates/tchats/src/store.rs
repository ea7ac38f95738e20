//! Token and room stores consulted by the admission gate.
//!
//! The gate only reads through the [`TokenValidator`], [`TokenStore`] and
//! [`RoomStore`] traits. [`MemoryStore`] is the in-process implementation,
//! populated from a TOML seed file and mutated only by its owner.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tchat_common::token;
use tchat_common::{RoomId, UserId};
use thiserror::Error;
use tracing::warn;

/// A backing store could not answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store is unreachable or failed internally.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors loading seed data.
#[derive(Debug, Error)]
pub enum SeedError {
    /// The seed file could not be read.
    #[error("cannot read seed file: {0}")]
    Io(#[from] std::io::Error),
    /// The seed file is not valid TOML for [`Seed`].
    #[error("cannot parse seed file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Two entries of the same kind share an id.
    #[error("duplicate {kind} id: {id}")]
    Duplicate {
        /// Entry kind (`user`, `token` or `room`).
        kind: &'static str,
        /// The repeated id.
        id: String,
    },
}

/// A resolved user. `id` is `None` when the token references a user that
/// no longer exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// User identifier compared against room participants.
    pub id: Option<UserId>,
    /// Display name, if known.
    pub name: Option<String>,
}

/// The identity bound to a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// The token string itself.
    pub token: String,
    /// The user the token was issued to.
    pub user: User,
    /// Expiry as Unix seconds; `None` never expires.
    pub expires_at: Option<u64>,
}

/// A chat room and its authorized participants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room identifier.
    pub id: RoomId,
    /// Users allowed to join.
    pub participants: HashSet<UserId>,
}

/// Checks a token's format before any lookup.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Returns `Ok(false)` for tokens that can never resolve.
    async fn is_token_valid(&self, token: &str) -> Result<bool, StoreError>;
}

/// Resolves tokens to their records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Look up a live token record. Expired records are not returned.
    async fn get_existing_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;
}

/// Resolves rooms by id.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Look up a room.
    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;
}

/// Validator accepting exactly the tokens [`token::is_well_formed`] accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatValidator;

#[async_trait]
impl TokenValidator for FormatValidator {
    async fn is_token_valid(&self, token: &str) -> Result<bool, StoreError> {
        Ok(token::is_well_formed(token))
    }
}

/// A user entry in the seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    /// User id.
    pub id: UserId,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A token entry in the seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedToken {
    /// The token string.
    pub token: String,
    /// Id of the user the token belongs to.
    pub user: UserId,
    /// Optional expiry in Unix seconds.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

/// A room entry in the seed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRoom {
    /// Room id.
    pub id: RoomId,
    /// User ids allowed to join.
    #[serde(default)]
    pub participants: Vec<UserId>,
}

/// Serialization wrapper matching the TOML seed file format.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Seed {
    /// Known users.
    #[serde(default)]
    pub users: Vec<SeedUser>,
    /// Issued tokens.
    #[serde(default)]
    pub tokens: Vec<SeedToken>,
    /// Rooms with their participants.
    #[serde(default)]
    pub rooms: Vec<SeedRoom>,
}

#[derive(Debug, Clone)]
struct StoredToken {
    user: UserId,
    expires_at: Option<u64>,
}

/// Concurrent in-memory token and room store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<UserId, Option<String>>,
    tokens: DashMap<String, StoredToken>,
    rooms: DashMap<RoomId, HashSet<UserId>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a TOML seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or contains
    /// duplicate ids.
    pub fn load_seed(path: &Path) -> Result<Self, SeedError> {
        let contents = std::fs::read_to_string(path)?;
        let seed: Seed = toml::from_str(&contents)?;
        Self::from_seed(seed)
    }

    /// Build a store from parsed seed data.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::Duplicate`] if two users, tokens or rooms share
    /// an id.
    pub fn from_seed(seed: Seed) -> Result<Self, SeedError> {
        let store = Self::new();

        for user in seed.users {
            let id = user.id.to_string();
            if store.insert_user(user.id, user.name).is_some() {
                return Err(SeedError::Duplicate { kind: "user", id });
            }
        }

        for t in seed.tokens {
            if !token::is_well_formed(&t.token) {
                warn!(user = %t.user, "seeded token is not well-formed and will never validate");
            }
            if !store.users.contains_key(&t.user) {
                warn!(user = %t.user, "seeded token references an unknown user");
            }
            if store.tokens.contains_key(&t.token) {
                return Err(SeedError::Duplicate {
                    kind: "token",
                    id: t.token,
                });
            }
            store.insert_token(t.token, t.user, t.expires_at);
        }

        for room in seed.rooms {
            if store.rooms.contains_key(&room.id) {
                return Err(SeedError::Duplicate {
                    kind: "room",
                    id: room.id.to_string(),
                });
            }
            for p in &room.participants {
                if !store.users.contains_key(p) {
                    warn!(room = %room.id, user = %p, "room participant is not a known user");
                }
            }
            store.insert_room(room.id, room.participants);
        }

        Ok(store)
    }

    /// Insert or replace a user, returning the previous display name entry.
    pub fn insert_user(&self, id: UserId, name: Option<String>) -> Option<Option<String>> {
        self.users.insert(id, name)
    }

    /// Issue a token for `user`.
    pub fn insert_token(&self, token: String, user: UserId, expires_at: Option<u64>) {
        self.tokens.insert(token, StoredToken { user, expires_at });
    }

    /// Revoke a token. Returns `true` if it existed.
    pub fn revoke_token(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Insert or replace a room with the given participants.
    pub fn insert_room(&self, id: RoomId, participants: impl IntoIterator<Item = UserId>) {
        self.rooms.insert(id, participants.into_iter().collect());
    }

    /// Add a participant. Returns `false` if the room does not exist.
    pub fn add_participant(&self, room: &RoomId, user: UserId) -> bool {
        match self.rooms.get_mut(room) {
            Some(mut participants) => {
                participants.insert(user);
                true
            }
            None => false,
        }
    }

    /// Remove a participant. Returns `true` if the user was a participant.
    pub fn remove_participant(&self, room: &RoomId, user: &UserId) -> bool {
        self.rooms
            .get_mut(room)
            .is_some_and(|mut participants| participants.remove(user))
    }

    /// Number of stored rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of stored tokens, including expired ones.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn resolve_user(&self, id: &UserId) -> User {
        match self.users.get(id) {
            Some(entry) => User {
                id: Some(id.clone()),
                name: entry.value().clone(),
            },
            None => User::default(),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_existing_token(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let Some(stored) = self.tokens.get(token).map(|e| e.value().clone()) else {
            return Ok(None);
        };

        if stored.expires_at.is_some_and(|at| at <= token::unix_now()) {
            return Ok(None);
        }

        Ok(Some(TokenRecord {
            token: token.to_string(),
            user: self.resolve_user(&stored.user),
            expires_at: stored.expires_at,
        }))
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn find_room_by_id(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(id).map(|entry| Room {
            id: id.clone(),
            participants: entry.value().clone(),
        }))
    }
}
