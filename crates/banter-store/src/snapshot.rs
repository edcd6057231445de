use banter_proto::protocol::{GroupInfo, MessageRecord, UserProfile};
use serde::{Deserialize, Serialize};

/// A registered account as stored on disk. `password_hash` is an argon2
/// PHC string, never a plaintext password.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub avatar: String,
}

impl User {
    /// Public view of the account with the credential stripped.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Lifecycle state of a friendship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Pending,
    Accepted,
}

/// One friendship edge. At most one edge exists per unordered user pair;
/// `blocker_id`, when set, is always one of the two endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friendship {
    pub id: String,
    pub from: String,
    pub to: String,
    pub status: EdgeStatus,
    #[serde(default)]
    pub blocker_id: Option<String>,
}

impl Friendship {
    pub fn involves(&self, user_id: &str) -> bool {
        self.from == user_id || self.to == user_id
    }

    /// The other endpoint of the edge, seen from `user_id`.
    pub fn peer_of(&self, user_id: &str) -> &str {
        if self.from == user_id {
            &self.to
        } else {
            &self.from
        }
    }
}

/// The whole application state as flushed to the state file. Absent
/// collections in an older file load as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub friendships: Vec<Friendship>,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
}

/// Default avatar for a new user or group, derived from the first two
/// characters of the name.
pub fn default_avatar_url(seed: &str) -> String {
    let prefix: String = seed.chars().take(2).collect();
    format!(
        "https://ui-avatars.com/api/?name={prefix}&background=3b82f6&color=fff&size=128&bold=true"
    )
}
