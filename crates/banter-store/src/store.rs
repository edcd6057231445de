use crate::snapshot::{EdgeStatus, Friendship, Snapshot, User, default_avatar_url};
use crate::time::now_ms;
use anyhow::{Context, Result, bail};
use banter_proto::protocol::{
    ContactSnapshot, FriendEntry, GroupInfo, GroupMember, MessageRecord, PendingRequest,
    PresenceStatus, UserProfile,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const DB_FILE: &str = "db.json";

/// Maximum number of results returned by a username search.
pub const SEARCH_LIMIT: usize = 10;

/// Outcome of the block check for a direct message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePermission {
    Allowed,
    BlockedBySelf,
    BlockedByPeer,
}

/// Persistent application state backed by one JSON file. Every mutator
/// rewrites the whole file; callers serialize access behind one lock so a
/// mutation never observes a half-applied peer.
pub struct ChatStore {
    state_path: PathBuf,
    db: Snapshot,
    last_timestamp: u64,
}

impl ChatStore {
    /// Load from disk, or create empty.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let state_path = state_dir.join(DB_FILE);

        let db = if state_path.exists() {
            let data = std::fs::read_to_string(&state_path).context("failed to read db.json")?;
            if data.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&data).context("invalid db.json")?
            }
        } else {
            Snapshot::default()
        };

        let last_timestamp = db.messages.iter().map(|m| m.timestamp).max().unwrap_or(0);

        Ok(Self {
            state_path,
            db,
            last_timestamp,
        })
    }

    fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.db)?;
        std::fs::write(&self.state_path, data)
            .with_context(|| format!("failed to write {}", self.state_path.display()))
    }

    /// Next message timestamp: wall clock, but strictly greater than every
    /// timestamp handed out before (including across restarts).
    fn next_timestamp(&mut self) -> u64 {
        let ts = now_ms().max(self.last_timestamp + 1);
        self.last_timestamp = ts;
        ts
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user with a fresh id and the default avatar. Usernames are
    /// unique case-insensitively.
    pub fn create_user(&mut self, username: &str, password_hash: &str) -> Result<User> {
        if self.username_taken(username) {
            bail!("username already taken: {username}");
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            avatar: default_avatar_url(username),
        };
        self.db.users.push(user.clone());
        self.save()?;
        Ok(user)
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.db.users.iter().find(|u| u.id == user_id)
    }

    /// Look up a user by name, case-insensitively.
    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.db
            .users
            .iter()
            .find(|u| u.username.eq_ignore_ascii_case(username))
    }

    pub fn username_taken(&self, username: &str) -> bool {
        self.user_by_username(username).is_some()
    }

    /// Case-insensitive prefix search over usernames, excluding the caller,
    /// capped at `SEARCH_LIMIT` results.
    pub fn search_users(&self, query: &str, self_id: &str) -> Vec<UserProfile> {
        let query = query.to_lowercase();
        self.db
            .users
            .iter()
            .filter(|u| u.id != self_id && u.username.to_lowercase().starts_with(&query))
            .take(SEARCH_LIMIT)
            .map(User::profile)
            .collect()
    }

    pub fn update_avatar(&mut self, user_id: &str, avatar: &str) -> Result<User> {
        let Some(user) = self.db.users.iter_mut().find(|u| u.id == user_id) else {
            bail!("no such user: {user_id}");
        };
        user.avatar = avatar.to_string();
        let updated = user.clone();
        self.save()?;
        Ok(updated)
    }

    /// Rename a user. Friend lists pick the new name up automatically;
    /// group member entries keep the display-name snapshot taken when the
    /// user joined.
    pub fn update_username(&mut self, user_id: &str, username: &str) -> Result<User> {
        if let Some(existing) = self.user_by_username(username)
            && existing.id != user_id
        {
            bail!("username already taken: {username}");
        }
        let Some(user) = self.db.users.iter_mut().find(|u| u.id == user_id) else {
            bail!("no such user: {user_id}");
        };
        user.username = username.to_string();
        let updated = user.clone();
        self.save()?;
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Friendship edges
    // -----------------------------------------------------------------------

    pub fn friendship(&self, edge_id: &str) -> Option<&Friendship> {
        self.db.friendships.iter().find(|f| f.id == edge_id)
    }

    /// The single edge between two users, in either direction.
    pub fn friendship_between(&self, a: &str, b: &str) -> Option<&Friendship> {
        self.db
            .friendships
            .iter()
            .find(|f| (f.from == a && f.to == b) || (f.from == b && f.to == a))
    }

    pub fn are_friends(&self, a: &str, b: &str) -> bool {
        matches!(
            self.friendship_between(a, b),
            Some(f) if f.status == EdgeStatus::Accepted
        )
    }

    /// Create a pending edge. At most one edge may exist per pair.
    pub fn create_friend_request(&mut self, from: &str, to: &str) -> Result<Friendship> {
        if self.friendship_between(from, to).is_some() {
            bail!("friendship edge already exists between {from} and {to}");
        }
        let edge = Friendship {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            status: EdgeStatus::Pending,
            blocker_id: None,
        };
        self.db.friendships.push(edge.clone());
        self.save()?;
        Ok(edge)
    }

    pub fn accept_friendship(&mut self, edge_id: &str) -> Result<()> {
        let Some(edge) = self.db.friendships.iter_mut().find(|f| f.id == edge_id) else {
            bail!("no such friendship edge: {edge_id}");
        };
        edge.status = EdgeStatus::Accepted;
        self.save()
    }

    /// Delete an edge, returning it so the caller can notify both endpoints.
    pub fn remove_friendship(&mut self, edge_id: &str) -> Result<Friendship> {
        let Some(pos) = self.db.friendships.iter().position(|f| f.id == edge_id) else {
            bail!("no such friendship edge: {edge_id}");
        };
        let removed = self.db.friendships.remove(pos);
        self.save()?;
        Ok(removed)
    }

    pub fn set_blocker(&mut self, edge_id: &str, blocker: Option<&str>) -> Result<()> {
        let Some(edge) = self.db.friendships.iter_mut().find(|f| f.id == edge_id) else {
            bail!("no such friendship edge: {edge_id}");
        };
        edge.blocker_id = blocker.map(str::to_string);
        self.save()
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn group(&self, group_id: &str) -> Option<&GroupInfo> {
        self.db.groups.iter().find(|g| g.id == group_id)
    }

    /// Create a group with the given members. The creator is the sole admin.
    pub fn create_group(
        &mut self,
        name: &str,
        avatar: Option<String>,
        creator_id: &str,
        members: Vec<GroupMember>,
    ) -> Result<GroupInfo> {
        let group = GroupInfo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            avatar: avatar.unwrap_or_else(|| default_avatar_url(name)),
            creator_id: creator_id.to_string(),
            members,
            admins: vec![creator_id.to_string()],
        };
        self.db.groups.push(group.clone());
        self.save()?;
        Ok(group)
    }

    /// Append members to a group, skipping ids that are already present.
    /// Returns the updated group.
    pub fn add_group_members(
        &mut self,
        group_id: &str,
        new_members: Vec<GroupMember>,
    ) -> Result<GroupInfo> {
        let Some(group) = self.db.groups.iter_mut().find(|g| g.id == group_id) else {
            bail!("no such group: {group_id}");
        };
        for member in new_members {
            if !group.members.iter().any(|m| m.id == member.id) {
                group.members.push(member);
            }
        }
        let updated = group.clone();
        self.save()?;
        Ok(updated)
    }

    pub fn is_group_member(&self, user_id: &str, group_id: &str) -> bool {
        matches!(
            self.group(group_id),
            Some(g) if g.members.iter().any(|m| m.id == user_id)
        )
    }

    /// Group creators count as admins even if the admin list drifts.
    pub fn is_group_admin(&self, user_id: &str, group_id: &str) -> bool {
        matches!(
            self.group(group_id),
            Some(g) if g.admins.iter().any(|a| a == user_id) || g.creator_id == user_id
        )
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Append a message with a fresh id and a strictly monotonic timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn append_message(
        &mut self,
        from: &str,
        to: &str,
        is_group: bool,
        content: &str,
        content_type: &str,
        sender_name: Option<String>,
    ) -> Result<MessageRecord> {
        let message = MessageRecord {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            is_group,
            content: content.to_string(),
            content_type: content_type.to_string(),
            timestamp: self.next_timestamp(),
            sender_name,
        };
        self.db.messages.push(message.clone());
        self.save()?;
        Ok(message)
    }

    /// Permanently delete a message, but only for its sender. Returns the
    /// removed message, or `None` when it does not exist or `sender` did not
    /// send it.
    pub fn delete_own_message(
        &mut self,
        message_id: &str,
        sender: &str,
    ) -> Result<Option<MessageRecord>> {
        let Some(pos) = self
            .db
            .messages
            .iter()
            .position(|m| m.id == message_id && m.from == sender)
        else {
            return Ok(None);
        };
        let removed = self.db.messages.remove(pos);
        self.save()?;
        Ok(Some(removed))
    }

    /// All messages between two users, oldest first.
    pub fn dm_history(&self, a: &str, b: &str) -> Vec<MessageRecord> {
        let mut history: Vec<MessageRecord> = self
            .db
            .messages
            .iter()
            .filter(|m| {
                !m.is_group && ((m.from == a && m.to == b) || (m.from == b && m.to == a))
            })
            .cloned()
            .collect();
        history.sort_by_key(|m| m.timestamp);
        history
    }

    /// All messages addressed to a group, oldest first.
    pub fn group_history(&self, group_id: &str) -> Vec<MessageRecord> {
        let mut history: Vec<MessageRecord> = self
            .db
            .messages
            .iter()
            .filter(|m| m.is_group && m.to == group_id)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.timestamp);
        history
    }

    // -----------------------------------------------------------------------
    // Social graph queries
    // -----------------------------------------------------------------------

    /// Pending incoming requests, annotated with the requester's name.
    pub fn pending_requests_for(&self, user_id: &str) -> Vec<PendingRequest> {
        self.db
            .friendships
            .iter()
            .filter(|f| f.to == user_id && f.status == EdgeStatus::Pending)
            .filter_map(|f| {
                let requester = self.user(&f.from)?;
                Some(PendingRequest {
                    id: f.id.clone(),
                    from: f.from.clone(),
                    from_name: requester.username.clone(),
                })
            })
            .collect()
    }

    /// Accepted friends, annotated with profile, live presence, and the
    /// block state of the edge.
    pub fn friends_for(&self, user_id: &str, online: &HashSet<String>) -> Vec<FriendEntry> {
        self.db
            .friendships
            .iter()
            .filter(|f| f.involves(user_id) && f.status == EdgeStatus::Accepted)
            .filter_map(|f| {
                let friend = self.user(f.peer_of(user_id))?;
                let status = if online.contains(&friend.id) {
                    PresenceStatus::Online
                } else {
                    PresenceStatus::Offline
                };
                Some(FriendEntry {
                    id: friend.id.clone(),
                    username: friend.username.clone(),
                    avatar: friend.avatar.clone(),
                    status,
                    is_blocked: f.blocker_id.is_some(),
                    blocker_id: f.blocker_id.clone(),
                })
            })
            .collect()
    }

    /// Ids of accepted, non-blocked friends. This is the set notified when
    /// the user's presence changes.
    pub fn notifiable_friend_ids(&self, user_id: &str) -> Vec<String> {
        self.db
            .friendships
            .iter()
            .filter(|f| {
                f.involves(user_id) && f.status == EdgeStatus::Accepted && f.blocker_id.is_none()
            })
            .map(|f| f.peer_of(user_id).to_string())
            .collect()
    }

    /// Every group the user belongs to.
    pub fn groups_for(&self, user_id: &str) -> Vec<GroupInfo> {
        self.db
            .groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m.id == user_id))
            .cloned()
            .collect()
    }

    /// The combined record every connected client keeps in sync.
    pub fn contact_snapshot(&self, user_id: &str, online: &HashSet<String>) -> ContactSnapshot {
        ContactSnapshot {
            requests: self.pending_requests_for(user_id),
            friends: self.friends_for(user_id, online),
            groups: self.groups_for(user_id),
        }
    }

    /// Block check for a direct message from `from` to `to`. Blocking is the
    /// only gate; users without any edge may still message each other.
    pub fn can_message(&self, from: &str, to: &str) -> MessagePermission {
        match self
            .friendship_between(from, to)
            .and_then(|f| f.blocker_id.as_deref())
        {
            None => MessagePermission::Allowed,
            Some(blocker) if blocker == from => MessagePermission::BlockedBySelf,
            Some(_) => MessagePermission::BlockedByPeer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store(dir: &tempfile::TempDir) -> ChatStore {
        ChatStore::load(dir.path()).unwrap()
    }

    fn add_user(store: &mut ChatStore, name: &str) -> String {
        store.create_user(name, "hash").unwrap().id
    }

    fn no_online() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn create_user_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let user = store.create_user("Alice", "hash").unwrap();
        assert_eq!(user.username, "Alice");
        assert!(user.avatar.contains("name=Al"));

        // Case-insensitive lookup
        assert_eq!(store.user_by_username("alice").unwrap().id, user.id);
        assert_eq!(store.user(&user.id).unwrap().username, "Alice");
    }

    #[test]
    fn duplicate_username_rejected_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        store.create_user("alice", "hash").unwrap();
        assert!(store.create_user("ALICE", "hash").is_err());
        assert!(store.username_taken("Alice"));
    }

    #[test]
    fn search_users_prefix_match() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let me = add_user(&mut store, "anna");
        add_user(&mut store, "Andre");
        add_user(&mut store, "andrew");
        add_user(&mut store, "bob");

        let results = store.search_users("an", &me);
        let names: Vec<&str> = results.iter().map(|p| p.username.as_str()).collect();
        // Excludes the caller, matches prefix case-insensitively
        assert_eq!(names, vec!["Andre", "andrew"]);
    }

    #[test]
    fn search_users_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let me = add_user(&mut store, "zzz");
        for i in 0..12 {
            add_user(&mut store, &format!("user{i}"));
        }
        assert_eq!(store.search_users("user", &me).len(), SEARCH_LIMIT);
    }

    #[test]
    fn update_username_keeps_group_name_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let members = vec![
            GroupMember {
                id: a.clone(),
                name: "alice".to_string(),
            },
            GroupMember {
                id: b.clone(),
                name: "bob".to_string(),
            },
        ];
        let group = store.create_group("team", None, &a, members).unwrap();

        store.update_username(&a, "alicia").unwrap();
        assert_eq!(store.user(&a).unwrap().username, "alicia");
        // The membership entry keeps the snapshot taken at join time
        let g = store.group(&group.id).unwrap();
        assert_eq!(g.members[0].name, "alice");
    }

    #[test]
    fn update_username_rejects_taken_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        add_user(&mut store, "bob");
        assert!(store.update_username(&a, "BOB").is_err());
        // Renaming to your own name (case change) is allowed
        assert!(store.update_username(&a, "Alice").is_ok());
    }

    #[test]
    fn friendship_edge_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");

        let edge = store.create_friend_request(&a, &b).unwrap();
        assert_eq!(edge.status, EdgeStatus::Pending);
        assert!(!store.are_friends(&a, &b));

        store.accept_friendship(&edge.id).unwrap();
        assert!(store.are_friends(&a, &b));

        let removed = store.remove_friendship(&edge.id).unwrap();
        assert_eq!(removed.id, edge.id);
        assert!(store.friendship_between(&a, &b).is_none());
    }

    #[test]
    fn one_edge_per_pair() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");

        store.create_friend_request(&a, &b).unwrap();
        // Same direction and reverse direction both refused
        assert!(store.create_friend_request(&a, &b).is_err());
        assert!(store.create_friend_request(&b, &a).is_err());
    }

    #[test]
    fn blocking_gates_direct_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let edge = store.create_friend_request(&a, &b).unwrap();
        store.accept_friendship(&edge.id).unwrap();

        assert_eq!(store.can_message(&a, &b), MessagePermission::Allowed);

        store.set_blocker(&edge.id, Some(&a)).unwrap();
        assert_eq!(store.can_message(&a, &b), MessagePermission::BlockedBySelf);
        assert_eq!(store.can_message(&b, &a), MessagePermission::BlockedByPeer);

        store.set_blocker(&edge.id, None).unwrap();
        assert_eq!(store.can_message(&a, &b), MessagePermission::Allowed);
        assert_eq!(store.can_message(&b, &a), MessagePermission::Allowed);
    }

    #[test]
    fn strangers_may_message() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        assert_eq!(store.can_message(&a, &b), MessagePermission::Allowed);
    }

    #[test]
    fn pending_requests_carry_requester_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        store.create_friend_request(&a, &b).unwrap();

        let requests = store.pending_requests_for(&b);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].from, a);
        assert_eq!(requests[0].from_name, "alice");

        // The requester has no incoming request
        assert!(store.pending_requests_for(&a).is_empty());
    }

    #[test]
    fn friends_annotated_with_presence_and_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let edge = store.create_friend_request(&a, &b).unwrap();
        store.accept_friendship(&edge.id).unwrap();

        let mut online = HashSet::new();
        online.insert(b.clone());

        let friends = store.friends_for(&a, &online);
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, b);
        assert_eq!(friends[0].status, PresenceStatus::Online);
        assert!(!friends[0].is_blocked);

        store.set_blocker(&edge.id, Some(&b)).unwrap();
        let friends = store.friends_for(&a, &no_online());
        assert_eq!(friends[0].status, PresenceStatus::Offline);
        assert!(friends[0].is_blocked);
        assert_eq!(friends[0].blocker_id.as_deref(), Some(b.as_str()));
    }

    #[test]
    fn notifiable_friends_exclude_pending_and_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let c = add_user(&mut store, "carol");
        let d = add_user(&mut store, "dave");

        let ab = store.create_friend_request(&a, &b).unwrap();
        store.accept_friendship(&ab.id).unwrap();
        let ac = store.create_friend_request(&a, &c).unwrap();
        store.accept_friendship(&ac.id).unwrap();
        store.set_blocker(&ac.id, Some(&c)).unwrap();
        store.create_friend_request(&a, &d).unwrap();

        assert_eq!(store.notifiable_friend_ids(&a), vec![b.clone()]);
        assert_eq!(store.notifiable_friend_ids(&b), vec![a]);
        assert!(store.notifiable_friend_ids(&d).is_empty());
    }

    #[test]
    fn pending_edges_are_not_friends() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        store.create_friend_request(&a, &b).unwrap();

        assert!(store.friends_for(&a, &no_online()).is_empty());
        assert!(store.friends_for(&b, &no_online()).is_empty());
    }

    #[test]
    fn group_membership_and_admin_checks() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let c = add_user(&mut store, "carol");

        let members = vec![
            GroupMember {
                id: a.clone(),
                name: "alice".to_string(),
            },
            GroupMember {
                id: b.clone(),
                name: "bob".to_string(),
            },
        ];
        let group = store.create_group("team", None, &a, members).unwrap();
        assert_eq!(group.admins, vec![a.clone()]);
        assert!(group.avatar.contains("name=te"));

        assert!(store.is_group_member(&a, &group.id));
        assert!(store.is_group_member(&b, &group.id));
        assert!(!store.is_group_member(&c, &group.id));

        assert!(store.is_group_admin(&a, &group.id));
        assert!(!store.is_group_admin(&b, &group.id));

        let mine = store.groups_for(&b);
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, group.id);
        assert!(store.groups_for(&c).is_empty());
    }

    #[test]
    fn add_group_members_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let c = add_user(&mut store, "carol");

        let members = vec![
            GroupMember {
                id: a.clone(),
                name: "alice".to_string(),
            },
            GroupMember {
                id: b.clone(),
                name: "bob".to_string(),
            },
        ];
        let group = store.create_group("team", None, &a, members).unwrap();

        let updated = store
            .add_group_members(
                &group.id,
                vec![
                    GroupMember {
                        id: b.clone(),
                        name: "bob".to_string(),
                    },
                    GroupMember {
                        id: c.clone(),
                        name: "carol".to_string(),
                    },
                ],
            )
            .unwrap();
        assert_eq!(updated.members.len(), 3);
    }

    #[test]
    fn message_timestamps_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");

        let mut last = 0;
        for i in 0..5 {
            let msg = store
                .append_message(&a, &b, false, &format!("m{i}"), "text", None)
                .unwrap();
            assert!(msg.timestamp > last);
            last = msg.timestamp;
        }
    }

    #[test]
    fn dm_history_is_sorted_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let c = add_user(&mut store, "carol");

        store.append_message(&a, &b, false, "one", "text", None).unwrap();
        store.append_message(&b, &a, false, "two", "text", None).unwrap();
        store.append_message(&a, &c, false, "other", "text", None).unwrap();

        let history = store.dm_history(&a, &b);
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp < history[1].timestamp);
        assert_eq!(history[0].content, "one");

        // Symmetric
        assert_eq!(store.dm_history(&b, &a).len(), 2);
    }

    #[test]
    fn group_history_excludes_dms() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let members = vec![
            GroupMember {
                id: a.clone(),
                name: "alice".to_string(),
            },
            GroupMember {
                id: b.clone(),
                name: "bob".to_string(),
            },
        ];
        let group = store.create_group("team", None, &a, members).unwrap();

        store
            .append_message(&a, &group.id, true, "hi all", "text", Some("alice".to_string()))
            .unwrap();
        store.append_message(&a, &b, false, "psst", "text", None).unwrap();

        let history = store.group_history(&group.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi all");
        assert_eq!(history[0].sender_name.as_deref(), Some("alice"));
    }

    #[test]
    fn delete_own_message_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let msg = store.append_message(&a, &b, false, "oops", "text", None).unwrap();

        // The recipient cannot delete it
        assert!(store.delete_own_message(&msg.id, &b).unwrap().is_none());

        let removed = store.delete_own_message(&msg.id, &a).unwrap().unwrap();
        assert_eq!(removed.id, msg.id);
        assert!(store.dm_history(&a, &b).is_empty());

        // Second delete finds nothing
        assert!(store.delete_own_message(&msg.id, &a).unwrap().is_none());
    }

    #[test]
    fn contact_snapshot_combines_sections() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = make_store(&dir);

        let a = add_user(&mut store, "alice");
        let b = add_user(&mut store, "bob");
        let c = add_user(&mut store, "carol");

        let edge = store.create_friend_request(&a, &b).unwrap();
        store.accept_friendship(&edge.id).unwrap();
        store.create_friend_request(&c, &a).unwrap();
        let members = vec![
            GroupMember {
                id: a.clone(),
                name: "alice".to_string(),
            },
            GroupMember {
                id: b.clone(),
                name: "bob".to_string(),
            },
        ];
        store.create_group("team", None, &a, members).unwrap();

        let snap = store.contact_snapshot(&a, &no_online());
        assert_eq!(snap.requests.len(), 1);
        assert_eq!(snap.requests[0].from_name, "carol");
        assert_eq!(snap.friends.len(), 1);
        assert_eq!(snap.groups.len(), 1);
    }

    #[test]
    fn persistence() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b, last_ts) = {
            let mut store = make_store(&dir);
            let a = add_user(&mut store, "alice");
            let b = add_user(&mut store, "bob");
            let edge = store.create_friend_request(&a, &b).unwrap();
            store.accept_friendship(&edge.id).unwrap();
            let msg = store.append_message(&a, &b, false, "hello", "text", None).unwrap();
            (a, b, msg.timestamp)
        };

        let mut store = make_store(&dir);
        assert_eq!(store.user_by_username("alice").unwrap().id, a);
        assert!(store.are_friends(&a, &b));
        assert_eq!(store.dm_history(&a, &b).len(), 1);

        // Timestamps stay strictly monotonic across a reload
        let msg = store.append_message(&b, &a, false, "again", "text", None).unwrap();
        assert!(msg.timestamp > last_ts);
    }

    #[test]
    fn empty_state_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db.json"), "").unwrap();
        let store = make_store(&dir);
        assert!(store.search_users("a", "nobody").is_empty());
    }
}
