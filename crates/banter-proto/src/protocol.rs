use serde::{Deserialize, Serialize};

/// Maximum size of a JSON text frame on the WebSocket (64 KiB).
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Typed enums for wire format safety
// ---------------------------------------------------------------------------

/// Live connection state of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

// ---------------------------------------------------------------------------
// ClientIntent
// ---------------------------------------------------------------------------

/// An intent sent from a connected client to the server, one JSON text
/// frame per intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientIntent {
    // -- Social graph --
    /// Ask another user (by name) to become a friend.
    FriendRequest { username: String },
    /// Accept a pending incoming request by edge id.
    AcceptRequest { id: String },
    /// Decline a pending incoming request by edge id.
    DeclineRequest { id: String },
    /// Remove an accepted friend.
    RemoveFriend {
        #[serde(rename = "friendId")]
        friend_id: String,
    },
    /// Toggle the block flag on an existing relationship.
    BlockUser {
        #[serde(rename = "targetId")]
        target_id: String,
    },

    // -- Groups --
    /// Create a group with the caller plus the listed member ids.
    CreateGroup {
        name: String,
        members: Vec<String>,
        #[serde(default)]
        avatar: Option<String>,
    },
    /// Add members to an existing group (admins only).
    AddMembersToGroup {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "membersToAdd")]
        members_to_add: Vec<String>,
    },

    // -- Messaging --
    /// Fetch the message history of one conversation.
    GetHistory {
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "isGroup", default)]
        is_group: bool,
    },
    /// Send a message to a user (DM) or a group.
    SendMessage {
        #[serde(rename = "toUserId")]
        to_user_id: String,
        content: String,
        #[serde(rename = "contentType", default = "default_content_type")]
        content_type: String,
        #[serde(rename = "isGroup", default)]
        is_group: bool,
    },
    /// Permanently delete an own message for every participant.
    DeleteMessage {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "isGroup", default)]
        is_group: bool,
    },

    // -- Snapshot --
    /// Re-request the full contact snapshot.
    RefreshData,
}

fn default_content_type() -> String {
    "text".to_string()
}

// ---------------------------------------------------------------------------
// ServerEvent
// ---------------------------------------------------------------------------

/// An event pushed from the server to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full contact snapshot, pushed on connect and on `refresh_data`.
    InitData(ContactSnapshot),
    /// The recipient's contact data changed; it should re-request the snapshot.
    RefreshData,
    /// One conversation's history, delivered to the requester only.
    ChatHistory {
        #[serde(rename = "chatId")]
        chat_id: String,
        messages: Vec<MessageRecord>,
        #[serde(rename = "isGroup")]
        is_group: bool,
    },
    /// A message addressed to the recipient (DM target or group member).
    NewMessage(MessageRecord),
    /// Echo of an own DM back to the sender.
    MessageSent(MessageRecord),
    /// A message was permanently removed from a conversation.
    MessageDeleted {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(rename = "isGroup")]
        is_group: bool,
        permanent: bool,
    },
    /// An intent completed; `text` is the user-visible confirmation.
    Success { text: String },
    /// An intent failed; `text` is the user-visible reason.
    Error { text: String },
}

// ---------------------------------------------------------------------------
// Payload records
// ---------------------------------------------------------------------------

/// Public view of a user, credential fields stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub avatar: String,
}

/// A pending incoming friend request, annotated with the requester's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: String,
    pub from: String,
    #[serde(rename = "fromName")]
    pub from_name: String,
}

/// A friend in the contact snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEntry {
    pub id: String,
    pub username: String,
    pub avatar: String,
    pub status: PresenceStatus,
    #[serde(rename = "isBlocked")]
    pub is_blocked: bool,
    #[serde(rename = "blockerId")]
    pub blocker_id: Option<String>,
}

/// A group member with the display-name snapshot taken when they joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: String,
    pub name: String,
}

/// A group in the contact snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    pub name: String,
    pub avatar: String,
    #[serde(rename = "creatorId")]
    pub creator_id: String,
    pub members: Vec<GroupMember>,
    pub admins: Vec<String>,
}

/// The combined requests/friends/groups record every client keeps in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub requests: Vec<PendingRequest>,
    pub friends: Vec<FriendEntry>,
    pub groups: Vec<GroupInfo>,
}

/// A chat message as delivered to clients. `sender_name` is only present on
/// group messages so members can render the author without a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "isGroup")]
    pub is_group: bool,
    pub content: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub timestamp: u64,
    #[serde(rename = "senderName", default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}
