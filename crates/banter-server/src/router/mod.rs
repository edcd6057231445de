pub mod groups;
pub mod messaging;
pub mod social;

use crate::presence::PresenceRegistry;
use banter_auth::session::SessionRegistry;
use banter_proto::protocol::{ClientIntent, ServerEvent};
use banter_store::store::ChatStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Shared server state accessible by every connection and HTTP handler.
///
/// The store mutex spans each whole read-modify-write so concurrent intents
/// never interleave half-applied snapshots. The presence registry has its
/// own internal lock and is only ever taken after (or without) the store
/// lock, never before it while it is held.
pub struct ServerState {
    pub store: Mutex<ChatStore>,
    pub sessions: Mutex<SessionRegistry>,
    pub presence: PresenceRegistry,
    pub upload_dir: PathBuf,
}

impl ServerState {
    pub fn new(store: ChatStore, upload_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            sessions: Mutex::new(SessionRegistry::new()),
            presence: PresenceRegistry::new(),
            upload_dir,
        })
    }
}

/// Why an intent was rejected. The display strings are the user-visible
/// texts delivered as one `error` event to the sender.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("User not found.")]
    UserNotFound,
    #[error("Cannot send a friend request to yourself.")]
    SelfFriendRequest,
    #[error("You are already friends.")]
    AlreadyFriends,
    #[error("Request already sent.")]
    RequestAlreadySent,
    #[error("Request not found or already processed.")]
    RequestNotFound,
    #[error("Friendship not found.")]
    FriendshipNotFound,
    #[error("You can only block current friends.")]
    NotCurrentFriends,
    #[error("Only the blocker can unblock.")]
    OnlyBlockerCanUnblock,
    #[error("Group needs at least two members (including you).")]
    GroupTooSmall,
    #[error("Group name cannot be empty.")]
    GroupNameEmpty,
    #[error("One or more selected users were not found.")]
    MembersNotFound,
    #[error("Group not found.")]
    GroupNotFound,
    #[error("Only group admins can add members.")]
    NotGroupAdmin,
    #[error("No new members were added.")]
    NoMembersAdded,
    #[error("You are not a participant of this conversation.")]
    NotParticipant,
    #[error("You have blocked this user. Unblock to send messages.")]
    BlockedBySelf,
    #[error("You are blocked by this user.")]
    BlockedByPeer,
    #[error("You are not a member of this group.")]
    NotGroupMember,
    #[error("Cannot delete this message or message not found.")]
    MessageNotDeletable,
    #[error("Internal server error.")]
    Storage(#[from] anyhow::Error),
}

impl RouterError {
    /// Stable category code for logs.
    pub fn to_error_code(&self) -> &'static str {
        match self {
            RouterError::UserNotFound
            | RouterError::RequestNotFound
            | RouterError::FriendshipNotFound
            | RouterError::MembersNotFound
            | RouterError::GroupNotFound
            | RouterError::MessageNotDeletable => "not_found",
            RouterError::SelfFriendRequest
            | RouterError::NotCurrentFriends
            | RouterError::OnlyBlockerCanUnblock
            | RouterError::NotGroupAdmin
            | RouterError::NotParticipant
            | RouterError::BlockedBySelf
            | RouterError::BlockedByPeer
            | RouterError::NotGroupMember => "permission_denied",
            RouterError::AlreadyFriends
            | RouterError::RequestAlreadySent
            | RouterError::GroupTooSmall
            | RouterError::GroupNameEmpty
            | RouterError::NoMembersAdded => "validation",
            RouterError::Storage(_) => "storage",
        }
    }
}

/// Route one client intent: validate against the social graph, persist the
/// mutation, fan the result out to every affected live connection. Errors
/// are rendered by the gateway as a single `error` event to the sender.
pub async fn handle_intent(
    state: &Arc<ServerState>,
    user_id: &str,
    intent: ClientIntent,
) -> Result<(), RouterError> {
    match intent {
        // Social graph
        ClientIntent::FriendRequest { username } => {
            social::friend_request(state, user_id, &username).await
        }
        ClientIntent::AcceptRequest { id } => social::accept_request(state, user_id, &id).await,
        ClientIntent::DeclineRequest { id } => social::decline_request(state, user_id, &id).await,
        ClientIntent::RemoveFriend { friend_id } => {
            social::remove_friend(state, user_id, &friend_id).await
        }
        ClientIntent::BlockUser { target_id } => {
            social::block_user(state, user_id, &target_id).await
        }

        // Groups
        ClientIntent::CreateGroup {
            name,
            members,
            avatar,
        } => groups::create_group(state, user_id, &name, members, avatar).await,
        ClientIntent::AddMembersToGroup {
            group_id,
            members_to_add,
        } => groups::add_members(state, user_id, &group_id, members_to_add).await,

        // Conversations
        ClientIntent::GetHistory { chat_id, is_group } => {
            messaging::get_history(state, user_id, &chat_id, is_group).await
        }
        ClientIntent::SendMessage {
            to_user_id,
            content,
            content_type,
            is_group,
        } => {
            messaging::send_message(state, user_id, &to_user_id, &content, &content_type, is_group)
                .await
        }
        ClientIntent::DeleteMessage {
            message_id,
            chat_id,
            is_group,
        } => messaging::delete_message(state, user_id, &message_id, &chat_id, is_group).await,

        // Snapshot
        ClientIntent::RefreshData => push_snapshot(state, user_id).await,
    }
}

/// Send the caller its full contact snapshot as `init_data`.
pub async fn push_snapshot(state: &Arc<ServerState>, user_id: &str) -> Result<(), RouterError> {
    let online = state.presence.online_users().await;
    let snapshot = {
        let store = state.store.lock().await;
        store.contact_snapshot(user_id, &online)
    };
    state
        .presence
        .send_to_user(user_id, ServerEvent::InitData(snapshot))
        .await;
    Ok(())
}

// ---- Shared helpers ----

/// Success event carrying a user-visible confirmation.
pub(crate) fn success(text: &str) -> ServerEvent {
    ServerEvent::Success {
        text: text.to_string(),
    }
}

pub use banter_store::time::now_ms;
