use super::{RouterError, ServerState, success};
use banter_proto::protocol::ServerEvent;
use banter_store::store::MessagePermission;
use std::sync::Arc;

pub async fn get_history(
    state: &Arc<ServerState>,
    user_id: &str,
    chat_id: &str,
    is_group: bool,
) -> Result<(), RouterError> {
    let store = state.store.lock().await;

    let messages = if is_group {
        if !store.is_group_member(user_id, chat_id) {
            return Err(RouterError::NotParticipant);
        }
        store.group_history(chat_id)
    } else {
        store.dm_history(user_id, chat_id)
    };

    state
        .presence
        .send_to_user(
            user_id,
            ServerEvent::ChatHistory {
                chat_id: chat_id.to_string(),
                messages,
                is_group,
            },
        )
        .await;
    Ok(())
}

pub async fn send_message(
    state: &Arc<ServerState>,
    user_id: &str,
    to: &str,
    content: &str,
    content_type: &str,
    is_group: bool,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    // Group messages carry the sender's name so members can label them
    // without a profile lookup; DMs leave it out.
    let sender_name = if is_group {
        if !store.is_group_member(user_id, to) {
            return Err(RouterError::NotGroupMember);
        }
        store.user(user_id).map(|u| u.username.clone())
    } else {
        match store.can_message(user_id, to) {
            MessagePermission::Allowed => {}
            MessagePermission::BlockedBySelf => return Err(RouterError::BlockedBySelf),
            MessagePermission::BlockedByPeer => return Err(RouterError::BlockedByPeer),
        }
        None
    };

    let record = store.append_message(user_id, to, is_group, content, content_type, sender_name)?;

    let presence = &state.presence;
    if is_group {
        // The sender is subscribed to the group channel and receives the
        // same broadcast as everyone else.
        presence.broadcast(to, &ServerEvent::NewMessage(record)).await;
    } else {
        presence
            .send_to_user(to, ServerEvent::NewMessage(record.clone()))
            .await;
        presence
            .send_to_user(user_id, ServerEvent::MessageSent(record))
            .await;
    }
    Ok(())
}

pub async fn delete_message(
    state: &Arc<ServerState>,
    user_id: &str,
    message_id: &str,
    chat_id: &str,
    is_group: bool,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let removed = store
        .delete_own_message(message_id, user_id)?
        .ok_or(RouterError::MessageNotDeletable)?;

    let mut recipients: Vec<String> = if is_group {
        store
            .group(chat_id)
            .map(|g| g.members.iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    } else {
        vec![removed.to.clone(), removed.from.clone()]
    };
    recipients.retain(|id| id != user_id);

    let event = ServerEvent::MessageDeleted {
        message_id: message_id.to_string(),
        chat_id: chat_id.to_string(),
        is_group,
        permanent: true,
    };

    let presence = &state.presence;
    presence.send_to_user(user_id, event.clone()).await;
    for recipient in &recipients {
        presence.send_to_user(recipient, event.clone()).await;
    }
    presence
        .send_to_user(user_id, success("Message permanently deleted for everyone."))
        .await;
    Ok(())
}
