use super::{RouterError, ServerState, success};
use banter_proto::protocol::ServerEvent;
use banter_store::snapshot::EdgeStatus;
use std::sync::Arc;

pub async fn friend_request(
    state: &Arc<ServerState>,
    user_id: &str,
    username: &str,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let target_id = store
        .user_by_username(username)
        .map(|u| u.id.clone())
        .ok_or(RouterError::UserNotFound)?;
    if target_id == user_id {
        return Err(RouterError::SelfFriendRequest);
    }

    if let Some(edge) = store.friendship_between(user_id, &target_id) {
        if edge.status == EdgeStatus::Accepted {
            return Err(RouterError::AlreadyFriends);
        }
        if edge.from == user_id {
            return Err(RouterError::RequestAlreadySent);
        }

        // Mutual request: the target already asked us, so accept on the spot
        // instead of creating a second edge.
        let edge_id = edge.id.clone();
        store.accept_friendship(&edge_id)?;

        let presence = &state.presence;
        presence.send_to_user(user_id, success("Friend added!")).await;
        presence
            .send_to_user(&target_id, success("Friend added!"))
            .await;
        presence.send_to_user(user_id, ServerEvent::RefreshData).await;
        presence
            .send_to_user(&target_id, ServerEvent::RefreshData)
            .await;
        return Ok(());
    }

    store.create_friend_request(user_id, &target_id)?;

    let presence = &state.presence;
    presence
        .send_to_user(&target_id, ServerEvent::RefreshData)
        .await;
    presence
        .send_to_user(user_id, success("Friend request sent."))
        .await;
    Ok(())
}

pub async fn accept_request(
    state: &Arc<ServerState>,
    user_id: &str,
    request_id: &str,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let edge = store
        .friendship(request_id)
        .filter(|f| f.to == user_id && f.status == EdgeStatus::Pending)
        .ok_or(RouterError::RequestNotFound)?;
    let edge_id = edge.id.clone();
    let requester = edge.from.clone();
    store.accept_friendship(&edge_id)?;

    let presence = &state.presence;
    presence
        .send_to_user(user_id, success("Request accepted. Friend added!"))
        .await;
    presence
        .send_to_user(&requester, success("Request accepted. Friend added!"))
        .await;
    presence.send_to_user(user_id, ServerEvent::RefreshData).await;
    presence
        .send_to_user(&requester, ServerEvent::RefreshData)
        .await;
    Ok(())
}

pub async fn decline_request(
    state: &Arc<ServerState>,
    user_id: &str,
    request_id: &str,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let edge_id = store
        .friendship(request_id)
        .filter(|f| f.to == user_id && f.status == EdgeStatus::Pending)
        .map(|f| f.id.clone())
        .ok_or(RouterError::RequestNotFound)?;
    let removed = store.remove_friendship(&edge_id)?;

    let presence = &state.presence;
    presence
        .send_to_user(user_id, success("Request declined."))
        .await;
    presence
        .send_to_user(&removed.from, ServerEvent::RefreshData)
        .await;
    presence.send_to_user(user_id, ServerEvent::RefreshData).await;
    Ok(())
}

pub async fn remove_friend(
    state: &Arc<ServerState>,
    user_id: &str,
    friend_id: &str,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let edge_id = store
        .friendship_between(user_id, friend_id)
        .filter(|f| f.status == EdgeStatus::Accepted)
        .map(|f| f.id.clone())
        .ok_or(RouterError::FriendshipNotFound)?;
    store.remove_friendship(&edge_id)?;

    let presence = &state.presence;
    presence
        .send_to_user(user_id, success("Friend removed."))
        .await;
    presence
        .send_to_user(friend_id, success("Friend removed by partner."))
        .await;
    presence.send_to_user(user_id, ServerEvent::RefreshData).await;
    presence
        .send_to_user(friend_id, ServerEvent::RefreshData)
        .await;
    Ok(())
}

pub async fn block_user(
    state: &Arc<ServerState>,
    user_id: &str,
    target_id: &str,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    // Any edge qualifies, pending included.
    let edge = store
        .friendship_between(user_id, target_id)
        .ok_or(RouterError::NotCurrentFriends)?;
    let edge_id = edge.id.clone();
    let blocker = edge.blocker_id.clone();

    let text = match blocker.as_deref() {
        Some(b) if b == user_id => {
            store.set_blocker(&edge_id, None)?;
            "User unblocked."
        }
        Some(_) => return Err(RouterError::OnlyBlockerCanUnblock),
        None => {
            store.set_blocker(&edge_id, Some(user_id))?;
            "User blocked."
        }
    };

    let presence = &state.presence;
    presence.send_to_user(user_id, success(text)).await;
    presence.send_to_user(user_id, ServerEvent::RefreshData).await;
    presence
        .send_to_user(target_id, ServerEvent::RefreshData)
        .await;
    Ok(())
}
