use super::{RouterError, ServerState, success};
use banter_proto::protocol::{GroupMember, ServerEvent};
use std::sync::Arc;

pub async fn create_group(
    state: &Arc<ServerState>,
    user_id: &str,
    name: &str,
    members: Vec<String>,
    avatar: Option<String>,
) -> Result<(), RouterError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RouterError::GroupNameEmpty);
    }

    let mut store = state.store.lock().await;

    let mut member_ids: Vec<String> = Vec::new();
    for id in members {
        if !member_ids.contains(&id) {
            member_ids.push(id);
        }
    }
    if !member_ids.iter().any(|id| id == user_id) {
        member_ids.push(user_id.to_string());
    }
    if member_ids.len() < 2 {
        return Err(RouterError::GroupTooSmall);
    }

    let mut roster = Vec::with_capacity(member_ids.len());
    for id in &member_ids {
        let user = store.user(id).ok_or(RouterError::MembersNotFound)?;
        roster.push(GroupMember {
            id: user.id.clone(),
            name: user.username.clone(),
        });
    }

    let avatar = avatar.filter(|a| !a.is_empty());
    let group = store.create_group(name, avatar, user_id, roster)?;

    let presence = &state.presence;
    for member in &group.members {
        presence.join(&member.id, &group.id).await;
        presence
            .send_to_user(&member.id, ServerEvent::RefreshData)
            .await;
    }
    presence
        .send_to_user(user_id, success("Group created successfully."))
        .await;
    Ok(())
}

pub async fn add_members(
    state: &Arc<ServerState>,
    user_id: &str,
    group_id: &str,
    members_to_add: Vec<String>,
) -> Result<(), RouterError> {
    let mut store = state.store.lock().await;

    let group = store.group(group_id).ok_or(RouterError::GroupNotFound)?;
    let existing: Vec<String> = group.members.iter().map(|m| m.id.clone()).collect();
    if !store.is_group_admin(user_id, group_id) {
        return Err(RouterError::NotGroupAdmin);
    }

    // Silently skip ids that are unknown or already in the group.
    let mut additions: Vec<GroupMember> = Vec::new();
    for id in members_to_add {
        if existing.contains(&id) || additions.iter().any(|m| m.id == id) {
            continue;
        }
        if let Some(user) = store.user(&id) {
            additions.push(GroupMember {
                id: user.id.clone(),
                name: user.username.clone(),
            });
        }
    }
    if additions.is_empty() {
        return Err(RouterError::NoMembersAdded);
    }

    let added: Vec<String> = additions.iter().map(|m| m.id.clone()).collect();
    let updated = store.add_group_members(group_id, additions)?;

    let presence = &state.presence;
    for member in &updated.members {
        if added.contains(&member.id) {
            presence.join(&member.id, &updated.id).await;
        }
        presence
            .send_to_user(&member.id, ServerEvent::RefreshData)
            .await;
    }
    presence
        .send_to_user(user_id, success(&format!("{} members added.", added.len())))
        .await;
    Ok(())
}
