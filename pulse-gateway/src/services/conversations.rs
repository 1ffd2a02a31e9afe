use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{
    Conversation, ConversationMember, NewConversation, NewConversationMember, User, ROLE_ADMIN,
    ROLE_MEMBER,
};
use crate::schema::{conversation_members, conversations, users};
use crate::services::messages::{self, MessageView};

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversation {
    pub user_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_group: bool,
    pub name: Option<String>,
}

// --- View DTOs ---

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub user_id: Uuid,
    pub display_name: String,
    pub image_url: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    /// Advisory; filled from the presence store by callers that want it.
    pub is_online: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub members: Vec<MemberView>,
    pub last_message: Option<MessageView>,
}

// --- Membership ---

/// Hot-path membership predicate; every gateway event and media request
/// goes through here.
pub fn is_member(conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let count: i64 = conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .filter(conversation_members::user_id.eq(user_id))
        .select(count_star())
        .first::<i64>(conn)?;
    Ok(count > 0)
}

pub fn ensure_member(conn: &mut PgConnection, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
    if !is_member(conn, conversation_id, user_id)? {
        return Err(AppError::new(
            ErrorCode::NotConversationMember,
            "you are not a member of this conversation",
        ));
    }
    Ok(())
}

pub fn member_ids(conn: &mut PgConnection, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
    Ok(conversation_members::table
        .filter(conversation_members::conversation_id.eq(conversation_id))
        .select(conversation_members::user_id)
        .load::<Uuid>(conn)?)
}

/// Strict set equality against the pair `{a, b}`. Subset matches would
/// return groups containing both users, which is exactly the bug the direct
/// lookup must avoid.
fn same_member_pair(members: &[Uuid], a: Uuid, b: Uuid) -> bool {
    members.len() == 2 && members.contains(&a) && members.contains(&b) && a != b
}

fn find_direct_conversation(
    conn: &mut PgConnection,
    a: Uuid,
    b: Uuid,
) -> AppResult<Option<Conversation>> {
    let candidate_ids: Vec<Uuid> = conversation_members::table
        .inner_join(conversations::table)
        .filter(conversations::is_group.eq(false))
        .filter(conversation_members::user_id.eq(a))
        .select(conversation_members::conversation_id)
        .load::<Uuid>(conn)?;

    for conversation_id in candidate_ids {
        let ids = member_ids(conn, conversation_id)?;
        if same_member_pair(&ids, a, b) {
            let conversation = conversations::table
                .find(conversation_id)
                .first::<Conversation>(conn)?;
            return Ok(Some(conversation));
        }
    }

    Ok(None)
}

// --- Operations ---

/// Create a conversation. Direct creation is idempotent: an existing
/// conversation whose member set equals the pair is returned as-is.
pub fn create(
    conn: &mut PgConnection,
    actor: Uuid,
    req: &CreateConversation,
) -> AppResult<ConversationView> {
    let mut others: Vec<Uuid> = Vec::new();
    for id in &req.user_ids {
        if *id != actor && !others.contains(id) {
            others.push(*id);
        }
    }

    if others.is_empty() {
        return Err(AppError::new(
            ErrorCode::InvalidMemberSet,
            "a conversation needs at least one other member",
        ));
    }

    let known: i64 = users::table
        .filter(users::id.eq_any(&others))
        .select(count_star())
        .first::<i64>(conn)?;
    if known as usize != others.len() {
        return Err(AppError::new(
            ErrorCode::UserNotFound,
            "a referenced user does not exist",
        ));
    }

    let conversation = if req.is_group {
        if others.len() < 2 {
            return Err(AppError::new(
                ErrorCode::InvalidMemberSet,
                "a group conversation needs at least two other members",
            ));
        }
        let name = req.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(AppError::new(
                ErrorCode::GroupNameRequired,
                "group name is required",
            ));
        }
        insert_group(conn, actor, &others, name)?
    } else {
        if others.len() != 1 {
            return Err(AppError::new(
                ErrorCode::InvalidMemberSet,
                "a direct conversation has exactly one other member",
            ));
        }
        if req.name.is_some() {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "direct conversations are unnamed",
            ));
        }
        let other = others[0];
        match find_direct_conversation(conn, actor, other)? {
            Some(existing) => existing,
            None => insert_direct(conn, actor, other)?,
        }
    };

    load_view(conn, &conversation)
}

fn insert_group(
    conn: &mut PgConnection,
    actor: Uuid,
    others: &[Uuid],
    name: &str,
) -> AppResult<Conversation> {
    conn.transaction::<Conversation, AppError, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .values(&NewConversation {
                is_group: true,
                name: Some(name.to_string()),
            })
            .get_result(conn)?;

        let mut members = vec![NewConversationMember {
            conversation_id: conversation.id,
            user_id: actor,
            role: ROLE_ADMIN.to_string(),
        }];
        members.extend(others.iter().map(|uid| NewConversationMember {
            conversation_id: conversation.id,
            user_id: *uid,
            role: ROLE_MEMBER.to_string(),
        }));

        diesel::insert_into(conversation_members::table)
            .values(&members)
            .execute(conn)?;

        Ok(conversation)
    })
}

fn insert_direct(conn: &mut PgConnection, actor: Uuid, other: Uuid) -> AppResult<Conversation> {
    conn.transaction::<Conversation, AppError, _>(|conn| {
        let conversation: Conversation = diesel::insert_into(conversations::table)
            .values(&NewConversation {
                is_group: false,
                name: None,
            })
            .get_result(conn)?;

        let members: Vec<NewConversationMember> = [actor, other]
            .into_iter()
            .map(|uid| NewConversationMember {
                conversation_id: conversation.id,
                user_id: uid,
                role: ROLE_MEMBER.to_string(),
            })
            .collect();

        diesel::insert_into(conversation_members::table)
            .values(&members)
            .execute(conn)?;

        Ok(conversation)
    })
}

/// The actor's conversations, most recently active first, each with its
/// latest message attached.
pub fn list_for_user(conn: &mut PgConnection, actor: Uuid) -> AppResult<Vec<ConversationView>> {
    let conversation_ids: Vec<Uuid> = conversation_members::table
        .filter(conversation_members::user_id.eq(actor))
        .select(conversation_members::conversation_id)
        .load::<Uuid>(conn)?;

    if conversation_ids.is_empty() {
        return Ok(vec![]);
    }

    let convs: Vec<Conversation> = conversations::table
        .filter(conversations::id.eq_any(&conversation_ids))
        .order(conversations::updated_at.desc())
        .load::<Conversation>(conn)?;

    convs.iter().map(|c| load_view(conn, c)).collect()
}

/// Not-found and forbidden are distinct outcomes so callers can log the
/// difference between probing and a stale client.
pub fn get(conn: &mut PgConnection, id: Uuid, actor: Uuid) -> AppResult<ConversationView> {
    let conversation: Conversation = conversations::table
        .find(id)
        .first::<Conversation>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ConversationNotFound, "conversation not found"))?;

    ensure_member(conn, id, actor)?;

    load_view(conn, &conversation)
}

fn load_view(conn: &mut PgConnection, conversation: &Conversation) -> AppResult<ConversationView> {
    let rows: Vec<(ConversationMember, User)> = conversation_members::table
        .inner_join(users::table)
        .filter(conversation_members::conversation_id.eq(conversation.id))
        .load::<(ConversationMember, User)>(conn)?;

    let members = rows
        .into_iter()
        .map(|(member, user)| MemberView {
            user_id: user.id,
            display_name: user.display_name,
            image_url: user.image_url,
            role: member.role,
            joined_at: member.joined_at,
            is_online: false,
        })
        .collect();

    let last_message = messages::latest_view(conn, conversation.id)?;

    Ok(ConversationView {
        id: conversation.id,
        is_group: conversation.is_group,
        name: conversation.name.clone(),
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        members,
        last_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_equality_is_strict() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        assert!(same_member_pair(&[a, b], a, b));
        assert!(same_member_pair(&[b, a], a, b));
        // A group containing both users is not the direct conversation.
        assert!(!same_member_pair(&[a, b, c], a, b));
        assert!(!same_member_pair(&[a], a, b));
        assert!(!same_member_pair(&[a, c], a, b));
    }

    #[test]
    fn self_pair_never_matches() {
        let a = Uuid::new_v4();
        assert!(!same_member_pair(&[a, a], a, a));
    }
}
