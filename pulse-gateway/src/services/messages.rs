use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pulse_shared::errors::{AppError, AppResult, ErrorCode};
use pulse_shared::types::pagination::{CursorParams, Page};

use crate::models::{
    Conversation, Message, MessageKind, MessageStatus, NewMessage, NewMessageStatus, User,
};
use crate::schema::{conversation_members, conversations, message_statuses, messages, users};
use crate::services::conversations::ensure_member;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub conversation_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub media_meta: Option<serde_json::Value>,
}

// --- View DTOs ---

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub id: Uuid,
    pub display_name: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub media_path: Option<String>,
    pub media_meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub sender: SenderProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub user_id: Uuid,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct MessageDetail {
    #[serde(flatten)]
    pub message: MessageView,
    pub statuses: Vec<StatusView>,
}

fn to_view(message: Message, sender: &User) -> MessageView {
    MessageView {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        content: message.content,
        kind: message.kind,
        media_path: message.media_path,
        media_meta: message.media_meta,
        created_at: message.created_at,
        sender: SenderProfile {
            id: sender.id,
            display_name: sender.display_name.clone(),
            image_url: sender.image_url.clone(),
        },
    }
}

/// Type-vs-payload invariants: text carries non-empty content and no media
/// path; image and video carry a media path.
fn validate_payload(
    kind: MessageKind,
    content: Option<&str>,
    media_path: Option<&str>,
) -> AppResult<()> {
    match kind {
        MessageKind::Text => {
            if content.map_or(true, |c| c.trim().is_empty()) {
                return Err(AppError::new(
                    ErrorCode::EmptyContent,
                    "text message must have content",
                ));
            }
            if media_path.is_some() {
                return Err(AppError::new(
                    ErrorCode::ValidationError,
                    "text message cannot reference media",
                ));
            }
        }
        MessageKind::Image | MessageKind::Video => {
            if media_path.map_or(true, |p| p.trim().is_empty()) {
                return Err(AppError::new(
                    ErrorCode::MediaPathRequired,
                    "media message must reference an uploaded file",
                ));
            }
        }
    }
    Ok(())
}

// --- Operations ---

/// Persist a message with its per-member status fan-out. One transaction:
/// the message row, one status row per member (sender pre-delivered at the
/// message timestamp), and the conversation's `updated_at` bump all commit
/// or roll back together.
pub fn send(conn: &mut PgConnection, actor: Uuid, req: &SendMessage) -> AppResult<MessageView> {
    validate_payload(req.kind, req.content.as_deref(), req.media_url.as_deref())?;

    let message = conn.transaction::<Message, AppError, _>(|conn| {
        let conversation: Conversation = conversations::table
            .find(req.conversation_id)
            .first::<Conversation>(conn)
            .optional()?
            .ok_or_else(|| {
                AppError::new(ErrorCode::ConversationNotFound, "conversation not found")
            })?;

        let member_ids: Vec<Uuid> = conversation_members::table
            .filter(conversation_members::conversation_id.eq(conversation.id))
            .select(conversation_members::user_id)
            .load::<Uuid>(conn)?;

        if !member_ids.contains(&actor) {
            return Err(AppError::new(
                ErrorCode::NotConversationMember,
                "you are not a member of this conversation",
            ));
        }

        let message: Message = diesel::insert_into(messages::table)
            .values(&NewMessage {
                conversation_id: conversation.id,
                sender_id: actor,
                content: req.content.clone(),
                kind: req.kind.to_string(),
                media_path: req.media_url.clone(),
                media_meta: req.media_meta.clone(),
            })
            .get_result(conn)?;

        let statuses: Vec<NewMessageStatus> = member_ids
            .iter()
            .map(|uid| NewMessageStatus {
                message_id: message.id,
                user_id: *uid,
                delivered_at: (*uid == actor).then_some(message.created_at),
            })
            .collect();

        diesel::insert_into(message_statuses::table)
            .values(&statuses)
            .execute(conn)?;

        diesel::update(conversations::table.find(conversation.id))
            .set(conversations::updated_at.eq(message.created_at))
            .execute(conn)?;

        Ok(message)
    })?;

    let sender: User = users::table.find(message.sender_id).first::<User>(conn)?;
    Ok(to_view(message, &sender))
}

/// History page ordered `created_at` descending, starting strictly before
/// the cursor when one is given.
pub fn list_for_conversation(
    conn: &mut PgConnection,
    conversation_id: Uuid,
    actor: Uuid,
    params: &CursorParams,
) -> AppResult<Page<MessageView>> {
    ensure_member(conn, conversation_id, actor)?;

    let limit = params.limit();
    let mut query = messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .into_boxed();

    if let Some(cursor) = params.cursor {
        query = query.filter(messages::created_at.lt(cursor));
    }

    let rows: Vec<(Message, User)> = query
        .order(messages::created_at.desc())
        .limit(limit)
        .load::<(Message, User)>(conn)?;

    let views: Vec<MessageView> = rows
        .into_iter()
        .map(|(message, sender)| to_view(message, &sender))
        .collect();

    Ok(Page::from_rows(views, limit, |v| v.created_at))
}

/// A single message with its status rows.
pub fn get_single(
    conn: &mut PgConnection,
    message_id: Uuid,
    actor: Uuid,
) -> AppResult<MessageDetail> {
    let row: Option<(Message, User)> = messages::table
        .inner_join(users::table)
        .filter(messages::id.eq(message_id))
        .first::<(Message, User)>(conn)
        .optional()?;

    let (message, sender) =
        row.ok_or_else(|| AppError::new(ErrorCode::MessageNotFound, "message not found"))?;

    ensure_member(conn, message.conversation_id, actor)?;

    let statuses: Vec<MessageStatus> = message_statuses::table
        .filter(message_statuses::message_id.eq(message.id))
        .load::<MessageStatus>(conn)?;

    Ok(MessageDetail {
        message: to_view(message, &sender),
        statuses: statuses
            .into_iter()
            .map(|s| StatusView {
                user_id: s.user_id,
                delivered_at: s.delivered_at,
                read_at: s.read_at,
            })
            .collect(),
    })
}

/// Source-of-truth read for the bus consumer. Absent means the publish won
/// a race against a rollback; the caller drops the notification.
pub fn get_view(conn: &mut PgConnection, message_id: Uuid) -> AppResult<Option<MessageView>> {
    let row: Option<(Message, User)> = messages::table
        .inner_join(users::table)
        .filter(messages::id.eq(message_id))
        .first::<(Message, User)>(conn)
        .optional()?;

    Ok(row.map(|(message, sender)| to_view(message, &sender)))
}

/// Latest message of a conversation, for list views.
pub fn latest_view(
    conn: &mut PgConnection,
    conversation_id: Uuid,
) -> AppResult<Option<MessageView>> {
    let row: Option<(Message, User)> = messages::table
        .inner_join(users::table)
        .filter(messages::conversation_id.eq(conversation_id))
        .order(messages::created_at.desc())
        .first::<(Message, User)>(conn)
        .optional()?;

    Ok(row.map(|(message, sender)| to_view(message, &sender)))
}

/// Set the actor's `delivered_at` if still null. Returns the timestamp when
/// a row actually changed; a repeat delivery is a no-op.
pub fn mark_delivered(
    conn: &mut PgConnection,
    actor: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
) -> AppResult<Option<DateTime<Utc>>> {
    ensure_member(conn, conversation_id, actor)?;

    let belongs: i64 = messages::table
        .filter(messages::id.eq(message_id))
        .filter(messages::conversation_id.eq(conversation_id))
        .select(count_star())
        .first::<i64>(conn)?;
    if belongs == 0 {
        return Err(AppError::new(ErrorCode::MessageNotFound, "message not found"));
    }

    let now = Utc::now();
    let updated = diesel::update(
        message_statuses::table
            .filter(message_statuses::message_id.eq(message_id))
            .filter(message_statuses::user_id.eq(actor))
            .filter(message_statuses::delivered_at.is_null()),
    )
    .set(message_statuses::delivered_at.eq(now))
    .execute(conn)?;

    Ok((updated > 0).then_some(now))
}

/// Batch read receipt. One transaction sets `delivered_at` where null and
/// `read_at` where null, both to the same instant, restricted to the
/// actor's own rows for messages of the stated conversation. Returns the
/// message ids whose `read_at` actually transitioned.
pub fn mark_read(
    conn: &mut PgConnection,
    actor: Uuid,
    conversation_id: Uuid,
    message_ids: &[Uuid],
) -> AppResult<(Vec<Uuid>, DateTime<Utc>)> {
    ensure_member(conn, conversation_id, actor)?;

    let now = Utc::now();
    let read_ids = conn.transaction::<Vec<Uuid>, AppError, _>(|conn| {
        let valid: Vec<Uuid> = messages::table
            .filter(messages::id.eq_any(message_ids))
            .filter(messages::conversation_id.eq(conversation_id))
            .select(messages::id)
            .load::<Uuid>(conn)?;

        if valid.is_empty() {
            return Ok(vec![]);
        }

        diesel::update(
            message_statuses::table
                .filter(message_statuses::message_id.eq_any(&valid))
                .filter(message_statuses::user_id.eq(actor))
                .filter(message_statuses::delivered_at.is_null()),
        )
        .set(message_statuses::delivered_at.eq(now))
        .execute(conn)?;

        let read_ids: Vec<Uuid> = diesel::update(
            message_statuses::table
                .filter(message_statuses::message_id.eq_any(&valid))
                .filter(message_statuses::user_id.eq(actor))
                .filter(message_statuses::read_at.is_null()),
        )
        .set(message_statuses::read_at.eq(now))
        .returning(message_statuses::message_id)
        .get_results(conn)?;

        Ok(read_ids)
    })?;

    Ok((read_ids, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_requires_content() {
        assert!(validate_payload(MessageKind::Text, Some("hi"), None).is_ok());
        assert!(validate_payload(MessageKind::Text, None, None).is_err());
        assert!(validate_payload(MessageKind::Text, Some("   "), None).is_err());
    }

    #[test]
    fn text_rejects_media_path() {
        let err = validate_payload(MessageKind::Text, Some("hi"), Some("a/b.png")).unwrap_err();
        assert_eq!(err.wire_code(), ErrorCode::ValidationError.code());
    }

    #[test]
    fn media_requires_path() {
        assert!(validate_payload(MessageKind::Image, None, Some("a/b.png")).is_ok());
        assert!(validate_payload(MessageKind::Video, Some("caption"), Some("a/b.mp4")).is_ok());

        let err = validate_payload(MessageKind::Image, None, None).unwrap_err();
        assert_eq!(err.wire_code(), ErrorCode::MediaPathRequired.code());
        assert!(validate_payload(MessageKind::Video, None, Some("  ")).is_err());
    }

    #[test]
    fn send_payload_wire_names() {
        let json = serde_json::json!({
            "conversationId": Uuid::nil(),
            "type": "image",
            "mediaUrl": "conversations/x/y.png",
            "mediaMeta": { "mime": "image/png" }
        });
        let req: SendMessage = serde_json::from_value(json).unwrap();
        assert_eq!(req.kind, MessageKind::Image);
        assert_eq!(req.media_url.as_deref(), Some("conversations/x/y.png"));
        assert!(req.content.is_none());
    }
}
