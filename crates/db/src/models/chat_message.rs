use std::collections::HashMap;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, JsonValue, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use uuid::Uuid;

use crate::{
    entities::chat_message,
    models::chat_session::{ChatSession, ChatSessionError, merge_metadata},
    types::MessageRole,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessageMetadata {
    pub metadata: JsonValue,
}

/// Timestamp for a message appended after `previous`: now at microsecond
/// precision, pushed forward when the clock has not moved past `previous`.
pub fn next_message_timestamp(
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let candidate = now.trunc_subsecs(6);
    match previous {
        Some(previous) if previous >= candidate => previous + Duration::microseconds(1),
        _ => candidate,
    }
}

impl ChatMessage {
    fn from_model(model: chat_message::Model) -> Self {
        Self {
            id: model.id,
            session_id: model.session_id,
            role: model.role,
            content: model.content,
            timestamp: model.timestamp,
            metadata: model.metadata,
        }
    }

    /// All messages of a session in timestamp order.
    pub async fn find_by_session<C: ConnectionTrait>(
        db: &C,
        session_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let records = chat_message::Entity::find()
            .filter(chat_message::Column::SessionId.eq(session_id))
            .order_by_asc(chat_message::Column::Timestamp)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// The newest `limit` messages, oldest first.
    pub async fn find_recent<C: ConnectionTrait>(
        db: &C,
        session_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let mut records = chat_message::Entity::find()
            .filter(chat_message::Column::SessionId.eq(session_id))
            .order_by_desc(chat_message::Column::Timestamp)
            .limit(limit)
            .all(db)
            .await?;
        records.reverse();
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    pub async fn find_latest<C: ConnectionTrait>(
        db: &C,
        session_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let record = chat_message::Entity::find()
            .filter(chat_message::Column::SessionId.eq(session_id))
            .order_by_desc(chat_message::Column::Timestamp)
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn count_by_sessions<C: ConnectionTrait>(
        db: &C,
        session_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, u64>, DbErr> {
        if session_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, i64)> = chat_message::Entity::find()
            .select_only()
            .column(chat_message::Column::SessionId)
            .column_as(chat_message::Column::Id.count(), "count")
            .filter(chat_message::Column::SessionId.is_in(session_ids.to_vec()))
            .group_by(chat_message::Column::SessionId)
            .into_tuple()
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(session_id, count)| (session_id, count.max(0) as u64))
            .collect())
    }

    /// Appends a message to an owned session and bumps the session's
    /// `updated_at`.
    pub async fn append<C: ConnectionTrait>(
        db: &C,
        session: &ChatSession,
        data: &CreateChatMessage,
    ) -> Result<Self, ChatSessionError> {
        if data.content.trim().is_empty() {
            return Err(ChatSessionError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }
        let mut metadata = JsonValue::Object(Map::new());
        if let Some(patch) = data.metadata.clone() {
            merge_metadata(&mut metadata, patch)?;
        }

        let previous = Self::find_latest(db, session.id)
            .await?
            .map(|message| message.timestamp);
        let active = chat_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(session.id),
            role: Set(data.role),
            content: Set(data.content.clone()),
            timestamp: Set(next_message_timestamp(previous, Utc::now())),
            metadata: Set(metadata),
        };
        let model = active.insert(db).await?;
        ChatSession::touch(db, session.id).await?;
        Ok(Self::from_model(model))
    }

    /// Messages are append-only; metadata is the one mutable part.
    pub async fn update_metadata<C: ConnectionTrait>(
        db: &C,
        session: &ChatSession,
        message_id: Uuid,
        patch: JsonValue,
    ) -> Result<Self, ChatSessionError> {
        let record = chat_message::Entity::find()
            .filter(chat_message::Column::Id.eq(message_id))
            .filter(chat_message::Column::SessionId.eq(session.id))
            .one(db)
            .await?
            .ok_or(ChatSessionError::MessageNotFound)?;

        let mut metadata = record.metadata.clone();
        merge_metadata(&mut metadata, patch)?;

        let mut active: chat_message::ActiveModel = record.into();
        active.metadata = Set(metadata);
        let updated = active.update(db).await?;
        Ok(Self::from_model(updated))
    }

    /// Deletes every message of the session, keeping the session itself.
    pub async fn clear<C: ConnectionTrait>(db: &C, session: &ChatSession) -> Result<u64, DbErr> {
        let result = chat_message::Entity::delete_many()
            .filter(chat_message::Column::SessionId.eq(session.id))
            .exec(db)
            .await?;
        ChatSession::touch(db, session.id).await?;
        Ok(result.rows_affected)
    }
}
