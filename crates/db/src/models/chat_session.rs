use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, JsonValue,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionSession, TransactionTrait,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use thiserror::Error;
use utils::text::{ellipsize, non_blank};
use uuid::Uuid;

use crate::{
    entities::{chat_message, chat_session},
    models::chat_message::ChatMessage,
};

pub const DEFAULT_TITLE: &str = "New Chat";
pub const MAX_TITLE_CHARS: usize = 200;
pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;
pub const PREVIEW_CHARS: usize = 100;
const SYSTEM_PROMPT_KEY: &str = "system_prompt";

#[derive(Debug, Error)]
pub enum ChatSessionError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Chat session not found")]
    NotFound,
    #[error("Message not found")]
    MessageNotFound,
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChatSession {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// Partial update. A blank `system_prompt` clears the stored prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChatSession {
    pub title: Option<String>,
    pub system_prompt: Option<String>,
    pub is_active: Option<bool>,
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSessionsParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub include_archived: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ChatSession,
    pub message_count: u64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionSummary>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
    pub total_messages: usize,
}

/// Trimmed title, capped at [`MAX_TITLE_CHARS`], or [`DEFAULT_TITLE`] when blank.
pub fn normalize_title(title: Option<&str>) -> String {
    match non_blank(title) {
        Some(title) => ellipsize(&title, MAX_TITLE_CHARS),
        None => DEFAULT_TITLE.to_string(),
    }
}

/// Shallow merge of `patch` into `target`; keys in `patch` win.
pub fn merge_metadata(target: &mut JsonValue, patch: JsonValue) -> Result<(), ChatSessionError> {
    let JsonValue::Object(patch) = patch else {
        return Err(ChatSessionError::Validation(
            "metadata must be a JSON object".to_string(),
        ));
    };
    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(target) = target {
        target.extend(patch);
    }
    Ok(())
}

fn set_system_prompt(metadata: &mut JsonValue, prompt: Option<&str>) {
    if !metadata.is_object() {
        *metadata = JsonValue::Object(Map::new());
    }
    if let JsonValue::Object(map) = metadata {
        match non_blank(prompt) {
            Some(prompt) => {
                map.insert(SYSTEM_PROMPT_KEY.to_string(), JsonValue::String(prompt));
            }
            None => {
                map.remove(SYSTEM_PROMPT_KEY);
            }
        }
    }
}

impl ChatSession {
    fn from_model(model: chat_session::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            created_at: model.created_at,
            updated_at: model.updated_at,
            is_active: model.is_active,
            metadata: model.metadata,
        }
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.metadata
            .get(SYSTEM_PROMPT_KEY)
            .and_then(JsonValue::as_str)
    }

    async fn find_owned_model<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<chat_session::Model, ChatSessionError> {
        chat_session::Entity::find()
            .filter(chat_session::Column::Id.eq(id))
            .filter(chat_session::Column::UserId.eq(user_id))
            .one(db)
            .await?
            .ok_or(ChatSessionError::NotFound)
    }

    /// Looks up a session owned by `user_id`. Sessions of other users are
    /// reported exactly like missing ones.
    pub async fn find_for_user<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let record = chat_session::Entity::find()
            .filter(chat_session::Column::Id.eq(id))
            .filter(chat_session::Column::UserId.eq(user_id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn list_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        params: &ListSessionsParams,
    ) -> Result<SessionPage, DbErr> {
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = params.offset.unwrap_or(0);

        let mut query =
            chat_session::Entity::find().filter(chat_session::Column::UserId.eq(user_id));
        if !params.include_archived.unwrap_or(false) {
            query = query.filter(chat_session::Column::IsActive.eq(true));
        }

        let total = query.clone().count(db).await?;
        let records = query
            .order_by_desc(chat_session::Column::UpdatedAt)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await?;

        let ids: Vec<Uuid> = records.iter().map(|record| record.id).collect();
        let counts = ChatMessage::count_by_sessions(db, &ids).await?;

        let mut sessions = Vec::with_capacity(records.len());
        for record in records {
            let latest = ChatMessage::find_latest(db, record.id).await?;
            sessions.push(SessionSummary {
                message_count: counts.get(&record.id).copied().unwrap_or(0),
                last_message: latest
                    .as_ref()
                    .map(|message| ellipsize(&message.content, PREVIEW_CHARS)),
                last_message_at: latest.map(|message| message.timestamp),
                session: Self::from_model(record),
            });
        }

        Ok(SessionPage {
            has_more: offset + (sessions.len() as u64) < total,
            sessions,
            total,
            limit,
            offset,
        })
    }

    pub async fn detail<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<ChatSessionDetail, ChatSessionError> {
        let session = Self::from_model(Self::find_owned_model(db, id, user_id).await?);
        let messages = ChatMessage::find_by_session(db, session.id).await?;
        Ok(ChatSessionDetail {
            total_messages: messages.len(),
            session,
            messages,
        })
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        data: &CreateChatSession,
    ) -> Result<Self, ChatSessionError> {
        let mut metadata = JsonValue::Object(Map::new());
        if let Some(patch) = data.metadata.clone() {
            merge_metadata(&mut metadata, patch)?;
        }
        if data.system_prompt.is_some() {
            set_system_prompt(&mut metadata, data.system_prompt.as_deref());
        }

        let now = Utc::now();
        let active = chat_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            title: Set(Some(normalize_title(data.title.as_deref()))),
            created_at: Set(now),
            updated_at: Set(now),
            is_active: Set(true),
            metadata: Set(metadata),
        };
        let model = active.insert(db).await?;
        tracing::debug!(session_id = %model.id, %user_id, "chat session created");
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
        data: &UpdateChatSession,
    ) -> Result<Self, ChatSessionError> {
        let record = Self::find_owned_model(db, id, user_id).await?;

        let mut metadata = record.metadata.clone();
        if let Some(patch) = data.metadata.clone() {
            merge_metadata(&mut metadata, patch)?;
        }
        if data.system_prompt.is_some() {
            set_system_prompt(&mut metadata, data.system_prompt.as_deref());
        }

        let mut active: chat_session::ActiveModel = record.into();
        if let Some(title) = data.title.as_deref() {
            active.title = Set(Some(normalize_title(Some(title))));
        }
        if let Some(is_active) = data.is_active {
            active.is_active = Set(is_active);
        }
        active.metadata = Set(metadata);
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Ok(Self::from_model(updated))
    }

    /// Soft delete: the session drops out of default listings, messages stay.
    pub async fn archive<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Self, ChatSessionError> {
        let record = Self::find_owned_model(db, id, user_id).await?;
        let mut active: chat_session::ActiveModel = record.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        Ok(Self::from_model(updated))
    }

    /// Removes the session and every message in it atomically. Returns the
    /// number of messages removed.
    pub async fn delete<C: ConnectionTrait + TransactionTrait>(
        db: &C,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, ChatSessionError> {
        let tx = db.begin().await?;
        Self::find_owned_model(&tx, id, user_id).await?;

        let messages = chat_message::Entity::delete_many()
            .filter(chat_message::Column::SessionId.eq(id))
            .exec(&tx)
            .await?;
        chat_session::Entity::delete_many()
            .filter(chat_session::Column::Id.eq(id))
            .filter(chat_session::Column::UserId.eq(user_id))
            .exec(&tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(session_id = %id, messages = messages.rows_affected, "chat session deleted");
        Ok(messages.rows_affected)
    }

    pub(crate) async fn touch<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<(), DbErr> {
        chat_session::Entity::update_many()
            .col_expr(chat_session::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(chat_session::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;
    use serde_json::json;

    use super::*;
    use crate::{
        entities::user,
        models::{
            chat_message::CreateChatMessage,
            user::{CreateUser, User},
        },
        types::MessageRole,
    };

    async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn create_user(db: &DatabaseConnection, email: &str) -> Uuid {
        User::create(
            db,
            &CreateUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                first_name: None,
                last_name: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn create_session(db: &DatabaseConnection, user_id: Uuid, title: &str) -> ChatSession {
        ChatSession::create(
            db,
            user_id,
            &CreateChatSession {
                title: Some(title.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    async fn say(db: &DatabaseConnection, session: &ChatSession, content: &str) -> ChatMessage {
        ChatMessage::append(
            db,
            session,
            &CreateChatMessage {
                role: MessageRole::User,
                content: content.to_string(),
                metadata: None,
            },
        )
        .await
        .unwrap()
    }

    #[test]
    fn titles_are_trimmed_capped_and_defaulted() {
        assert_eq!(normalize_title(Some("  Sales  ")), "Sales");
        assert_eq!(normalize_title(Some("   ")), DEFAULT_TITLE);
        assert_eq!(normalize_title(None), DEFAULT_TITLE);

        let long = "x".repeat(MAX_TITLE_CHARS + 10);
        let title = normalize_title(Some(&long));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn metadata_merge_overrides_keys_and_rejects_non_objects() {
        let mut metadata = json!({"a": 1, "b": 2});
        merge_metadata(&mut metadata, json!({"b": 3, "c": 4})).unwrap();
        assert_eq!(metadata, json!({"a": 1, "b": 3, "c": 4}));

        assert!(matches!(
            merge_metadata(&mut metadata, json!([1])),
            Err(ChatSessionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_stores_system_prompt_in_metadata() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;

        let session = ChatSession::create(
            &db,
            user_id,
            &CreateChatSession {
                title: None,
                system_prompt: Some("Be brief".to_string()),
                metadata: Some(json!({"source": "web"})),
            },
        )
        .await
        .unwrap();

        assert_eq!(session.title.as_deref(), Some(DEFAULT_TITLE));
        assert_eq!(session.system_prompt(), Some("Be brief"));
        assert_eq!(session.metadata["source"], "web");
        assert!(session.is_active);
    }

    #[tokio::test]
    async fn sessions_are_invisible_to_other_users() {
        let db = setup_db().await;
        let alice = create_user(&db, "alice@example.com").await;
        let bob = create_user(&db, "bob@example.com").await;
        let session = create_session(&db, alice, "private").await;

        assert!(
            ChatSession::find_for_user(&db, session.id, bob)
                .await
                .unwrap()
                .is_none()
        );
        let page = ChatSession::list_for_user(&db, bob, &ListSessionsParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.sessions.is_empty());

        assert!(matches!(
            ChatSession::detail(&db, session.id, bob).await,
            Err(ChatSessionError::NotFound)
        ));
        assert!(matches!(
            ChatSession::update(&db, session.id, bob, &UpdateChatSession::default()).await,
            Err(ChatSessionError::NotFound)
        ));
        assert!(matches!(
            ChatSession::archive(&db, session.id, bob).await,
            Err(ChatSessionError::NotFound)
        ));
        assert!(matches!(
            ChatSession::delete(&db, session.id, bob).await,
            Err(ChatSessionError::NotFound)
        ));

        let still_there = ChatSession::find_for_user(&db, session.id, alice)
            .await
            .unwrap()
            .unwrap();
        assert!(still_there.is_active);
    }

    #[tokio::test]
    async fn archiving_keeps_messages_and_hides_from_default_listing() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let session = create_session(&db, user_id, "archive me").await;
        say(&db, &session, "one").await;
        say(&db, &session, "two").await;

        let archived = ChatSession::archive(&db, session.id, user_id).await.unwrap();
        assert!(!archived.is_active);

        let default_page = ChatSession::list_for_user(&db, user_id, &ListSessionsParams::default())
            .await
            .unwrap();
        assert!(default_page.sessions.is_empty());

        let all = ChatSession::list_for_user(
            &db,
            user_id,
            &ListSessionsParams {
                include_archived: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all.sessions.len(), 1);
        assert_eq!(all.sessions[0].message_count, 2);

        let detail = ChatSession::detail(&db, session.id, user_id).await.unwrap();
        assert_eq!(detail.total_messages, 2);
    }

    #[tokio::test]
    async fn hard_delete_removes_session_and_messages() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let session = create_session(&db, user_id, "doomed").await;
        say(&db, &session, "one").await;
        say(&db, &session, "two").await;
        say(&db, &session, "three").await;

        let removed = ChatSession::delete(&db, session.id, user_id).await.unwrap();
        assert_eq!(removed, 3);

        assert!(
            ChatSession::find_for_user(&db, session.id, user_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            ChatMessage::find_by_session(&db, session.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn removing_session_row_cascades_to_messages() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let doomed = create_session(&db, user_id, "doomed").await;
        let kept = create_session(&db, user_id, "kept").await;
        say(&db, &doomed, "one").await;
        say(&db, &doomed, "two").await;
        say(&db, &kept, "three").await;

        chat_session::Entity::delete_by_id(doomed.id)
            .exec(&db)
            .await
            .unwrap();

        let remaining = chat_message::Entity::find().all(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].session_id, kept.id);
    }

    #[tokio::test]
    async fn removing_user_row_cascades_to_sessions_and_messages() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let other_id = create_user(&db, "b@example.com").await;
        let session = create_session(&db, user_id, "mine").await;
        say(&db, &session, "one").await;
        let other = create_session(&db, other_id, "theirs").await;
        say(&db, &other, "two").await;

        user::Entity::delete_by_id(user_id).exec(&db).await.unwrap();

        let sessions = chat_session::Entity::find().all(&db).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_id, other_id);
        let messages = chat_message::Entity::find().all(&db).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].session_id, other.id);
    }

    #[tokio::test]
    async fn listing_orders_by_activity_and_summarizes() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let older = create_session(&db, user_id, "older").await;
        let newer = create_session(&db, user_id, "newer").await;
        let long = "y".repeat(PREVIEW_CHARS + 20);
        say(&db, &older, &long).await;

        let page = ChatSession::list_for_user(&db, user_id, &ListSessionsParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert!(!page.has_more);

        let first = &page.sessions[0];
        assert_eq!(first.session.id, older.id);
        assert_eq!(first.message_count, 1);
        let preview = first.last_message.as_deref().unwrap();
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(first.last_message_at.is_some());

        let second = &page.sessions[1];
        assert_eq!(second.session.id, newer.id);
        assert_eq!(second.message_count, 0);
        assert!(second.last_message.is_none());
    }

    #[tokio::test]
    async fn listing_clamps_limit_and_reports_more() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        for i in 0..3 {
            create_session(&db, user_id, &format!("s{i}")).await;
        }

        let page = ChatSession::list_for_user(
            &db,
            user_id,
            &ListSessionsParams {
                limit: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.sessions.len(), 1);
        assert!(page.has_more);

        let page = ChatSession::list_for_user(
            &db,
            user_id,
            &ListSessionsParams {
                limit: Some(1_000),
                offset: Some(2),
                include_archived: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(page.sessions.len(), 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn update_merges_metadata_and_clears_prompt() {
        let db = setup_db().await;
        let user_id = create_user(&db, "a@example.com").await;
        let session = ChatSession::create(
            &db,
            user_id,
            &CreateChatSession {
                title: Some("t".to_string()),
                system_prompt: Some("p".to_string()),
                metadata: Some(json!({"keep": true})),
            },
        )
        .await
        .unwrap();

        let updated = ChatSession::update(
            &db,
            session.id,
            user_id,
            &UpdateChatSession {
                title: Some("  renamed ".to_string()),
                system_prompt: Some(String::new()),
                is_active: None,
                metadata: Some(json!({"extra": 1})),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.title.as_deref(), Some("renamed"));
        assert_eq!(updated.system_prompt(), None);
        assert_eq!(updated.metadata, json!({"keep": true, "extra": 1}));
        assert!(updated.updated_at >= session.updated_at);
    }
}
