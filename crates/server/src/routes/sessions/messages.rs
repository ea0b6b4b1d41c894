use axum::{
    Extension, Json,
    extract::{Path, State},
    response::Json as ResponseJson,
};
use db::models::{
    chat_message::{ChatMessage, CreateChatMessage, UpdateMessageMetadata},
    chat_session::ChatSession,
    user::User,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError};

/// The `session_id` segment is consumed by the session loader.
#[derive(Debug, Deserialize)]
pub struct MessagePath {
    pub message_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ClearedMessages {
    pub session_id: Uuid,
    pub deleted_count: u64,
}

pub async fn append_message(
    Extension(user): Extension<User>,
    Extension(session): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateChatMessage>,
) -> Result<ResponseJson<ApiResponse<ChatMessage>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let message = ChatMessage::append(&tx, &session, &payload).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(message)))
}

pub async fn update_message_metadata(
    Extension(user): Extension<User>,
    Extension(session): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
    Path(path): Path<MessagePath>,
    Json(payload): Json<UpdateMessageMetadata>,
) -> Result<ResponseJson<ApiResponse<ChatMessage>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let message =
        ChatMessage::update_metadata(&tx, &session, path.message_id, payload.metadata).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(message)))
}

pub async fn clear_messages(
    Extension(user): Extension<User>,
    Extension(session): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ClearedMessages>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let deleted_count = ChatMessage::clear(&tx, &session).await?;
    tx.commit().await?;

    tracing::info!(session_id = %session.id, deleted_count, "Cleared chat messages");
    Ok(ResponseJson(ApiResponse::success(ClearedMessages {
        session_id: session.id,
        deleted_count,
    })))
}
