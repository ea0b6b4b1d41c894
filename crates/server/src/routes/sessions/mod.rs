use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, patch, post},
};
use db::models::{
    chat_session::{
        ChatSession, ChatSessionDetail, CreateChatSession, ListSessionsParams, SessionPage,
        UpdateChatSession,
    },
    user::User,
};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::load_chat_session_middleware};

pub mod messages;

#[derive(Debug, Default, Deserialize)]
pub struct DeleteSessionQuery {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Serialize)]
pub struct DeletedSession {
    pub id: Uuid,
    pub hard: bool,
    /// Only set for hard deletes.
    pub messages_deleted: Option<u64>,
}

pub async fn list_sessions(
    Extension(user): Extension<User>,
    State(deployment): State<DeploymentImpl>,
    Query(params): Query<ListSessionsParams>,
) -> Result<ResponseJson<ApiResponse<SessionPage>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let page = ChatSession::list_for_user(&tx, user.id, &params).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(page)))
}

pub async fn create_session(
    Extension(user): Extension<User>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<CreateChatSession>,
) -> Result<ResponseJson<ApiResponse<ChatSession>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let session = ChatSession::create(&tx, user.id, &payload).await?;
    tx.commit().await?;

    tracing::debug!(session_id = %session.id, user_id = %user.id, "Created chat session");
    Ok(ResponseJson(ApiResponse::success(session)))
}

pub async fn get_session(
    Extension(user): Extension<User>,
    Extension(session): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<ChatSessionDetail>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let detail = ChatSession::detail(&tx, session.id, user.id).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(detail)))
}

pub async fn update_session(
    Extension(user): Extension<User>,
    Extension(existing): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<UpdateChatSession>,
) -> Result<ResponseJson<ApiResponse<ChatSession>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let session = ChatSession::update(&tx, existing.id, user.id, &payload).await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(session)))
}

/// Archives by default; `?hard=true` removes the session and its messages.
pub async fn delete_session(
    Extension(user): Extension<User>,
    Extension(existing): Extension<ChatSession>,
    State(deployment): State<DeploymentImpl>,
    Query(query): Query<DeleteSessionQuery>,
) -> Result<ResponseJson<ApiResponse<DeletedSession>>, ApiError> {
    let tx = deployment.db().begin_user_scope(user.id).await?;
    let messages_deleted = if query.hard {
        Some(ChatSession::delete(&tx, existing.id, user.id).await?)
    } else {
        ChatSession::archive(&tx, existing.id, user.id).await?;
        None
    };
    tx.commit().await?;

    tracing::info!(
        session_id = %existing.id,
        hard = query.hard,
        messages_deleted = messages_deleted.unwrap_or(0),
        "Deleted chat session"
    );
    Ok(ResponseJson(ApiResponse::success(DeletedSession {
        id: existing.id,
        hard: query.hard,
        messages_deleted,
    })))
}

pub fn router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    let session_id_router = Router::new()
        .route(
            "/",
            get(get_session)
                .patch(update_session)
                .delete(delete_session),
        )
        .route(
            "/messages",
            post(messages::append_message).delete(messages::clear_messages),
        )
        .route(
            "/messages/{message_id}",
            patch(messages::update_message_metadata),
        )
        .layer(from_fn_with_state(
            deployment.clone(),
            load_chat_session_middleware::<DeploymentImpl>,
        ));

    let inner = Router::new()
        .route("/", get(list_sessions).post(create_session))
        .nest("/{session_id}", session_id_router);

    Router::new().nest("/chat/sessions", inner)
}
