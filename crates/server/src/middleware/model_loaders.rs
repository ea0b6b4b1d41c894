use std::{fmt::Display, future::Future};

use axum::{
    Extension,
    extract::{Path, Request, State},
    middleware::Next,
    response::Response,
};
use db::{
    DBService, DatabaseConnection, DbErr, begin_user_scope,
    models::{chat_session::ChatSession, user::User},
};
use deployment::Deployment;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

pub trait ModelLoaderDeps {
    fn db_service(&self) -> &DBService;
}

impl<D> ModelLoaderDeps for D
where
    D: Deployment,
{
    fn db_service(&self) -> &DBService {
        self.db()
    }
}

/// Path segment shared by every route below `/chat/sessions/{session_id}`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionPath {
    pub session_id: Uuid,
}

async fn fetch_model_or_status<M, E, Fut>(
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<M, ApiError>
where
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    match load_future.await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => {
            tracing::warn!("{model_name} {model_id} not found");
            Err(ApiError::NotFound(format!("{model_name} not found")))
        }
        Err(error) => {
            tracing::error!("Failed to fetch {model_name} {model_id}: {error}");
            Err(ApiError::Internal(error.to_string()))
        }
    }
}

async fn load_request_extension<M, E, Fut>(
    request: Request,
    next: Next,
    model_name: &'static str,
    model_id: Uuid,
    load_future: Fut,
) -> Result<Response, ApiError>
where
    M: Clone + Send + Sync + 'static,
    E: Display,
    Fut: Future<Output = Result<Option<M>, E>>,
{
    let model = fetch_model_or_status(model_name, model_id, load_future).await?;
    let mut request = request;
    request.extensions_mut().insert(model);
    Ok(next.run(request).await)
}

/// Another user's session and a missing one are indistinguishable.
async fn find_owned_session(
    db: &DatabaseConnection,
    session_id: Uuid,
    user_id: Uuid,
) -> Result<Option<ChatSession>, DbErr> {
    let tx = begin_user_scope(db, user_id).await?;
    let session = ChatSession::find_for_user(&tx, session_id, user_id).await?;
    tx.commit().await?;
    Ok(session)
}

pub async fn load_chat_session_middleware<S>(
    State(deployment): State<S>,
    Extension(user): Extension<User>,
    Path(path): Path<SessionPath>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    S: ModelLoaderDeps,
{
    load_request_extension(
        request,
        next,
        "Chat session",
        path.session_id,
        find_owned_session(&deployment.db_service().pool, path.session_id, user.id),
    )
    .await
}
