use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::user::{CreateUser, UpdateProfile, User, normalize_email};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::password::{hash_password, verify_password};
use utils::{response::ApiResponse, text::non_blank};
use uuid::Uuid;

use crate::{DeploymentImpl, error::ApiError, middleware::limit_registrations};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct TokenCheck {
    pub valid: bool,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LoggedOut {
    pub message: &'static str,
}

fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = normalize_email(email);
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::BadRequest("Invalid email address".to_string())),
    }
}

// Argon2 blocks the thread for tens of milliseconds.
async fn run_blocking<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| ApiError::Internal(format!("Password task join failed: {err}")))
}

pub async fn register(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<RegisterRequest>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let email = validate_email(&payload.email)?;
    let password = payload.password;
    let password_hash = run_blocking(move || hash_password(&password)).await??;

    let user = User::create(
        &deployment.db().pool,
        &CreateUser {
            email,
            password_hash,
            first_name: non_blank(payload.first_name.as_deref()),
            last_name: non_blank(payload.last_name.as_deref()),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "Registered user");
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn login(
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<TokenResponse>>, ApiError> {
    let Some((user, stored_hash)) =
        User::find_credentials_by_email(&deployment.db().pool, &payload.email).await?
    else {
        tracing::warn!("Login attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let password = payload.password;
    if !run_blocking(move || verify_password(&password, &stored_hash)).await? {
        tracing::warn!(user_id = %user.id, "Login attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let access_token = deployment.jwt().issue(user.id, &user.email)?;
    Ok(ResponseJson(ApiResponse::success(TokenResponse {
        access_token,
        token_type: "bearer",
        expires_in: deployment.jwt().expires_in().num_seconds(),
    })))
}

pub async fn me(Extension(user): Extension<User>) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user))
}

pub async fn update_me(
    State(deployment): State<DeploymentImpl>,
    Extension(user): Extension<User>,
    Json(payload): Json<UpdateProfile>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let changes = UpdateProfile {
        first_name: non_blank(payload.first_name.as_deref()),
        last_name: non_blank(payload.last_name.as_deref()),
    };
    if changes.is_empty() {
        return Err(ApiError::BadRequest("No valid fields to update".to_string()));
    }

    let updated = User::update_profile(&deployment.db().pool, user.id, &changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    tracing::info!(user_id = %updated.id, "Updated user profile");
    Ok(ResponseJson(ApiResponse::success(updated)))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(Extension(user): Extension<User>) -> ResponseJson<ApiResponse<LoggedOut>> {
    tracing::info!(user_id = %user.id, "User logged out");
    ResponseJson(ApiResponse::success(LoggedOut {
        message: "Successfully logged out",
    }))
}

pub async fn verify_token(
    Extension(user): Extension<User>,
) -> ResponseJson<ApiResponse<TokenCheck>> {
    ResponseJson(ApiResponse::success(TokenCheck {
        valid: true,
        user_id: user.id,
    }))
}

/// Routes reachable without a token.
pub fn public_router(deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route(
            "/auth/register",
            post(register).layer(from_fn_with_state(deployment.clone(), limit_registrations)),
        )
        .route("/auth/login", post(login))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/auth/me", get(me).put(update_me))
        .route("/auth/verify", get(verify_token))
        .route("/auth/logout", post(logout))
}
