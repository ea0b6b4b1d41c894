use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::user::User;
use deployment::Deployment;
use utils_jwt::JwtError;

use crate::{DeploymentImpl, error::ApiError};

fn parse_authorization_bearer(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let (prefix, rest) = trimmed.split_once(' ')?;
    if !prefix.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn unauthorized(req: &Request, reason: &'static str) -> Response {
    tracing::warn!(
        path = %req.uri().path(),
        method = %req.method(),
        reason,
        "Unauthorized API request"
    );
    ApiError::Unauthorized.into_response()
}

/// Verifies the bearer token and makes the caller available to handlers as
/// an `Extension<User>`. Tokens for users that no longer exist are rejected.
pub async fn require_auth(
    State(deployment): State<DeploymentImpl>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_authorization_bearer)
    else {
        return unauthorized(&req, "missing_token");
    };

    let claims = match deployment.jwt().verify(token) {
        Ok(claims) => claims,
        Err(JwtError::Expired) => return unauthorized(&req, "token_expired"),
        Err(_) => return unauthorized(&req, "invalid_token"),
    };

    let user = match User::find_by_id(&deployment.db().pool, claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => return unauthorized(&req, "unknown_user"),
        Err(err) => {
            tracing::error!(user_id = %claims.sub, "Failed to load authenticated user: {err}");
            return ApiError::Database(err).into_response();
        }
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}
