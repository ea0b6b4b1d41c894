use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{chat_session::ChatSessionError, user::UserError},
};
use deployment::DeploymentError;
use services::services::{
    chat::ChatError, edge_functions::EdgeFunctionError, password::PasswordError,
};
use thiserror::Error;
use utils::response::ApiResponse;
use utils_jwt::JwtError;

const DATABASE_ERROR_MESSAGE: &str = "A database error occurred. Please try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    ChatSession(#[from] ChatSessionError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    EdgeFunction(#[from] EdgeFunctionError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Deployment(#[from] DeploymentError),
    #[error("Unauthorized")]
    Unauthorized,
    /// Unknown email and wrong password share one message.
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Too many requests: {0}")]
    RateLimited(String),
}

fn chat_session_status(err: &ChatSessionError) -> StatusCode {
    match err {
        ChatSessionError::NotFound | ChatSessionError::MessageNotFound => StatusCode::NOT_FOUND,
        ChatSessionError::Validation(_) => StatusCode::BAD_REQUEST,
        ChatSessionError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn is_database_fault(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Database(_)
            | ApiError::ChatSession(ChatSessionError::Database(_))
            | ApiError::User(UserError::Database(_))
            | ApiError::Chat(ChatError::Database(_))
            | ApiError::Chat(ChatError::Session(ChatSessionError::Database(_)))
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::ChatSession(err) => (chat_session_status(err), "ChatSessionError"),
            ApiError::User(err) => match err {
                UserError::EmailTaken(_) => (StatusCode::CONFLICT, "UserError"),
                UserError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UserError"),
            },
            ApiError::Chat(err) => match err {
                ChatError::Session(inner) => (chat_session_status(inner), "ChatError"),
                ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "ChatError"),
                ChatError::Database(_) | ChatError::Model(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "ChatError")
                }
            },
            ApiError::EdgeFunction(err) => match err {
                EdgeFunctionError::UnknownFunction(_) => {
                    (StatusCode::NOT_FOUND, "EdgeFunctionError")
                }
                err if err.is_validation() => (StatusCode::BAD_REQUEST, "EdgeFunctionError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "EdgeFunctionError"),
            },
            ApiError::Jwt(err) => match err {
                JwtError::Expired | JwtError::Invalid(_) => {
                    (StatusCode::UNAUTHORIZED, "Unauthorized")
                }
                JwtError::Encode(_) | JwtError::UnsupportedAlgorithm(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "JwtError")
                }
            },
            ApiError::Password(err) => match err {
                PasswordError::TooShort => (StatusCode::BAD_REQUEST, "PasswordError"),
                PasswordError::Hash(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PasswordError"),
            },
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Deployment(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DeploymentError"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "InvalidCredentials"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "RateLimited"),
        };

        let error_message = match &self {
            err if is_database_fault(err) => DATABASE_ERROR_MESSAGE.to_string(),
            ApiError::Unauthorized | ApiError::Jwt(JwtError::Expired | JwtError::Invalid(_)) => {
                "Unauthorized".to_string()
            }
            ApiError::Deployment(_) | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::RateLimited(msg) => msg.clone(),
            // Upstream and validation messages are passed through verbatim.
            _ => self.to_string(),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;
    use services::services::llm::LlmError;

    use super::*;

    async fn message_of(err: ApiError) -> String {
        let response = err.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["message"].as_str().unwrap_or_default().to_string()
    }

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::InvalidCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RateLimited("slow down".to_string())
                .into_response()
                .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal("boom".to_string())
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(ChatSessionError::NotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ChatSessionError::MessageNotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ChatSessionError::Validation("empty".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(UserError::EmailTaken("a@example.com".to_string()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(ChatError::Session(ChatSessionError::NotFound))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ChatError::Validation("empty".to_string()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PasswordError::TooShort)
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(JwtError::Expired).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn edge_function_errors_split_by_origin() {
        assert_eq!(
            ApiError::from(EdgeFunctionError::UnknownFunction("nope".to_string()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(EdgeFunctionError::MissingParameter {
                function: "getOrderDetails".to_string(),
                parameter: "order_id".to_string(),
            })
            .into_response()
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(EdgeFunctionError::Timeout {
                function: "getCustomers".to_string(),
                after: Duration::from_secs(30),
            })
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn upstream_messages_pass_through() {
        let message = message_of(ApiError::from(ChatError::Model(LlmError::Api {
            status: 429,
            message: "Rate limit reached".to_string(),
        })))
        .await;
        assert!(message.contains("Rate limit reached"), "{message}");

        let message = message_of(ApiError::from(EdgeFunctionError::Status {
            function: "getCustomers".to_string(),
            status: 502,
            body: "bad gateway".to_string(),
        }))
        .await;
        assert!(message.contains("bad gateway"), "{message}");
    }

    #[tokio::test]
    async fn database_faults_hide_details() {
        let message = message_of(ApiError::from(ChatSessionError::Database(DbErr::Custom(
            "relation chat_sessions does not exist".to_string(),
        ))))
        .await;
        assert_eq!(message, DATABASE_ERROR_MESSAGE);

        let message = message_of(ApiError::from(JwtError::Invalid("bad sig".to_string()))).await;
        assert_eq!(message, "Unauthorized");
    }
}
