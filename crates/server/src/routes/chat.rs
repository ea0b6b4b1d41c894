use axum::{
    Extension, Json, Router, extract::State, response::Json as ResponseJson, routing::post,
};
use db::models::user::User;
use deployment::Deployment;
use services::services::chat::{ChatReply, SendMessage};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

pub async fn send_message(
    Extension(user): Extension<User>,
    State(deployment): State<DeploymentImpl>,
    Json(payload): Json<SendMessage>,
) -> Result<ResponseJson<ApiResponse<ChatReply>>, ApiError> {
    let reply = deployment.chat().send(user.id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(reply)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/chat/send", post(send_message))
}
