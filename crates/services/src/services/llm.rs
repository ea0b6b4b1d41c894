use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::services::config::OpenAiSettings;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Request(String),
    #[error("Model request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Model response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(LlmRole::User, content)
    }

    /// The assistant turn that requested `tool_calls`; it has to precede the
    /// tool results in the follow-up request.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model produced it.
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub model: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, LlmError>;
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiMessageResponse>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessageResponse {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: Option<String>,
}

/// Non-streaming client for the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    url: String,
    api_key: SecretString,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        api_base: &str,
        api_key: SecretString,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            url: format_openai_url(api_base),
            api_key,
            model: model.into(),
            timeout,
        }
    }

    pub fn from_settings(http: reqwest::Client, settings: &OpenAiSettings) -> Self {
        Self::new(
            http,
            &settings.api_base,
            settings.api_key.clone(),
            settings.model.clone(),
            settings.timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn map_send_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Request(err.to_string())
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<Completion, LlmError> {
        let body = OpenAiChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: &request.tools,
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
        };

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| self.map_send_error(err))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = parse_openai_error(&body)
                .unwrap_or_else(|| body.trim().to_string())
                .trim()
                .to_string();
            let message = if message.is_empty() {
                format!("Model request failed with status {}", status)
            } else {
                message
            };
            tracing::warn!(status = status.as_u16(), "OpenAI request failed: {}", message);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data = response
            .json::<OpenAiChatResponse>()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::InvalidResponse(err.to_string())
                }
            })?;

        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices returned".to_string()))?;
        let message = choice.message;

        Ok(Completion {
            content: message.as_ref().and_then(|message| message.content.clone()),
            tool_calls: message
                .and_then(|message| message.tool_calls)
                .unwrap_or_default(),
            finish_reason: choice.finish_reason,
            model: data.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

pub fn format_openai_url(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        format!("{}/chat/completions", trimmed)
    } else {
        format!("{}/v1/chat/completions", trimmed)
    }
}

fn parse_openai_error(body: &str) -> Option<String> {
    let parsed: OpenAiErrorResponse = serde_json::from_str(body).ok()?;
    parsed.error.and_then(|err| err.message)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::json;

    use super::*;

    #[test]
    fn format_openai_url_appends_v1() {
        assert_eq!(
            format_openai_url("https://example.com"),
            "https://example.com/v1/chat/completions"
        );
        assert_eq!(
            format_openai_url("https://example.com/"),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn format_openai_url_respects_existing_v1() {
        assert_eq!(
            format_openai_url("https://example.com/v1"),
            "https://example.com/v1/chat/completions"
        );
        assert_eq!(
            format_openai_url("https://example.com/v1/"),
            "https://example.com/v1/chat/completions"
        );
    }

    #[test]
    fn parse_openai_error_reads_nested_message() {
        assert_eq!(
            parse_openai_error(r#"{"error":{"message":"Rate limit reached"}}"#).as_deref(),
            Some("Rate limit reached")
        );
        assert_eq!(parse_openai_error("gateway timeout"), None);
    }

    #[test]
    fn tool_messages_serialize_like_the_api_expects() {
        let message = LlmMessage::tool_result("call_1", "{}");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"role": "tool", "content": "{}", "tool_call_id": "call_1"})
        );

        let plain = serde_json::to_value(LlmMessage::user("hi")).unwrap();
        assert_eq!(plain, json!({"role": "user", "content": "hi"}));
    }

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn spawn_stub(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(move |State(seen): State<Seen>, Json(body): Json<Value>| {
                    let reply = reply.clone();
                    async move {
                        seen.lock().unwrap().push(body);
                        (status, Json(reply))
                    }
                }),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn client(base: &str) -> OpenAiClient {
        OpenAiClient::new(
            reqwest::Client::new(),
            base,
            SecretString::from("sk-test".to_string()),
            "gpt-4o",
            Duration::from_secs(5),
        )
    }

    fn request(tools: Vec<Value>) -> ChatRequest {
        ChatRequest {
            messages: vec![LlmMessage::system("be nice"), LlmMessage::user("hello")],
            tools,
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn complete_parses_text_answer() {
        let (base, seen) = spawn_stub(
            StatusCode::OK,
            json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{
                    "message": {"role": "assistant", "content": "Hi there"},
                    "finish_reason": "stop"
                }]
            }),
        )
        .await;

        let completion = client(&base).complete(request(Vec::new())).await.unwrap();
        assert_eq!(completion.content.as_deref(), Some("Hi there"));
        assert!(completion.tool_calls.is_empty());
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.model, "gpt-4o-2024-08-06");

        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn complete_returns_tool_calls() {
        let (base, seen) = spawn_stub(
            StatusCode::OK,
            json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "getTopProducts", "arguments": "{\"limit\":3}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            }),
        )
        .await;

        let tools = vec![json!({"type": "function", "function": {"name": "getTopProducts"}})];
        let completion = client(&format!("{base}/v1/"))
            .complete(request(tools))
            .await
            .unwrap();
        assert_eq!(completion.content, None);
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].function.name, "getTopProducts");
        assert_eq!(completion.model, "gpt-4o");

        let body = seen.lock().unwrap()[0].clone();
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let (base, _seen) = spawn_stub(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"message": "Rate limit reached", "type": "requests"}}),
        )
        .await;

        match client(&base).complete(request(Vec::new())).await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let (base, _seen) = spawn_stub(StatusCode::OK, json!({"choices": []})).await;
        assert!(matches!(
            client(&base).complete(request(Vec::new())).await,
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
