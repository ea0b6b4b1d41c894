use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use db::{
    DatabaseConnection, DbErr, begin_user_scope,
    models::{
        chat_message::{ChatMessage, CreateChatMessage},
        chat_session::{
            ChatSession, ChatSessionError, CreateChatSession, DEFAULT_TITLE, UpdateChatSession,
        },
    },
    types::MessageRole,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use utils::text::{ellipsize, truncate_with_suffix};
use uuid::Uuid;

use crate::services::{
    config::ChatSettings,
    edge_functions::{FunctionInvoker, openai_tools},
    llm::{ChatModel, ChatRequest, Completion, LlmError, LlmMessage, LlmRole, ToolCall},
};

pub const EMPTY_RESPONSE_FALLBACK: &str = "I apologize, but I couldn't generate a response.";
const TITLE_MAX_CHARS: usize = 50;
const FALLBACK_TITLE_CHARS: usize = 30;
const TITLE_PROMPT_MESSAGE_CHARS: usize = 200;
const TITLE_TEMPERATURE: f32 = 0.7;
const TITLE_MAX_TOKENS: u32 = 100;
const TITLE_SYSTEM_PROMPT: &str = "You are a title generator. Generate concise, descriptive \
titles for chat conversations. Keep titles under 50 characters and make them relevant to the \
conversation topic.";

static DEBUG_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(>\s*)?\[debug\]").expect("valid regex"));
static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Session(#[from] ChatSessionError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("{0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    pub message: String,
    pub session_id: Option<Uuid>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub session_id: Uuid,
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub metadata: ReplyMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyMetadata {
    pub user_message_id: Uuid,
    pub tool_calls: Vec<String>,
}

/// Runs one user turn: persist the question, ask the model (with at most one
/// round of edge-function calls), persist the answer.
#[derive(Clone)]
pub struct ChatService {
    db: DatabaseConnection,
    model: Arc<dyn ChatModel>,
    functions: Arc<dyn FunctionInvoker>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        db: DatabaseConnection,
        model: Arc<dyn ChatModel>,
        functions: Arc<dyn FunctionInvoker>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            db,
            model,
            functions,
            settings,
        }
    }

    pub async fn send(&self, user_id: Uuid, request: SendMessage) -> Result<ChatReply, ChatError> {
        if request.message.trim().is_empty() {
            return Err(ChatError::Validation("Message cannot be empty".to_string()));
        }
        let temperature = request
            .temperature
            .unwrap_or(self.settings.default_temperature);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ChatError::Validation(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        let max_tokens = request
            .max_tokens
            .unwrap_or(self.settings.default_max_tokens);
        if max_tokens == 0 {
            return Err(ChatError::Validation(
                "max_tokens must be at least 1".to_string(),
            ));
        }

        // The model call can take a while; no transaction stays open across it.
        let (session, history, user_message, created) = {
            let tx = begin_user_scope(&self.db, user_id).await?;
            let (session, created) = match request.session_id {
                Some(session_id) => (
                    ChatSession::find_for_user(&tx, session_id, user_id)
                        .await?
                        .ok_or(ChatSessionError::NotFound)?,
                    false,
                ),
                None => {
                    let session = ChatSession::create(
                        &tx,
                        user_id,
                        &CreateChatSession {
                            title: Some(fallback_title(&request.message)),
                            system_prompt: request.system_prompt.clone(),
                            metadata: None,
                        },
                    )
                    .await?;
                    (session, true)
                }
            };
            let history =
                ChatMessage::find_recent(&tx, session.id, self.settings.context_window).await?;
            let user_message = ChatMessage::append(
                &tx,
                &session,
                &CreateChatMessage {
                    role: MessageRole::User,
                    content: request.message.clone(),
                    metadata: None,
                },
            )
            .await?;
            tx.commit().await?;
            (session, history, user_message, created)
        };
        // Explicit titles on existing sessions are left alone.
        let needs_title = history.is_empty()
            && (created || matches!(session.title.as_deref(), None | Some(DEFAULT_TITLE)));

        let system_prompt = request
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
            .or(session.system_prompt());
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(LlmMessage::system(build_system_prompt(
            Utc::now().date_naive(),
            system_prompt,
        )));
        messages.extend(history.iter().map(history_message));
        messages.push(LlmMessage::user(request.message.clone()));

        let (completion, tool_names) = self
            .run_model(messages, temperature, max_tokens)
            .await
            .inspect_err(|err| {
                tracing::error!(session_id = %session.id, "Chat completion failed: {}", err);
            })?;

        let response = match clean_response(completion.content.as_deref().unwrap_or_default()) {
            text if text.is_empty() => EMPTY_RESPONSE_FALLBACK.to_string(),
            text => text,
        };

        let title = if needs_title {
            Some(self.generate_title(&request.message).await)
        } else {
            None
        };

        let tx = begin_user_scope(&self.db, user_id).await?;
        if let Some(title) = title {
            ChatSession::update(
                &tx,
                session.id,
                user_id,
                &UpdateChatSession {
                    title: Some(title),
                    ..Default::default()
                },
            )
            .await?;
        }
        let assistant_message = ChatMessage::append(
            &tx,
            &session,
            &CreateChatMessage {
                role: MessageRole::Assistant,
                content: response.clone(),
                metadata: Some(json!({
                    "model": completion.model,
                    "tool_calls": tool_names,
                    "finish_reason": completion.finish_reason,
                })),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            session_id = %session.id,
            tool_calls = tool_names.len(),
            "Chat turn completed"
        );

        Ok(ChatReply {
            response,
            session_id: session.id,
            message_id: assistant_message.id,
            timestamp: assistant_message.timestamp,
            metadata: ReplyMetadata {
                user_message_id: user_message.id,
                tool_calls: tool_names,
            },
        })
    }

    async fn run_model(
        &self,
        mut messages: Vec<LlmMessage>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<(Completion, Vec<String>), LlmError> {
        let first = self
            .model
            .complete(ChatRequest {
                messages: messages.clone(),
                tools: openai_tools(),
                temperature,
                max_tokens,
            })
            .await?;
        if first.tool_calls.is_empty() {
            return Ok((first, Vec::new()));
        }

        let tool_names: Vec<String> = first
            .tool_calls
            .iter()
            .map(|call| call.function.name.clone())
            .collect();
        messages.push(LlmMessage::assistant_tool_calls(
            first.content.clone(),
            first.tool_calls.clone(),
        ));
        for call in &first.tool_calls {
            let result = self.run_tool(call).await;
            messages.push(LlmMessage::tool_result(call.id.clone(), result.to_string()));
        }

        let second = self
            .model
            .complete(ChatRequest {
                messages,
                tools: Vec::new(),
                temperature,
                max_tokens,
            })
            .await?;
        Ok((second, tool_names))
    }

    /// Asks the model to name a new conversation. Falls back to the start of
    /// the first message when the call fails.
    async fn generate_title(&self, message: &str) -> String {
        let prompt = format!(
            "Generate a short, descriptive title (max {TITLE_MAX_CHARS} characters) for a chat \
conversation that starts with: '{}'",
            truncate_with_suffix(message.trim(), TITLE_PROMPT_MESSAGE_CHARS, "...")
        );
        let request = ChatRequest {
            messages: vec![LlmMessage::system(TITLE_SYSTEM_PROMPT), LlmMessage::user(prompt)],
            tools: Vec::new(),
            temperature: TITLE_TEMPERATURE,
            max_tokens: TITLE_MAX_TOKENS,
        };
        match self.model.complete(request).await {
            Ok(completion) => clean_title(completion.content.as_deref().unwrap_or_default()),
            Err(err) => {
                tracing::warn!("Title generation failed: {}", err);
                fallback_title(message)
            }
        }
    }

    /// Tool failures are reported back to the model instead of failing the turn.
    async fn run_tool(&self, call: &ToolCall) -> Value {
        let name = call.function.name.as_str();
        let arguments = match call.function.arguments.trim() {
            "" => Value::Null,
            raw => match serde_json::from_str::<Value>(raw) {
                Ok(arguments) => arguments,
                Err(err) => {
                    tracing::warn!(function = name, "Model sent malformed tool arguments: {}", err);
                    return json!({ "error": format!("Invalid arguments for {name}: {err}") });
                }
            },
        };

        match self.functions.invoke(name, arguments).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(function = name, "Tool call failed: {}", err);
                json!({ "error": err.to_string() })
            }
        }
    }
}

fn history_message(message: &ChatMessage) -> LlmMessage {
    let role = match message.role {
        MessageRole::User => LlmRole::User,
        MessageRole::Assistant => LlmRole::Assistant,
        MessageRole::System => LlmRole::System,
    };
    LlmMessage::new(role, message.content.clone())
}

/// The analyst instructions sent ahead of every conversation, followed by the
/// session's own prompt when it has one.
pub fn build_system_prompt(today: NaiveDate, session_prompt: Option<&str>) -> String {
    let date = today.format("%Y-%m-%d");
    let year = today.year();
    let mut prompt = format!(
        "You are an eCommerce data analyst for a Shopify store. Today is {date} (year {year}); \
resolve relative periods such as \"last week\" against this date.\n\
\n\
Answer only questions about the store's orders, customers, discounts, Okendo reviews and \
Klaviyo engagement. Politely decline anything else and suggest an analytics question instead.\n\
\n\
Use the provided functions to fetch data. Pass dates as YYYY-MM-DD, keep ratings between 1 \
and 5 and intervals to day, week or month. If a function reports an error, explain what went \
wrong and what the user can try. Never paste raw JSON; summarize the results with tables for \
structured data and bullet points for insights, and close with a concrete follow-up suggestion."
    );
    if let Some(extra) = session_prompt.map(str::trim).filter(|extra| !extra.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }
    prompt
}

fn is_trace_line(line: &str) -> bool {
    DEBUG_LINE.is_match(line) || (line.contains("Talked to") && line.contains("supabase.co"))
}

/// Drops tracing noise the edge functions sometimes leak into model output.
pub fn clean_response(text: &str) -> String {
    let text = text
        .lines()
        .filter(|line| !is_trace_line(line))
        .collect::<Vec<_>>()
        .join("\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Model-suggested title without surrounding quotes, capped at 50 chars.
pub fn clean_title(raw: &str) -> String {
    let title = raw.trim().trim_matches(['"', '\'']).trim();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        truncate_with_suffix(title, TITLE_MAX_CHARS - 3, "...")
    } else {
        title.to_string()
    }
}

pub fn fallback_title(message: &str) -> String {
    ellipsize(message.trim(), FALLBACK_TITLE_CHARS)
}
