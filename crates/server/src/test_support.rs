use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use db::DBService;
use sea_orm::Database;
use serde_json::{Value, json};
use services::services::{
    config::Settings,
    edge_functions::{EdgeFunctionError, FunctionInvoker},
    llm::{ChatModel, ChatRequest, Completion, LlmError},
};
use tower::ServiceExt;

use crate::DeploymentImpl;

/// Model double that answers from a fixed script.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
}

impl ScriptedModel {
    pub fn push(&self, reply: Result<Completion, LlmError>) {
        self.replies.lock().unwrap().push_back(reply);
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _request: ChatRequest) -> Result<Completion, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string())))
    }
}

pub fn text_completion(content: &str) -> Result<Completion, LlmError> {
    Ok(Completion {
        content: Some(content.to_string()),
        tool_calls: Vec::new(),
        finish_reason: Some("stop".to_string()),
        model: "gpt-4o".to_string(),
    })
}

/// Edge-function double that records every call and echoes its arguments.
#[derive(Default)]
pub struct RecordingFunctions {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingFunctions {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionInvoker for RecordingFunctions {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, EdgeFunctionError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));
        Ok(json!({ "function": name, "arguments": arguments }))
    }
}

pub struct TestApp {
    pub router: Router,
    pub model: Arc<ScriptedModel>,
    pub functions: Arc<RecordingFunctions>,
}

pub fn test_settings() -> Settings {
    Settings::from_lookup(|key| {
        let value = match key {
            "DATABASE_URL" => "sqlite::memory:",
            "JWT_SECRET_KEY" => "test-secret",
            "OPENAI_API_KEY" => "sk-test",
            "SUPABASE_EDGE_FUNCTION_URL" => "http://127.0.0.1:9",
            "SUPABASE_EDGE_FUNCTION_KEY" => "edge-key",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

/// Full router over an in-memory database with the outbound clients faked.
pub async fn test_app() -> TestApp {
    let pool = Database::connect("sqlite::memory:").await.unwrap();
    let db = DBService::from_connection(pool).await.unwrap();
    let model = Arc::new(ScriptedModel::default());
    let functions = Arc::new(RecordingFunctions::default());
    let deployment =
        DeploymentImpl::from_parts(test_settings(), db, model.clone(), functions.clone());

    TestApp {
        router: crate::http::router(deployment),
        model,
        functions,
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Registers `email` and returns a bearer token for it.
    pub async fn login_as(&self, email: &str) -> String {
        let credentials = json!({ "email": email, "password": "correct horse" });
        let (status, _) = self
            .request(Method::POST, "/api/auth/register", None, Some(credentials.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = self
            .request(Method::POST, "/api/auth/login", None, Some(credentials))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["access_token"].as_str().unwrap().to_string()
    }
}
