use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use secrecy::ExposeSecret;
use services::services::{
    chat::ChatService,
    config::Settings,
    edge_functions::{EdgeFunctionClient, FunctionInvoker},
    llm::{ChatModel, OpenAiClient},
    rate_limit::RegistrationLimiter,
};
use utils_jwt::JwtService;

const HTTP_USER_AGENT: &str = concat!("pulse-chat/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct LocalDeployment {
    settings: Arc<Settings>,
    db: DBService,
    jwt: JwtService,
    chat: ChatService,
    functions: Arc<dyn FunctionInvoker>,
    registration_limiter: RegistrationLimiter,
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let settings = Settings::from_env()?;
        Self::from_settings(settings).await
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    fn chat(&self) -> &ChatService {
        &self.chat
    }

    fn functions(&self) -> &Arc<dyn FunctionInvoker> {
        &self.functions
    }

    fn registration_limiter(&self) -> &RegistrationLimiter {
        &self.registration_limiter
    }
}

impl LocalDeployment {
    /// Connects to the database, applies migrations and wires the outbound
    /// clients. One `reqwest::Client` is shared by both upstreams.
    pub async fn from_settings(settings: Settings) -> Result<Self, DeploymentError> {
        let db = DBService::new(
            settings.database.url.expose_secret(),
            settings.database.max_connections,
        )
        .await?;

        let http = reqwest::Client::builder()
            .user_agent(HTTP_USER_AGENT)
            .build()
            .map_err(|err| DeploymentError::HttpClient(err.to_string()))?;
        let functions: Arc<dyn FunctionInvoker> = Arc::new(EdgeFunctionClient::from_settings(
            http.clone(),
            &settings.edge_functions,
        ));
        let model: Arc<dyn ChatModel> =
            Arc::new(OpenAiClient::from_settings(http, &settings.openai));

        tracing::info!(
            model = %settings.openai.model,
            edge_functions = %settings.edge_functions.base_url,
            "Deployment initialized"
        );
        Ok(Self::from_parts(settings, db, model, functions))
    }

    /// Assembles a deployment from already-built parts.
    pub fn from_parts(
        settings: Settings,
        db: DBService,
        model: Arc<dyn ChatModel>,
        functions: Arc<dyn FunctionInvoker>,
    ) -> Self {
        let jwt = JwtService::new(
            settings.jwt.secret.expose_secret().as_bytes(),
            settings.jwt.algorithm,
            chrono::Duration::minutes(settings.jwt.expire_minutes),
        );
        let chat = ChatService::new(db.pool.clone(), model, functions.clone(), settings.chat);
        let registration_limiter =
            RegistrationLimiter::per_hour(settings.auth.registrations_per_hour);

        Self {
            settings: Arc::new(settings),
            db,
            jwt,
            chat,
            functions,
            registration_limiter,
        }
    }
}
