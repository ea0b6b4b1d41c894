use std::sync::Arc;

use async_trait::async_trait;
use db::{DBService, DbErr};
use services::services::{
    chat::ChatService,
    config::{ConfigError, Settings},
    edge_functions::FunctionInvoker,
    rate_limit::RegistrationLimiter,
};
use thiserror::Error;
use utils_jwt::JwtService;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Everything a request handler needs, shared across the whole process.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn settings(&self) -> &Settings;

    fn db(&self) -> &DBService;

    fn jwt(&self) -> &JwtService;

    fn chat(&self) -> &ChatService;

    fn functions(&self) -> &Arc<dyn FunctionInvoker>;

    fn registration_limiter(&self) -> &RegistrationLimiter;
}
