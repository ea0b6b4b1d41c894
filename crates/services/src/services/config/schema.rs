use std::{num::NonZeroU32, time::Duration};

use secrecy::SecretString;
use utils_jwt::HmacAlgorithm;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_JWT_EXPIRE_MINUTES: i64 = 30;
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_EDGE_FUNCTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHAT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONTEXT_WINDOW_MESSAGES: u64 = 20;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_REGISTRATIONS_PER_HOUR: u32 = 5;

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub auth: AuthSettings,
    pub openai: OpenAiSettings,
    pub edge_functions: EdgeFunctionSettings,
    pub chat: ChatSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: SecretString,
    pub algorithm: HmacAlgorithm,
    pub expire_minutes: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    /// Registration attempts allowed per client IP and hour.
    pub registrations_per_hour: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: SecretString,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EdgeFunctionSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub timeout: Duration,
}

/// Knobs of the send pipeline that do not depend on any external service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatSettings {
    pub context_window: u64,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW_MESSAGES,
            default_temperature: DEFAULT_TEMPERATURE,
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}
