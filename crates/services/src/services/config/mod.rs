use std::{num::NonZeroU32, str::FromStr, time::Duration};

use secrecy::SecretString;
use thiserror::Error;
use utils_jwt::HmacAlgorithm;

mod schema;

pub use schema::*;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Loads `.env` from the working directory if there is one. Variables already
/// present in the environment win.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => tracing::warn!("Failed to load .env file: {}", err),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let port = match env.get("BACKEND_PORT") {
            Some(_) => env.parse_or("BACKEND_PORT", DEFAULT_PORT)?,
            None => env.parse_or("PORT", DEFAULT_PORT)?,
        };

        let algorithm = match env.get("JWT_ALGORITHM") {
            Some(raw) => HmacAlgorithm::from_str(&raw).map_err(|err| ConfigError::Invalid {
                var: "JWT_ALGORITHM",
                reason: err.to_string(),
            })?,
            None => HmacAlgorithm::default(),
        };
        let expire_minutes = env.parse_or("JWT_EXPIRE_MINUTES", DEFAULT_JWT_EXPIRE_MINUTES)?;
        if expire_minutes <= 0 {
            return Err(ConfigError::Invalid {
                var: "JWT_EXPIRE_MINUTES",
                reason: "must be positive".to_string(),
            });
        }

        let default_temperature = env.parse_or("DEFAULT_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&default_temperature) {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_TEMPERATURE",
                reason: "must be between 0.0 and 2.0".to_string(),
            });
        }
        let default_max_tokens = env.parse_or("DEFAULT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        if default_max_tokens == 0 {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_MAX_TOKENS",
                reason: "must be at least 1".to_string(),
            });
        }

        let registrations_per_hour = NonZeroU32::new(env.parse_or(
            "REGISTRATION_ATTEMPTS_PER_HOUR",
            DEFAULT_REGISTRATIONS_PER_HOUR,
        )?)
        .ok_or_else(|| ConfigError::Invalid {
            var: "REGISTRATION_ATTEMPTS_PER_HOUR",
            reason: "must be at least 1".to_string(),
        })?;

        let edge_key = env
            .get("SUPABASE_EDGE_FUNCTION_KEY")
            .or_else(|| env.get("SUPABASE_ANON_KEY"))
            .ok_or(ConfigError::Missing("SUPABASE_EDGE_FUNCTION_KEY"))?;

        Ok(Settings {
            server: ServerSettings {
                host: env.get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
            },
            database: DatabaseSettings {
                url: SecretString::from(env.require("DATABASE_URL")?),
                max_connections: env
                    .parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            },
            jwt: JwtSettings {
                secret: SecretString::from(env.require("JWT_SECRET_KEY")?),
                algorithm,
                expire_minutes,
            },
            auth: AuthSettings {
                registrations_per_hour,
            },
            openai: OpenAiSettings {
                api_key: SecretString::from(env.require("OPENAI_API_KEY")?),
                api_base: env
                    .get("OPENAI_API_BASE")
                    .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string()),
                model: env
                    .get("OPENAI_MODEL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout: Duration::from_secs(
                    env.parse_or("CHAT_TIMEOUT_SECS", DEFAULT_CHAT_TIMEOUT_SECS)?,
                ),
            },
            edge_functions: EdgeFunctionSettings {
                base_url: env
                    .require("SUPABASE_EDGE_FUNCTION_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                api_key: SecretString::from(edge_key),
                timeout: Duration::from_secs(env.parse_or(
                    "EDGE_FUNCTION_TIMEOUT_SECS",
                    DEFAULT_EDGE_FUNCTION_TIMEOUT_SECS,
                )?),
            },
            chat: ChatSettings {
                context_window: env
                    .parse_or("CONTEXT_WINDOW_MESSAGES", DEFAULT_CONTEXT_WINDOW_MESSAGES)?,
                default_temperature,
                default_max_tokens,
            },
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn require(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map_err(|err| ConfigError::Invalid {
                var: key,
                reason: format!("{raw:?}: {err}"),
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "sqlite::memory:"),
            ("JWT_SECRET_KEY", "secret"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SUPABASE_EDGE_FUNCTION_URL", "https://proj.supabase.co/functions/v1/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Settings, ConfigError> {
        Settings::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let settings = load(&required()).unwrap();

        assert_eq!(settings.server.host, DEFAULT_HOST);
        assert_eq!(settings.server.port, DEFAULT_PORT);
        assert_eq!(settings.jwt.algorithm, HmacAlgorithm::Hs256);
        assert_eq!(settings.jwt.expire_minutes, 30);
        assert_eq!(settings.openai.model, "gpt-4o");
        assert_eq!(settings.openai.api_base, DEFAULT_OPENAI_API_BASE);
        assert_eq!(settings.openai.timeout, Duration::from_secs(60));
        assert_eq!(
            settings.edge_functions.base_url,
            "https://proj.supabase.co/functions/v1"
        );
        assert_eq!(settings.edge_functions.api_key.expose_secret(), "anon");
        assert_eq!(settings.edge_functions.timeout, Duration::from_secs(30));
        assert_eq!(settings.chat, ChatSettings::default());
        assert_eq!(settings.auth.registrations_per_hour.get(), 5);
    }

    #[test]
    fn backend_port_wins_over_port() {
        let mut vars = required();
        vars.insert("PORT", "9000");
        vars.insert("BACKEND_PORT", "9100");
        assert_eq!(load(&vars).unwrap().server.port, 9100);

        vars.remove("BACKEND_PORT");
        assert_eq!(load(&vars).unwrap().server.port, 9000);
    }

    #[test]
    fn dedicated_edge_key_wins_over_anon_key() {
        let mut vars = required();
        vars.insert("SUPABASE_EDGE_FUNCTION_KEY", "service");
        let settings = load(&vars).unwrap();
        assert_eq!(settings.edge_functions.api_key.expose_secret(), "service");
    }

    #[test]
    fn missing_required_var_is_named() {
        let mut vars = required();
        vars.remove("JWT_SECRET_KEY");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("JWT_SECRET_KEY"))));

        let mut vars = required();
        vars.insert("DATABASE_URL", "   ");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("DATABASE_URL"))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("PORT", "eighty"),
            ("JWT_ALGORITHM", "RS256"),
            ("JWT_EXPIRE_MINUTES", "0"),
            ("DEFAULT_TEMPERATURE", "2.5"),
            ("DEFAULT_MAX_TOKENS", "0"),
            ("CONTEXT_WINDOW_MESSAGES", "-1"),
            ("REGISTRATION_ATTEMPTS_PER_HOUR", "0"),
        ] {
            let mut vars = required();
            vars.insert(key, value);
            match load(&vars) {
                Err(ConfigError::Invalid { var, .. }) => assert_eq!(var, key),
                other => panic!("expected invalid {key}, got {other:?}"),
            }
        }
    }
}
