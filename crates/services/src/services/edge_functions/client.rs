use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use super::{
    EdgeFunctionError, FunctionInvoker,
    catalog::{FunctionSpec, HttpVerb, find},
    validation::validate_arguments,
};
use crate::services::config::EdgeFunctionSettings;

const CLIENT_USER_AGENT: &str = concat!("pulse-chat/", env!("CARGO_PKG_VERSION"));
const NON_JSON_WARNING: &str = "Response was not valid JSON";

/// HTTP client for the edge functions listed in the catalog. One request per
/// call, no retries.
#[derive(Debug, Clone)]
pub struct EdgeFunctionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl EdgeFunctionClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    pub fn from_settings(http: reqwest::Client, settings: &EdgeFunctionSettings) -> Self {
        Self::new(
            http,
            settings.base_url.clone(),
            settings.api_key.clone(),
            settings.timeout,
        )
    }

    pub fn endpoint(&self, spec: &FunctionSpec) -> String {
        format!("{}/{}", self.base_url, spec.slug)
    }

    /// GET functions carry their arguments in the query string, POST
    /// functions in a JSON body.
    pub fn build_request(
        &self,
        spec: &FunctionSpec,
        arguments: &Map<String, Value>,
    ) -> Result<reqwest::Request, EdgeFunctionError> {
        let url = self.endpoint(spec);
        let builder = match spec.verb {
            HttpVerb::Get => self.http.get(url).query(&query_pairs(arguments)),
            HttpVerb::Post => self.http.post(url).json(arguments),
        };
        let key = self.api_key.expose_secret();
        builder
            .bearer_auth(key)
            .header("apikey", key)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.timeout)
            .build()
            .map_err(|err| EdgeFunctionError::Transport {
                function: spec.name.to_string(),
                message: err.to_string(),
            })
    }

    async fn send(
        &self,
        spec: &FunctionSpec,
        request: reqwest::Request,
    ) -> Result<Value, EdgeFunctionError> {
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|err| self.map_transport_error(spec, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.map_transport_error(spec, err))?;

        if !status.is_success() {
            tracing::warn!(
                function = spec.name,
                status = status.as_u16(),
                "Edge function returned an error status"
            );
            return Err(EdgeFunctionError::Status {
                function: spec.name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)
            .unwrap_or_else(|_| json!({ "data": body, "warning": NON_JSON_WARNING })))
    }

    fn map_transport_error(&self, spec: &FunctionSpec, err: reqwest::Error) -> EdgeFunctionError {
        if err.is_timeout() {
            tracing::warn!(function = spec.name, "Edge function timed out");
            EdgeFunctionError::Timeout {
                function: spec.name.to_string(),
                after: self.timeout,
            }
        } else {
            tracing::warn!(function = spec.name, "Edge function request failed: {}", err);
            EdgeFunctionError::Transport {
                function: spec.name.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl FunctionInvoker for EdgeFunctionClient {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, EdgeFunctionError> {
        let spec = find(name).ok_or_else(|| EdgeFunctionError::UnknownFunction(name.to_string()))?;
        let arguments = validate_arguments(spec, arguments)?;
        let request = self.build_request(spec, &arguments)?;

        tracing::info!(function = spec.name, verb = %spec.verb, "Invoking edge function");
        self.send(spec, request).await
    }
}

fn query_pairs(arguments: &Map<String, Value>) -> Vec<(String, String)> {
    arguments
        .iter()
        .map(|(key, value)| (key.clone(), query_value(value)))
        .collect()
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items.iter().map(query_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
