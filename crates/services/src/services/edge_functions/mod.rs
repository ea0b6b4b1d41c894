use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use thiserror::Error;

pub mod catalog;
mod client;
mod validation;

pub use catalog::{CATALOG, FunctionSpec, HttpVerb, ParamKind, ParamSpec, find};
pub use client::EdgeFunctionClient;
pub use validation::validate_arguments;

#[derive(Debug, Error)]
pub enum EdgeFunctionError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Invalid arguments for {function}: {message}")]
    InvalidArguments { function: String, message: String },
    #[error("Missing required parameter '{parameter}' for {function}")]
    MissingParameter { function: String, parameter: String },
    #[error("Invalid parameter '{parameter}' for {function}: {reason}")]
    InvalidParameter {
        function: String,
        parameter: String,
        reason: String,
    },
    #[error("{function} returned HTTP {status}: {body}")]
    Status {
        function: String,
        status: u16,
        body: String,
    },
    #[error("{function} timed out after {}s", .after.as_secs())]
    Timeout { function: String, after: Duration },
    #[error("{function} request failed: {message}")]
    Transport { function: String, message: String },
}

impl EdgeFunctionError {
    /// True for faults detected before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EdgeFunctionError::InvalidArguments { .. }
                | EdgeFunctionError::MissingParameter { .. }
                | EdgeFunctionError::InvalidParameter { .. }
        )
    }
}

/// Dispatches a named function call. Implemented by [`EdgeFunctionClient`].
#[async_trait]
pub trait FunctionInvoker: Send + Sync {
    async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, EdgeFunctionError>;
}

/// Renders the catalog as OpenAI `tools` entries.
pub fn openai_tools() -> Vec<Value> {
    CATALOG.iter().map(tool_definition).collect()
}

fn tool_definition(spec: &FunctionSpec) -> Value {
    let mut properties = Map::new();
    for param in spec.params {
        properties.insert(param.name.to_string(), param_schema(param));
    }
    let required: Vec<&str> = spec
        .params
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name)
        .collect();

    let mut description = spec.description.to_string();
    if !spec.at_least_one_of.is_empty() {
        description.push_str(&format!(
            ". Provide at least one of: {}",
            spec.at_least_one_of.join(", ")
        ));
    }

    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            },
        },
    })
}

fn param_schema(param: &ParamSpec) -> Value {
    let mut schema = match param.kind {
        ParamKind::String => json!({"type": "string"}),
        ParamKind::Enum { values } => json!({"type": "string", "enum": values}),
        ParamKind::Date => json!({"type": "string", "format": "date"}),
        ParamKind::Integer { min, max } => {
            let mut schema = json!({"type": "integer"});
            if let Some(min) = min {
                schema["minimum"] = json!(min);
            }
            if let Some(max) = max {
                schema["maximum"] = json!(max);
            }
            schema
        }
        ParamKind::StringList => json!({"type": "array", "items": {"type": "string"}}),
    };
    schema["description"] = json!(param.description);
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_cover_the_whole_catalog() {
        let tools = openai_tools();
        assert_eq!(tools.len(), CATALOG.len());
        assert!(tools.iter().all(|tool| tool["type"] == "function"));
    }

    #[test]
    fn tool_schema_reflects_param_kinds() {
        let tools = openai_tools();
        let tool = tools
            .iter()
            .find(|tool| tool["function"]["name"] == "getOrdersOverTime")
            .unwrap();
        let parameters = &tool["function"]["parameters"];

        assert_eq!(
            parameters["required"],
            json!(["interval", "start_date", "end_date"])
        );
        assert_eq!(
            parameters["properties"]["interval"]["enum"],
            json!(["day", "week", "month"])
        );
        assert_eq!(parameters["properties"]["start_date"]["format"], "date");
        assert_eq!(parameters["properties"]["currency"]["type"], "string");
        assert_eq!(parameters["additionalProperties"], false);
    }

    #[test]
    fn integer_bounds_and_lists_are_described() {
        let rating = tool_definition(find("getReviewsByRatingRange").unwrap());
        let min_rating = &rating["function"]["parameters"]["properties"]["min_rating"];
        assert_eq!(min_rating["minimum"], 1);
        assert_eq!(min_rating["maximum"], 5);

        let repeat = tool_definition(find("getTopCustomersRepeatFrequency").unwrap());
        let emails = &repeat["function"]["parameters"]["properties"]["customer_emails"];
        assert_eq!(emails["items"]["type"], "string");
    }

    #[test]
    fn at_least_one_group_is_mentioned() {
        let tool = tool_definition(find("getCustomerOrders").unwrap());
        let description = tool["function"]["description"].as_str().unwrap();
        assert!(description.contains("email, customer_id"));
        assert_eq!(tool["function"]["parameters"]["required"], json!([]));
    }

    #[test]
    fn validation_faults_are_classified() {
        assert!(
            EdgeFunctionError::MissingParameter {
                function: "f".into(),
                parameter: "p".into()
            }
            .is_validation()
        );
        assert!(!EdgeFunctionError::UnknownFunction("f".into()).is_validation());
        assert!(
            !EdgeFunctionError::Status {
                function: "f".into(),
                status: 500,
                body: String::new()
            }
            .is_validation()
        );
    }
}
