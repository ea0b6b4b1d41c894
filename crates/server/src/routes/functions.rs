use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use deployment::Deployment;
use serde::Serialize;
use serde_json::Value;
use services::services::edge_functions::{
    CATALOG, EdgeFunctionError, FunctionSpec, find, validate_arguments,
};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Serialize)]
pub struct FunctionResult {
    pub function: &'static str,
    pub result: Value,
}

pub async fn list_functions() -> ResponseJson<ApiResponse<&'static [FunctionSpec]>> {
    ResponseJson(ApiResponse::success(CATALOG))
}

/// An empty body is the same as `{}`.
fn parse_arguments(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::BadRequest(format!("Invalid JSON arguments: {err}")))
}

pub async fn invoke_function(
    State(deployment): State<DeploymentImpl>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<ResponseJson<ApiResponse<FunctionResult>>, ApiError> {
    let spec = find(&name).ok_or(EdgeFunctionError::UnknownFunction(name))?;
    let arguments = validate_arguments(spec, parse_arguments(&body)?)?;

    let result = deployment
        .functions()
        .invoke(spec.name, Value::Object(arguments))
        .await?;
    Ok(ResponseJson(ApiResponse::success(FunctionResult {
        function: spec.name,
        result,
    })))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new()
        .route("/functions", get(list_functions))
        .route("/functions/{name}", post(invoke_function))
}
