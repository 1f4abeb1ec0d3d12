//! JSON-RPC request handling for the node service.

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use catalog_search::models::{IngestRequest, SearchRequest};
use catalog_search::remote::{methods, RpcRequest, RpcResponse};
use catalog_search::SearchError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

const METHOD_NOT_FOUND: i32 = -32601;

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract an optional unsigned parameter, supporting both snake_case and camelCase.
///
/// Numbers sent as strings are accepted.
pub(crate) fn get_u64_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> catalog_search::Result<Option<u64>> {
    let Some(value) = params.get(snake).or_else(|| params.get(camel)) else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_u64().map(Some).ok_or_else(|| invalid(snake, value)),
        Value::String(s) => s.trim().parse().map(Some).map_err(|_| invalid(snake, value)),
        _ => Err(invalid(snake, value)),
    }
}

fn invalid(name: &str, value: &Value) -> SearchError {
    SearchError::InvalidParams {
        message: format!("Parameter {} must be a non-negative integer, got {}", name, value),
    }
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RpcRequest>,
) -> impl IntoResponse {
    let method = request.method.as_str();
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id;

    debug!("RPC call: {}({:?})", method, params);

    let response = match dispatch_method(&state, method, &params).await {
        Some(Ok(value)) => RpcResponse::success(id, value),
        Some(Err(e)) => {
            error!(node_id = %state.node.node_id(), "RPC error for {}: {}", method, e);
            RpcResponse::error(id, e.to_rpc_error_code(), e.to_string())
        }
        None => {
            warn!("Method not found: {}", method);
            RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
        }
    };
    (StatusCode::OK, Json(response))
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call; `None` for an unknown method.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> Option<catalog_search::Result<Value>> {
    let result = match method {
        methods::HEALTH_CHECK => Ok(json!({"status": "ok"})),
        methods::GET_STATUS => get_status(state).await,
        methods::INGEST_DATA => ingest_data(state, params).await,
        methods::SEARCH_AND_FETCH_ITEMS => search_and_fetch_items(state, params).await,
        _ => return None,
    };
    Some(result)
}

async fn get_status(state: &AppState) -> catalog_search::Result<Value> {
    let response = state.node.get_status().await;
    Ok(serde_json::to_value(response)?)
}

async fn ingest_data(state: &AppState, params: &Value) -> catalog_search::Result<Value> {
    let request = IngestRequest {
        start_index: get_u64_param(params, "start_index", "startIndex")?.unwrap_or(0),
        limit: get_u64_param(params, "limit", "limit")?.unwrap_or(0),
        category_filter: get_str_param(params, "category_filter", "categoryFilter")
            .unwrap_or_default()
            .to_string(),
    };
    let response = state.node.ingest_data(request).await;
    Ok(serde_json::to_value(response)?)
}

async fn search_and_fetch_items(state: &AppState, params: &Value) -> catalog_search::Result<Value> {
    let limit = get_u64_param(params, "limit", "limit")?.unwrap_or(0);
    let request = SearchRequest {
        query: get_str_param(params, "query", "query")
            .unwrap_or_default()
            .to_string(),
        limit: u32::try_from(limit).unwrap_or(u32::MAX),
    };
    let response = state.node.search_and_fetch_items(request).await;
    Ok(serde_json::to_value(response)?)
}

// ============================================================================
// Tests
// ============================================================================
