//! JSON-RPC 2.0 message types of the node service.
//!
//! The node serves `POST /rpc` with these envelopes and `GET /health`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names served by a node.
pub mod methods {
    pub const GET_STATUS: &str = "get_status";
    pub const INGEST_DATA: &str = "ingest_data";
    pub const SEARCH_AND_FETCH_ITEMS: &str = "search_and_fetch_items";
    pub const HEALTH_CHECK: &str = "health_check";
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(Value::Number(id.into())),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req = RpcRequest::new(methods::GET_STATUS, json!({}), 7);
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "get_status");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_error_response_omits_result() {
        let resp = RpcResponse::error(Some(json!(1)), -32601, "Method not found".into());
        let json = serde_json::to_string(&resp).unwrap();

        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"result\""));

        let parsed: RpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error.unwrap().code, -32601);
    }
}
