use serde::{Deserialize, Serialize};

use gemgrid_engine::GameError;

/// Incoming RPC request: `{ method, params?, id? }`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// RPC response: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Error object with a stable string code clients can branch on.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(
        id: Option<serde_json::Value>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Map an engine failure to its wire code. Internal detail (store
    /// failures) is logged server-side, not leaked to clients.
    pub fn game_error(id: Option<serde_json::Value>, err: &GameError) -> Self {
        let message = match err {
            GameError::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self::error(id, err.code(), message)
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, "METHOD_NOT_FOUND", format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, "INVALID_PARAMS", msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, "PARSE_ERROR", "Parse error")
    }
}

/// Extract a required string param.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract a required coordinate (u8-sized non-negative integer).
pub fn require_u8(params: &serde_json::Value, key: &str) -> Result<u8, String> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| format!("Missing or invalid parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gemgrid_store::StoreError;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"game.join","params":{"gameId":"game_123","token":"p1_abc"},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "game.join");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn success_response_serializes_without_error() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn game_error_carries_wire_code() {
        let err = GameError::NotYourTurn;
        let resp = RpcResponse::game_error(Some(serde_json::json!(2)), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "NOT_YOUR_TURN");
    }

    #[test]
    fn store_failure_is_masked_as_unknown_error() {
        let err = GameError::Store(StoreError::Database("disk full".into()));
        let resp = RpcResponse::game_error(None, &err);
        let error = resp.error.unwrap();
        assert_eq!(error.code, "UNKNOWN_ERROR");
        assert!(!error.message.contains("disk"));
    }

    #[test]
    fn missing_cell_is_reported_as_game_not_found() {
        let err = GameError::CellNotFound { x: 1, y: 1 };
        let resp = RpcResponse::game_error(None, &err);
        assert_eq!(resp.error.unwrap().code, "GAME_NOT_FOUND");
    }

    #[test]
    fn require_u8_bounds() {
        let params = serde_json::json!({"x": 3, "big": 300, "neg": -1, "s": "3"});
        assert_eq!(require_u8(&params, "x").unwrap(), 3);
        assert!(require_u8(&params, "big").is_err());
        assert!(require_u8(&params, "neg").is_err());
        assert!(require_u8(&params, "s").is_err());
        assert!(require_u8(&params, "missing").is_err());
    }

    #[test]
    fn require_str_extracts() {
        let params = serde_json::json!({"token": "p1_abc", "x": 5});
        assert_eq!(require_str(&params, "token").unwrap(), "p1_abc");
        assert!(require_str(&params, "x").is_err());
        assert!(require_str(&params, "missing").is_err());
        assert_eq!(optional_str(&params, "token"), Some("p1_abc"));
        assert_eq!(optional_str(&params, "missing"), None);
    }
}
