use serde::{Deserialize, Serialize};

use tabtrace_core::TabId;

/// JSON-RPC style request from a bridge or consumer client.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

/// Response wire format: `{ id, success, result?, error?: { code, message } }`.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: Option<serde_json::Value>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

// Standard JSON-RPC error codes (used internally for routing)
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const HOST_UNAVAILABLE: i32 = -32001;
pub const STORE_ERROR: i32 = -32002;

/// Map numeric error codes to the string codes sent on the wire.
pub fn error_code_to_string(code: i32) -> &'static str {
    match code {
        PARSE_ERROR => "PARSE_ERROR",
        INVALID_REQUEST => "INVALID_REQUEST",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        INVALID_PARAMS => "INVALID_PARAMS",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        HOST_UNAVAILABLE => "HOST_UNAVAILABLE",
        STORE_ERROR => "STORE_ERROR",
        _ => "UNKNOWN_ERROR",
    }
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

    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(RpcError {
                code: error_code_to_string(code).to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: Option<serde_json::Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    pub fn internal_error(id: Option<serde_json::Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    pub fn parse_error() -> Self {
        Self::error(None, PARSE_ERROR, "Parse error")
    }
}

/// Extract the required `tabId` param. Accepts a number or a numeric string.
pub fn require_tab_id(params: &serde_json::Value) -> Result<TabId, String> {
    let value = params
        .get("tabId")
        .ok_or_else(|| "Missing required parameter: tabId".to_string())?;
    let tab_id = match value {
        serde_json::Value::Number(n) => n.as_i64().map(TabId::new),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    };
    tab_id.ok_or_else(|| format!("Invalid tabId: {value}"))
}

/// Extract a required string param from the RPC params object.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Deserialize the whole params object into `T`.
pub fn parse_params<T: serde::de::DeserializeOwned>(params: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(params.clone()).map_err(|e| format!("Invalid params: {e}"))
}

/// Deserialize a required nested param into `T`.
pub fn require_value<T: serde::de::DeserializeOwned>(
    params: &serde_json::Value,
    key: &str,
) -> Result<T, String> {
    let value = params
        .get(key)
        .ok_or_else(|| format!("Missing required parameter: {key}"))?;
    serde_json::from_value(value.clone()).map_err(|e| format!("Invalid {key}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabtrace_core::host::NavigationStart;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"method":"getIPData","params":{"tabId":7},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "getIPData");
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn success_response_serializes() {
        let resp = RpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"success\":true"));
    }

    #[test]
    fn error_response_has_string_code() {
        let resp = RpcResponse::error(Some(serde_json::json!(1)), HOST_UNAVAILABLE, "no bridge");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "HOST_UNAVAILABLE");
        assert_eq!(json["error"]["message"], "no bridge");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn error_code_maps_to_string() {
        assert_eq!(error_code_to_string(PARSE_ERROR), "PARSE_ERROR");
        assert_eq!(error_code_to_string(METHOD_NOT_FOUND), "METHOD_NOT_FOUND");
        assert_eq!(error_code_to_string(STORE_ERROR), "STORE_ERROR");
        assert_eq!(error_code_to_string(-99999), "UNKNOWN_ERROR");
    }

    #[test]
    fn tab_id_accepts_number_or_string() {
        assert_eq!(require_tab_id(&serde_json::json!({"tabId": 7})).unwrap(), TabId::new(7));
        assert_eq!(require_tab_id(&serde_json::json!({"tabId": "12"})).unwrap(), TabId::new(12));
        assert!(require_tab_id(&serde_json::json!({})).is_err());
        assert!(require_tab_id(&serde_json::json!({"tabId": true})).is_err());
    }

    #[test]
    fn typed_params() {
        let params = serde_json::json!({"tabId": 7, "frameId": 0, "url": "https://a.test/"});
        let nav: NavigationStart = parse_params(&params).unwrap();
        assert!(nav.frame_id.is_top_level());
        assert!(parse_params::<NavigationStart>(&serde_json::json!({"tabId": 7})).is_err());

        let url: String = require_value(&params, "url").unwrap();
        assert_eq!(url, "https://a.test/");
        assert_eq!(optional_str(&params, "missing"), None);
        assert_eq!(require_str(&params, "url").unwrap(), "https://a.test/");
    }

    #[test]
    fn parse_error_has_no_id() {
        let resp = RpcResponse::parse_error();
        assert!(resp.id.is_none());
        assert_eq!(resp.error.as_ref().unwrap().code, "PARSE_ERROR");
    }
}
