//! RPC method handlers: consumer messages and host bridge events.

use std::sync::Arc;

use serde_json::json;

use tabtrace_core::host::{NavigationStart, NetworkCompletion, TabRemoved};
use tabtrace_core::NavigationTiming;
use tabtrace_engine::{BadgeStyle, EngineError, ObservationService, StartOutcome};

use crate::client::ClientRegistry;
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub service: Arc<ObservationService>,
    pub clients: Arc<ClientRegistry>,
}

impl HandlerState {
    pub fn new(service: Arc<ObservationService>, clients: Arc<ClientRegistry>) -> Self {
        Self { service, clients }
    }
}

/// Dispatch an RPC method to the appropriate handler.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        // Consumer
        "startListening" => start_listening(state, params, id),
        "stopListening" => stop_listening(state, params, id),
        "getIPData" => get_ip_data(state, params, id).await,
        "savePerformanceData" => save_performance_data(state, params, id).await,
        "getPerformanceData" => get_performance_data(state, params, id).await,
        "submitTiming" => submit_timing(state, params, id).await,
        "getTabPhase" => get_tab_phase(state, params, id),
        "getStats" => get_stats(state, id).await,

        // Host bridge
        "webRequest.completed" => web_request_completed(state, params, id),
        "webNavigation.beforeNavigate" => before_navigate(state, params, id),
        "tabs.removed" => tab_removed(state, params, id).await,

        // System
        "system.ping" | "health" => health(state, id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

fn engine_error(id: Option<serde_json::Value>, error: &EngineError) -> RpcResponse {
    let code = match error {
        EngineError::Host(_) => rpc::HOST_UNAVAILABLE,
        EngineError::Store(_) | EngineError::StoreUnavailable => rpc::STORE_ERROR,
        _ => rpc::INTERNAL_ERROR,
    };
    RpcResponse::error(id, code, error.to_string())
}

macro_rules! tab_param {
    ($params:expr, $id:expr) => {
        match rpc::require_tab_id($params) {
            Ok(tab_id) => tab_id,
            Err(msg) => return RpcResponse::invalid_params($id, msg),
        }
    };
}

// ── Consumer ────────────────────────────────────────────────────────────

fn start_listening(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    match state.service.start_listening(tab_id) {
        Ok(outcome) => RpcResponse::success(
            id,
            json!({ "started": matches!(outcome, StartOutcome::Started(_)) }),
        ),
        Err(e) => engine_error(id, &e),
    }
}

fn stop_listening(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    let stopped = state.service.stop_listening(tab_id);
    RpcResponse::success(id, json!({ "stopped": stopped }))
}

/// Always answers with a mapping; a storage failure yields `{}`.
async fn get_ip_data(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    let ips = state.service.get_ip_data(tab_id).await.unwrap_or_else(|e| {
        tracing::warn!(%tab_id, error = %e, "ip data read failed");
        Default::default()
    });
    RpcResponse::success(id, json!(ips))
}

async fn save_performance_data(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    let time = match rpc::require_str(params, "time") {
        Ok(time) => time,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let timing: NavigationTiming = match rpc::require_value(params, "timing") {
        Ok(timing) => timing,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };

    match state.service.save_performance_data(tab_id, time, timing).await {
        Ok(_) => RpcResponse::success(id, json!({ "success": true })),
        Err(e) => RpcResponse::success(id, json!({ "success": false, "error": e.to_string() })),
    }
}

async fn get_performance_data(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    match state.service.get_performance_data(tab_id).await {
        Ok(record) => RpcResponse::success(id, json!(record)),
        Err(e) => engine_error(id, &e),
    }
}

async fn submit_timing(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    let timing: NavigationTiming = match rpc::require_value(params, "timing") {
        Ok(timing) => timing,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let style = match params.get("style") {
        None | Some(serde_json::Value::Null) => None,
        Some(_) => match rpc::require_value::<BadgeStyle>(params, "style") {
            Ok(style) => Some(style),
            Err(msg) => return RpcResponse::invalid_params(id, msg),
        },
    };

    match state.service.submit_timing(tab_id, timing, style).await {
        Ok(submission) => RpcResponse::success(
            id,
            json!({ "success": true, "time": submission.time }),
        ),
        Err(e) if e.is_retryable() => {
            RpcResponse::success(id, json!({ "success": false, "retry": true }))
        }
        Err(e) => engine_error(id, &e),
    }
}

fn get_tab_phase(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let tab_id = tab_param!(params, id);
    let phase = state.service.tab_phase(tab_id);
    RpcResponse::success(id, json!({ "phase": phase }))
}

async fn get_stats(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.service.stats().await {
        Ok(stats) => RpcResponse::success(id, json!(stats)),
        Err(e) => engine_error(id, &e),
    }
}

// ── Host bridge ─────────────────────────────────────────────────────────

fn web_request_completed(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let event: NetworkCompletion = match rpc::parse_params(params) {
        Ok(event) => event,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let outcome = state.service.on_network_completed(&event);
    RpcResponse::success(id, json!({ "outcome": outcome }))
}

fn before_navigate(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let event: NavigationStart = match rpc::parse_params(params) {
        Ok(event) => event,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    match state.service.on_before_navigate(&event) {
        Ok(observing) => RpcResponse::success(id, json!({ "observing": observing })),
        Err(e) => engine_error(id, &e),
    }
}

async fn tab_removed(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let event: TabRemoved = match rpc::parse_params(params) {
        Ok(event) => event,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let eviction = state.service.on_tab_removed(event.tab_id).await;
    RpcResponse::success(
        id,
        json!({
            "stopped": eviction.stopped,
            "evicted": eviction.evicted,
            "durableFacts": eviction.durable.map(|d| d.facts),
            "durableRecords": eviction.durable.map(|d| d.records),
        }),
    )
}

// ── System ──────────────────────────────────────────────────────────────

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let mirror = state.service.mirror();
    let store_ok = mirror.is_ready();

    RpcResponse::success(
        id,
        json!({
            "status": if store_ok { "healthy" } else { "degraded" },
            "components": {
                "store": mirror.status(),
                "clients": state.clients.count(),
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_channel::HostChannel;
    use tabtrace_engine::{ServiceConfig, StoreMirror};

    struct Setup {
        state: Arc<HandlerState>,
        bridge: tokio::sync::mpsc::Receiver<String>,
    }

    /// Handler state wired to a real host channel with one bridge client.
    async fn setup() -> Setup {
        let clients = Arc::new(ClientRegistry::new(64));
        let (_bridge_id, bridge) = clients.register();
        let host = Arc::new(HostChannel::new(clients.clone()));
        let mirror = StoreMirror::in_memory();
        mirror.flush().await;
        let service = Arc::new(ObservationService::new(
            ServiceConfig::default(),
            host.clone(),
            host,
            mirror,
        ));
        Setup {
            state: Arc::new(HandlerState::new(service, clients)),
            bridge,
        }
    }

    async fn call(state: &Arc<HandlerState>, method: &str, params: serde_json::Value) -> RpcResponse {
        dispatch(state, method, &params, Some(json!(1))).await
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            frames.push(serde_json::from_str(&raw).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn health_check() {
        let s = setup().await;
        let resp = call(&s.state, "health", json!({})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "healthy");
        assert_eq!(result["components"]["clients"], 1);
    }

    #[tokio::test]
    async fn unknown_method() {
        let s = setup().await;
        let resp = call(&s.state, "tabs.explode", json!({})).await;
        assert_eq!(resp.error.unwrap().code, "METHOD_NOT_FOUND");
    }

    #[tokio::test]
    async fn missing_tab_id_is_invalid() {
        let s = setup().await;
        let resp = call(&s.state, "getIPData", json!({})).await;
        assert_eq!(resp.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn navigation_and_capture_flow() {
        let mut s = setup().await;
        let resp = call(
            &s.state,
            "webNavigation.beforeNavigate",
            json!({"tabId": 7, "frameId": 0, "url": "https://a.test/"}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["observing"], true);

        let frames = drain(&mut s.bridge);
        assert_eq!(frames[0]["method"], "listener.add");
        assert_eq!(frames[0]["params"]["tabId"], 7);

        let resp = call(
            &s.state,
            "webRequest.completed",
            json!({"url": "https://a.test/", "ip": "1.2.3.4", "tabId": 7}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["outcome"], "recorded");

        let resp = call(&s.state, "getIPData", json!({"tabId": 7})).await;
        assert_eq!(resp.result.unwrap()["https://a.test/"], "1.2.3.4");

        let resp = call(&s.state, "getTabPhase", json!({"tabId": 7})).await;
        assert_eq!(resp.result.unwrap()["phase"], "observing");
    }

    #[tokio::test]
    async fn submit_timing_retry_then_success() {
        let mut s = setup().await;
        call(&s.state, "startListening", json!({"tabId": 7})).await;
        call(
            &s.state,
            "webRequest.completed",
            json!({"url": "https://a.test/", "ip": "1.2.3.4", "tabId": 7}),
        )
        .await;

        let pending = call(
            &s.state,
            "submitTiming",
            json!({"tabId": 7, "timing": {"name": "https://a.test/", "duration": 0}}),
        )
        .await;
        assert_eq!(pending.result.unwrap()["retry"], true);

        let done = call(
            &s.state,
            "submitTiming",
            json!({"tabId": 7, "timing": {"name": "https://a.test/", "duration": 120}}),
        )
        .await;
        let result = done.result.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["time"], "0.12");

        let methods: Vec<String> = drain(&mut s.bridge)
            .into_iter()
            .map(|f| f["method"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            methods,
            vec!["listener.add", "listener.remove", "badge.setText", "badge.setPopup"]
        );

        let resp = call(&s.state, "getPerformanceData", json!({"tabId": 7})).await;
        let record = resp.result.unwrap();
        assert_eq!(record["timing"]["remoteIPAddress"], "1.2.3.4");
    }

    #[tokio::test]
    async fn compact_style_is_honored() {
        let s = setup().await;
        let resp = call(
            &s.state,
            "submitTiming",
            json!({"tabId": 3, "timing": {"name": "https://a.test/", "duration": 120}, "style": "compact"}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["time"], "0.1");

        let bad = call(
            &s.state,
            "submitTiming",
            json!({"tabId": 3, "timing": {"name": "https://a.test/", "duration": 120}, "style": "huge"}),
        )
        .await;
        assert_eq!(bad.error.unwrap().code, "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn save_and_read_performance_data() {
        let s = setup().await;
        let resp = call(
            &s.state,
            "savePerformanceData",
            json!({"tabId": 9, "time": "1.23", "timing": {"name": "https://a.test/", "duration": 1230}}),
        )
        .await;
        assert_eq!(resp.result.unwrap()["success"], true);

        let resp = call(&s.state, "getPerformanceData", json!({"tabId": 9})).await;
        assert_eq!(resp.result.unwrap()["timing"]["duration"], 1230.0);

        let resp = call(&s.state, "getPerformanceData", json!({"tabId": 10})).await;
        assert!(resp.result.unwrap().is_null());
    }

    #[tokio::test]
    async fn tab_removed_evicts() {
        let s = setup().await;
        call(
            &s.state,
            "webNavigation.beforeNavigate",
            json!({"tabId": 7, "frameId": 0, "url": "https://a.test/"}),
        )
        .await;
        call(
            &s.state,
            "webRequest.completed",
            json!({"url": "https://a.test/", "ip": "1.2.3.4", "tabId": 7}),
        )
        .await;

        let resp = call(&s.state, "tabs.removed", json!({"tabId": 7})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["stopped"], true);
        assert_eq!(result["evicted"], true);
        assert_eq!(result["durableFacts"], 1);

        let resp = call(&s.state, "getIPData", json!({"tabId": 7})).await;
        assert_eq!(resp.result.unwrap(), json!({}));

        let resp = call(&s.state, "getTabPhase", json!({"tabId": 7})).await;
        assert!(resp.result.unwrap()["phase"].is_null());
    }

    #[tokio::test]
    async fn navigation_without_bridge_reports_host_error() {
        let clients = Arc::new(ClientRegistry::new(8));
        let host = Arc::new(HostChannel::new(clients.clone()));
        let service = Arc::new(ObservationService::new(
            ServiceConfig::default(),
            host.clone(),
            host,
            StoreMirror::disabled(),
        ));
        let state = Arc::new(HandlerState::new(service, clients));

        let resp = call(
            &state,
            "webNavigation.beforeNavigate",
            json!({"tabId": 7, "frameId": 0, "url": "https://a.test/"}),
        )
        .await;
        assert_eq!(resp.error.unwrap().code, "HOST_UNAVAILABLE");

        let health = call(&state, "system.ping", json!({})).await;
        assert_eq!(health.result.unwrap()["status"], "degraded");
    }

    #[tokio::test]
    async fn stats_are_reported() {
        let s = setup().await;
        call(&s.state, "startListening", json!({"tabId": 1})).await;
        let resp = call(&s.state, "getStats", json!({})).await;
        let stats = resp.result.unwrap();
        assert_eq!(stats["activeSessions"], 1);
        assert!(stats["store"]["totalRecords"].is_number());
    }
}
