use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use tabtrace_engine::ObservationService;
use tabtrace_settings::ServerSettings;

use crate::client::{self, ClientId, ClientRegistry};
use crate::handlers::HandlerState;
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub client_cleanup_interval: Duration,
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            client_cleanup_interval: Duration::from_secs(settings.client_cleanup_interval_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. `clients` must be the same registry the
/// service's host channel broadcasts through.
pub async fn start(
    config: ServerConfig,
    service: Arc<ObservationService>,
    clients: Arc<ClientRegistry>,
) -> Result<ServerHandle, std::io::Error> {
    let cleanup = client::start_cleanup_task(Arc::clone(&clients), config.client_cleanup_interval);

    // Message processing channel
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(service, Arc::clone(&clients)));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        client_registry: Arc::clone(&clients),
        message_tx: msg_tx,
    };

    // One processor applies every message in arrival order.
    let rpc_handle = tokio::spawn(process_rpc_messages(msg_rx, handler_state, Arc::clone(&clients)));

    let router = build_router(app_state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "tabtrace server started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        server: server_handle,
        rpc: rpc_handle,
        cleanup,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
    rpc: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and processing messages.
    pub fn abort(&self) {
        self.server.abort();
        self.rpc.abort();
        self.cleanup.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = crate::handlers::dispatch(
        &state.handler_state,
        "health",
        &serde_json::json!({}),
        None,
    )
    .await;

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, axum::Json(resp.result.unwrap_or_default()))
}

/// Process incoming RPC messages from WebSocket clients.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw_message)) = rx.recv().await {
        let request: RpcRequest = match serde_json::from_str(&raw_message) {
            Ok(req) => req,
            Err(_) => {
                let resp = RpcResponse::parse_error();
                if let Ok(json) = serde_json::to_string(&resp) {
                    registry.send_to(&client_id, json);
                }
                continue;
            }
        };

        let params = request.params.unwrap_or(serde_json::json!({}));
        let response = crate::handlers::dispatch(&state, &request.method, &params, request.id).await;

        if let Ok(json) = serde_json::to_string(&response) {
            registry.send_to(&client_id, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_channel::HostChannel;
    use tabtrace_engine::{ServiceConfig, StoreMirror};

    async fn service(clients: &Arc<ClientRegistry>) -> Arc<ObservationService> {
        let host = Arc::new(HostChannel::new(Arc::clone(clients)));
        let mirror = StoreMirror::in_memory();
        mirror.flush().await;
        Arc::new(ObservationService::new(ServiceConfig::default(), host.clone(), host, mirror))
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let clients = Arc::new(ClientRegistry::new(32));
        let service = service(&clients).await;

        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };

        let handle = start(config, service, clients).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["store"], "ready");
        handle.abort();
    }

    #[tokio::test]
    async fn rpc_processor_answers_in_order() {
        let clients = Arc::new(ClientRegistry::new(32));
        let service = service(&clients).await;
        let state = Arc::new(HandlerState::new(service, Arc::clone(&clients)));
        let (client_id, mut out) = clients.register();

        let (tx, rx) = mpsc::channel(8);
        let processor = tokio::spawn(process_rpc_messages(rx, state, Arc::clone(&clients)));

        tx.send((client_id.clone(), "not json".into())).await.unwrap();
        tx.send((
            client_id.clone(),
            r#"{"method":"getIPData","params":{"tabId":4},"id":2}"#.into(),
        ))
        .await
        .unwrap();
        drop(tx);
        processor.await.unwrap();

        let first: serde_json::Value = serde_json::from_str(&out.recv().await.unwrap()).unwrap();
        assert_eq!(first["error"]["code"], "PARSE_ERROR");
        let second: serde_json::Value = serde_json::from_str(&out.recv().await.unwrap()).unwrap();
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"], serde_json::json!({}));
    }

    #[test]
    fn config_follows_settings() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9292);
        assert_eq!(config.client_cleanup_interval, Duration::from_secs(60));
    }
}
