//! Gateway server: Axum-based HTTP + WS server hosting the prompt page

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use prism_core::{ModelRouter, Selector};

use crate::events::EventSink;
use crate::protocol::{Call, Reply, SubmitParams, codes, methods};
use crate::session::Session;

/// Frames buffered per connection before the streaming task waits on the socket
const OUTBOUND_CAPACITY: usize = 64;

/// Shared state for all connections
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<ModelRouter>,
    pub start_time: std::time::Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(bind: SocketAddr, router: Arc<ModelRouter>) -> Self {
        let state = GatewayState {
            router,
            start_time: std::time::Instant::now(),
        };
        Self { state, bind }
    }

    /// Address the server binds when run
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/status", get(status_handler))
            .route("/api/models", get(models_handler))
            .route("/", get(crate::page::index_handler))
            .route("/assets/{*path}", get(crate::page::static_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind)
            .await
            .with_context(|| format!("Failed to bind gateway on {}", self.bind))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        info!("Gateway listening on http://{}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Gateway stopped");
        Ok(())
    }

    /// Serve on `listener` in the background, returning a handle
    pub fn spawn(self, listener: TcpListener) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.serve(listener, std::future::pending()).await })
    }
}

// ── HTTP Handlers ──

async fn status_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    axum::Json(status_body(&state))
}

async fn models_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    axum::Json(models_body(&state))
}

fn status_body(state: &GatewayState) -> serde_json::Value {
    let models: Vec<&str> = state
        .router
        .selectors()
        .into_iter()
        .map(|s| s.label())
        .collect();
    serde_json::json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "models": models,
    })
}

fn models_body(state: &GatewayState) -> serde_json::Value {
    let models: Vec<serde_json::Value> = state
        .router
        .selectors()
        .into_iter()
        .filter_map(|sel| {
            let source = state.router.source(sel)?;
            Some(serde_json::json!({
                "label": sel.label(),
                "provider": source.provider_name(),
                "model": source.model(),
            }))
        })
        .collect();
    serde_json::json!({ "models": models })
}

// ── WebSocket Handler ──

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!("WebSocket connection from {}", addr);
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr))
}

async fn handle_ws(socket: WebSocket, state: GatewayState, addr: SocketAddr) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    // Single writer: responses and streamed events share one ordered queue
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(EventSink::new(tx));

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("Client {} sent close", addr);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error from {}: {}", addr, e);
                break;
            }
        };

        let response = handle_call(&state, &mut session, &msg).await;
        if !session.sink().respond(&response).await {
            break;
        }
    }

    // Dropping the session cancels any request still streaming
    drop(session);
    send_task.abort();
    info!("Client {} disconnected", addr);
}

pub(crate) async fn handle_call(
    state: &GatewayState,
    session: &mut Session,
    raw: &str,
) -> Reply {
    let call: Call = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => {
            return Reply::fault(
                None,
                codes::INVALID_PARAMS,
                format!("Invalid JSON: {}", e),
            );
        }
    };

    let id = call.id.clone();

    match call.method.as_str() {
        methods::STATUS_GET => {
            let mut body = status_body(state);
            body["active_request"] = serde_json::json!(session.active_request());
            body["submitted"] = serde_json::json!(session.submitted());
            body["connected_since"] = serde_json::json!(session.opened_at().to_rfc3339());
            Reply::ok(id, body)
        }

        methods::MODELS_LIST => Reply::ok(id, models_body(state)),

        methods::PROMPT_SUBMIT => {
            let params: SubmitParams = match serde_json::from_value(call.params) {
                Ok(p) => p,
                Err(e) => {
                    return Reply::fault(
                        id,
                        codes::INVALID_PARAMS,
                        format!("Invalid prompt.submit params: {}", e),
                    );
                }
            };

            let selector = match params.model.parse::<Selector>() {
                Ok(sel) => sel,
                Err(e) => {
                    warn!("Rejected prompt for model '{}'", params.model);
                    return Reply::fault(id, codes::UNRECOGNIZED_SELECTOR, e.to_string());
                }
            };
            let stream = match state.router.route_selector(&params.prompt, selector) {
                Ok(stream) => stream,
                Err(e) => {
                    return Reply::fault(id, codes::UNRECOGNIZED_SELECTOR, e.to_string());
                }
            };

            let submitted = session.start(stream, selector).await;
            Reply::ok(
                id,
                serde_json::json!({
                    "request_id": submitted.request_id,
                    "model": selector,
                    "abandoned": submitted.abandoned,
                }),
            )
        }

        methods::PROMPT_CANCEL => {
            let cancelled = session.cancel();
            Reply::ok(id, serde_json::json!({ "cancelled": cancelled }))
        }

        _ => Reply::fault(
            id,
            codes::METHOD_NOT_FOUND,
            format!("Unknown method: {}", call.method),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use prism_core::{StreamingTextSource, TextStream};

    struct EchoSource;

    impl StreamingTextSource for EchoSource {
        fn provider_name(&self) -> &str {
            "echo"
        }
        fn model(&self) -> &str {
            "echo-1"
        }
        fn stream(&self, prompt: &str) -> TextStream {
            let item: prism_core::Result<String> = Ok(format!("echo: {prompt}"));
            Box::pin(stream::iter(vec![item]))
        }
    }

    fn state() -> GatewayState {
        let router = ModelRouter::builder()
            .source(Selector::Gpt, Arc::new(EchoSource))
            .source(Selector::Gemini, Arc::new(EchoSource))
            .build();
        GatewayState {
            router: Arc::new(router),
            start_time: std::time::Instant::now(),
        }
    }

    fn session() -> (Session, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (Session::new(EventSink::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_handle_call_status() {
        let (mut session, _rx) = session();
        let resp = handle_call(&state(), &mut session, r#"{"method":"status.get","params":{}}"#).await;
        let result = resp.result.unwrap();
        assert_eq!(result["status"], "ok");
        assert_eq!(result["models"], serde_json::json!(["GPT", "Gemini"]));
        assert_eq!(result["submitted"], 0);
        assert!(result["connected_since"].is_string());
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn test_handle_call_models_list() {
        let (mut session, _rx) = session();
        let resp = handle_call(&state(), &mut session, r#"{"method":"models.list","id":"m"}"#).await;
        assert_eq!(resp.id.as_deref(), Some("m"));
        let models = resp.result.unwrap()["models"].clone();
        assert_eq!(models[0]["label"], "GPT");
        assert_eq!(models[0]["model"], "echo-1");
    }

    #[tokio::test]
    async fn test_handle_call_submit_streams_events() {
        let (mut session, mut rx) = session();
        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"Say hi","model":"GPT"},"id":"1"}"#,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["model"], "GPT");
        assert!(result["abandoned"].is_null());

        let mut contents = Vec::new();
        loop {
            let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            match frame["event"].as_str().unwrap() {
                "response.snapshot" => {
                    contents.push(frame["data"]["content"].as_str().unwrap().to_string())
                }
                "response.done" => break,
                _ => {}
            }
        }
        assert_eq!(contents, vec!["echo: Say hi"]);
    }

    #[tokio::test]
    async fn test_handle_call_resubmit_reports_abandoned_once() {
        let (mut session, mut rx) = session();
        let stalled: TextStream = Box::pin(stream::pending());
        let first = session.start(stalled, Selector::Gpt).await.request_id;

        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"again","model":"GPT"},"id":"2"}"#,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["abandoned"], first.as_str());
        assert_eq!(session.submitted(), 2);

        let mut cancelled = false;
        loop {
            let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            match frame["event"].as_str().unwrap() {
                "response.cancelled" => {
                    assert_eq!(frame["data"]["request_id"], first.as_str());
                    cancelled = true;
                }
                "response.done" => {
                    assert_eq!(frame["data"]["request_id"], result["request_id"]);
                    break;
                }
                _ => {}
            }
        }
        // The abandoned task may still be flushing its cancellation
        if !cancelled {
            let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(frame["event"], "response.cancelled");
        }
        assert!(session.cancel().is_none());
    }

    #[tokio::test]
    async fn test_handle_call_empty_prompt_is_accepted() {
        let (mut session, _rx) = session();
        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"","model":"Gemini"}}"#,
        )
        .await;
        assert!(resp.error.is_none());
    }

    #[tokio::test]
    async fn test_handle_call_unknown_selector() {
        let (mut session, _rx) = session();
        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"x","model":"Unknown"}}"#,
        )
        .await;
        let error = resp.error.unwrap();
        assert_eq!(error.code, codes::UNRECOGNIZED_SELECTOR);
        assert!(error.message.contains("Unknown"));
        assert_eq!(session.submitted(), 0);
    }

    #[tokio::test]
    async fn test_handle_call_unconfigured_selector() {
        let (mut session, _rx) = session();
        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"x","model":"Claude"}}"#,
        )
        .await;
        assert_eq!(resp.error.unwrap().code, codes::UNRECOGNIZED_SELECTOR);
    }

    #[tokio::test]
    async fn test_handle_call_submit_missing_model() {
        let (mut session, _rx) = session();
        let resp = handle_call(
            &state(),
            &mut session,
            r#"{"method":"prompt.submit","params":{"prompt":"x"}}"#,
        )
        .await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_handle_call_cancel_idle() {
        let (mut session, _rx) = session();
        let resp = handle_call(&state(), &mut session, r#"{"method":"prompt.cancel"}"#).await;
        assert!(resp.result.unwrap()["cancelled"].is_null());
    }

    #[tokio::test]
    async fn test_handle_call_unknown_method() {
        let (mut session, _rx) = session();
        let resp = handle_call(&state(), &mut session, r#"{"method":"unknown","params":{}}"#).await;
        assert!(resp.error.is_some());
        assert_eq!(resp.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handle_call_invalid_json() {
        let (mut session, _rx) = session();
        let resp = handle_call(&state(), &mut session, "not json").await;
        assert!(resp.error.is_some());
    }
}
