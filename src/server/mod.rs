//! MCP transport: JSON-RPC 2.0 over the SSE wire protocol.
//!
//! Clients open `GET /sse` to receive an `endpoint` event naming the message
//! URL, then POST JSON-RPC frames to `/messages?session_id=...`; responses
//! flow back over the session's SSE stream. The server announces itself as
//! the `LLM-Inference` service and exposes a single tool,
//! `safety_guidelines`.

pub mod rpc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::Config;
use crate::guidance::GuidanceService;
use rpc::{JsonRpcRequest, JsonRpcResponse};

/// Service identity announced to MCP clients.
pub const SERVICE_NAME: &str = "LLM-Inference";

const PROTOCOL_VERSION: &str = "2024-11-05";
const TOOL_NAME: &str = "safety_guidelines";

type SessionMap = Arc<Mutex<HashMap<Uuid, mpsc::Sender<String>>>>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GuidanceService>,
    sessions: SessionMap,
}

impl AppState {
    pub fn new(service: GuidanceService) -> Self {
        AppState {
            service: Arc::new(service),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Bind the configured endpoint and serve until the process exits.
pub async fn run_server(config: &Config, service: GuidanceService) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("{SERVICE_NAME} listening on {addr} (SSE transport)");

    let state = AppState::new(service);
    let app = Router::new()
        .route("/sse", get(handle_sse))
        .route("/messages", post(handle_messages))
        .with_state(state);

    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    session_id: Uuid,
}

/// Removes the session entry when its SSE stream is dropped, so clients
/// that disconnect without another frame in flight do not leak map entries.
struct SessionGuard {
    session_id: Uuid,
    sessions: SessionMap,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.session_id);
        tracing::debug!(session_id = %self.session_id, "SSE session closed");
    }
}

/// Open an SSE session. The first event tells the client where to POST its
/// JSON-RPC frames; every later `message` event carries one response frame.
async fn handle_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel::<String>(32);
    state
        .sessions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(session_id, tx);
    tracing::debug!(%session_id, "SSE session opened");

    let guard = SessionGuard {
        session_id,
        sessions: Arc::clone(&state.sessions),
    };
    let endpoint = format!("/messages?session_id={session_id}");
    let hello = stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });
    // The guard lives inside the stream closure; dropping the stream drops
    // the guard and unregisters the session.
    let messages = ReceiverStream::new(rx).map(move |frame| {
        let _ = &guard;
        Ok::<_, Infallible>(Event::default().event("message").data(frame))
    });

    Sse::new(hello.chain(messages)).keep_alive(KeepAlive::default())
}

/// Accept one JSON-RPC frame. Dispatch happens on a spawned task so slow
/// generation never holds the HTTP connection; the response is pushed over
/// the session's SSE stream.
async fn handle_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: String,
) -> (StatusCode, &'static str) {
    let known_session = state
        .sessions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .contains_key(&query.session_id);
    if !known_session {
        return (StatusCode::NOT_FOUND, "unknown session");
    }

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(error) => {
            send_frame(&state, query.session_id, &error).await;
            return (StatusCode::BAD_REQUEST, "invalid request");
        }
    };

    let session_id = query.session_id;
    tokio::spawn(async move {
        if let Some(response) = dispatch(&state, request).await {
            send_frame(&state, session_id, &response).await;
        }
    });

    (StatusCode::ACCEPTED, "Accepted")
}

/// Distinguish unparseable bodies (-32700) from well-formed JSON that is
/// not a valid request object (-32600).
fn parse_request(body: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        JsonRpcResponse::error(Value::Null, rpc::PARSE_ERROR, format!("parse error: {e}"))
    })?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::error(id, rpc::INVALID_REQUEST, format!("invalid request: {e}"))
    })
}

async fn send_frame(state: &AppState, session_id: Uuid, response: &JsonRpcResponse) {
    let frame = match serde_json::to_string(response) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(%e, "failed to serialize response frame");
            return;
        }
    };
    let tx = state
        .sessions
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(&session_id)
        .cloned();
    match tx {
        Some(tx) => {
            if tx.send(frame).await.is_err() {
                tracing::debug!(%session_id, "SSE stream gone, dropping session");
                state
                    .sessions
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&session_id);
            }
        }
        None => tracing::debug!(%session_id, "response for closed session discarded"),
    }
}

/// Route one request to its handler. Notifications produce no response.
pub async fn dispatch(state: &AppState, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    if request.is_notification() {
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    let response = match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVICE_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": [tool_descriptor()] })),
        "tools/call" => handle_tool_call(state, id, request.params).await,
        other => JsonRpcResponse::error(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        ),
    };
    Some(response)
}

/// Tool advertisement for `tools/list`. The four guidance sections are part
/// of the documented contract for calling agents.
fn tool_descriptor() -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Generate personalized outdoor safety and health guidelines \
            based on the provided weather and air quality reports. The response covers \
            overall outdoor safety level, health risks, precautions, and special advice \
            for sensitive groups.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "weather_report": {
                    "type": "string",
                    "description": "A detailed weather report for the location."
                },
                "aqi_report": {
                    "type": "string",
                    "description": "The Air Quality Index (AQI) report for the same location."
                }
            },
            "required": ["weather_report", "aqi_report"]
        }
    })
}

async fn handle_tool_call(state: &AppState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params = params.unwrap_or(Value::Null);
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    if name != TOOL_NAME {
        return JsonRpcResponse::error(
            id,
            rpc::INVALID_PARAMS,
            format!("unknown tool: {name}"),
        );
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let weather_report = match arguments.get("weather_report").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => {
            return JsonRpcResponse::error(
                id,
                rpc::INVALID_PARAMS,
                "missing required argument: weather_report",
            )
        }
    };
    let aqi_report = match arguments.get("aqi_report").and_then(Value::as_str) {
        Some(text) => text.to_string(),
        None => {
            return JsonRpcResponse::error(
                id,
                rpc::INVALID_PARAMS,
                "missing required argument: aqi_report",
            )
        }
    };

    let text = state
        .service
        .safety_guidelines(&weather_report, &aqi_report)
        .await;

    JsonRpcResponse::success(
        id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": false,
        }),
    )
}
