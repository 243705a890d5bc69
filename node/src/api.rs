//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the node's HTTP interface. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/status`              | Node status summary                  |
//! | POST   | `/rpc`                 | JSON-RPC 2.0 gateway                 |
//! | GET    | `/identities/:ein`     | Identity details                     |
//! | GET    | `/addresses/:address`  | EIN and call nonce of an address     |
//! | GET    | `/ws`                  | WebSocket feed of registry events    |
//!
//! ## JSON-RPC error codes
//!
//! Standard codes for malformed requests, plus `-32002` for an envelope
//! that does not verify, `-32003` for a wrong call nonce, and
//! `-32010 - kind` for registry refusals, where `kind` is the error kind's
//! code (`existence` = 0 through `integrity` = 5).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use ein_contracts::{IdentityDetails, RegistryError, RegistryEvent, SignedCall};
use ein_protocol::crypto::RecoverableSignature;
use ein_protocol::identity::{Address, Ein};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::executor::{Ledger, Receipt, SubmitError};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted registry.
    pub ledger: Arc<Ledger>,
    /// Committed registry events, fanned out to WebSocket subscribers.
    pub event_tx: broadcast::Sender<RegistryEvent>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/identities/:ein", get(identity_handler))
        .route("/addresses/:address", get(address_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const BAD_CALL_SIGNATURE: i32 = -32002;
pub const BAD_CALL_NONCE: i32 = -32003;
pub const REGISTRY_ERROR_BASE: i32 = -32010;

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    pub method: String,
    /// Positional parameters.
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

impl From<&RegistryError> for JsonRpcError {
    fn from(err: &RegistryError) -> Self {
        let kind = err.kind();
        Self {
            code: REGISTRY_ERROR_BASE - kind.code() as i32,
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": kind })),
        }
    }
}

impl From<RegistryError> for JsonRpcError {
    fn from(err: RegistryError) -> Self {
        Self::from(&err)
    }
}

impl From<SubmitError> for JsonRpcError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Envelope(e) => Self::new(BAD_CALL_SIGNATURE, e.to_string()),
            e @ SubmitError::BadNonce { .. } => Self::new(BAD_CALL_NONCE, e.to_string()),
            SubmitError::Registry(e) => Self::from(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub protocol_version: String,
    pub registry_address: Address,
    /// Identities that currently exist.
    pub live_identities: usize,
    /// EINs handed out so far, destroyed identities included.
    pub assigned_eins: u64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /addresses/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AddressResponse {
    pub address: Address,
    pub ein: Ein,
    /// The nonce the address's next signed call must carry.
    pub call_nonce: u64,
}

/// Error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns node status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (live_identities, assigned_eins) = state
        .ledger
        .read(|registry| (registry.live_identities(), registry.assigned_eins()));

    Json(StatusResponse {
        version: state.version.clone(),
        protocol_version: ein_protocol::config::PROTOCOL_VERSION.to_string(),
        registry_address: state.ledger.registry_address(),
        live_identities,
        assigned_eins,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let outcome = if req.jsonrpc != "2.0" {
        Err(JsonRpcError::new(
            INVALID_REQUEST,
            "Invalid Request: jsonrpc must be \"2.0\"",
        ))
    } else {
        dispatch(&state, &req.method, &req.params)
    };

    let (result, error) = match outcome {
        Ok(value) => (Some(value), None),
        Err(error) => (None, Some(error)),
    };
    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn dispatch(state: &AppState, method: &str, params: &Option<Value>) -> Result<Value, JsonRpcError> {
    let ledger = &state.ledger;
    match method {
        "ein_sendCall" => {
            let call: SignedCall = param(params, 0, "call")?;
            let receipt = send_call(state, call)?;
            to_json(&receipt)
        }
        "ein_getDetails" => {
            let ein: Ein = param(params, 0, "ein")?;
            let details: IdentityDetails = ledger.read(|r| r.get_details(ein))?;
            to_json(&details)
        }
        "ein_getEin" => {
            let address: Address = param(params, 0, "address")?;
            to_json(&ledger.read(|r| r.get_ein(&address))?)
        }
        "ein_identityExists" => {
            let ein: Ein = param(params, 0, "ein")?;
            Ok(Value::Bool(ledger.read(|r| r.identity_exists(ein))))
        }
        "ein_hasIdentity" => {
            let address: Address = param(params, 0, "address")?;
            Ok(Value::Bool(ledger.read(|r| r.has_identity(&address))))
        }
        "ein_isAddressFor" | "ein_isProviderFor" | "ein_isResolverFor" => {
            let ein: Ein = param(params, 0, "ein")?;
            let address: Address = param(params, 1, "address")?;
            let member = ledger.read(|r| match method {
                "ein_isAddressFor" => r.is_address_for(ein, &address),
                "ein_isProviderFor" => r.is_provider_for(ein, &address),
                _ => r.is_resolver_for(ein, &address),
            });
            Ok(Value::Bool(member))
        }
        "ein_isSigned" => {
            let signer: Address = param(params, 0, "signer")?;
            let hash: String = param(params, 1, "hash")?;
            let signature: RecoverableSignature = param(params, 2, "signature")?;
            let hash = parse_hash(&hash)?;
            Ok(Value::Bool(ledger.read(|r| r.is_signed(&signer, &hash, &signature))))
        }
        "ein_maxAssociatedAddresses" => {
            to_json(&ledger.read(|r| r.max_associated_addresses()))
        }
        "ein_getCallNonce" => {
            let address: Address = param(params, 0, "address")?;
            to_json(&ledger.call_nonce(&address))
        }
        "ein_getActionNonce" => {
            let ein: Ein = param(params, 0, "ein")?;
            to_json(&ledger.read(|r| r.action_nonce(ein))?)
        }
        "ein_registryAddress" => to_json(&ledger.registry_address()),
        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )),
    }
}

/// Submits `call`, then records metrics and broadcasts its events.
fn send_call(state: &AppState, call: SignedCall) -> Result<Receipt, SubmitError> {
    let metrics = &state.metrics;
    let timer = metrics.call_latency_seconds.start_timer();
    let result = state.ledger.submit(call);
    timer.observe_duration();

    match &result {
        Ok(receipt) => {
            metrics
                .calls_accepted_total
                .with_label_values(&[receipt.call.as_str()])
                .inc();
            for event in &receipt.events {
                match event {
                    RegistryEvent::IdentityCreated { .. } => metrics.identities_created_total.inc(),
                    RegistryEvent::RecoveryTriggered { .. } => metrics.recoveries_total.inc(),
                    RegistryEvent::IdentityDestroyed { .. } => metrics.destructions_total.inc(),
                    _ => {}
                }
                // No subscribers is fine.
                let _ = state.event_tx.send(event.clone());
            }
            let live = state.ledger.read(|r| r.live_identities());
            metrics.live_identities.set(live as i64);
        }
        Err(SubmitError::Envelope(_)) => metrics.reject_envelope("envelope"),
        Err(SubmitError::BadNonce { .. }) => metrics.reject_envelope("nonce"),
        Err(SubmitError::Registry(e)) => metrics.reject_kind(e.kind()),
    }
    result
}

/// Positional parameter `index`, deserialized.
fn param<T: DeserializeOwned>(
    params: &Option<Value>,
    index: usize,
    name: &str,
) -> Result<T, JsonRpcError> {
    let value = params
        .as_ref()
        .and_then(|p| p.as_array())
        .and_then(|arr| arr.get(index))
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Invalid params: missing [{index}] {name}")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: [{index}] {name}: {e}")))
}

fn parse_hash(s: &str) -> Result<[u8; 32], JsonRpcError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: hash: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| JsonRpcError::invalid_params("Invalid params: hash must be 32 bytes"))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Internal error: {e}")))
}

/// `GET /identities/:ein` — identity details, or 404.
async fn identity_handler(Path(ein): Path<u64>, State(state): State<AppState>) -> impl IntoResponse {
    match state.ledger.read(|r| r.get_details(Ein::new(ein))) {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

/// `GET /addresses/:address` — the address's EIN and call nonce, 404 if it
/// has no identity, 400 if it doesn't parse.
async fn address_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let address: Address = match address.parse() {
        Ok(a) => a,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("{e}")),
    };
    match state.ledger.read(|r| r.get_ein(&address)) {
        Ok(ein) => {
            let resp = AddressResponse {
                address,
                ein,
                call_nonce: state.ledger.call_nonce(&address),
            };
            (StatusCode::OK, Json(resp)).into_response()
        }
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// `GET /ws` — WebSocket upgrade for live registry events.
///
/// Clients receive one JSON-encoded [`RegistryEvent`] per message. The
/// connection is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize ws event");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
