//! Gateway service - the process root for RPC and real-time delivery.
//!
//! Owns the dispatcher, the subscription registry and the broadcast
//! service, and serves them over one HTTP listener:
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /` | JSON-RPC, single request or batch |
//! | `GET /health` | Liveness |
//! | `GET /stats` | Registry and request counters |
//! | `GET /ws` | Real-time channel upgrade |
//!
//! After every successful write the affected topics are re-broadcast before
//! the response is returned.

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pvm_mempool::MempoolApi;
use pvm_validators::ValidatorSelector;
use serde_json::{json, Value};
use shared_crypto::Signer;
use shared_types::{RpcRequest, RpcResponse};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, info, instrument};

use crate::commands::{CommandContext, CommandFactory};
use crate::dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::domain::{messages, ApiError, GatewayConfig, GatewayError, NodeLifecycle};
use crate::middleware::{create_cors_layer, GatewayMetrics, TracingLayer};
use crate::ports::{GameEngine, LedgerReader, LedgerWriter, TimeSource};
use crate::projection::GameProjector;
use crate::ws::{refuse, serve_socket, BroadcastService, ConnectParams, SubscriptionRegistry, WsContext};

/// External collaborators the gateway is built over.
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerReader>,
    pub ledger_writer: Arc<dyn LedgerWriter>,
    pub engine: Arc<dyn GameEngine>,
    pub mempool: Arc<dyn MempoolApi>,
    pub validators: Arc<ValidatorSelector>,
    pub signer: Arc<dyn Signer>,
    pub lifecycle: Arc<NodeLifecycle>,
    pub time: Arc<dyn TimeSource>,
}

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<SubscriptionRegistry>,
    broadcast: Arc<BroadcastService>,
    metrics: Arc<GatewayMetrics>,
    lifecycle: Arc<NodeLifecycle>,
}

impl GatewayService {
    pub fn new(config: GatewayConfig, c: Collaborators) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let metrics = Arc::new(GatewayMetrics::new());
        let projector = Arc::new(GameProjector::new(
            c.ledger.clone(),
            c.engine.clone(),
            c.mempool.clone(),
        ));
        let context = CommandContext {
            ledger: c.ledger,
            ledger_writer: c.ledger_writer,
            engine: c.engine,
            mempool: c.mempool,
            validators: c.validators,
            signer: c.signer,
            projector: projector.clone(),
            lifecycle: c.lifecycle.clone(),
            time: c.time,
            identity: config.node.clone(),
            limits: config.limits.clone(),
            operator: config.operator.clone(),
        };
        let dispatcher = Arc::new(CommandDispatcher::new(
            CommandFactory::new(context),
            metrics.clone(),
        ));
        let registry = Arc::new(SubscriptionRegistry::new(config.websocket.max_connections));
        let broadcast = Arc::new(BroadcastService::new(
            registry.clone(),
            projector,
            metrics.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            registry,
            broadcast,
            metrics,
            lifecycle: c.lifecycle,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn broadcast(&self) -> &Arc<BroadcastService> {
        &self.broadcast
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    pub fn lifecycle(&self) -> &Arc<NodeLifecycle> {
        &self.lifecycle
    }

    /// Dispatch one request, then fan out whatever it changed.
    pub async fn handle_rpc(
        &self,
        request: Option<RpcRequest>,
    ) -> Result<RpcResponse<Value>, DispatchError> {
        let dispatched = self.dispatcher.dispatch(request).await?;
        self.fan_out(&dispatched).await;
        Ok(dispatched.response)
    }

    #[instrument(skip_all, fields(tables = dispatched.touched_tables.len()))]
    async fn fan_out(&self, dispatched: &Dispatched) {
        if dispatched.response.is_error() {
            return;
        }
        if dispatched.mempool_changed {
            self.broadcast.broadcast_mempool();
        }
        for table in &dispatched.touched_tables {
            self.broadcast.broadcast_to_all(table).await;
        }
    }

    /// Router with every route and the middleware stack.
    pub fn router(&self) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(create_cors_layer(&self.config.cors))
            .layer(TracingLayer::new());

        Router::new()
            .route("/", post(handle_json_rpc))
            .route("/health", get(health_check))
            .route("/stats", get(stats))
            .route("/ws", get(ws_upgrade))
            .layer(middleware)
            .layer(DefaultBodyLimit::max(self.config.limits.max_request_size))
            .with_state(self.clone())
    }

    /// Bind the configured address and serve until shutdown is requested.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener until shutdown is requested.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), GatewayError> {
        let addr = listener
            .local_addr()
            .map_err(|e| GatewayError::Bind(e.to_string()))?;
        let mut shutdown = self.lifecycle.subscribe_shutdown();
        let router = self.router();

        info!(addr = %addr, "Gateway listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stopping| *stopping).await;
                info!("Gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        info!("Gateway stopped");
        Ok(())
    }
}

/// Handle a JSON-RPC body: one request object or an array of them.
///
/// Malformed JSON, a non-object body and an empty or oversized batch are
/// refused at the transport level. Anything else is answered per request,
/// so one malformed batch entry only fails its own slot.
async fn handle_json_rpc(State(service): State<GatewayService>, body: String) -> Response {
    let value: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return ApiError::invalid_request("empty batch").into_response();
            }
            let max = service.config.limits.max_batch_size;
            if items.len() > max {
                return ApiError::limit_exceeded(format!(
                    "batch of {} exceeds {max}",
                    items.len()
                ))
                .into_response();
            }
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                responses.push(answer(&service, item).await);
            }
            (StatusCode::OK, Json(responses)).into_response()
        }
        object @ Value::Object(_) => {
            (StatusCode::OK, Json(answer(&service, object).await)).into_response()
        }
        other => {
            debug!(kind = %json_kind(&other), "Rejected non-object request");
            ApiError::invalid_request(format!("{} request", json_kind(&other))).into_response()
        }
    }
}

/// Answer one request value, echoing whatever id it carried.
async fn answer(service: &GatewayService, value: Value) -> RpcResponse<Value> {
    match parse_request(value) {
        Ok(request) => {
            let id = request.id.clone();
            service
                .handle_rpc(Some(request))
                .await
                .unwrap_or_else(|e| RpcResponse::failure(id, e.to_string()))
        }
        Err(failure) => failure,
    }
}

/// Decode one request. A value that does not decode is answered with the
/// id it carried, so callers can still correlate the failure.
fn parse_request(value: Value) -> Result<RpcRequest, RpcResponse<Value>> {
    let id = raw_id(&value);
    let has_method = value.get("method").map_or(false, Value::is_string);
    serde_json::from_value(value).map_err(|e| {
        debug!(%id, error = %e, "Undecodable request");
        let message = if has_method {
            messages::INVALID_PARAMS
        } else {
            messages::MISSING_METHOD
        };
        RpcResponse::failure(id, message)
    })
}

fn raw_id(value: &Value) -> String {
    match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn stats(State(service): State<GatewayService>) -> impl IntoResponse {
    Json(json!({
        "registry": service.registry.stats(),
        "requests": service.metrics.to_json(),
        "producing": service.lifecycle.is_producing(),
    }))
}

async fn ws_upgrade(
    State(service): State<GatewayService>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        match service.registry.try_acquire() {
            Ok(permit) => {
                let ctx = WsContext {
                    broadcast: service.broadcast.clone(),
                    metrics: service.metrics.clone(),
                    config: service.config.websocket.clone(),
                    shutdown: service.lifecycle.subscribe_shutdown(),
                };
                serve_socket(socket, params, ctx, permit).await;
            }
            Err(e) => refuse(socket, e, &service.metrics).await,
        }
    })
}
