use std::sync::Arc;

use axum::{
    Router, debug_handler,
    extract::{Extension, Json, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use ptb_core::{CallbackReceiver, DeviceErrorReporter, ExchangeCoordinator, ExchangeError};
use serde_json::{Value, json};
use tracing::{error, warn};

#[derive(Clone)]
pub struct GatewayState {
    pub coordinator: ExchangeCoordinator,
    pub receiver: CallbackReceiver,
    pub device_errors: DeviceErrorReporter,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/terminal/request", post(submit_request))
        .route("/api/terminal/callback", post(device_callback))
        .route("/api/terminal/error", post(device_error))
        .route("/healthz", get(healthz))
        .layer(Extension(Arc::new(state)))
}

#[debug_handler]
async fn submit_request(
    Extension(state): Extension<Arc<GatewayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload.map_err(rejected)?;
    state
        .coordinator
        .submit(request)
        .await
        .map(|outcome| Json(outcome.into_body()))
        .map_err(failure)
}

#[debug_handler]
async fn device_callback(
    Extension(state): Extension<Arc<GatewayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(reply) = payload.map_err(rejected)?;
    state
        .receiver
        .receive(reply)
        .await
        .map(|outcome| Json(outcome.body()))
        .map_err(failure)
}

#[debug_handler]
async fn device_error(
    Extension(state): Extension<Arc<GatewayState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult {
    let Json(report) = payload.map_err(rejected)?;
    Ok(Json(state.device_errors.report(report).await))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "status": "error", "message": message.into() }))
}

fn rejected(rejection: JsonRejection) -> (StatusCode, Json<Value>) {
    warn!(error = %rejection, "rejected request body");
    (StatusCode::BAD_REQUEST, error_body(rejection.body_text()))
}

fn failure(err: ExchangeError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ExchangeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ExchangeError::DestinationNotFound(_) => StatusCode::NOT_FOUND,
        ExchangeError::Directory(_) | ExchangeError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        error!(error = %err, "exchange backend unavailable");
    }
    (status, error_body(err.to_string()))
}
