use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use model::{AdvanceOrderRequest, CreateOrderRequest, OrderFilter};
use payment::CALLBACK_TOKEN_HEADER;
use serde_json::json;
use service::{ErrorKind, ServiceError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Maps a service error onto a status code and a JSON body.
///
/// Internal errors are logged and answered with a generic message.
fn error_response(err: ServiceError) -> Response {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternalGateway => StatusCode::BAD_GATEWAY,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {err}");
        "internal server error".to_string()
    } else {
        warn!("Request rejected: {err}");
        err.to_string()
    };

    (status, Json(json!({ "error": message }))).into_response()
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "invalid",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::ExternalGateway => "gateway_error",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::Internal => "error",
    }
}

pub(crate) async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Response {
    match state.orders.create_order(&request).await {
        Ok(details) => {
            state.metrics.record_order_created();
            (StatusCode::CREATED, Json(details)).into_response()
        }
        Err(e) => error_response(e),
    }
}

pub(crate) async fn get_order_by_uuid(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Response {
    match state.orders.get_order_by_uuid(uuid).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) async fn get_order_by_track_id(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> Response {
    match state.orders.get_order_by_track_id(&track_id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) async fn cancel_order(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> Response {
    match state.orders.cancel_order(&track_id).await {
        Ok(order) => Json(order).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Response {
    match state.orders.list_orders(&filter).await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) async fn get_order_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Response {
    match state.orders.get_order_by_id(id).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => error_response(e),
    }
}

pub(crate) async fn advance_order_status(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(request): Json<AdvanceOrderRequest>,
) -> Response {
    match state.orders.advance_order_status(uuid, &request).await {
        Ok(details) => Json(details).into_response(),
        Err(e) => error_response(e),
    }
}

/// Takes the raw body so classification sees exactly what the provider sent.
pub(crate) async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = headers
        .get(CALLBACK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.webhooks.handle_provider_webhook(token, &body).await {
        Ok(outcome) => {
            state.metrics.record_webhook(outcome.as_str());
            info!(
                track_id = %outcome.order().track_id,
                outcome = outcome.as_str(),
                "Payment callback handled"
            );
            Json(json!({
                "status": outcome.as_str(),
                "track_id": outcome.order().track_id,
            }))
            .into_response()
        }
        Err(e) => {
            state.metrics.record_webhook(kind_label(e.kind()));
            error_response(e)
        }
    }
}

pub(crate) async fn health() -> &'static str {
    "OK"
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
