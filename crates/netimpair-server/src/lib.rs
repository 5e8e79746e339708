//! HTTP control surface for a running [`netimpair_core::PipePair`]: read and
//! mutate impairment parameters, drain telemetry events, and read the
//! legacy byte meters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use netimpair_core::CoreHandle;
use netimpair_core::error::Error;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: Error) -> Response {
    let status = match err {
        Error::MalformedParameter { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: err.to_string() })).into_response()
}

async fn get_pipes(State(handle): State<Arc<CoreHandle>>) -> Json<Value> {
    Json(serde_json::to_value(handle.params()).unwrap_or_default())
}

async fn put_pipes(
    State(handle): State<Arc<CoreHandle>>,
    Json(candidate): Json<HashMap<String, Value>>,
) -> Response {
    match handle.update_params(&candidate) {
        Ok(merged) => Json(merged).into_response(),
        Err(err) => {
            log::warn!("rejected parameter update: {err}");
            error_response(err)
        }
    }
}

async fn delete_pipes(State(handle): State<Arc<CoreHandle>>) -> Json<Value> {
    let reset = handle.reset_params();
    Json(serde_json::to_value(reset).unwrap_or_default())
}

async fn get_events(State(handle): State<Arc<CoreHandle>>) -> Json<Value> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    let events = handle.drain_events();
    Json(serde_json::json!({ "now": now, "events": events }))
}

async fn get_bytes(State(handle): State<Arc<CoreHandle>>) -> Json<Value> {
    let meters = handle.meters();
    Json(serde_json::json!({
        "up_bytes_attempted": meters.up_bytes_attempted,
        "up_bytes_delivered": meters.up_bytes_delivered,
        "down_bytes_attempted": meters.down_bytes_attempted,
        "down_bytes_delivered": meters.down_bytes_delivered,
    }))
}

async fn get_index() -> Json<Value> {
    Json(serde_json::json!({
        "name": "netimpair control surface",
        "version": netimpair_core::VERSION,
        "endpoints": {
            "GET /pipes": "Current impairment parameters",
            "PUT /pipes": "Merge a JSON object of parameters (bandwidth, buffer, delay, loss)",
            "DELETE /pipes": "Reset parameters to their initial values",
            "GET /events": "Drain pending telemetry events",
            "GET /bytes": "Legacy byte meters for both directions",
        },
    }))
}

/// Build the axum router over a shared [`CoreHandle`].
pub fn build_router(handle: Arc<CoreHandle>) -> Router {
    Router::new()
        .route("/", get(get_index))
        .route("/pipes", get(get_pipes).put(put_pipes).delete(delete_pipes))
        .route("/events", get(get_events))
        .route("/bytes", get(get_bytes))
        .with_state(handle)
}

/// Serve the control surface on `host:port` until the process is killed.
pub async fn run_server(handle: Arc<CoreHandle>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(handle);
    let addr = format!("{host}:{port}");
    log::info!("netimpair control surface listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use netimpair_core::parameters::{ParameterStore, Parameters};
    use netimpair_core::pipe_pair::PipePair;
    use netimpair_core::scheduler::{Scheduler, VirtualScheduler};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn handle() -> Arc<CoreHandle> {
        let scheduler: Arc<dyn Scheduler> = Arc::new(VirtualScheduler::new());
        let params = Arc::new(ParameterStore::new(Parameters::default()));
        Arc::new(CoreHandle::new(Arc::new(PipePair::new(params, scheduler, Some(3)))))
    }

    #[tokio::test]
    async fn get_pipes_returns_defaults() {
        let app = build_router(handle());
        let response =
            app.oneshot(Request::builder().uri("/pipes").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn put_pipes_rejects_bad_loss() {
        let app = build_router(handle());
        let body = serde_json::json!({ "loss": 5.0 }).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/pipes")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_pipes_resets() {
        let handle = handle();
        let mut candidate = HashMap::new();
        candidate.insert("loss".to_string(), Value::from(0.5));
        handle.update_params(&candidate).unwrap();

        let app = build_router(Arc::clone(&handle));
        let response =
            app.oneshot(Request::builder().method("DELETE").uri("/pipes").body(Body::empty()).unwrap())
                .await
                .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(handle.params(), Parameters::default());
    }
}
