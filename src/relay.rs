//! HTTP front of the broker relay. Routing of work onto the queue is left to
//! the broker itself; this side only proves the connection is still up.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};

use crate::{
    app::with_http_layers,
    envelope::{error_json, success_json, JsonResponse},
};

pub trait Liveness: Send + Sync {
    fn is_connected(&self) -> bool;
}

impl Liveness for lapin::Connection {
    fn is_connected(&self) -> bool {
        self.status().connected()
    }
}

#[derive(Clone)]
pub struct BrokerState {
    pub queue: Arc<dyn Liveness>,
}

pub fn build_relay(state: BrokerState) -> Router {
    with_http_layers(
        Router::new()
            .route("/", post(hit))
            .route("/health", get(health))
            .with_state(state),
    )
}

async fn hit() -> JsonResponse<()> {
    success_json("Hit the broker", None)
}

async fn health(State(state): State<BrokerState>) -> Result<JsonResponse<()>, JsonResponse<()>> {
    if state.queue.is_connected() {
        Ok(success_json("ok", None))
    } else {
        tracing::warn!("amqp connection lost");
        Err(error_json(
            "message queue unavailable",
            Some(StatusCode::SERVICE_UNAVAILABLE),
        ))
    }
}
