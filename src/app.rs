use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, envelope::success_json, state::AppState};

pub fn build_app(state: AppState) -> Router {
    with_http_layers(
        Router::new()
            .merge(auth::router())
            .route("/health", get(|| async { success_json::<()>("ok", None) }))
            .with_state(state),
    )
}

/// CORS plus a request span carrying method, uri and the final status.
pub fn with_http_layers(router: Router) -> Router {
    router.layer(CorsLayer::permissive()).layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!(
                    "http_request",
                    %method,
                    uri = %uri,
                    status = tracing::field::Empty
                )
            })
            .on_response(
                |res: &axum::http::Response<_>,
                 _latency: std::time::Duration,
                 span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, "response");
                    } else {
                        tracing::info!(%status, "response");
                    }
                },
            ),
    )
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
