//! HTTP Frontend collaborator (`spec.md` §2, §6): accepts form-encoded
//! POSTs, decodes them with `dc2-wire`, routes the typed request to the
//! matching `dc2-engine::Dispatcher` method, and encodes the typed result
//! back into EC2/AutoScaling XML. The frontend owns no lifecycle semantics
//! of its own — every decision here is either transport plumbing (status
//! codes, the `Action` routing table) or formatting (§6's exact XML
//! shapes); the dispatcher is the only thing that touches store/executor
//! state.

mod dispatch;
mod metadata;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::Router;
use dc2_engine::dispatcher::Dispatcher;
use dc2_ids::OsRng;
use dc2_imds::{imds_router, ImdsRouterState, InMemoryImdsProxy};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

pub use metadata::BuildInfo;

/// Shared application state for both the control-plane API and (in the same
/// process, on a separate listener) the IMDS proxy it feeds.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher<OsRng>,
    pub region: String,
    pub build_info: Arc<BuildInfo>,
}

/// Binds the control-plane API listener and, alongside it, the link-local
/// IMDS proxy listener, and serves both until `shutdown` fires. Mirrors the
/// teacher's `run_server` shape: build the router, bind, serve, then drain.
pub async fn run(
    addr: SocketAddr,
    imds_addr: SocketAddr,
    dispatcher: Dispatcher<OsRng>,
    imds_proxy: InMemoryImdsProxy,
    region: String,
    build_info: BuildInfo,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = AppState {
        dispatcher: dispatcher.clone(),
        region,
        build_info: Arc::new(build_info),
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let app = Router::new()
        .route("/", any(dispatch_handler))
        .route("/_dc2/metadata", get(metadata::handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .layer(dc2_common::metrics::MetricsLayer::new(state.region.clone()))
        .layer(cors)
        .with_state(state);

    let imds_app = imds_router(ImdsRouterState { proxy: imds_proxy });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let imds_listener = tokio::net::TcpListener::bind(imds_addr).await?;
    info!(%addr, %imds_addr, "dc2 listening");

    let api_shutdown = shutdown.clone();
    let imds_shutdown = shutdown.clone();
    let api = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { api_shutdown.cancelled().await });
    let imds = axum::serve(imds_listener, imds_app.into_make_service())
        .with_graceful_shutdown(async move { imds_shutdown.cancelled().await });

    let (api_res, imds_res) = tokio::join!(api, imds);
    api_res?;
    imds_res?;

    dispatcher.shutdown(Duration::from_secs(5)).await;
    Ok(())
}

async fn dispatch_handler(State(state): State<AppState>, method: Method, headers: HeaderMap, body: Bytes) -> Response {
    if method != Method::POST {
        return render_method_not_allowed();
    }
    let request_id = Uuid::new_v4().to_string();
    let body = String::from_utf8_lossy(&body);
    match dispatch::handle(&state, &body, &request_id).await {
        Ok(xml) => (StatusCode::OK, [("content-type", "text/xml")], xml).into_response(),
        Err(wire_err) => {
            warn!(code = %wire_err.code, message = %wire_err.message, "request failed");
            let dialect = dispatch::dialect_hint(&body);
            let status = StatusCode::from_u16(wire_err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let xml = dc2_wire::xml::render_error(dialect, &wire_err.code, &wire_err.message, &request_id);
            (status, [("content-type", "text/xml")], xml).into_response()
        }
    }
    .tap_log(&headers)
}

async fn metrics_handler() -> String {
    dc2_common::metrics::prometheus_handle().render()
}

fn render_method_not_allowed() -> Response {
    let err = dc2_wire::WireError::method_not_allowed();
    let xml = dc2_wire::xml::render_error(dc2_wire::Dialect::Ec2, &err.code, &err.message, "unknown");
    (StatusCode::METHOD_NOT_ALLOWED, [("content-type", "text/xml")], xml).into_response()
}

/// Small extension trait purely so `dispatch_handler` can end in a single
/// expression; keeps the source-ip/log line out of the main control flow.
trait TapLog {
    fn tap_log(self, headers: &HeaderMap) -> Self;
}

impl TapLog for Response {
    fn tap_log(self, headers: &HeaderMap) -> Self {
        let ip = dc2_common::get_source_ip(headers).map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".into());
        tracing::debug!(status = %self.status(), client_ip = %ip, "handled request");
        self
    }
}
