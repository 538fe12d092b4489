//! `api` crate — HTTP front end.
//!
//! Exposes:
//!   POST   /api/execute   run a formula
//!   POST   /api/run-js    run one script in the sandbox pool
//!   GET    /healthz       liveness plus pool stats
//!
//! Both POST routes report their wall time in an `X-Execution-Time` header.

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use engine::FormulaExecutor;
use queue::SandboxPool;

pub use error::ApiError;

pub const EXECUTION_TIME_HEADER: HeaderName = HeaderName::from_static("x-execution-time");

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<FormulaExecutor>,
    pub pool: Arc<SandboxPool>,
}

impl AppState {
    /// Share the executor's sandbox pool with the `run-js` route.
    pub fn new(executor: Arc<FormulaExecutor>) -> Self {
        let pool = executor.runner().pool().clone();
        Self { executor, pool }
    }
}

pub fn build_router(state: AppState) -> Router {
    let timed = Router::new()
        .route("/api/execute", post(handlers::execute::execute))
        .route("/api/run-js", post(handlers::run_js::run_js))
        .route_layer(middleware::from_fn(execution_time_header));

    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .merge(timed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn execution_time_header(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = started.elapsed().as_millis();
    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed}ms")) {
        response.headers_mut().insert(EXECUTION_TIME_HEADER, value);
    }
    response
}

/// Serve until Ctrl-C, then shut the sandbox pool down.
pub async fn serve(bind: &str, state: AppState) -> std::io::Result<()> {
    let pool = state.pool.clone();
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    pool.shutdown().await;
    Ok(())
}
