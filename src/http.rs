//! Local status endpoint.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Raise a local event and serve the status page |
//!
//! Every page load is a game event: a gun reports `shooting`, anything else
//! reports `hit`.

use crate::error::Result;
use crate::router::{EventRouter, LocalEvent};
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::{debug, info, warn};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct HttpState {
    router: Arc<EventRouter>,
    asset: Arc<PathBuf>,
}

impl HttpState {
    pub fn new(router: Arc<EventRouter>, asset: impl Into<PathBuf>) -> Self {
        Self {
            router,
            asset: Arc::new(asset.into()),
        }
    }
}

pub fn status_router(state: HttpState) -> Router {
    Router::new().route("/", get(index)).with_state(state)
}

/// `GET /`: raise the page-load event and return the asset.
async fn index(State(state): State<HttpState>) -> Response {
    if let Err(e) = state.router.handle_local_event(LocalEvent::HttpRequest) {
        debug!("[HTTP] Page-load event not delivered: {}", e);
    }

    // Served as stored; the asset need not be UTF-8.
    match tokio::fs::read(state.asset.as_path()).await {
        Ok(body) => ([(header::CONTENT_TYPE, "text/html")], body).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("[HTTP] Asset {} not found", state.asset.display());
            (StatusCode::NOT_FOUND, "404 Not Found").into_response()
        }
        Err(e) => {
            warn!("[HTTP] Cannot read {}: {}", state.asset.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error").into_response()
        }
    }
}

pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("[HTTP] Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve on `listener` until `shutdown` fires.
pub fn spawn(
    listener: TcpListener,
    state: HttpState,
    shutdown: CancellationToken,
) -> JoinHandle<Result<()>> {
    let app = status_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!("[HTTP] Server stopped");
        Ok(())
    })
}
