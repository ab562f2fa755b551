//! HTTP front: route table, dispatch and the listener loop.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::GatewayResult;
use crate::handlers::{self, AppState};

enum Matcher {
    /// Matches any path starting with the pattern. A pattern without a
    /// trailing slash also catches namespace-suffixed verbs
    /// (`/upload-photos/...`).
    Prefix(&'static str),
    Exact(&'static str),
}

#[derive(Clone, Copy)]
enum Route {
    Upload,
    Get,
    Delete,
    DownloadInfo,
    StatLog,
    Ping,
    Cache,
}

/// First match wins.
const ROUTES: &[(Matcher, Route)] = &[
    (Matcher::Prefix("/upload"), Route::Upload),
    (Matcher::Prefix("/get/"), Route::Get),
    (Matcher::Prefix("/delete"), Route::Delete),
    (Matcher::Prefix("/download_info/"), Route::DownloadInfo),
    (Matcher::Prefix("/download-info/"), Route::DownloadInfo),
    (Matcher::Exact("/stat-log"), Route::StatLog),
    (Matcher::Exact("/stat_log"), Route::StatLog),
    (Matcher::Exact("/ping"), Route::Ping),
    (Matcher::Exact("/stat"), Route::Ping),
    (Matcher::Exact("/cache"), Route::Cache),
];

fn route_for(path: &str) -> Option<Route> {
    ROUTES
        .iter()
        .find(|(matcher, _)| match matcher {
            Matcher::Prefix(prefix) => path.starts_with(prefix),
            Matcher::Exact(exact) => path == *exact,
        })
        .map(|(_, route)| *route)
}

async fn dispatch(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let Some(route) = route_for(req.uri().path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let result: GatewayResult<Response> = match route {
        Route::Upload => handlers::upload(state, req).await,
        Route::Get => handlers::get(state, req).await,
        Route::Delete => handlers::delete(state, req).await,
        Route::DownloadInfo => handlers::download_info(state, req).await,
        Route::StatLog => handlers::stat_log(state, req).await,
        Route::Ping => handlers::ping(state, req).await,
        Route::Cache => handlers::cache(state, req).await,
    };
    result.into_response()
}

/// Build the application router around shared request state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// The gateway server: owns the request state and the listen address.
pub struct Server {
    state: Arc<AppState>,
    listen: String,
}

impl Server {
    pub fn new(state: AppState, listen: String) -> Self {
        Self {
            state: Arc::new(state),
            listen,
        }
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(self) -> std::io::Result<()> {
        let app = router(self.state);
        let listener = tokio::net::TcpListener::bind(&self.listen).await?;
        info!("gateway listening on {}", self.listen);
        axum::serve(listener, app).await
    }
}
