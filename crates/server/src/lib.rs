use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use worldgrid_engine::{Engine, GridError};
use worldgrid_protocol::{
    CellPatch, DefaultGridRequest, GridCell, GridPayload, GridTemplate, WorldGrid,
};

pub mod config;

pub use config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            config: ServerConfig::default(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rev", get(api_rev))
        .route(
            "/api/worlds/{world_id}/grid",
            get(api_get_grid)
                .post(api_create_grid)
                .put(api_replace_grid)
                .delete(api_delete_grid),
        )
        .route(
            "/api/worlds/{world_id}/grid/default",
            post(api_create_default_grid),
        )
        .route(
            "/api/worlds/{world_id}/grid/distances",
            get(api_grid_distances),
        )
        .route("/api/worlds/{world_id}/grid/path", get(api_grid_path))
        .route("/api/cells/{cell_id}", get(api_get_cell).patch(api_patch_cell))
        .with_state(Arc::new(state))
        // Local security: allow only loopback + Tailscale by default.
        .layer(middleware::from_fn(ip_allowlist))
        // Never `Access-Control-Allow-Origin: *`: a random page in the browser
        // could otherwise rewrite local grids.
        .layer(local_only_cors())
}

async fn health() -> &'static str {
    "ok"
}

fn api_error(err: GridError) -> (StatusCode, String) {
    let status = match &err {
        GridError::NotFound { .. } => StatusCode::NOT_FOUND,
        GridError::InvalidTemplate(_) => StatusCode::UNPROCESSABLE_ENTITY,
        GridError::AlreadyExists { .. } => StatusCode::CONFLICT,
        GridError::TemplateMismatch { .. }
        | GridError::Storage(_)
        | GridError::Serde(_)
        | GridError::Open(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "grid request failed");
    }
    (status, err.to_string())
}

/// Runs SQLite work off the async runtime.
async fn blocking<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> Result<T, GridError> + Send + 'static,
{
    let engine = state.engine.clone();
    let out = tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "blocking task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("task failed: {e}"))
        })?;
    out.map(Json).map_err(api_error)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RevResponse {
    pub rev: i64,
}

async fn api_rev(State(state): State<Arc<AppState>>) -> ApiResult<RevResponse> {
    blocking(&state, |engine| Ok(RevResponse { rev: engine.get_rev()? })).await
}

async fn api_get_grid(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
) -> ApiResult<GridPayload> {
    let image_url = state.config.image_url_for(&world_id);
    blocking(&state, move |engine| {
        let mut payload = engine.get_world_grid(&world_id)?;
        payload.image_url = image_url;
        Ok(payload)
    })
    .await
}

async fn api_create_grid(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    Json(template): Json<GridTemplate>,
) -> ApiResult<WorldGrid> {
    blocking(&state, move |engine| engine.create_grid(&world_id, &template)).await
}

async fn api_replace_grid(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    Json(template): Json<GridTemplate>,
) -> ApiResult<WorldGrid> {
    blocking(&state, move |engine| engine.replace_grid(&world_id, &template)).await
}

async fn api_create_default_grid(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    Json(request): Json<DefaultGridRequest>,
) -> ApiResult<WorldGrid> {
    let request = DefaultGridRequest {
        width: request.width.or(Some(state.config.default_width)),
        height: request.height.or(Some(state.config.default_height)),
    };
    blocking(&state, move |engine| {
        engine.create_default_grid(&world_id, request)
    })
    .await
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DeleteResponse {
    pub deleted: bool,
}

async fn api_delete_grid(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
) -> ApiResult<DeleteResponse> {
    blocking(&state, move |engine| {
        Ok(DeleteResponse {
            deleted: engine.delete_grid(&world_id)?,
        })
    })
    .await
}

async fn api_get_cell(
    State(state): State<Arc<AppState>>,
    Path(cell_id): Path<String>,
) -> ApiResult<GridCell> {
    blocking(&state, move |engine| engine.get_cell(&cell_id)).await
}

async fn api_patch_cell(
    State(state): State<Arc<AppState>>,
    Path(cell_id): Path<String>,
    Json(patch): Json<CellPatch>,
) -> ApiResult<GridCell> {
    if patch.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "patch names no fields".to_string(),
        ));
    }
    blocking(&state, move |engine| engine.update_cell(&cell_id, &patch)).await
}

#[derive(Debug, Deserialize)]
pub struct DistancesQuery {
    pub from: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DistancesResponse {
    pub from: String,
    pub distances: BTreeMap<String, u32>,
}

async fn api_grid_distances(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    Query(q): Query<DistancesQuery>,
) -> ApiResult<DistancesResponse> {
    blocking(&state, move |engine| {
        let distances = engine.grid_distances(&world_id, &q.from)?;
        Ok(DistancesResponse {
            from: q.from,
            distances: distances.into_iter().collect(),
        })
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PathResponse {
    pub path: Option<Vec<String>>,
}

async fn api_grid_path(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    Query(q): Query<PathQuery>,
) -> ApiResult<PathResponse> {
    blocking(&state, move |engine| {
        Ok(PathResponse {
            path: engine.grid_path(&world_id, &q.from, &q.to)?,
        })
    })
    .await
}

pub async fn serve(addr: SocketAddr, db_path: PathBuf, config: ServerConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    serve_listener(listener, db_path, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown requested");
    })
    .await?;
    Ok(())
}

pub async fn serve_listener(
    listener: tokio::net::TcpListener,
    db_path: PathBuf,
    config: ServerConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<SocketAddr> {
    let engine = Engine::new(db_path);
    // Fail fast if the database cannot be opened or migrated.
    engine.open()?;
    let state = AppState { engine, config };
    let app = build_router(state);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "worldgrid server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(addr)
}

async fn ip_allowlist(
    axum::extract::ConnectInfo(peer): axum::extract::ConnectInfo<SocketAddr>,
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ip = peer.ip();
    if is_allowed_peer_ip(ip) {
        return next.run(req).await;
    }
    tracing::warn!(%ip, "rejected non-local peer");
    (StatusCode::FORBIDDEN, "forbidden").into_response()
}

fn is_allowed_peer_ip(ip: IpAddr) -> bool {
    if ip.is_loopback() {
        return true;
    }

    // Tailscale CGNAT range (100.64.0.0/10).
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 100 && (64..=127).contains(&o[1])
        }
        IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

fn local_only_cors() -> CorsLayer {
    use axum::http::header;
    use axum::http::HeaderValue;
    use axum::http::Method;

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _req| {
            is_allowed_local_origin(origin)
        }))
}

fn is_allowed_local_origin(origin: &axum::http::HeaderValue) -> bool {
    let Ok(s) = origin.to_str() else {
        return false;
    };
    is_http_origin_for_host(s, "localhost") || is_http_origin_for_host(s, "127.0.0.1")
}

fn is_http_origin_for_host(origin: &str, host: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = origin.strip_prefix(scheme) {
            if let Some(after) = rest.strip_prefix(host) {
                // scheme://host[:port] only
                return after.is_empty() || after.starts_with(':');
            }
        }
    }
    false
}
