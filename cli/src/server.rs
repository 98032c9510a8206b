use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use petgraph::visit::EdgeRef;
use routemap_core::engine::{EngineStatus, SelectionDetail, TopologyEngine};
use routemap_core::error::EngineError;
use routemap_core::graph::{EdgeStats, Node};
use routemap_core::layout::{LayoutMode, LayoutPosition};
use routemap_core::record::PathRecord;
use routemap_core::signature::{RankOrder, RouteGroup};
use routemap_core::{Config, StreamChanges};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// One named record buffer with its own engine. Workspaces are isolated
/// from each other; a refresh in one never touches another.
struct Workspace {
    records: Vec<PathRecord>,
    engine: TopologyEngine,
}

impl Workspace {
    fn new(config: Config) -> Self {
        Self {
            records: Vec::new(),
            engine: TopologyEngine::new(config),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    workspaces: Arc<DashMap<String, Arc<RwLock<Workspace>>>>,
}

impl AppState {
    /// Fetch an existing workspace. GET endpoints never create.
    fn workspace(&self, name: &str) -> Result<Arc<RwLock<Workspace>>, EngineError> {
        self.workspaces
            .get(name)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| EngineError::WorkspaceNotFound(name.to_string()))
    }

    /// Fetch or create a workspace. Ingest is the only creation path.
    fn workspace_or_create(&self, name: &str) -> Arc<RwLock<Workspace>> {
        Arc::clone(
            &self
                .workspaces
                .entry(name.to_string())
                .or_insert_with(|| {
                    tracing::info!(workspace = name, "workspace created");
                    Arc::new(RwLock::new(Workspace::new((*self.config).clone())))
                }),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RecordBatch {
    records: Vec<PathRecord>,
}

#[derive(Debug, Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<String> {
    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse<String>>);

/// Missing-entity lookups surface as typed engine errors and map to 404.
fn engine_error(err: EngineError) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(err.to_string())))
}

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error(message)))
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(message)))
}

pub async fn start_server(config: Config) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_target(config.logging.include_modules)
        .with_max_level(log_level)
        .compact()
        .init();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(init_state(config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "\n🗺  Routemap Server Started!\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n   🌐 Server:    http://{}\n   📥 Ingest:    http://{}/api/workspaces/:ws/records\n   🕸  Graph:     http://{}/api/workspaces/:ws/graph\n   🧭 Layout:    http://{}/api/workspaces/:ws/layout\n   🛣  Routes:    http://{}/api/workspaces/:ws/routes\n   🔀 Changes:   http://{}/api/workspaces/:ws/changes/:agent\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n✨ Ready to map routes!\n",
        addr, addr, addr, addr, addr, addr
    );

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn init_state(config: Config) -> AppState {
    AppState {
        config: Arc::new(config),
        workspaces: Arc::new(DashMap::new()),
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/api/workspaces/:ws/records", post(ingest_records_handler))
        .route("/api/workspaces/:ws/graph", get(graph_handler))
        .route("/api/workspaces/:ws/layout", get(layout_handler))
        .route("/api/workspaces/:ws/routes", get(routes_handler))
        .route("/api/workspaces/:ws/changes/:agent", get(changes_handler))
        .route("/api/workspaces/:ws/nodes/:node_id", get(node_handler))
        .layer(cors)
        .with_state(state)
}

fn build_cors(config: &Config) -> CorsLayer {
    if config.server.cors_enabled {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(ApiResponse::success("ok".to_string()))
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    version: String,
    workspace_count: usize,
    workspaces: HashMap<String, EngineStatus>,
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut workspaces = HashMap::new();
    for entry in state.workspaces.iter() {
        let workspace = entry.value().read().await;
        workspaces.insert(entry.key().clone(), workspace.engine.status());
    }

    let status = ServerStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        workspace_count: workspaces.len(),
        workspaces,
    };

    Json(ApiResponse::success(status))
}

#[derive(Debug, Serialize)]
struct IngestSummary {
    accepted: usize,
    record_count: usize,
    skipped_records: usize,
    node_count: usize,
    edge_count: usize,
}

async fn ingest_records_handler(
    State(state): State<AppState>,
    Path(ws): Path<String>,
    Json(batch): Json<RecordBatch>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = batch.records.len();
    let workspace = state.workspace_or_create(&ws);
    let mut workspace = workspace.write().await;
    let workspace = &mut *workspace;

    workspace.records.extend(batch.records);
    // The buffer itself is kept inside the ingest window; refresh prunes
    // only its own copy, so an unpruned buffer would grow forever.
    workspace.engine.prune_window(&mut workspace.records);
    let mode = workspace.engine.layout_mode();
    let snapshot = workspace.engine.refresh(workspace.records.clone(), mode);

    tracing::info!(
        workspace = %ws,
        accepted,
        records = snapshot.record_count,
        "record batch ingested"
    );

    Ok(Json(ApiResponse::success(IngestSummary {
        accepted,
        record_count: snapshot.record_count,
        skipped_records: snapshot.skipped_records,
        node_count: snapshot.graph.node_count(),
        edge_count: snapshot.graph.edge_count(),
    })))
}

#[derive(Debug, Serialize)]
struct EdgeView {
    source: String,
    target: String,
    #[serde(flatten)]
    stats: EdgeStats,
}

#[derive(Debug, Serialize)]
struct GraphView {
    nodes: Vec<Node>,
    edges: Vec<EdgeView>,
    record_count: usize,
    skipped_records: usize,
}

async fn graph_handler(
    State(state): State<AppState>,
    Path(ws): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspace(&ws).map_err(engine_error)?;
    let workspace = workspace.read().await;
    let snapshot = workspace.engine.snapshot();

    let inner = snapshot.graph.graph();
    let mut nodes: Vec<Node> = inner.node_weights().cloned().collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));

    let mut edges: Vec<EdgeView> = inner
        .edge_references()
        .map(|edge| EdgeView {
            source: inner[edge.source()].id.clone(),
            target: inner[edge.target()].id.clone(),
            stats: edge.weight().clone(),
        })
        .collect();
    edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

    Ok(Json(ApiResponse::success(GraphView {
        nodes,
        edges,
        record_count: snapshot.record_count,
        skipped_records: snapshot.skipped_records,
    })))
}

#[derive(Debug, Serialize)]
struct LayoutView {
    mode: LayoutMode,
    positions: HashMap<String, LayoutPosition>,
}

async fn layout_handler(
    State(state): State<AppState>,
    Path(ws): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspace(&ws).map_err(engine_error)?;
    let mut workspace = workspace.write().await;

    let mode = match params.get("mode").map(String::as_str) {
        Some("force") => LayoutMode::Force,
        Some("hierarchical") | None => LayoutMode::Hierarchical,
        Some(other) => {
            return Err(bad_request(format!("Unknown layout mode: {}", other)));
        }
    };

    let positions = if mode == workspace.engine.layout_mode() {
        workspace.engine.layout().clone()
    } else {
        workspace.engine.relayout(mode).clone()
    };

    Ok(Json(ApiResponse::success(LayoutView { mode, positions })))
}

#[derive(Debug, Serialize)]
struct RouteGroupView {
    #[serde(flatten)]
    group: RouteGroup,
    /// Derived from the configured loss threshold at response time.
    has_issue: bool,
}

#[derive(Debug, Serialize)]
struct RoutesView {
    group_count: usize,
    groups: Vec<RouteGroupView>,
}

async fn routes_handler(
    State(state): State<AppState>,
    Path(ws): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspace(&ws).map_err(engine_error)?;
    let workspace = workspace.read().await;

    let order = match params.get("order").map(String::as_str) {
        Some("detail") => RankOrder::Detail,
        Some("summary") | None => RankOrder::Summary,
        Some(other) => {
            return Err(bad_request(format!("Unknown route order: {}", other)));
        }
    };

    let issue_loss_pct = workspace.engine.config().routes.issue_loss_pct;
    let groups: Vec<RouteGroupView> = workspace
        .engine
        .ranked_groups(order)
        .into_iter()
        .map(|group| RouteGroupView {
            has_issue: group.has_issue(issue_loss_pct),
            group,
        })
        .collect();

    Ok(Json(ApiResponse::success(RoutesView {
        group_count: groups.len(),
        groups,
    })))
}

async fn changes_handler(
    State(state): State<AppState>,
    Path((ws, agent)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspace(&ws).map_err(engine_error)?;
    let workspace = workspace.read().await;

    let changes: StreamChanges = workspace
        .engine
        .changes_for_agent(&agent)
        .cloned()
        .ok_or_else(|| not_found(format!("Agent '{}' not found", agent)))?;

    Ok(Json(ApiResponse::success(changes)))
}

async fn node_handler(
    State(state): State<AppState>,
    Path((ws, node_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace = state.workspace(&ws).map_err(engine_error)?;
    let workspace = workspace.read().await;

    let detail: SelectionDetail = workspace
        .engine
        .select(&node_id)
        .ok_or_else(|| engine_error(EngineError::NodeNotFound(node_id.clone())))?;

    Ok(Json(ApiResponse::success(detail)))
}
