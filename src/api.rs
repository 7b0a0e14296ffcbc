use crate::config::RelayConfig;
use crate::errors::{DaemonError, Result};
use crate::relay::{self, FrontendOrigin, HubHandle, HubStats, OriginClassifier};
use axum::{
    extract::{ws::WebSocketUpgrade, Json, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Relay server state
#[derive(Clone)]
pub struct RelayState {
    pub hub: HubHandle,
    pub classifier: Arc<dyn OriginClassifier>,
    pub records: Arc<RecordStore>,
    /// Exact origin allowed by CORS besides localhost
    pub frontend_origin: String,
    pub start_time: std::time::Instant,
}

impl RelayState {
    /// Spawns the hub, so this must run inside a tokio runtime
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            hub: HubHandle::spawn(),
            classifier: Arc::new(FrontendOrigin::new(config.frontend_origin.clone())),
            records: Arc::new(RecordStore::default()),
            frontend_origin: config.frontend_origin.clone(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Named record kept by the relay's CRUD boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub col_id: u64,
    pub col_name: String,
}

/// In-memory record table with generated ids
#[derive(Debug, Default)]
pub struct RecordStore {
    records: RwLock<BTreeMap<u64, Record>>,
}

impl RecordStore {
    pub async fn get(&self, id: u64) -> Option<Record> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn create(&self, name: String) -> Record {
        let mut records = self.records.write().await;
        let col_id = records.keys().next_back().map_or(1, |last| last + 1);
        let record = Record { col_id, col_name: name };
        records.insert(col_id, record.clone());
        record
    }
}

#[derive(Debug, Deserialize)]
pub struct GetUserQuery {
    #[serde(rename = "transacID")]
    pub transac_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(rename = "UserName")]
    pub user_name: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Open channels by origin class
    pub channels: HubStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let error_string = self.to_string();
        let (status, message) = match self {
            DaemonError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            DaemonError::Config(msg) => (StatusCode::BAD_REQUEST, msg),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            details: Some(error_string),
        });

        (status, body).into_response()
    }
}

/// GET / - Relay channel upgrade. The class is fixed at accept time.
async fn handle_channel(
    State(state): State<RelayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let class = state.classifier.classify(&headers);
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| relay::handle_socket(socket, class, hub))
}

/// GET /health - Relay liveness and channel counts
async fn handle_health(State(state): State<RelayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        channels: state.hub.stats().await,
    })
}

/// GET /masterList/getUser?transacID= - One record, or `null`
async fn handle_get_user(
    State(state): State<RelayState>,
    Query(query): Query<GetUserQuery>,
) -> Json<Option<Record>> {
    debug!("Record lookup: {:?}", query.transac_id);

    // Unknown or malformed ids read as "no such record"
    let record = match query.transac_id.and_then(|id| id.trim().parse::<u64>().ok()) {
        Some(id) => state.records.get(id).await,
        None => None,
    };

    Json(record)
}

/// POST /masterList/create - New record from `{UserName}`
async fn handle_create_user(
    State(state): State<RelayState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<Record>> {
    let name = request
        .user_name
        .ok_or_else(|| DaemonError::InvalidRequest("UserName is required".to_string()))?;

    let record = state.records.create(name).await;
    info!("Record created: {}", record.col_id);
    Ok(Json(record))
}

/// Create relay router
pub fn create_router(state: RelayState) -> Router {
    let frontend = state.frontend_origin.clone();

    Router::new()
        .route("/", get(handle_channel))
        .route("/health", get(handle_health))
        .route("/masterList/getUser", get(handle_get_user))
        .route("/masterList/create", post(handle_create_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(AllowOrigin::predicate(move |origin, _| {
                            let o = origin.as_bytes();
                            o.starts_with(b"http://localhost")
                                || o.starts_with(b"https://localhost")
                                || o.starts_with(b"http://127.0.0.1")
                                || o == frontend.as_bytes()
                        }))
                        .allow_methods([
                            axum::http::Method::GET,
                            axum::http::Method::POST,
                            axum::http::Method::OPTIONS,
                        ])
                        .allow_headers(tower_http::cors::Any),
                ),
        )
        .with_state(state)
}

/// Serve the relay on an already-bound listener
pub async fn serve(listener: TcpListener, state: RelayState) -> Result<()> {
    let router = create_router(state);

    axum::serve(listener, router).await.map_err(|e| {
        error!("Relay server error: {}", e);
        DaemonError::Relay(e.to_string())
    })
}

/// Start relay server
pub async fn start_relay_server(config: &RelayConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| DaemonError::Relay(format!("Bind {} failed: {}", config.listen_addr, e)))?;

    info!("Server is listening on {}", config.listen_addr);
    serve(listener, RelayState::new(config)).await
}
