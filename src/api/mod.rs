pub mod metrics;

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::absences::{AbsencePatch, AbsenceStore};
use crate::assistant::{AgentRunner, AskRequest, AskResponse};
use crate::config::Config;
use crate::dates::{hour_of, now};
use crate::db::Database;
use crate::error::{BoxdeskError, Result};
use crate::interfaces::assistant::AssistantBackend;
use crate::providers::openai::OpenAiAssistantClient;
use crate::reservations::{ReservationPatch, ReservationStore, DEFAULT_RESERVED_BY};
use crate::threads::ThreadStore;
use crate::tools::absences::NO_UPCOMING_ABSENCES;
use crate::tools::booking::NO_UPCOMING_RESERVATIONS;
use crate::tools::default_registry;

pub const NO_RESERVATIONS: &str = "No reservations found.";

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub reservations: ReservationStore,
    pub absences: AbsenceStore,
    pub runner: Arc<AgentRunner>,
}

impl AppState {
    /// Wires stores, tool registry and runner around one database and backend.
    pub async fn new(
        db: Database,
        backend: Arc<dyn AssistantBackend>,
        assistant_id: impl Into<String>,
    ) -> Self {
        let reservations = ReservationStore::new(db.clone());
        let absences = AbsenceStore::new(db.clone());
        let registry =
            default_registry(reservations.clone(), absences.clone(), backend.clone()).await;
        let runner = AgentRunner::new(
            backend,
            ThreadStore::new(db.clone()),
            Arc::new(registry),
            assistant_id,
        );
        Self {
            db,
            reservations,
            absences,
            runner: Arc::new(runner),
        }
    }

    pub fn with_runner(mut self, runner: AgentRunner) -> Self {
        self.runner = Arc::new(runner);
        self
    }
}

/// Error body shared by every failing handler: `{"detail": "..."}`.
pub struct ApiError(BoxdeskError);

impl From<BoxdeskError> for ApiError {
    fn from(err: BoxdeskError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BoxdeskError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BoxdeskError::NotFound(_) => StatusCode::NOT_FOUND,
            BoxdeskError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BoxdeskError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    database: String,
}

#[derive(Deserialize)]
struct BookBoxRequest {
    date: String,
    hour: String,
    #[serde(default)]
    reserved_by: Option<String>,
}

#[derive(Deserialize)]
struct ReportAbsenceRequest {
    name: String,
    date: String,
}

#[derive(Deserialize)]
struct UpdateReservationQuery {
    res_id: i32,
    date: Option<String>,
    hour: Option<String>,
    reserved_by: Option<String>,
}

#[derive(Deserialize)]
struct UpdateAbsenceQuery {
    abs_id: i32,
    name: Option<String>,
    date: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics::serve_metrics))
        .route("/ask_agent", post(ask_agent))
        .route("/reservations", get(all_reservations))
        .route("/list_reservations", get(upcoming_reservations))
        .route("/book_box", post(book_box))
        .route("/update_reservation", put(update_reservation))
        .route("/absences", get(all_absences))
        .route("/list_absences", get(upcoming_absences))
        .route("/report_absence", post(report_absence))
        .route("/update_absence", put(update_absence))
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "boxdesk API online" }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                database: "ok".to_string(),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "database probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "error".to_string(),
                    database: "unavailable".to_string(),
                }),
            )
        }
    }
}

async fn ask_agent(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> ApiResult<Json<AskResponse>> {
    tracing::info!(user_id = %request.user_id, "ask_agent");
    Ok(Json(state.runner.ask(request).await?))
}

/// Lists keep the historical `[{"message": ...}]` shape when empty.
fn list_or_message<T: Serialize>(items: Vec<T>, empty: &str) -> Result<Json<Value>> {
    if items.is_empty() {
        return Ok(Json(json!([{ "message": empty }])));
    }
    Ok(Json(serde_json::to_value(items)?))
}

async fn all_reservations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let items = state.reservations.list_all().await?;
    Ok(list_or_message(items, NO_RESERVATIONS)?)
}

async fn upcoming_reservations(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let now = now();
    let items = state
        .reservations
        .list_upcoming(now.date(), &hour_of(now))
        .await?;
    Ok(list_or_message(items, NO_UPCOMING_RESERVATIONS)?)
}

async fn book_box(
    State(state): State<AppState>,
    Json(request): Json<BookBoxRequest>,
) -> ApiResult<Json<&'static str>> {
    let reserved_by = request.reserved_by.as_deref().unwrap_or(DEFAULT_RESERVED_BY);
    state
        .reservations
        .create(&request.date, &request.hour, reserved_by)
        .await?;
    Ok(Json("done"))
}

async fn update_reservation(
    State(state): State<AppState>,
    Query(query): Query<UpdateReservationQuery>,
) -> ApiResult<Json<Value>> {
    let patch = ReservationPatch {
        date: query.date,
        hour: query.hour,
        reserved_by: query.reserved_by,
    };
    state.reservations.update(query.res_id, patch).await?;
    Ok(Json(json!({ "message": "Reservation updated" })))
}

async fn all_absences(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let items = state.absences.list_all().await?;
    Ok(Json(serde_json::to_value(items).map_err(BoxdeskError::from)?))
}

async fn upcoming_absences(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let items = state.absences.list_upcoming(now().date()).await?;
    Ok(list_or_message(items, NO_UPCOMING_ABSENCES)?)
}

async fn report_absence(
    State(state): State<AppState>,
    Json(request): Json<ReportAbsenceRequest>,
) -> ApiResult<Json<&'static str>> {
    state.absences.create(&request.name, &request.date).await?;
    Ok(Json("done"))
}

async fn update_absence(
    State(state): State<AppState>,
    Query(query): Query<UpdateAbsenceQuery>,
) -> ApiResult<Json<Value>> {
    let patch = AbsencePatch {
        name: query.name,
        date: query.date,
    };
    state.absences.update(query.abs_id, patch).await?;
    Ok(Json(json!({ "message": "Absence updated" })))
}

pub async fn run(config: Config) -> Result<()> {
    run_with_shutdown(config, shutdown_signal()).await
}

pub async fn run_with_shutdown<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let api_key = config.require_openai_key()?;
    let assistant_id = config.require_assistant_id()?.to_string();
    let backend: Arc<dyn AssistantBackend> = Arc::new(OpenAiAssistantClient::new(
        api_key,
        Some(config.openai.base_url.clone()),
        Some(config.openai.image_model.clone()),
    )?);

    metrics::init_metrics();
    let db = Database::open(&config.database.path).await?;
    let state = AppState::new(db, backend, assistant_id).await;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
    tracing::info!(%addr, env = config.env.as_str(), db = %config.database.path, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))
}

/// Resolves on ctrl-c, or on SIGTERM where available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
}
