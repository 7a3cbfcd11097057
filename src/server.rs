use crate::config::AppConfig;
use crate::controls::{self, Options, Selection, SelectionRequest};
use crate::data::TransactionTable;
use crate::processing::{self, FilterCriteria};
use crate::render::{self, PageView};
use crate::types::PipelineOutcome;
use anyhow::Result;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Read-only for the whole session; every request recomputes from it.
pub struct AppState {
    pub table: TransactionTable,
    pub config: AppConfig,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    code: String,
    message: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };
        (status, Json(ApiError { code: code.to_string(), message })).into_response()
    }
}

#[derive(Deserialize)]
pub struct OptionsQuery {
    #[serde(default)]
    municipality_search: String,
}

#[derive(Debug, Serialize)]
pub struct PointsResponse {
    criteria: Option<FilterCriteria>,
    result: PipelineOutcome,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/api/options", get(options_handler))
        .route("/api/points", get(points_handler))
        .route("/api/points.geojson", get(geojson_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, table: TransactionTable) -> Result<()> {
    let port = config.server.port;
    let state = Arc::new(AppState { table, config });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting viewer on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// Resolves the request and runs the pipeline. `None` criteria means the
// municipality search left nothing to select, which is shown as empty.
fn evaluate(
    state: &AppState,
    request: &SelectionRequest,
) -> Result<(Option<FilterCriteria>, PipelineOutcome), AppError> {
    let prefecture = &state.config.filters.prefecture;
    let selection = controls::resolve(&state.table, prefecture, request)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    match selection {
        Selection::Criteria(criteria) => {
            let outcome = processing::run(&state.table, &criteria);
            if outcome.is_empty() {
                warn!("No transactions match {:?}", criteria);
            }
            Ok((Some(criteria), outcome))
        }
        Selection::NoMunicipality => Ok((None, PipelineOutcome::Empty)),
    }
}

async fn page_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SelectionRequest>, QueryRejection>,
) -> Result<Html<String>, AppError> {
    let Query(request) = query?;
    let (criteria, outcome) = evaluate(&state, &request)?;
    let search = request.municipality_search.as_deref().unwrap_or("");
    let options = controls::options(&state.table, &state.config.filters.prefecture, search);

    let html = render::render_page(&PageView {
        options: &options,
        search,
        criteria: criteria.as_ref(),
        outcome: &outcome,
        map: &state.config.map,
        interactive: true,
    })
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Html(html))
}

async fn options_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OptionsQuery>,
) -> Json<Options> {
    Json(controls::options(
        &state.table,
        &state.config.filters.prefecture,
        &query.municipality_search,
    ))
}

async fn points_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SelectionRequest>, QueryRejection>,
) -> Result<Json<PointsResponse>, AppError> {
    let Query(request) = query?;
    let (criteria, outcome) = evaluate(&state, &request)?;
    Ok(Json(PointsResponse { criteria, result: outcome }))
}

async fn geojson_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SelectionRequest>, QueryRejection>,
) -> Result<Json<FeatureCollection>, AppError> {
    let Query(request) = query?;
    let (_, outcome) = evaluate(&state, &request)?;
    Ok(Json(render::to_feature_collection(&outcome)))
}
