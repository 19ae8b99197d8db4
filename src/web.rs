use crate::app::{
    engine::{AlchemistResponse, ConceptsResponse, ResultKind, StatusResponse},
    trends::TrendsOutcome,
    AppError, SearchEngine, SearchOutcome, TextQuery,
};
use crate::semantic::FormulaStep;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    engine: Arc<SearchEngine>,
}

pub fn router(engine: Arc<SearchEngine>) -> Router {
    let shared_state = Arc::new(SharedState { engine });

    let api = Router::new()
        .route("/search", get(search))
        .route("/alchemist", post(alchemist))
        .route("/alchemist/concepts", get(concepts))
        .route("/status", get(status))
        .route("/trends", get(trends));

    // served both at the root and under /api
    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(
            tower::ServiceBuilder::new().layer(
                tower_http::trace::TraceLayer::new_for_http()
                    .make_span_with(
                        tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                    )
                    .on_response(
                        tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                    ),
            ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(engine: Arc<SearchEngine>, listen: &str) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(engine: SearchEngine, listen: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(Arc::new(engine), listen).await })
}

#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": self.0.to_string()})),
            ),
            _ => {
                log::error!("{self:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Comma separated flavor keywords
    pub flavors: Option<String>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<SearchParams>,
) -> Result<axum::response::Response, HttpError> {
    log::debug!("params: {params:?}");

    let engine = state.engine.clone();
    let text = TextQuery::parse(params.q, params.flavors);

    let outcome = tokio::task::block_in_place(move || engine.search_text(&text))?;

    let status = match &outcome {
        SearchOutcome::Results(response) if response.kind == ResultKind::Error => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::OK,
    };

    Ok((status, Json(outcome)).into_response())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlchemistRequest {
    /// Absent and `null` are both an empty formula
    #[serde(default)]
    pub formula: Option<Vec<FormulaStep>>,
}

async fn alchemist(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<AlchemistRequest>,
) -> Result<Json<AlchemistResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let engine = state.engine.clone();
    let formula = payload.formula.unwrap_or_default();

    tokio::task::block_in_place(move || {
        engine
            .alchemist(&formula)
            .map(Into::into)
            .map_err(Into::into)
    })
}

async fn concepts(State(state): State<Arc<SharedState>>) -> Json<ConceptsResponse> {
    state.engine.concepts().into()
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<StatusResponse> {
    let engine = state.engine.clone();
    tokio::task::block_in_place(move || engine.status().into())
}

async fn trends(
    State(state): State<Arc<SharedState>>,
) -> Result<Json<TrendsOutcome>, HttpError> {
    let engine = state.engine.clone();
    tokio::task::block_in_place(move || engine.trends().map(Into::into).map_err(Into::into))
}
