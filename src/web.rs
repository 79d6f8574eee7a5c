use crate::{
    eid::JobId,
    semantic::{
        AlbumId, AlbumIndexState, AlbumScope, EncodeError, EncodeOptions, JobProgress, PhotoId,
        RankedPhoto, SearchError, SearchService,
    },
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<SearchService>,
}

pub fn router(service: Arc<SearchService>) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/api/albums/index", post(index_album))
        .route("/api/albums/index/batch", post(index_albums))
        .route("/api/albums/:id", get(album_state))
        .route("/api/jobs", get(jobs))
        .route("/api/jobs/cancel", post(cancel_job))
        .route("/api/jobs/:id", get(job))
        .route("/api/search", post(search))
        .route("/api/search/similar", post(search_similar))
        .route("/api/photos/remove", post(remove_photo))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

/// Serve the API until Ctrl+C or SIGTERM. Active jobs are cancelled on the
/// way out.
pub async fn serve(service: Arc<SearchService>, listen: SocketAddr) -> anyhow::Result<()> {
    let signal = shutdown_signal(service.clone());
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await?;
    Ok(())
}

async fn shutdown_signal(service: Arc<SearchService>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install signal handler: {e}");
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

    let active = service.pipeline().active_jobs();
    if !active.is_empty() {
        log::warn!("cancelling {} active jobs", active.len());
    }
    for progress in active {
        service.cancel(&progress.job_id);
    }
}

#[derive(Debug)]
struct HttpError(SearchError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            SearchError::EmptyQuery => axum::http::StatusCode::BAD_REQUEST,
            SearchError::PhotoNotIndexed(_) => axum::http::StatusCode::NOT_FOUND,
            SearchError::PhotoSource(crate::gallery::PhotoSourceError::NotFound(_)) => {
                axum::http::StatusCode::NOT_FOUND
            }
            SearchError::PhotoSource(crate::gallery::PhotoSourceError::InvalidId(_)) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            SearchError::Encode(EncodeError::ModelLoad(_)) => {
                log::error!("{self:?}");
                axum::http::StatusCode::SERVICE_UNAVAILABLE
            }
            _ => {
                log::error!("{self:?}");
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<SearchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexAlbumRequest {
    pub album_id: AlbumId,
    pub photo_ids: Option<Vec<PhotoId>>,

    /// Re-encode photos that already have an embedding.
    #[serde(default)]
    pub reencode: bool,
}

async fn index_album(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IndexAlbumRequest>,
) -> Result<Json<JobProgress>, HttpError> {
    log::debug!("payload: {payload:?}");

    let options = EncodeOptions {
        reencode: payload.reencode,
        ..Default::default()
    };
    let handle = state
        .service
        .encode_album(payload.album_id, payload.photo_ids, options)
        .await?;

    Ok(Json(handle.progress()))
}

#[derive(Debug, Deserialize)]
pub struct IndexAlbumsRequest {
    pub album_ids: Vec<AlbumId>,
    #[serde(default)]
    pub reencode: bool,
}

/// One job per distinct album; albums already being indexed report their
/// running job.
async fn index_albums(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<IndexAlbumsRequest>,
) -> Result<Json<Vec<JobProgress>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let options = EncodeOptions {
        reencode: payload.reencode,
        ..Default::default()
    };
    let handles = state
        .service
        .encode_albums(payload.album_ids, options)
        .await?;

    Ok(Json(handles.iter().map(|h| h.progress()).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CancelJobRequest {
    pub job_id: JobId,
}

async fn cancel_job(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CancelJobRequest>,
) -> Json<serde_json::Value> {
    let cancelled = state.service.cancel(&payload.job_id);
    Json(json!({ "cancelled": cancelled }))
}

#[derive(Debug, Serialize)]
pub struct JobsResponse {
    pub active: Vec<JobProgress>,
    pub recent: Vec<JobProgress>,
}

async fn jobs(State(state): State<Arc<SharedState>>) -> Json<JobsResponse> {
    let pipeline = state.service.pipeline();
    Json(JobsResponse {
        active: pipeline.active_jobs(),
        recent: pipeline.history(),
    })
}

async fn job(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<JobProgress>, axum::response::Response> {
    state.service.job(&JobId::from(id)).map(Json).ok_or_else(|| {
        (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({"error": "job not found"})),
        )
            .into_response()
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub albums: Vec<AlbumId>,
    pub top_k: Option<usize>,
    pub min_score: Option<f32>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<RankedPhoto>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let scope = AlbumScope::from_albums(payload.albums);
    let results = state
        .service
        .search(&payload.query, &scope, payload.top_k, payload.min_score)
        .await?;

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct SimilarRequest {
    pub photo_id: PhotoId,
    #[serde(default)]
    pub albums: Vec<AlbumId>,
    pub top_k: Option<usize>,
}

async fn search_similar(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SimilarRequest>,
) -> Result<Json<Vec<RankedPhoto>>, HttpError> {
    let scope = AlbumScope::from_albums(payload.albums);
    let results = state
        .service
        .search_by_photo(&payload.photo_id, &scope, payload.top_k)
        .await?;

    Ok(Json(results))
}

async fn album_state(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<AlbumIndexState>, HttpError> {
    Ok(Json(state.service.album_state(&AlbumId::new(id)).await?))
}

#[derive(Debug, Deserialize)]
pub struct RemovePhotoRequest {
    pub photo_id: PhotoId,
}

async fn remove_photo(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RemovePhotoRequest>,
) -> Result<Json<serde_json::Value>, HttpError> {
    let removed = state.service.remove_photo(&payload.photo_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
