//! HTTP/JSON gateway over the log service

use std::future::Future;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use logline_core::VersionedKvStore;
use logline_service::{
    BatchCreateLogLinesRequest, BatchCreateLogLinesResponse, CountResponse, CreateLogLineRequest,
    CreateLogLineResponse, LogLineHistories, LogLineView, LogLines, LogService, ServiceError,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Error response: `{"error": "..."}` with a matching status code
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

/// Query string of `GET /v1/logs/prefix`; a missing prefix matches every key
#[derive(Debug, Default, Deserialize)]
struct PrefixQuery {
    #[serde(default)]
    prefix: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the gateway router
///
/// | Method | Path                          |
/// |--------|-------------------------------|
/// | POST   | `/v1/logs`                    |
/// | POST   | `/v1/logs/batch`              |
/// | GET    | `/v1/logs/count`              |
/// | GET    | `/v1/logs/key/{key}`          |
/// | GET    | `/v1/logs/prefix?prefix=...`  |
/// | GET    | `/v1/logs/prefix/{prefix}`    |
/// | GET    | `/v1/logs/bucket/{bucket}`    |
/// | GET    | `/v1/logs/history`            |
/// | GET    | `/v1/logs/history/last/{n}`   |
pub fn router<S>(service: LogService<S>) -> Router
where
    S: VersionedKvStore + 'static,
{
    Router::new()
        .route("/v1/logs", post(create_log_line::<S>))
        .route("/v1/logs/batch", post(batch_create_log_lines::<S>))
        .route("/v1/logs/count", get(count::<S>))
        .route("/v1/logs/key/{key}", get(by_key::<S>))
        .route("/v1/logs/prefix", get(by_prefix_query::<S>))
        .route("/v1/logs/prefix/{prefix}", get(by_prefix::<S>))
        .route("/v1/logs/bucket/{bucket}", get(by_bucket::<S>))
        .route("/v1/logs/history", get(all_history::<S>))
        .route("/v1/logs/history/last/{n}", get(last_n_history::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve `app` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Log line gateway listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Log line gateway shut down");
    Ok(())
}

async fn create_log_line<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    payload: Result<Json<CreateLogLineRequest>, JsonRejection>,
) -> ApiResult<CreateLogLineResponse> {
    let Json(request) = payload?;
    Ok(Json(service.create_log_line(&request).await?))
}

async fn batch_create_log_lines<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    payload: Result<Json<BatchCreateLogLinesRequest>, JsonRejection>,
) -> ApiResult<BatchCreateLogLinesResponse> {
    let Json(request) = payload?;
    Ok(Json(service.batch_create_log_lines(&request).await?))
}

async fn count<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
) -> ApiResult<CountResponse> {
    Ok(Json(service.get_log_line_count().await?))
}

async fn by_key<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    key: Result<Path<String>, PathRejection>,
) -> ApiResult<LogLineView> {
    let Path(key) = key?;
    Ok(Json(service.get_log_line_by_key(&key).await?))
}

async fn by_prefix<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    prefix: Result<Path<String>, PathRejection>,
) -> ApiResult<LogLines> {
    let Path(prefix) = prefix?;
    Ok(Json(service.get_log_lines_by_prefix(&prefix).await?))
}

async fn by_prefix_query<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    query: Result<Query<PrefixQuery>, QueryRejection>,
) -> ApiResult<LogLines> {
    let Query(query) = query?;
    Ok(Json(service.get_log_lines_by_prefix(&query.prefix).await?))
}

async fn by_bucket<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    bucket: Result<Path<String>, PathRejection>,
) -> ApiResult<LogLines> {
    let Path(bucket) = bucket?;
    Ok(Json(service.get_log_lines_by_bucket(&bucket).await?))
}

async fn all_history<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
) -> ApiResult<LogLineHistories> {
    Ok(Json(service.get_all_log_lines_history().await?))
}

async fn last_n_history<S: VersionedKvStore + 'static>(
    State(service): State<LogService<S>>,
    n: Result<Path<usize>, PathRejection>,
) -> ApiResult<LogLineHistories> {
    let Path(n) = n?;
    Ok(Json(service.get_last_n_log_lines_history(n).await?))
}
