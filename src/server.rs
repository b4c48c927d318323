// ABOUTME: HTTP binding for the export engine
// ABOUTME: Routes, basic-auth and CSV content negotiation middleware, streaming responses

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;

use crate::config::AuthConfig;
use crate::error::ExportError;
use crate::export::{spawn_export, ExportJob, ExportRequest};
use crate::store::Store;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Chunks buffered between the export task and the response body.
const CHANNEL_CAPACITY: usize = 16;

pub struct AppState<S> {
    pub store: Arc<S>,
    pub auth: Option<AuthConfig>,
}

impl<S> AppState<S> {
    pub fn new(store: S, auth: Option<AuthConfig>) -> Self {
        Self {
            store: Arc::new(store),
            auth,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    since: Option<String>,
    include_columns: Option<String>,
    exclude_columns: Option<String>,
}

/// Build the application router.
///
/// The two data routes sit behind basic auth and content negotiation;
/// the browser probes answer 404 without touching the store.
pub fn router<S: Store>(state: Arc<AppState<S>>) -> Router {
    let data_routes = Router::new()
        .route("/:database", get(list_tables_handler::<S>))
        .route("/:database/:table", get(export_rows_handler::<S>))
        .route_layer(middleware::from_fn(require_csv_acceptance))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth::<S>,
        ));

    Router::new()
        .route("/favicon.ico", get(not_found))
        .route("/index.html", get(not_found))
        .merge(data_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<S, F>(
    listener: tokio::net::TcpListener,
    state: Arc<AppState<S>>,
    shutdown: F,
) -> std::io::Result<()>
where
    S: Store,
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn list_tables_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(database): Path<String>,
) -> Response {
    let rx = spawn_export(
        state.store.clone(),
        ExportJob::ListTables { database },
        CHANNEL_CAPACITY,
    );
    csv_response(rx).await
}

async fn export_rows_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((database, table)): Path<(String, String)>,
    Query(params): Query<ExportParams>,
) -> Response {
    let request = ExportRequest {
        database,
        table,
        since: params.since,
        include_columns: params.include_columns,
        exclude_columns: params.exclude_columns,
    };
    let rx = spawn_export(
        state.store.clone(),
        ExportJob::Rows(request),
        CHANNEL_CAPACITY,
    );
    csv_response(rx).await
}

/// Wait for the first chunk so that any failure before the first byte
/// becomes a proper error response, then stream the rest.
async fn csv_response(mut rx: tokio::sync::mpsc::Receiver<Result<Bytes, ExportError>>) -> Response {
    let first = match rx.recv().await {
        None => Bytes::new(),
        Some(Ok(chunk)) => chunk,
        Some(Err(err)) => return error_response(err),
    };

    let rest = ReceiverStream::new(rx).map(|chunk| {
        chunk.map_err(|err| {
            tracing::error!("Export failed mid-stream: {}", err.detailed_message());
            std::io::Error::other(err.to_string())
        })
    });
    let stream = tokio_stream::once(Ok::<_, std::io::Error>(first)).chain(rest);

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(CSV_CONTENT_TYPE),
    );
    response
}

fn error_response(err: ExportError) -> Response {
    if err.is_client_error() {
        let status = match &err {
            ExportError::NoTimestampColumn { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        tracing::info!("Rejected request: {}", err);
        return text_response(status, format!("{}\n", err));
    }

    tracing::error!("{}", err.detailed_message());
    let body = json!({
        "error": err.kind(),
        "message": err.detailed_message(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn text_response(status: StatusCode, message: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        message,
    )
        .into_response()
}

async fn require_basic_auth<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(auth) = state.auth.as_ref() else {
        return next.run(request).await;
    };

    let authorized = basic_credentials(request.headers())
        .map(|(username, password)| auth.matches(&username, &password))
        .unwrap_or(false);
    if authorized {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::warn!("Login failed for {} when accessing {}", remote, request.uri());

    let mut response = text_response(StatusCode::UNAUTHORIZED, "Authentication failed\n".to_string());
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"change-exporter\""),
    );
    response
}

/// Decode `Authorization: Basic <base64(user:password)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

async fn require_csv_acceptance(request: Request, next: Next) -> Response {
    if accepts_csv(request.headers()) {
        return next.run(request).await;
    }
    text_response(
        StatusCode::NOT_ACCEPTABLE,
        format!("Only acceptable MIME types are: {}\n", CSV_CONTENT_TYPE),
    )
}

/// True when the `Accept` header admits `text/csv` with a non-zero quality.
/// A request without an `Accept` header accepts anything.
fn accepts_csv(headers: &HeaderMap) -> bool {
    let values: Vec<&str> = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();
    if values.is_empty() {
        return true;
    }

    values
        .iter()
        .flat_map(|value| value.split(','))
        .any(|range| {
            let mut parts = range.split(';');
            let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
            let quality = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .filter_map(|q| q.trim().parse::<f32>().ok())
                .next()
                .unwrap_or(1.0);
            quality > 0.0 && matches!(media.as_str(), "text/csv" | "text/*" | "*/*")
        })
}
