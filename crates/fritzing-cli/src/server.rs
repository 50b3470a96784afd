//! HTTP API server.
//!
//! One hyper http1 connection task per client over a shared `Services`
//! handle. The database is connected before the listener binds and closed
//! (journals checkpointed) after ctrl-c.
//!
//! Error bodies use a `detail` field; anything the services cannot handle
//! becomes a 500 with `{"message": "Internal server error", "detail": ...}`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
};
use hyper::http::response::Builder;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use url::form_urlencoded;

use fritzing_catalog::{CatalogError, PartQuery, ProjectQuery, Services, DEFAULT_LIMIT, MAX_LIMIT};
use fritzing_model::{PartCreate, PartUpdate, ProjectCreate, ProjectUpdate};
use fritzing_storage::Database;

use crate::ServeArgs;

type HttpResponse = Response<Full<Bytes>>;

const PART_NOT_FOUND: &str = "Part not found";
const PROJECT_NOT_FOUND: &str = "Project not found";
const SERVICE_NAME: &str = "fritzing-editor-api";

pub(crate) fn cmd_serve(args: ServeArgs) -> Result<()> {
    let rt = crate::runtime()?;
    rt.block_on(async move { serve_async(args).await })
}

async fn serve_async(args: ServeArgs) -> Result<()> {
    let config = args.store.config();
    let db = Database::connect(&config)
        .with_context(|| format!("serve: failed to open database `{}`", config.db_name))?;
    let state = Arc::new(
        Services::open(&db, &args.parts_dir).context("serve: failed to open collections")?,
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {}: {e}", args.listen))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;

    tracing::info!(
        addr = %bound,
        parts_dir = %args.parts_dir.display(),
        db = %config.db_name,
        "listening on http://{bound}"
    );
    if let Some(path) = args.ready_file.as_ref() {
        write_ready_file(path, bound);
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => break Err(anyhow!("serve: accept failed: {e}")),
                };
                let io = TokioIo::new(stream);
                let state = state.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle_request(req, state.clone()));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(peer = %peer, error = %e, "connection error");
                    }
                });
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                }
                tracing::info!("shutting down");
                break Ok(());
            }
        }
    };

    db.close().context("serve: failed to close database")?;
    result
}

fn write_ready_file(path: &Path, bound: SocketAddr) {
    let payload = serde_json::json!({
        "version": "fritzing_server_ready_v1",
        "addr": bound.to_string(),
        "pid": std::process::id(),
    });
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, serde_json::to_string_pretty(&payload).unwrap_or_default()) {
        tracing::warn!(path = %path.display(), error = %e, "failed to write ready file");
    }
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    ApiRoot,
    Health,
    Parts,
    PartFamilies,
    LoadParts,
    Part(&'a str),
    Projects,
    Project(&'a str),
    DuplicateProject(&'a str),
}

impl<'a> Route<'a> {
    /// Empty segments are ignored, so trailing slashes are accepted.
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let route = match segments.as_slice() {
            ["api"] => Route::ApiRoot,
            ["api", "health"] => Route::Health,
            ["api", "parts"] => Route::Parts,
            ["api", "parts", "families"] => Route::PartFamilies,
            ["api", "parts", "load-fritzing-parts"] => Route::LoadParts,
            ["api", "parts", id] => Route::Part(id),
            ["api", "projects"] => Route::Projects,
            ["api", "projects", id] => Route::Project(id),
            ["api", "projects", id, "duplicate"] => Route::DuplicateProject(id),
            _ => return None,
        };
        Some(route)
    }

    /// `families` and `load-fritzing-parts` only claim their own method;
    /// any other method addresses a part with that id.
    fn for_method(self, method: &Method) -> Self {
        match self {
            Route::PartFamilies if *method != Method::GET => Route::Part("families"),
            Route::LoadParts if *method != Method::POST => Route::Part("load-fritzing-parts"),
            route => route,
        }
    }
}

#[derive(Debug)]
enum ApiError {
    NotFound(&'static str),
    MethodNotAllowed,
    Unprocessable(String),
    Internal(String),
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(e) => ApiError::Unprocessable(e.to_string()),
            CatalogError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl ApiError {
    fn into_response(self) -> HttpResponse {
        match self {
            ApiError::NotFound(detail) => json_error(StatusCode::NOT_FOUND, detail),
            ApiError::MethodNotAllowed => {
                json_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
            }
            ApiError::Unprocessable(detail) => json_error(StatusCode::UNPROCESSABLE_ENTITY, &detail),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "unhandled error");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &serde_json::json!({ "message": "Internal server error", "detail": detail }),
                )
            }
        }
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<Services>,
) -> Result<HttpResponse, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = query_params(req.uri().query());

    if method == Method::OPTIONS {
        return Ok(preflight_response());
    }
    let Some(route) = Route::parse(&path).map(|r| r.for_method(&method)) else {
        return Ok(json_error(StatusCode::NOT_FOUND, "Not Found"));
    };

    let body = if method == Method::POST || method == Method::PUT {
        req.into_body().collect().await?.to_bytes()
    } else {
        Bytes::new()
    };

    let resp = match dispatch(&state, &method, route, &query, &body).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    };
    tracing::debug!(%method, %path, status = resp.status().as_u16(), "request");
    Ok(resp)
}

async fn dispatch(
    state: &Services,
    method: &Method,
    route: Route<'_>,
    query: &HashMap<String, String>,
    body: &[u8],
) -> ApiResult {
    match (route, method) {
        (Route::ApiRoot, &Method::GET) => ok(&serde_json::json!({
            "message": "Fritzing Editor API is running",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        (Route::Health, &Method::GET) => ok(&serde_json::json!({
            "status": "healthy",
            "service": SERVICE_NAME,
        })),

        (Route::Parts, &Method::GET) => {
            let part_query = PartQuery {
                skip: usize_param(query, "skip", 0, 0..=usize::MAX)?,
                limit: usize_param(query, "limit", DEFAULT_LIMIT, 1..=MAX_LIMIT)?,
                search: query.get("search").cloned(),
                family: query.get("family").cloned(),
            };
            ok(&state.parts.list_parts(&part_query).await?)
        }
        (Route::Parts, &Method::POST) => {
            let data: PartCreate = parse_body(body)?;
            ok(&state.parts.create_part(data).await?)
        }
        (Route::PartFamilies, &Method::GET) => ok(&state.parts.part_families().await?),
        (Route::LoadParts, &Method::POST) => {
            let force_reload = bool_param(query, "force_reload")?.unwrap_or(false);
            let summary = state.parts.load_fritzing_parts(force_reload).await?;
            ok(&serde_json::json!({
                "message": format!("Successfully loaded {} parts", summary.parts_loaded),
                "parts_loaded": summary.parts_loaded,
            }))
        }
        (Route::Part(id), &Method::GET) => found(state.parts.get_part(id).await?, PART_NOT_FOUND),
        (Route::Part(id), &Method::PUT) => {
            let update: PartUpdate = parse_body(body)?;
            found(state.parts.update_part(id, update).await?, PART_NOT_FOUND)
        }
        (Route::Part(id), &Method::DELETE) => deleted(
            state.parts.delete_part(id).await?,
            "Part deleted successfully",
            PART_NOT_FOUND,
        ),

        (Route::Projects, &Method::GET) => {
            let project_query = ProjectQuery {
                skip: usize_param(query, "skip", 0, 0..=usize::MAX)?,
                limit: usize_param(query, "limit", DEFAULT_LIMIT, 1..=MAX_LIMIT)?,
            };
            ok(&state.projects.list_projects(&project_query).await?)
        }
        (Route::Projects, &Method::POST) => {
            let data: ProjectCreate = parse_body(body)?;
            ok(&state.projects.create_project(data).await?)
        }
        (Route::Project(id), &Method::GET) => {
            found(state.projects.get_project(id).await?, PROJECT_NOT_FOUND)
        }
        (Route::Project(id), &Method::PUT) => {
            let update: ProjectUpdate = parse_body(body)?;
            found(state.projects.update_project(id, update).await?, PROJECT_NOT_FOUND)
        }
        (Route::Project(id), &Method::DELETE) => deleted(
            state.projects.delete_project(id).await?,
            "Project deleted successfully",
            PROJECT_NOT_FOUND,
        ),
        (Route::DuplicateProject(id), &Method::POST) => {
            let new_name = query.get("new_name").cloned();
            found(
                state.projects.duplicate_project(id, new_name).await?,
                PROJECT_NOT_FOUND,
            )
        }

        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn ok<T: Serialize>(value: &T) -> ApiResult {
    Ok(json_response(StatusCode::OK, value))
}

fn found<T: Serialize>(value: Option<T>, not_found: &'static str) -> ApiResult {
    match value {
        Some(v) => ok(&v),
        None => Err(ApiError::NotFound(not_found)),
    }
}

fn deleted(removed: bool, message: &str, not_found: &'static str) -> ApiResult {
    if !removed {
        return Err(ApiError::NotFound(not_found));
    }
    ok(&serde_json::json!({ "message": message }))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Unprocessable(format!("invalid request body: {e}")))
}

// ============================================================================
// Query parameters
// ============================================================================

/// Percent-decoded query pairs; a repeated key keeps its last value.
fn query_params(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

const TRUE_FLAGS: [&str; 6] = ["true", "1", "yes", "on", "t", "y"];
const FALSE_FLAGS: [&str; 6] = ["false", "0", "no", "off", "f", "n"];

/// Boolean flag spelling, case-insensitive. `force_reload` and any future
/// flag accept `true/false`, `1/0`, `yes/no`, `on/off`, `t/f` and `y/n`.
fn flag(raw: &str) -> Option<bool> {
    let s = raw.trim().to_ascii_lowercase();
    if TRUE_FLAGS.contains(&s.as_str()) {
        Some(true)
    } else if FALSE_FLAGS.contains(&s.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn bool_param(query: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ApiError> {
    match query.get(name) {
        None => Ok(None),
        Some(raw) => flag(raw)
            .map(Some)
            .ok_or_else(|| ApiError::Unprocessable(format!("`{name}` must be a boolean"))),
    }
}

fn usize_param(
    query: &HashMap<String, String>,
    name: &str,
    default: usize,
    range: RangeInclusive<usize>,
) -> Result<usize, ApiError> {
    let Some(raw) = query.get(name) else {
        return Ok(default);
    };
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::Unprocessable(format!("`{name}` must be a non-negative integer")))?;
    if !range.contains(&value) {
        return Err(ApiError::Unprocessable(format!(
            "`{name}` must be between {} and {}",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

// ============================================================================
// Responses
// ============================================================================

fn with_cors(builder: Builder) -> Builder {
    builder
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "*")
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    let body =
        serde_json::to_vec(value).unwrap_or_else(|_| b"{\"detail\":\"serialize\"}".to_vec());
    with_cors(Response::builder().status(status))
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"detail\":\"internal\"}"))))
}

fn json_error(status: StatusCode, detail: &str) -> HttpResponse {
    json_response(status, &serde_json::json!({ "detail": detail }))
}

fn preflight_response() -> HttpResponse {
    with_cors(Response::builder().status(StatusCode::OK))
        .header(ACCESS_CONTROL_MAX_AGE, "600")
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(b"OK")))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
