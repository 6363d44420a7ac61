use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kbase_core::{DocId, DocType, Document, KbError, KnowledgeBase, NewDocument, SearchHit, Stats};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub k: Option<usize>,
    /// Wrap matched terms in `<em>` inside excerpts
    #[serde(default)]
    pub highlight: bool,
}

#[derive(Deserialize)]
pub struct TypeParams {
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub doc_id: DocId,
}

#[derive(Deserialize)]
pub struct CvRequest {
    pub text: String,
    #[serde(default = "default_cv_title")]
    pub title: String,
}
fn default_cv_title() -> String { "CV".into() }

#[derive(Deserialize)]
pub struct JobRequest {
    pub text: String,
    pub company: String,
    pub title: String,
}

#[derive(Deserialize)]
pub struct NoteRequest {
    pub text: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub path: String,
}

#[derive(Clone)]
pub struct AppState {
    pub kb: Arc<KnowledgeBase>,
    pub admin_token: Option<String>,
}

/// JSON error body with a status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
    doc_id: Option<DocId>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), doc_id: None }
    }
}

impl From<KbError> for ApiError {
    fn from(e: KbError) -> Self {
        let (status, doc_id) = match &e {
            KbError::NotFound(id) => (StatusCode::NOT_FOUND, Some(*id)),
            KbError::Duplicate { existing } => (StatusCode::CONFLICT, Some(*existing)),
            // Indexed but not saved: the caller must know it may be lost on restart.
            KbError::NotDurable { id, .. } => (StatusCode::SERVICE_UNAVAILABLE, Some(*id)),
            KbError::Config { .. } => (StatusCode::BAD_REQUEST, None),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        if status.is_server_error() {
            tracing::warn!(error = %e, "request failed");
        }
        Self { status, message: e.to_string(), doc_id }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message, "doc_id": self.doc_id });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_app(kb: Arc<KnowledgeBase>, admin_token: Option<String>) -> Router {
    let app_state = AppState { kb, admin_token };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/stats", get(stats_handler))
        .route("/docs", get(docs_by_type))
        .route("/doc/:doc_id", get(doc_handler).delete(delete_handler))
        .route("/similar/:doc_id", get(similar_handler))
        .route("/ingest", post(ingest_handler))
        .route("/ingest/cv", post(ingest_cv))
        .route("/ingest/job", post(ingest_job))
        .route("/ingest/note", post(ingest_note))
        .route("/export", post(export_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let mut opts = state.kb.search_options();
    opts.doc_type = params.doc_type.map(DocType::from);
    opts.top_k = state.kb.config().clamp_top_k(params.k);

    let mut results: Vec<SearchHit> = state.kb.search(&params.q, &opts).into_iter().map(SearchHit::from).collect();
    if params.highlight {
        for hit in results.iter_mut() {
            hit.excerpt = highlight_terms(&hit.excerpt, &hit.matched_terms);
        }
    }
    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: results.len(), results })
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<Stats> {
    Json(state.kb.stats())
}

pub async fn docs_by_type(State(state): State<AppState>, Query(params): Query<TypeParams>) -> ApiResult<Vec<Document>> {
    let doc_type = params
        .doc_type
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "missing `type` parameter"))?;
    Ok(Json(state.kb.get_by_type(&DocType::from(doc_type))))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> ApiResult<Document> {
    state.kb.get(doc_id).map(Json).ok_or_else(|| KbError::NotFound(doc_id).into())
}

pub async fn similar_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
    Query(params): Query<TypeParams>,
) -> ApiResult<Vec<SearchHit>> {
    if state.kb.get(doc_id).is_none() {
        return Err(KbError::NotFound(doc_id).into());
    }
    let target = params.doc_type.map(DocType::from).unwrap_or(DocType::JobPosting);
    let top_k = state.kb.config().clamp_top_k(params.k.or(Some(5)));
    let hits = state.kb.find_similar(doc_id, &target, top_k).into_iter().map(SearchHit::from).collect();
    Ok(Json(hits))
}

// --- Admin endpoints ---

async fn ingest_handler(State(state): State<AppState>, headers: HeaderMap, Json(doc): Json<NewDocument>) -> ApiResult<IngestResponse> {
    authorize(&state, &headers)?;
    ingest_blocking(&state, doc).await
}

async fn ingest_cv(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CvRequest>) -> ApiResult<IngestResponse> {
    authorize(&state, &headers)?;
    ingest_blocking(&state, NewDocument::cv(req.text, req.title)).await
}

async fn ingest_job(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<JobRequest>) -> ApiResult<IngestResponse> {
    authorize(&state, &headers)?;
    ingest_blocking(&state, NewDocument::job_posting(req.text, &req.company, &req.title)).await
}

async fn ingest_note(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<NoteRequest>) -> ApiResult<IngestResponse> {
    authorize(&state, &headers)?;
    ingest_blocking(&state, NewDocument::note(req.text, req.title, req.tags)).await
}

async fn delete_handler(State(state): State<AppState>, headers: HeaderMap, Path(doc_id): Path<DocId>) -> ApiResult<Document> {
    authorize(&state, &headers)?;
    let kb = state.kb.clone();
    let doc = run_blocking(move || kb.delete_document(doc_id)).await?;
    Ok(Json(doc))
}

async fn export_handler(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ExportRequest>) -> ApiResult<Stats> {
    authorize(&state, &headers)?;
    let kb = state.kb.clone();
    let stats = run_blocking(move || {
        kb.export_corpus(std::path::Path::new(&req.path))?;
        Ok(kb.stats())
    })
    .await?;
    Ok(Json(stats))
}

async fn ingest_blocking(state: &AppState, doc: NewDocument) -> ApiResult<IngestResponse> {
    let kb = state.kb.clone();
    let doc_id = run_blocking(move || kb.ingest(doc)).await?;
    Ok(Json(IngestResponse { doc_id }))
}

/// Mutations rewrite the corpus file, so keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> kbase_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(ApiError::from),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("worker failed: {e}"))),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::new(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
