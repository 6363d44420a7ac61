use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use kbase_core::{Config, DuplicatePolicy, KnowledgeBase};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const TOKEN: &str = "secret";

fn build_tiny_app() -> (TempDir, Arc<KnowledgeBase>, Router) {
    let dir = tempdir().unwrap();
    let kb = Arc::new(KnowledgeBase::open(Config::with_data_dir(dir.path())).unwrap());
    // "rust" is half of the first note's terms and a quarter of the second's.
    kb.ingest_note("rust systems", "N1", ["x"]).unwrap();
    kb.ingest_note("learning rust tokio axum", "N2", ["x"]).unwrap();
    kb.ingest_job_posting("rust backend engineer", "Acme", "Dev").unwrap();
    let app = kbase_server::build_app(kb.clone(), Some(TOKEN.to_string()));
    (dir, kb, app)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(t) = token {
        builder = builder.header("X-ADMIN-TOKEN", t);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (_dir, _kb, app) = build_tiny_app();
    let (status, json) = call(&app, get("/search?q=rust&k=2")).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["doc_id"], 0);
    assert_eq!(arr[1]["doc_id"], 1);
    assert_eq!(arr[0]["matched_terms"], json!(["rust"]));
    assert!(arr[0]["excerpt"].as_str().unwrap().contains("rust"));
}

#[tokio::test]
async fn search_filters_by_type() {
    let (_dir, _kb, app) = build_tiny_app();
    let (_, json) = call(&app, get("/search?q=rust&type=job_posting&k=1")).await;
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["doc_type"], "job_posting");

    let (_, json) = call(&app, get("/search?q=the%20and%20for")).await;
    assert_eq!(json["total_hits"], 0);
}

#[tokio::test]
async fn ingest_requires_admin_token() {
    let (_dir, kb, app) = build_tiny_app();
    let body = json!({ "text": "Clinical informatics lead", "title": "CV" });

    let (status, _) = call(&app, post_json("/ingest/cv", body.clone(), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, post_json("/ingest/cv", body.clone(), Some("wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = call(&app, post_json("/ingest/cv", body, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);
    let id = json["doc_id"].as_u64().unwrap() as u32;
    assert_eq!(kb.get(id).unwrap().title, "CV");

    let (_, json) = call(&app, get("/search?q=informatics")).await;
    assert_eq!(json["results"][0]["doc_id"], id);
}

#[tokio::test]
async fn generic_ingest_accepts_open_types() {
    let (_dir, _kb, app) = build_tiny_app();
    let body = json!({
        "title": "Recruiter email",
        "content": "Interview scheduled with hiring manager",
        "doc_type": "email",
        "tags": ["inbox"]
    });
    let (status, _) = call(&app, post_json("/ingest", body, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&app, get("/docs?type=email")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["source"], "user_input");

    let (status, _) = call(&app, get("/docs")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stats_and_document_lookup() {
    let (_dir, _kb, app) = build_tiny_app();
    let (_, stats) = call(&app, get("/stats")).await;
    assert_eq!(stats["total_documents"], 3);
    assert_eq!(stats["by_type"]["note"], 2);

    let (status, doc) = call(&app, get("/doc/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["title"], "Dev at Acme");

    let (status, err) = call(&app, get("/doc/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["doc_id"], 99);
}

#[tokio::test]
async fn delete_removes_from_search() {
    let (_dir, _kb, app) = build_tiny_app();
    let req = Request::delete("/doc/0").header("X-ADMIN-TOKEN", TOKEN).body(Body::empty()).unwrap();
    let (status, _) = call(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = call(&app, get("/search?q=systems")).await;
    assert_eq!(json["total_hits"], 0);
    let (status, _) = call(&app, get("/doc/0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn similar_defaults_to_job_postings() {
    let (_dir, kb, app) = build_tiny_app();
    let cv = kb.ingest_cv("backend engineer rust", "CV").unwrap();
    let (status, json) = call(&app, get(&format!("/similar/{cv}"))).await;
    assert_eq!(status, StatusCode::OK);
    let arr = json.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["doc_type"], "job_posting");
}

#[tokio::test]
async fn duplicate_rejection_maps_to_conflict() {
    let dir = tempdir().unwrap();
    let mut config = Config::with_data_dir(dir.path());
    config.duplicate_policy = DuplicatePolicy::Reject;
    let kb = Arc::new(KnowledgeBase::open(config).unwrap());
    let existing = kb.ingest_job_posting("rust backend engineer", "Acme", "Dev").unwrap();
    let app = kbase_server::build_app(kb.clone(), Some(TOKEN.to_string()));

    let body = json!({ "text": "rewritten posting", "company": "Acme", "title": "Dev" });
    let (status, json) = call(&app, post_json("/ingest/job", body, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["doc_id"], existing);
    assert_eq!(kb.get(existing).unwrap().content, "rust backend engineer");
}

#[tokio::test]
async fn failed_save_maps_to_unavailable_but_stays_searchable() {
    let (dir, kb, app) = build_tiny_app();
    // A directory where the temp file goes makes every save fail.
    std::fs::create_dir(dir.path().join("knowledge_base.json.tmp")).unwrap();

    let body = json!({ "text": "zookeeper quorum notes", "title": "ZK" });
    let (status, json) = call(&app, post_json("/ingest/note", body, Some(TOKEN))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["doc_id"], 3);
    assert!(json["error"].as_str().unwrap().contains("not durable"));

    let (status, json) = call(&app, get("/search?q=zookeeper")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["results"][0]["doc_id"], 3);
    assert_eq!(kb.len(), 4);
}
