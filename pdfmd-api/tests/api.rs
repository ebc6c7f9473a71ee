use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use clap::Parser;
use pdfmd_api::{build_app, job_manager::JobManager, AppState, Args, FileStore};
use tower::ServiceExt;

fn test_state(upload_dir: &std::path::Path) -> AppState {
    let args = Args::parse_from([
        "pdfmd-api",
        "--upload-dir",
        upload_dir.to_str().unwrap(),
        "--api-keys",
        "test-key",
    ]);
    let ocr_model_path = args.ocr_model_path.as_ref().map(std::path::PathBuf::from);
    AppState {
        file_store: Arc::new(FileStore::new(upload_dir).unwrap()),
        job_manager: JobManager::new(args.job_retention_seconds, ocr_model_path),
        valid_api_keys: Arc::new(args.api_key_list()),
        config: Arc::new(args),
    }
}

#[tokio::test]
async fn health_check_does_not_require_auth() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn file_list_without_api_key_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/file/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn file_list_with_valid_key_returns_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/file/list")
                .header("X-API-Key", "test-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn convert_unknown_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let body = serde_json::json!({ "file_id": "file-does-not-exist" }).to_string();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/file/convert2md")
                .header("X-API-Key", "test-key")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_unknown_task_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/file/convert2md/cancel/{}",
                    uuid::Uuid::new_v4()
                ))
                .header("X-API-Key", "test-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn result_for_unknown_task_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app(test_state(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/file/convert2md/result/{}",
                    uuid::Uuid::new_v4()
                ))
                .header("X-API-Key", "test-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
