pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod file_store;
pub mod job_manager;
pub mod routes;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Args;
pub use file_store::FileStore;
pub use job_manager::JobManager;

const MAX_UPLOAD_BYTES: usize = 250 * 1024 * 1024;

/// Shared application state, threaded through every handler via axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub file_store: Arc<FileStore>,
    pub job_manager: JobManager,
    pub config: Arc<Args>,
    pub valid_api_keys: Arc<Vec<String>>,
}

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin_list());

    let protected = Router::new()
        .route("/file/upload", post(routes::upload_file))
        .route("/file/info/:file_id", get(routes::file_info))
        .route("/file/list", get(routes::file_list))
        .route("/file/delete/:file_id", delete(routes::file_delete))
        .route("/file/convert2md", post(routes::convert_to_md))
        .route(
            "/file/convert2md/result/:task_id",
            get(routes::convert_to_md_result),
        )
        .route(
            "/file/convert2md/cancel/:task_id",
            post(routes::convert_to_md_cancel),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth,
        ));

    Router::new()
        .route("/health", get(routes::health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let parsed = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(parsed)
    }
}

/// Sets up structured logging: an env-filtered `tracing-subscriber`
/// registry with no external trace collector configured (see DESIGN.md).
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();
}

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
