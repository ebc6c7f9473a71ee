use std::sync::Arc;

use clap::Parser;
use pdfmd_api::{build_app, job_manager::JobManager, Args, FileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    pdfmd_api::init_tracing(args.debug);

    let file_store = Arc::new(FileStore::new(&args.upload_dir)?);
    let ocr_model_path = args.ocr_model_path.as_ref().map(std::path::PathBuf::from);
    let job_manager = JobManager::new(args.job_retention_seconds, ocr_model_path);
    job_manager.spawn_retention_sweep();

    let valid_api_keys = Arc::new(args.api_key_list());
    let state = pdfmd_api::AppState {
        file_store,
        job_manager,
        config: Arc::new(args.clone()),
        valid_api_keys,
    };

    let app = build_app(state);

    let addr = format!("{}:{}", args.host, args.port);
    tracing::info!(%addr, "starting pdfmd-api");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
