use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use pdfmd_core::{
    convert_pdf, validate_pdf_path, ConversionConfig, ConversionResult, ExecutionProvider, Job,
    JobState, NullOcrEngine, OcrEngine, OrtOcrEngine, PdfiumReader,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Registry of conversion jobs. Terminal jobs stay queryable (by
/// `GET /file/convert2md/result/{task_id}`) until a background retention
/// sweep evicts them.
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    cancel_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    retention: Duration,
    ocr_model_path: Option<PathBuf>,
}

impl JobManager {
    pub fn new(retention_seconds: u64, ocr_model_path: Option<PathBuf>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            cancel_tokens: Arc::new(RwLock::new(HashMap::new())),
            retention: Duration::from_secs(retention_seconds),
            ocr_model_path,
        }
    }

    /// Spawns the background eviction loop. Internal only — not part of
    /// the HTTP surface.
    pub fn spawn_retention_sweep(&self) {
        let jobs = Arc::clone(&self.jobs);
        let retention = self.retention;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - chrono::Duration::from_std(retention).unwrap_or_default();
                jobs.write().unwrap().retain(|_, job| {
                    !job.is_terminal() || job.finished_at.map(|t| t > cutoff).unwrap_or(true)
                });
            }
        });
    }

    /// Requests cancellation of a job that hasn't reached a terminal state
    /// yet. The worker observes this at its next batch boundary; the job
    /// then transitions to `failed` with `error = "canceled"`.
    /// Returns `false` if the job is unknown or already terminal.
    pub fn cancel(&self, job_id: &Uuid) -> bool {
        let is_pending_or_running = self
            .jobs
            .read()
            .unwrap()
            .get(job_id)
            .map(|j| !j.is_terminal())
            .unwrap_or(false);
        if !is_pending_or_running {
            return false;
        }
        if let Some(token) = self.cancel_tokens.read().unwrap().get(job_id) {
            token.cancel();
        }
        true
    }

    /// Starts a conversion job for `file_id`, running `convert_pdf` against
    /// `pdf_path` on a blocking thread (pdfium's FFI handles aren't `Send`
    /// across an async runtime's worker pool) and updating the shared job
    /// record as it progresses.
    pub fn submit(
        &self,
        file_id: String,
        pdf_path: PathBuf,
        output_dir: PathBuf,
        config: ConversionConfig,
    ) -> Uuid {
        let job = Job::new(file_id.clone());
        let job_id = job.id;
        self.jobs.write().unwrap().insert(job_id, job);
        let token = CancellationToken::new();
        self.cancel_tokens
            .write()
            .unwrap()
            .insert(job_id, token.clone());

        let jobs = Arc::clone(&self.jobs);
        let cancel_tokens = Arc::clone(&self.cancel_tokens);
        let ocr_model_path = self.ocr_model_path.clone();
        tokio::task::spawn_blocking(move || {
            {
                let mut guard = jobs.write().unwrap();
                if let Some(job) = guard.get_mut(&job_id) {
                    job.state = JobState::Processing;
                    job.started_at = Some(Utc::now());
                }
            }

            let start = std::time::Instant::now();
            let result = run_conversion(
                &pdf_path,
                &output_dir,
                &file_id,
                &config,
                ocr_model_path.as_deref(),
                {
                    let jobs = Arc::clone(&jobs);
                    move |pct| {
                        let mut guard = jobs.write().unwrap();
                        if let Some(job) = guard.get_mut(&job_id) {
                            if pct as u8 > job.progress {
                                job.progress = pct;
                            }
                        }
                    }
                },
                {
                    let token = token.clone();
                    move || token.is_cancelled()
                },
            );

            let mut guard = jobs.write().unwrap();
            if let Some(job) = guard.get_mut(&job_id) {
                job.finished_at = Some(Utc::now());
                match result {
                    Ok(mut conversion_result) => {
                        conversion_result.processing_time_secs = start.elapsed().as_secs_f64();
                        job.progress = 100;
                        job.state = JobState::Completed;
                        job.result = Some(conversion_result);
                    }
                    Err(e) => {
                        job.progress = 100;
                        job.state = JobState::Failed;
                        job.error = Some(e.to_string());
                    }
                }
            }
            cancel_tokens.write().unwrap().remove(&job_id);
        });

        job_id
    }

    pub fn get(&self, job_id: &Uuid) -> Option<Job> {
        self.jobs.read().unwrap().get(job_id).cloned()
    }
}

/// Loads `OrtOcrEngine` against the configured model on the CPU execution
/// provider when `ocr_model_path` is set, falling back to `NullOcrEngine`
/// otherwise — mirroring the original's `ocr_service_type` switch between a
/// real backend and a no-op, without this service ever running without an
/// OCR step configured one way or the other.
fn build_ocr_engine(
    ocr_model_path: Option<&std::path::Path>,
) -> anyhow::Result<Box<dyn OcrEngine>> {
    match ocr_model_path {
        Some(path) => {
            let engine = OrtOcrEngine::load(path, ExecutionProvider::Cpu)?;
            Ok(Box::new(engine))
        }
        None => Ok(Box::new(NullOcrEngine)),
    }
}

fn run_conversion(
    pdf_path: &std::path::Path,
    output_dir: &std::path::Path,
    file_id: &str,
    config: &ConversionConfig,
    ocr_model_path: Option<&std::path::Path>,
    progress_callback: impl FnMut(u8),
    should_cancel: impl FnMut() -> bool,
) -> anyhow::Result<ConversionResult> {
    validate_pdf_path(pdf_path)?;
    let reader = PdfiumReader::open(pdf_path)?;
    let ocr = build_ocr_engine(ocr_model_path)?;
    let outcome = convert_pdf(&reader, ocr.as_ref(), config, progress_callback, should_cancel)?;

    std::fs::create_dir_all(output_dir)?;
    let stem = pdf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let timestamp = Utc::now().timestamp();
    let output_filename = format!("{stem}_converted_{timestamp}.md");
    let output_path = output_dir.join(&output_filename);
    std::fs::write(&output_path, &outcome.markdown)?;

    Ok(ConversionResult {
        file_id: file_id.to_string(),
        markdown_content: outcome.markdown,
        output_path: output_path.display().to_string(),
        processing_time_secs: 0.0,
        pages_processed: outcome.pages_processed,
        tables_found: outcome.tables_found,
    })
}
