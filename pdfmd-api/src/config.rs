use clap::Parser;

/// Server configuration, read from CLI flags with environment fallbacks.
#[derive(Parser, Debug, Clone)]
#[command(name = "pdfmd-api", about = "PDF to Markdown conversion service")]
pub struct Args {
    #[arg(long, env = "PDFMD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PDFMD_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "PDFMD_DEBUG", default_value_t = false)]
    pub debug: bool,

    #[arg(long, env = "PDFMD_RELOAD", default_value_t = false)]
    pub reload: bool,

    #[arg(long, env = "PDFMD_UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: String,

    /// Comma-separated list of allowed CORS origins.
    #[arg(long, env = "PDFMD_CORS_ORIGINS", default_value = "")]
    pub cors_origins: String,

    /// Comma-separated list of valid `X-API-Key` values.
    #[arg(long, env = "PDFMD_API_KEYS", default_value = "12345,67890")]
    pub api_keys: String,

    #[arg(long, env = "PDFMD_CHUNK_SIZE", default_value_t = 10)]
    pub chunk_size: usize,

    #[arg(long, env = "PDFMD_PROGRESS_UPDATE_INTERVAL", default_value_t = 10)]
    pub progress_update_interval: usize,

    #[arg(long, env = "PDFMD_TABLE_DETECTION_ENABLED", default_value_t = true)]
    pub table_detection_enabled: bool,

    #[arg(long, env = "PDFMD_EXTRACT_IMAGES", default_value_t = true)]
    pub extract_images: bool,

    #[arg(long, env = "PDFMD_PRESERVE_FORMATTING", default_value_t = true)]
    pub preserve_formatting: bool,

    #[arg(long, env = "PDFMD_TABLE_MIN_COLUMNS", default_value_t = 2)]
    pub table_min_columns: usize,

    /// How long a completed/failed job stays queryable before the
    /// retention sweep evicts it.
    #[arg(long, env = "PDFMD_JOB_RETENTION_SECONDS", default_value_t = 86_400)]
    pub job_retention_seconds: u64,

    #[arg(long, env = "PDFMD_OCR_MODEL_PATH")]
    pub ocr_model_path: Option<String>,
}

impl Args {
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
