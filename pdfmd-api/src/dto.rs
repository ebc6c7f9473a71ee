use serde::{Deserialize, Serialize};

use pdfmd_core::{ConversionResult, Job, JobState};

use crate::file_store::FileMetadata;

#[derive(Serialize)]
pub struct FileInfoDto {
    pub original_filename: String,
    pub file_size: u64,
    pub file_type: String,
}

impl From<&FileMetadata> for FileInfoDto {
    fn from(m: &FileMetadata) -> Self {
        Self {
            original_filename: m.original_filename.clone(),
            file_size: m.file_size,
            file_type: m.file_type.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub file_id: String,
    pub message: String,
    pub file_info: FileInfoDto,
}

#[derive(Serialize)]
pub struct FileListResponse {
    pub files: Vec<FileMetadata>,
}

#[derive(Deserialize)]
pub struct ConvertTaskRequest {
    pub file_id: String,
}

#[derive(Serialize)]
pub struct ConvertTaskStartResponse {
    pub task_id: uuid::Uuid,
    pub message: String,
    pub file_id: String,
}

#[derive(Serialize)]
pub struct ConvertTaskResultResponse {
    pub task_id: uuid::Uuid,
    pub file_id: String,
    pub status: &'static str,
    pub progress: u8,
    pub result: Option<ConversionResult>,
    pub error: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl From<Job> for ConvertTaskResultResponse {
    fn from(job: Job) -> Self {
        Self {
            task_id: job.id,
            file_id: job.file_id,
            status: match job.state {
                JobState::Pending => "pending",
                JobState::Processing => "processing",
                JobState::Completed => "completed",
                JobState::Failed => "failed",
            },
            progress: job.progress,
            result: job.result,
            error: job.error,
            start_time: job.started_at.map(|t| t.timestamp() as f64),
            end_time: job.finished_at.map(|t| t.timestamp() as f64),
        }
    }
}
