use axum::extract::{Multipart, Path, State};
use axum::Json;

use pdfmd_core::ConversionConfig;
use uuid::Uuid;

use crate::dto::{
    ConvertTaskRequest, ConvertTaskResultResponse, ConvertTaskStartResponse, FileInfoDto,
    FileListResponse, UploadResponse,
};
use crate::error::ApiError;
use crate::file_store::is_allowed_file;
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidArgument(e.to_string()))?
    {
        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        if !is_allowed_file(&filename) {
            return Err(ApiError::InvalidArgument("文件类型不允许".to_string()));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidArgument(e.to_string()))?;

        let metadata = state
            .file_store
            .save(&filename, &data)
            .map_err(|e| ApiError::Internal(e.into()))?;

        return Ok(Json(UploadResponse {
            file_id: metadata.file_id.clone(),
            message: "上传成功".to_string(),
            file_info: FileInfoDto::from(&metadata),
        }));
    }

    Err(ApiError::InvalidArgument("no file part in request".into()))
}

pub async fn file_info(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileInfoDto>, ApiError> {
    let metadata = state
        .file_store
        .get_info(&file_id)
        .ok_or_else(|| ApiError::NotFound(format!("file {file_id} not found")))?;
    Ok(Json(FileInfoDto::from(&metadata)))
}

pub async fn file_list(State(state): State<AppState>) -> Json<FileListResponse> {
    Json(FileListResponse {
        files: state.file_store.list(),
    })
}

pub async fn file_delete(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .file_store
        .delete(&file_id)
        .map_err(|e| ApiError::Internal(e.into()))?;
    if deleted {
        Ok(Json(serde_json::json!({ "message": "删除成功" })))
    } else {
        Err(ApiError::NotFound(format!("file {file_id} not found")))
    }
}

pub async fn convert_to_md(
    State(state): State<AppState>,
    Json(req): Json<ConvertTaskRequest>,
) -> Result<Json<ConvertTaskStartResponse>, ApiError> {
    let metadata = state
        .file_store
        .get_info(&req.file_id)
        .ok_or_else(|| ApiError::NotFound(format!("file {} not found", req.file_id)))?;
    if metadata.file_type != "pdf" {
        return Err(ApiError::InvalidArgument(format!(
            "file {} is not a PDF",
            req.file_id
        )));
    }
    let path = state
        .file_store
        .path_for(&req.file_id)
        .ok_or_else(|| ApiError::NotFound(format!("file {} not found", req.file_id)))?;

    let config = ConversionConfig {
        chunk_size: state.config.chunk_size,
        progress_update_interval: state.config.progress_update_interval,
        table_detection_enabled: state.config.table_detection_enabled,
        extract_images: state.config.extract_images,
        preserve_formatting: state.config.preserve_formatting,
        table_min_columns: state.config.table_min_columns,
        ..Default::default()
    };

    let task_id = state.job_manager.submit(
        metadata.file_id.clone(),
        path,
        state.file_store.upload_dir().to_path_buf(),
        config,
    );

    Ok(Json(ConvertTaskStartResponse {
        task_id,
        message: "转换任务已启动".to_string(),
        file_id: metadata.file_id,
    }))
}

/// Requests cancellation of a running or still-pending conversion job.
pub async fn convert_to_md_cancel(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.job_manager.get(&task_id).is_none() {
        return Err(ApiError::NotFound(format!("task {task_id} not found")));
    }
    let canceled = state.job_manager.cancel(&task_id);
    Ok(Json(serde_json::json!({ "task_id": task_id, "canceled": canceled })))
}

pub async fn convert_to_md_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ConvertTaskResultResponse>, ApiError> {
    let job = state
        .job_manager
        .get(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("task {task_id} not found")))?;
    Ok(Json(job.into()))
}
