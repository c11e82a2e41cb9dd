//! Task submission, progress, cancellation and download endpoints

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::path::Path as FsPath;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::{TaskState, TaskStatus};
use crate::server::state::{AppState, Upload};

/// Response from task submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub filename: String,
    pub model: String,
    pub message: String,
}

/// Task status plus derived progress
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub status: TaskStatus,
    pub percent_complete: f32,
}

impl From<TaskStatus> for TaskResponse {
    fn from(status: TaskStatus) -> Self {
        Self {
            percent_complete: status.percent_complete(),
            status,
        }
    }
}

/// Response listing all tasks
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub total: usize,
    pub active: usize,
}

/// POST /api/tasks - Upload a table for enrichment
pub async fn submit_task(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut model = None;
    let mut context = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::BadRequest("Uploaded file has no name".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", filename, e)))?;
                file = Some((filename, data.to_vec()));
            }
            "model" | "context" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                if name == "model" {
                    model = Some(value);
                } else {
                    context = Some(value);
                }
            }
            other => {
                tracing::debug!("Ignoring multipart field '{}'", other);
            }
        }
    }

    let (filename, data) =
        file.ok_or_else(|| Error::BadRequest("No file provided".to_string()))?;
    if data.is_empty() {
        return Err(Error::BadRequest(format!("{} is empty", filename)));
    }

    let status = state
        .submit(Upload {
            filename: filename.clone(),
            data,
            model,
            context,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            task_id: status.task_id,
            filename,
            model: status.model,
            message: format!(
                "Task queued. Use /api/tasks/{} to check progress.",
                status.task_id
            ),
        }),
    ))
}

/// GET /api/tasks - List all tasks
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks: Vec<TaskResponse> = state
        .registry()
        .list()
        .into_iter()
        .map(TaskResponse::from)
        .collect();
    let active = tasks
        .iter()
        .filter(|t| !t.status.state.is_terminal())
        .count();

    Json(TaskListResponse {
        total: tasks.len(),
        active,
        tasks,
    })
}

/// GET /api/tasks/:id - Task progress
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>> {
    state
        .registry()
        .snapshot(task_id)
        .map(|s| Json(s.into()))
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
}

/// POST /api/tasks/:id/cancel - Request cancellation
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>> {
    state
        .registry()
        .cancel(task_id)
        .map(|s| Json(s.into()))
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
}

/// GET /api/tasks/:id/download - Enriched file of a completed task
pub async fn download_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let status = state
        .registry()
        .snapshot(task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

    if status.state != TaskState::Completed {
        return Err(Error::BadRequest(format!(
            "Task {} is {:?}, nothing to download",
            task_id, status.state
        )));
    }

    let path = state.output_path(&status)?;
    let data = tokio::fs::read(&path).await?;

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();
    let content_disposition = format!(
        "attachment; filename=\"{}\"",
        download_name(status.filename.as_deref(), &path)
    );

    tracing::info!("[{}] Serving {} ({} bytes)", task_id, path.display(), data.len());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        data,
    ))
}

/// `<original stem>_enriched.<artifact ext>`, safe for a header value
fn download_name(original: Option<&str>, artifact: &FsPath) -> String {
    let stem = original
        .map(FsPath::new)
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "tickets".to_string());
    let stem: String = stem
        .chars()
        .map(|c| {
            if c == '"' || c == '\\' || !c.is_ascii() || c.is_ascii_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let ext = artifact
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xlsx".to_string());
    format!("{}_enriched.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_name_keeps_original_stem() {
        let artifact = FsPath::new("/out/0b6c_enriched.xlsx");
        assert_eq!(download_name(Some("Tickets Q3.xls"), artifact), "Tickets Q3_enriched.xlsx");
        assert_eq!(download_name(None, artifact), "tickets_enriched.xlsx");
        assert_eq!(
            download_name(Some("we\"ird.csv"), FsPath::new("x.csv")),
            "we_ird_enriched.csv"
        );
        assert_eq!(download_name(Some("Revisión.xlsx"), artifact), "Revisi_n_enriched.xlsx");
    }
}
