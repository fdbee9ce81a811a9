use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::extract::{AuthUser, MaybeAuthUser};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::state_machine::SessionStatus;
use crate::storage::models::UploadSession;
use crate::upload::{FileDescriptor, NewSession, Progress};
use crate::AppState;

/// Document types accepted for upload
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
];

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub workspace_id: String,
    pub total_files: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub workspace_id: String,
    pub status: SessionStatus,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStartedResponse {
    pub message: String,
    pub session_id: String,
    pub file_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<Json<JSend<SessionResponse>>, ApiError> {
    let session = state.uploads.create_session(NewSession {
        workspace_id: req.workspace_id,
        user_id: user.map(|u| u.id),
        total_files: req.total_files,
        metadata: req.metadata,
    })?;

    Ok(JSend::success(session_to_response(&session)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    AppQuery(params): AppQuery<ListSessionsParams>,
) -> Result<Json<JSendPaginated<SessionResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let status = match params.status.as_deref() {
        Some(s) => Some(SessionStatus::parse(s).ok_or_else(|| {
            ApiError::bad_request(format!(
                "status must be one of pending, uploading, completed, failed; got '{s}'"
            ))
        })?),
        None => None,
    };

    let sessions = state
        .uploads
        .list_sessions(&user.id, status, params.workspace_id.as_deref())?;

    Ok(JSendPaginated::page(
        sessions.iter().map(session_to_response).collect(),
        params.limit,
        params.offset,
    ))
}

pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadStartedResponse>>, ApiError> {
    let max_size = state.config.upload.max_upload_size;
    let mut files: Vec<FileDescriptor> = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("files") {
            // Ignore unknown fields
            continue;
        }

        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Every file must have a file name"))?;
        let mime_type = resolve_mime_type(field.content_type(), &file_name);
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(ApiError::bad_request(format!(
                "File type not supported: {file_name} ({mime_type})"
            )));
        }

        let mut file_size: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?
        {
            file_size += chunk.len() as u64;
            if file_size > max_size {
                return Err(ApiError::payload_too_large(format!(
                    "{file_name} exceeds maximum upload size of {max_size} bytes"
                )));
            }
        }

        files.push(FileDescriptor {
            file_name,
            file_size,
            mime_type,
        });
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    let file_count = state.uploads.submit_files(&session_id, files).await?;

    Ok(JSend::success(UploadStartedResponse {
        message: "Upload started".to_string(),
        session_id,
        file_count,
    }))
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<JSend<Progress>>, ApiError> {
    Ok(JSend::success(state.uploads.progress(&session_id)?))
}

pub async fn retry_upload(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<JSend<MessageResponse>>, ApiError> {
    let count = state.uploads.retry(&session_id).await?;
    tracing::debug!(session_id = %session_id, files = count, "Retry requested");

    Ok(JSend::success(MessageResponse {
        message: "Retry started".to_string(),
    }))
}

pub async fn cancel_upload(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<JSend<MessageResponse>>, ApiError> {
    state.uploads.cancel(&session_id).await?;

    Ok(JSend::success(MessageResponse {
        message: "Cancellation requested".to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

/// MIME type from the part's Content-Type, or guessed from the file name, or a generic fallback.
fn resolve_mime_type(content_type: Option<&str>, file_name: &str) -> String {
    content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn session_to_response(session: &UploadSession) -> SessionResponse {
    SessionResponse {
        id: session.id.clone(),
        user_id: session.user_id.clone(),
        workspace_id: session.workspace_id.clone(),
        status: session.status,
        total_files: session.total_files,
        completed_files: session.completed_files,
        failed_files: session.failed_files,
        metadata: session.metadata.clone(),
        created_at: session.created_at.to_rfc3339(),
    }
}
