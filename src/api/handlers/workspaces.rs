use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::extract::AuthUser;
use crate::api::response::{ApiError, JSend};
use crate::storage::models::{MetadataField, Workspace};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub metadata_fields: Vec<MetadataField>,
}

impl From<Workspace> for WorkspaceResponse {
    fn from(w: Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name,
            description: w.description,
            metadata_fields: w.metadata_fields,
        }
    }
}

pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<JSend<Vec<WorkspaceResponse>>>, ApiError> {
    let workspaces = state
        .db
        .list_workspaces()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(JSend::success(
        workspaces.into_iter().map(WorkspaceResponse::from).collect(),
    ))
}

pub async fn workspace_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<Vec<MetadataField>>>, ApiError> {
    let workspace = state
        .db
        .get_workspace(&id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))?;

    Ok(JSend::success(workspace.metadata_fields))
}
