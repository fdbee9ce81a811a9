use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state_machine::{FileStatus, SessionStatus};

/// Salted PBKDF2 digest of a user's password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHash {
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

/// A user record stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password: PasswordHash,
    pub server_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input control used to render a metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Select,
    Text,
    Textarea,
}

/// One entry of a workspace's document-metadata schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// An upload destination with its own metadata schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata_fields: Vec<MetadataField>,
}

/// One batch upload against a workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub workspace_id: String,
    pub status: SessionStatus,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        workspace_id: impl Into<String>,
        user_id: Option<String>,
        total_files: u32,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            workspace_id: workspace_id.into(),
            status: SessionStatus::Pending,
            total_files,
            completed_files: 0,
            failed_files: 0,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// The tracked state of one file within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub status: FileStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl UploadedFile {
    pub fn new(
        session_id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            file_name: file_name.into(),
            file_size,
            mime_type: mime_type.into(),
            status: FileStatus::Pending,
            error_message: None,
            uploaded_at: None,
        }
    }
}
