//! bulk-uploader - Bulk document upload service for a document-management platform
//!
//! Users log in, pick a workspace, open an upload session and submit files to it.
//! Each session is settled in the background one file at a time:
//! - Per-file and per-session state machines with partial-failure retry
//! - Pluggable transfer outcome (simulated by default)
//! - redb in-memory store for users, workspaces, sessions and files
//! - REST API with multipart upload and progress polling

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod state_machine;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod transfer;
pub mod upload;

use std::sync::Arc;
use std::time::Instant;

use auth::Authenticator;
use config::Config;
use storage::Database;
use upload::UploadOrchestrator;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub auth: Authenticator,
    pub uploads: Arc<UploadOrchestrator>,
    pub started_at: Instant,
}
