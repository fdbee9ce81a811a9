//! Upload orchestration: creating sessions, accepting files, and driving the
//! background run that settles each file's outcome.
//!
//! At most one run is active per session. A run processes its files strictly in
//! submission order; each outcome and the matching session counter are written in
//! one transaction, so a progress poll only ever sees whole steps.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::RunTiming;
use crate::state_machine::{FileStatus, SessionStatus, StateError};
use crate::storage::models::{UploadSession, UploadedFile};
use crate::storage::{Database, DatabaseError};
use crate::transfer::{Attempt, FileTransfer, TransferOutcome};

pub const CANCELLED_REASON: &str = "Upload cancelled";
pub const INTERRUPTED_REASON: &str = "Upload interrupted";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("An upload is already in progress for session {0}")]
    RunInProgress(String),
    #[error("No upload is in progress for session {0}")]
    NoActiveRun(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

const SESSION_NOT_FOUND: &str = "Upload session not found";
const WORKSPACE_NOT_FOUND: &str = "Workspace not found";

/// Input for a new upload session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub workspace_id: String,
    pub user_id: Option<String>,
    pub total_files: u32,
    pub metadata: HashMap<String, String>,
}

/// What the client told us about one submitted file
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileProgress {
    pub id: String,
    pub file_name: String,
    pub status: FileStatus,
    pub error_message: Option<String>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub session_id: String,
    pub total_files: u32,
    pub completed_files: u32,
    pub failed_files: u32,
    pub progress: u8,
    pub status: SessionStatus,
    pub files: Vec<FileProgress>,
}

impl Progress {
    fn from_snapshot(session: &UploadSession, files: &[UploadedFile]) -> Self {
        Self {
            session_id: session.id.clone(),
            total_files: session.total_files,
            completed_files: session.completed_files,
            failed_files: session.failed_files,
            progress: session.progress_percent(),
            status: session.status,
            files: files
                .iter()
                .map(|f| FileProgress {
                    id: f.id.clone(),
                    file_name: f.file_name.clone(),
                    status: f.status,
                    error_message: f.error_message.clone(),
                })
                .collect(),
        }
    }
}

/// Pacing for initial and retry runs
#[derive(Debug, Clone, Copy)]
pub struct RunSchedule {
    pub initial: RunTiming,
    pub retry: RunTiming,
}

impl RunSchedule {
    fn timing(&self, attempt: Attempt) -> RunTiming {
        match attempt {
            Attempt::Initial => self.initial,
            Attempt::Retry => self.retry,
        }
    }
}

/// How a background run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    Finished,
    Cancelled,
}

pub struct UploadOrchestrator {
    db: Database,
    transfer: Arc<dyn FileTransfer>,
    schedule: RunSchedule,
    runs: Mutex<HashMap<String, CancellationToken>>,
}

impl UploadOrchestrator {
    pub fn new(db: Database, transfer: Arc<dyn FileTransfer>, schedule: RunSchedule) -> Self {
        Self {
            db,
            transfer,
            schedule,
            runs: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn create_session(&self, new: NewSession) -> Result<UploadSession, UploadError> {
        let workspace_id = new.workspace_id.trim();
        if workspace_id.is_empty() {
            return Err(UploadError::Validation("workspaceId is required".into()));
        }

        let workspace = self
            .db
            .get_workspace(workspace_id)?
            .ok_or(UploadError::NotFound(WORKSPACE_NOT_FOUND))?;
        workspace
            .validate_metadata(&new.metadata)
            .map_err(UploadError::Validation)?;

        let session = UploadSession::new(workspace_id, new.user_id, new.total_files, new.metadata);
        self.db.create_session(&session)?;

        tracing::info!(
            session_id = %session.id,
            workspace_id = %session.workspace_id,
            total_files = session.total_files,
            "Created upload session"
        );
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<UploadSession, UploadError> {
        self.db
            .get_session(session_id)?
            .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))
    }

    /// Sessions owned by a user, newest first
    pub fn list_sessions(
        &self,
        user_id: &str,
        status: Option<SessionStatus>,
        workspace_id: Option<&str>,
    ) -> Result<Vec<UploadSession>, UploadError> {
        let mut sessions = self.db.list_sessions(|s| {
            s.user_id.as_deref() == Some(user_id)
                && status.map_or(true, |st| s.status == st)
                && workspace_id.map_or(true, |w| s.workspace_id == w)
        })?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    pub fn progress(&self, session_id: &str) -> Result<Progress, UploadError> {
        let (session, files) = self
            .db
            .session_snapshot(session_id)?
            .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))?;
        Ok(Progress::from_snapshot(&session, &files))
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Record submitted files and start settling them in the background.
    /// Returns the number of files accepted.
    pub async fn submit_files(
        self: &Arc<Self>,
        session_id: &str,
        files: Vec<FileDescriptor>,
    ) -> Result<usize, UploadError> {
        if files.is_empty() {
            return Err(UploadError::Validation("No files provided".into()));
        }
        self.get_session(session_id)?;

        let cancel = self.claim_run(session_id).await?;
        let created = self.db.modify_session(session_id, |edit| {
            let submitted = edit.files().len() + files.len();
            if submitted > edit.session.total_files as usize {
                return Err(UploadError::Validation(format!(
                    "Session expects {} files, {} submitted",
                    edit.session.total_files, submitted
                )));
            }

            let mut ids = Vec::with_capacity(files.len());
            for descriptor in &files {
                let file = UploadedFile::new(
                    session_id,
                    descriptor.file_name.as_str(),
                    descriptor.file_size,
                    descriptor.mime_type.as_str(),
                );
                ids.push(file.id.clone());
                edit.push_file(file);
            }
            edit.session.begin_upload()?;
            Ok::<_, UploadError>(ids)
        });

        let file_ids = match created {
            Ok(Some(ids)) => ids,
            Ok(None) => {
                self.release_run(session_id).await;
                return Err(UploadError::NotFound(SESSION_NOT_FOUND));
            }
            Err(e) => {
                self.release_run(session_id).await;
                return Err(e);
            }
        };

        let count = file_ids.len();
        tracing::info!(session_id = %session_id, files = count, "Upload started");
        self.spawn_run(session_id, file_ids, Attempt::Initial, cancel);
        Ok(count)
    }

    /// Reset every failed file and run them again.
    /// Returns the number of files being retried.
    pub async fn retry(self: &Arc<Self>, session_id: &str) -> Result<usize, UploadError> {
        self.get_session(session_id)?;

        let cancel = self.claim_run(session_id).await?;
        let reset = self.db.modify_session(session_id, |edit| {
            let mut ids = Vec::new();
            for file in edit.files_mut() {
                if file.status == FileStatus::Failed {
                    file.reset()?;
                    ids.push(file.id.clone());
                }
            }
            edit.session.begin_retry()?;
            Ok::<_, UploadError>(ids)
        });

        let file_ids = match reset {
            Ok(Some(ids)) => ids,
            Ok(None) => {
                self.release_run(session_id).await;
                return Err(UploadError::NotFound(SESSION_NOT_FOUND));
            }
            Err(e) => {
                self.release_run(session_id).await;
                return Err(e);
            }
        };

        let count = file_ids.len();
        tracing::info!(session_id = %session_id, files = count, "Retry started");
        self.spawn_run(session_id, file_ids, Attempt::Retry, cancel);
        Ok(count)
    }

    /// Stop the active run of a session. Files it has not settled yet are marked failed.
    pub async fn cancel(&self, session_id: &str) -> Result<(), UploadError> {
        self.get_session(session_id)?;

        let runs = self.runs.lock().await;
        match runs.get(session_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(session_id = %session_id, "Upload cancellation requested");
                Ok(())
            }
            None => Err(UploadError::NoActiveRun(session_id.to_string())),
        }
    }

    pub async fn is_running(&self, session_id: &str) -> bool {
        self.runs.lock().await.contains_key(session_id)
    }

    pub async fn active_runs(&self) -> usize {
        self.runs.lock().await.len()
    }

    /// Cancel every active run and wait up to `grace` for them to record it.
    /// Returns the number of runs still active when the wait ended.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let cancelled = {
            let runs = self.runs.lock().await;
            for token in runs.values() {
                token.cancel();
            }
            runs.len()
        };
        if cancelled == 0 {
            return 0;
        }

        let deadline = tokio::time::Instant::now() + grace;
        let mut remaining = self.active_runs().await;
        while remaining > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remaining = self.active_runs().await;
        }

        if remaining == 0 {
            tracing::info!(runs = cancelled, "Cancelled active upload runs");
        } else {
            tracing::warn!(
                runs = cancelled,
                unfinished = remaining,
                "Upload runs did not finish cancelling before shutdown"
            );
        }
        remaining
    }

    async fn claim_run(&self, session_id: &str) -> Result<CancellationToken, UploadError> {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(session_id) {
            return Err(UploadError::RunInProgress(session_id.to_string()));
        }
        let token = CancellationToken::new();
        runs.insert(session_id.to_string(), token.clone());
        Ok(token)
    }

    async fn release_run(&self, session_id: &str) {
        self.runs.lock().await.remove(session_id);
    }

    fn spawn_run(
        self: &Arc<Self>,
        session_id: &str,
        file_ids: Vec<String>,
        attempt: Attempt,
        cancel: CancellationToken,
    ) {
        let this = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            match this.drive(&session_id, &file_ids, attempt, &cancel).await {
                Ok(RunEnd::Finished) => {
                    tracing::info!(session_id = %session_id, ?attempt, "Upload run finished");
                }
                Ok(RunEnd::Cancelled) => {
                    tracing::info!(session_id = %session_id, ?attempt, "Upload run cancelled");
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Upload run failed");
                    // Leave the session retryable rather than stuck in `uploading`
                    if let Err(e) =
                        this.abort_remaining(&session_id, &file_ids, INTERRUPTED_REASON)
                    {
                        tracing::error!(
                            session_id = %session_id,
                            error = %e,
                            "Failed to settle interrupted upload run"
                        );
                    }
                }
            }
            this.release_run(&session_id).await;
        });
    }

    async fn drive(
        &self,
        session_id: &str,
        file_ids: &[String],
        attempt: Attempt,
        cancel: &CancellationToken,
    ) -> Result<RunEnd, UploadError> {
        let timing = self.schedule.timing(attempt);

        if !pause(cancel, timing.start_delay).await {
            self.abort_remaining(session_id, file_ids, CANCELLED_REASON)?;
            return Ok(RunEnd::Cancelled);
        }

        for (index, file_id) in file_ids.iter().enumerate() {
            let file = self
                .db
                .modify_session(session_id, |edit| {
                    let file = edit
                        .file_mut(file_id)
                        .ok_or(UploadError::NotFound("Uploaded file not found"))?;
                    file.start()?;
                    Ok::<_, UploadError>(file.clone())
                })?
                .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))?;

            if !pause(cancel, timing.file_delay).await {
                self.abort_remaining(session_id, &file_ids[index..], CANCELLED_REASON)?;
                return Ok(RunEnd::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = self.transfer.transfer(&file, attempt) => Some(outcome),
            };
            let Some(outcome) = outcome else {
                self.abort_remaining(session_id, &file_ids[index..], CANCELLED_REASON)?;
                return Ok(RunEnd::Cancelled);
            };

            self.record_outcome(session_id, file_id, &outcome)?;
        }

        self.db
            .modify_session(session_id, |edit| {
                edit.session.finish()?;
                Ok::<_, UploadError>(())
            })?
            .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))?;
        Ok(RunEnd::Finished)
    }

    fn record_outcome(
        &self,
        session_id: &str,
        file_id: &str,
        outcome: &TransferOutcome,
    ) -> Result<(), UploadError> {
        self.db
            .modify_session(session_id, |edit| {
                let file = edit
                    .file_mut(file_id)
                    .ok_or(UploadError::NotFound("Uploaded file not found"))?;
                match outcome {
                    TransferOutcome::Completed => file.complete(Utc::now())?,
                    TransferOutcome::Failed(reason) => file.fail(reason)?,
                }
                let status = file.status;
                edit.session.record_outcome(status)?;
                Ok::<_, UploadError>(())
            })?
            .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))?;

        match outcome {
            TransferOutcome::Completed => {
                tracing::debug!(session_id = %session_id, file_id = %file_id, "File uploaded");
            }
            TransferOutcome::Failed(reason) => {
                tracing::warn!(session_id = %session_id, file_id = %file_id, reason = %reason, "File upload failed");
            }
        }
        Ok(())
    }

    /// Fail every file of the run that has not been settled and fail the session.
    fn abort_remaining(
        &self,
        session_id: &str,
        file_ids: &[String],
        reason: &str,
    ) -> Result<(), UploadError> {
        self.db
            .modify_session(session_id, |edit| {
                for file_id in file_ids {
                    let Some(file) = edit.file_mut(file_id) else {
                        continue;
                    };
                    if !file.status.is_unsettled() {
                        continue;
                    }
                    file.fail(reason)?;
                    edit.session.record_outcome(FileStatus::Failed)?;
                }
                if edit.session.status == SessionStatus::Uploading {
                    edit.session.abort()?;
                }
                Ok::<_, UploadError>(())
            })?
            .ok_or(UploadError::NotFound(SESSION_NOT_FOUND))?;
        Ok(())
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
