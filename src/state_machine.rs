//! Lifecycle rules for upload sessions and the files they track.
//!
//! Sessions move `pending -> uploading -> completed`, re-entering `uploading` on
//! retry. `failed` is only reached when a run is cancelled. Files move
//! `pending -> uploading -> {completed | failed}`; a failed file can be reset to
//! `pending` for a retry, a completed file never changes again.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::models::{UploadSession, UploadedFile};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("session already accounts for all {total} files")]
    CounterOverflow { total: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "uploading" => Some(SessionStatus::Uploading),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Completed, Uploading)
                | (Failed, Uploading)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploading => "uploading",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Failed)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Failed, Pending)
        )
    }

    /// Whether a run still has to decide this file's outcome
    pub fn is_unsettled(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Uploading)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session transitions
// ============================================================================

impl UploadSession {
    fn transition(&mut self, next: SessionStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                entity: "session",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Enter `uploading` for a newly submitted batch.
    pub fn begin_upload(&mut self) -> Result<(), StateError> {
        self.transition(SessionStatus::Uploading)
    }

    /// Enter `uploading` for a retry run. Completed files stay counted, failures are forgotten.
    pub fn begin_retry(&mut self) -> Result<(), StateError> {
        self.transition(SessionStatus::Uploading)?;
        self.failed_files = 0;
        Ok(())
    }

    /// Count one file's terminal outcome.
    pub fn record_outcome(&mut self, status: FileStatus) -> Result<(), StateError> {
        if self.completed_files + self.failed_files >= self.total_files {
            return Err(StateError::CounterOverflow {
                total: self.total_files,
            });
        }
        match status {
            FileStatus::Completed => self.completed_files += 1,
            FileStatus::Failed => self.failed_files += 1,
            other => {
                return Err(StateError::InvalidTransition {
                    entity: "file",
                    from: FileStatus::Uploading.as_str(),
                    to: other.as_str(),
                })
            }
        }
        Ok(())
    }

    /// The run went through every file, regardless of how many failed.
    pub fn finish(&mut self) -> Result<(), StateError> {
        self.transition(SessionStatus::Completed)
    }

    /// The run was cancelled before it went through every file.
    pub fn abort(&mut self) -> Result<(), StateError> {
        self.transition(SessionStatus::Failed)
    }

    /// Completed share of all files, rounded down, 0 for an empty session.
    pub fn progress_percent(&self) -> u8 {
        if self.total_files == 0 {
            return 0;
        }
        let percent = u64::from(self.completed_files) * 100 / u64::from(self.total_files);
        percent.min(100) as u8
    }
}

// ============================================================================
// File transitions
// ============================================================================

impl UploadedFile {
    fn transition(&mut self, next: FileStatus) -> Result<(), StateError> {
        if !self.status.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                entity: "file",
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), StateError> {
        self.transition(FileStatus::Uploading)
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), StateError> {
        self.transition(FileStatus::Completed)?;
        self.error_message = None;
        self.uploaded_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), StateError> {
        self.transition(FileStatus::Failed)?;
        let reason = reason.trim();
        self.error_message = Some(if reason.is_empty() {
            "Upload failed".to_string()
        } else {
            reason.to_string()
        });
        Ok(())
    }

    /// Put a failed file back in line for a retry run.
    pub fn reset(&mut self) -> Result<(), StateError> {
        self.transition(FileStatus::Pending)?;
        self.error_message = None;
        Ok(())
    }
}
