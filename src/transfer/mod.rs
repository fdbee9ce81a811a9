mod simulated;

pub use simulated::SimulatedTransfer;

use async_trait::async_trait;

use crate::storage::models::UploadedFile;

/// Which pass over a session's files is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Retry,
}

/// Result of moving one file to the document-management platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Failed(String),
}

/// Abstraction over the operation that actually delivers a file.
/// Failures are reported as an outcome, never as an error: they belong to the file, not the request.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn transfer(&self, file: &UploadedFile, attempt: Attempt) -> TransferOutcome;
}
