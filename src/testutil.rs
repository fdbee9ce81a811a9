//! Shared test helpers for bulk-uploader unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::auth::Authenticator;
use crate::catalog;
use crate::config::{Config, RunTiming, TransferConfig, UploadConfig};
use crate::storage::models::UploadedFile;
use crate::storage::Database;
use crate::transfer::{Attempt, FileTransfer, TransferOutcome};
use crate::upload::{RunSchedule, UploadOrchestrator};
use crate::AppState;

/// Deterministic transfer: fails files by name, separately per attempt.
#[derive(Default)]
pub struct ScriptedTransfer {
    fail_initial: HashSet<String>,
    fail_retry: HashSet<String>,
    fail_everything: bool,
    calls: AtomicUsize,
}

impl ScriptedTransfer {
    pub fn succeed_all() -> Self {
        Self::default()
    }

    pub fn fail_all() -> Self {
        Self {
            fail_everything: true,
            ..Self::default()
        }
    }

    pub fn fail_initial<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_initial.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn fail_retry<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_retry.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileTransfer for ScriptedTransfer {
    async fn transfer(&self, file: &UploadedFile, attempt: Attempt) -> TransferOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = match attempt {
            Attempt::Initial => &self.fail_initial,
            Attempt::Retry => &self.fail_retry,
        };
        if self.fail_everything || failing.contains(&file.file_name) {
            TransferOutcome::Failed(format!("scripted failure ({attempt:?})"))
        } else {
            TransferOutcome::Completed
        }
    }
}

pub fn no_delay() -> RunSchedule {
    let timing = RunTiming {
        start_delay: Duration::ZERO,
        file_delay: Duration::ZERO,
    };
    RunSchedule {
        initial: timing,
        retry: timing,
    }
}

/// A store seeded with the default workspace catalog
pub fn test_db() -> Database {
    let db = Database::in_memory().expect("Failed to open test database");
    db.put_workspaces(&catalog::default_workspaces())
        .expect("Failed to seed workspaces");
    db
}

/// Create a test AppState with an in-memory store and no run delays.
pub fn test_state(transfer: ScriptedTransfer) -> Arc<AppState> {
    let config = Config {
        bind_address: "127.0.0.1:0".to_string(),
        upload: UploadConfig {
            max_upload_size: 10 * 1024 * 1024, // 10MB for tests
            ..UploadConfig::default()
        },
        transfer: TransferConfig::default(),
        workspaces_file: None,
    };

    let db = test_db();
    let uploads = Arc::new(UploadOrchestrator::new(
        db.clone(),
        Arc::new(transfer),
        no_delay(),
    ));

    Arc::new(AppState {
        config,
        auth: Authenticator::new(db.clone()),
        db,
        uploads,
        started_at: Instant::now(),
    })
}

/// Wait for the active run of a session to end, panicking after five seconds.
pub async fn wait_until_idle(uploads: &UploadOrchestrator, session_id: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while uploads.is_running(session_id).await {
        assert!(
            Instant::now() < deadline,
            "upload run for {session_id} did not finish"
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
