use std::collections::HashMap;

use bulk_uploader::catalog;
use bulk_uploader::state_machine::{FileStatus, SessionStatus};
use bulk_uploader::storage::models::{PasswordHash, UploadSession, UploadedFile, User};
use bulk_uploader::storage::{Database, DatabaseError};
use chrono::Utc;

fn test_db() -> Database {
    Database::in_memory().unwrap()
}

fn sample_user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        password: PasswordHash {
            iterations: 1,
            salt: vec![0; 16],
            hash: vec![1; 32],
        },
        server_url: "https://dms.example.com".to_string(),
        access_token: None,
        created_at: Utc::now(),
    }
}

fn sample_session(db: &Database, user_id: &str, workspace_id: &str, total: u32) -> UploadSession {
    let session = UploadSession::new(
        workspace_id,
        Some(user_id.to_string()),
        total,
        HashMap::new(),
    );
    db.create_session(&session).unwrap();
    session
}

/// Add files to a session through a write transaction
fn add_files(db: &Database, session_id: &str, names: &[&str]) -> Vec<String> {
    db.modify_session(session_id, |edit| {
        let mut ids = Vec::new();
        for name in names {
            let file = UploadedFile::new(session_id, *name, 100, "application/pdf");
            ids.push(file.id.clone());
            edit.push_file(file);
        }
        Ok::<_, DatabaseError>(ids)
    })
    .unwrap()
    .expect("session should exist")
}

#[derive(Debug)]
enum EditError {
    Rejected,
    Store(DatabaseError),
}

impl From<DatabaseError> for EditError {
    fn from(e: DatabaseError) -> Self {
        EditError::Store(e)
    }
}

// ============================================================================
// Users
// ============================================================================

#[test]
fn test_create_and_get_user() {
    let db = test_db();
    assert!(db.create_user(&sample_user("u-1", "alice")).unwrap());

    let by_id = db.get_user("u-1").unwrap().expect("user should exist");
    assert_eq!(by_id.username, "alice");

    let by_name = db
        .get_user_by_username("alice")
        .unwrap()
        .expect("user should resolve by name");
    assert_eq!(by_name.id, "u-1");
    assert!(db.get_user_by_username("bob").unwrap().is_none());
}

#[test]
fn test_duplicate_username_rejected() {
    let db = test_db();
    assert!(db.create_user(&sample_user("u-1", "alice")).unwrap());
    assert!(!db.create_user(&sample_user("u-2", "alice")).unwrap());
    assert!(db.get_user("u-2").unwrap().is_none());
}

#[test]
fn test_token_rotation_retires_old_token() {
    let db = test_db();
    db.create_user(&sample_user("u-1", "alice")).unwrap();

    assert!(db.set_user_token("u-1", "token-a").unwrap());
    assert_eq!(db.get_user_by_token("token-a").unwrap().unwrap().id, "u-1");

    assert!(db.set_user_token("u-1", "token-b").unwrap());
    assert!(db.get_user_by_token("token-a").unwrap().is_none());
    let user = db.get_user_by_token("token-b").unwrap().unwrap();
    assert_eq!(user.access_token.as_deref(), Some("token-b"));
}

#[test]
fn test_set_token_unknown_user() {
    let db = test_db();
    assert!(!db.set_user_token("nobody", "token").unwrap());
    assert!(db.get_user_by_token("token").unwrap().is_none());
}

// ============================================================================
// Workspaces
// ============================================================================

#[test]
fn test_workspaces_listed_by_id() {
    let db = test_db();
    db.put_workspaces(&catalog::default_workspaces()).unwrap();

    let ids: Vec<String> = db
        .list_workspaces()
        .unwrap()
        .into_iter()
        .map(|w| w.id)
        .collect();
    assert_eq!(
        ids,
        vec!["ws-finance-001", "ws-hr-001", "ws-legal-001", "ws-marketing-001"]
    );

    let legal = db.get_workspace("ws-legal-001").unwrap().unwrap();
    assert_eq!(legal.name, "Legal Documents");
    assert!(!legal.metadata_fields.is_empty());
    assert!(db.get_workspace("ws-unknown").unwrap().is_none());
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_create_and_get_session() {
    let db = test_db();
    let session = sample_session(&db, "u-1", "ws-hr-001", 3);

    let stored = db.get_session(&session.id).unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Pending);
    assert_eq!(stored.total_files, 3);
    assert_eq!(stored.completed_files, 0);
    assert!(db.get_session_files(&session.id).unwrap().is_empty());
    assert!(db.get_session("missing").unwrap().is_none());
}

#[test]
fn test_snapshot_keeps_submission_order() {
    let db = test_db();
    let session = sample_session(&db, "u-1", "ws-hr-001", 4);
    let first = add_files(&db, &session.id, &["c.pdf", "a.pdf"]);
    let second = add_files(&db, &session.id, &["b.pdf", "d.pdf"]);

    let (snapshot, files) = db.session_snapshot(&session.id).unwrap().unwrap();
    assert_eq!(snapshot.id, session.id);
    let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["c.pdf", "a.pdf", "b.pdf", "d.pdf"]);

    let ids: Vec<String> = files.into_iter().map(|f| f.id).collect();
    assert_eq!(ids, [first, second].concat());
    assert!(db.session_snapshot("missing").unwrap().is_none());
}

#[test]
fn test_modify_session_writes_files_and_counters() {
    let db = test_db();
    let session = sample_session(&db, "u-1", "ws-hr-001", 2);
    let ids = add_files(&db, &session.id, &["a.pdf", "b.pdf"]);

    db.modify_session(&session.id, |edit| {
        let file = edit.file_mut(&ids[0]).unwrap();
        file.status = FileStatus::Completed;
        edit.session.completed_files = 1;
        Ok::<_, DatabaseError>(())
    })
    .unwrap()
    .unwrap();

    let file = db.get_file(&ids[0]).unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(db.get_file(&ids[1]).unwrap().unwrap().status, FileStatus::Pending);
    assert_eq!(db.get_session(&session.id).unwrap().unwrap().completed_files, 1);
}

#[test]
fn test_modify_session_aborts_on_error() {
    let db = test_db();
    let session = sample_session(&db, "u-1", "ws-hr-001", 2);
    let ids = add_files(&db, &session.id, &["a.pdf"]);

    let result = db.modify_session(&session.id, |edit| {
        edit.session.failed_files = 1;
        edit.file_mut(&ids[0]).unwrap().status = FileStatus::Failed;
        edit.push_file(UploadedFile::new(&session.id, "b.pdf", 1, "text/plain"));
        Err::<(), _>(EditError::Rejected)
    });
    assert!(matches!(result, Err(EditError::Rejected)));

    let (stored, files) = db.session_snapshot(&session.id).unwrap().unwrap();
    assert_eq!(stored.failed_files, 0);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].status, FileStatus::Pending);
}

#[test]
fn test_modify_missing_session() {
    let db = test_db();
    let result = db
        .modify_session("missing", |_| Ok::<_, DatabaseError>(()))
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn test_list_sessions_with_predicate() {
    let db = test_db();
    let mine = sample_session(&db, "u-1", "ws-hr-001", 1);
    sample_session(&db, "u-1", "ws-legal-001", 1);
    sample_session(&db, "u-2", "ws-hr-001", 1);

    let all = db.list_sessions(|_| true).unwrap();
    assert_eq!(all.len(), 3);

    let filtered = db
        .list_sessions(|s| s.user_id.as_deref() == Some("u-1") && s.workspace_id == "ws-hr-001")
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, mine.id);
}

#[test]
fn test_health_check() {
    let db = test_db();
    db.health_check().unwrap();
}
