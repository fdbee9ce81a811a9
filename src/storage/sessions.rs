use super::db::{load, load_all, store, Database, DatabaseError};
use super::models::{UploadSession, UploadedFile};
use super::tables::*;

/// A session and its files loaded inside one write transaction.
///
/// Only records touched through the mutable accessors are written back.
#[derive(Debug)]
pub struct SessionEdit {
    pub session: UploadSession,
    files: Vec<UploadedFile>,
    dirty: Vec<bool>,
    added: bool,
}

impl SessionEdit {
    /// Files of the session in submission order
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn file_mut(&mut self, id: &str) -> Option<&mut UploadedFile> {
        let index = self.files.iter().position(|f| f.id == id)?;
        self.dirty[index] = true;
        Some(&mut self.files[index])
    }

    /// Mutable access to every file; all of them are written back.
    pub fn files_mut(&mut self) -> &mut [UploadedFile] {
        self.dirty.iter_mut().for_each(|d| *d = true);
        &mut self.files
    }

    /// Append a new file to the end of the session's submission order
    pub fn push_file(&mut self, file: UploadedFile) {
        debug_assert_eq!(file.session_id, self.session.id);
        self.files.push(file);
        self.dirty.push(true);
        self.added = true;
    }
}

impl Database {
    // ========================================================================
    // Upload session operations
    // ========================================================================

    pub fn create_session(&self, session: &UploadSession) -> Result<(), DatabaseError> {
        debug_assert!(!session.id.is_empty(), "session id must not be empty");

        let write_txn = self.begin_write()?;
        store(&write_txn, SESSIONS, &session.id, session)?;
        store(&write_txn, SESSION_FILES, &session.id, &Vec::<String>::new())?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_session(&self, id: &str) -> Result<Option<UploadSession>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        load(&table, id)
    }

    /// Sessions matching a predicate, in no particular order
    pub fn list_sessions<F>(&self, predicate: F) -> Result<Vec<UploadSession>, DatabaseError>
    where
        F: Fn(&UploadSession) -> bool,
    {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        let sessions: Vec<UploadSession> = load_all(&table)?;
        Ok(sessions.into_iter().filter(|s| predicate(s)).collect())
    }

    /// Get a session together with its files (submission order) from a single snapshot
    pub fn session_snapshot(
        &self,
        id: &str,
    ) -> Result<Option<(UploadSession, Vec<UploadedFile>)>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let sessions = read_txn.open_table(SESSIONS)?;
        let session: UploadSession = match load(&sessions, id)? {
            Some(session) => session,
            None => return Ok(None),
        };

        let index = read_txn.open_table(SESSION_FILES)?;
        let file_ids: Vec<String> = load(&index, id)?.unwrap_or_default();

        let files_table = read_txn.open_table(FILES)?;
        let mut files = Vec::with_capacity(file_ids.len());
        for file_id in &file_ids {
            if let Some(file) = load(&files_table, file_id)? {
                files.push(file);
            }
        }

        Ok(Some((session, files)))
    }

    /// Files of a session in submission order
    pub fn get_session_files(&self, session_id: &str) -> Result<Vec<UploadedFile>, DatabaseError> {
        Ok(self
            .session_snapshot(session_id)?
            .map(|(_, files)| files)
            .unwrap_or_default())
    }

    pub fn get_file(&self, id: &str) -> Result<Option<UploadedFile>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        load(&table, id)
    }

    /// Apply `mutate` to a session and its files in one write transaction.
    ///
    /// Returns `Ok(None)` if the session does not exist. If `mutate` fails the
    /// transaction is dropped and nothing is written.
    pub fn modify_session<T, E, F>(&self, id: &str, mutate: F) -> Result<Option<T>, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&mut SessionEdit) -> Result<T, E>,
    {
        let write_txn = self.begin_write()?;

        let session: UploadSession = {
            let sessions = write_txn.open_table(SESSIONS).map_err(DatabaseError::from)?;
            match load(&sessions, id)? {
                Some(session) => session,
                None => return Ok(None),
            }
        };

        let files: Vec<UploadedFile> = {
            let index = write_txn
                .open_table(SESSION_FILES)
                .map_err(DatabaseError::from)?;
            let file_ids: Vec<String> = load(&index, id)?.unwrap_or_default();

            let files_table = write_txn.open_table(FILES).map_err(DatabaseError::from)?;
            let mut files = Vec::with_capacity(file_ids.len());
            for file_id in &file_ids {
                if let Some(file) = load(&files_table, file_id)? {
                    files.push(file);
                }
            }
            files
        };

        let mut edit = SessionEdit {
            session,
            dirty: vec![false; files.len()],
            files,
            added: false,
        };
        let result = mutate(&mut edit)?;

        store(&write_txn, SESSIONS, id, &edit.session)?;
        for (file, dirty) in edit.files.iter().zip(&edit.dirty) {
            if *dirty {
                store(&write_txn, FILES, &file.id, file)?;
            }
        }
        if edit.added {
            let file_ids: Vec<&str> = edit.files.iter().map(|f| f.id.as_str()).collect();
            store(&write_txn, SESSION_FILES, id, &file_ids)?;
        }

        write_txn.commit().map_err(DatabaseError::from)?;
        Ok(Some(result))
    }
}
