use super::db::{load, load_all, store, Database, DatabaseError};
use super::models::Workspace;
use super::tables::*;

impl Database {
    // ========================================================================
    // Workspace operations
    // ========================================================================

    /// Insert or replace workspaces (catalog seeding)
    pub fn put_workspaces(&self, workspaces: &[Workspace]) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        for workspace in workspaces {
            debug_assert!(!workspace.id.is_empty(), "workspace id must not be empty");
            store(&write_txn, WORKSPACES, &workspace.id, workspace)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_workspace(&self, id: &str) -> Result<Option<Workspace>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WORKSPACES)?;
        load(&table, id)
    }

    /// All workspaces, ordered by id
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(WORKSPACES)?;
        load_all(&table)
    }
}
