use redb::backends::InMemoryBackend;
use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Handle to the session store. Cloning shares the same underlying database.
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl Database {
    /// Create an empty store held entirely in memory.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let db = Arc::new(RedbDatabase::builder().create_with_backend(InMemoryBackend::new())?);

        // Initialize application tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(TOKENS)?;
            let _ = write_txn.open_table(WORKSPACES)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(SESSION_FILES)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }

    /// Verify every table can be opened for reading.
    pub fn health_check(&self) -> Result<(), DatabaseError> {
        let read_txn = self.begin_read()?;
        read_txn.open_table(USERS)?;
        read_txn.open_table(USERNAMES)?;
        read_txn.open_table(TOKENS)?;
        read_txn.open_table(WORKSPACES)?;
        read_txn.open_table(SESSIONS)?;
        read_txn.open_table(FILES)?;
        read_txn.open_table(SESSION_FILES)?;
        Ok(())
    }
}

// ============================================================================
// Record helpers shared by the per-entity modules
// ============================================================================

pub(super) fn load<T, R>(table: &R, id: &str) -> Result<Option<T>, DatabaseError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(id)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

pub(super) fn load_all<T, R>(table: &R) -> Result<Vec<T>, DatabaseError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    for result in table.iter()? {
        let (_, value) = result?;
        records.push(rmp_serde::from_slice(value.value())?);
    }
    Ok(records)
}

pub(super) fn store<T: Serialize>(
    txn: &WriteTransaction,
    table: RecordTable,
    id: &str,
    record: &T,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(record)?;
    let mut table = txn.open_table(table)?;
    table.insert(id, data.as_slice())?;
    Ok(())
}
