use redb::ReadableTable;

use super::db::{load, store, Database, DatabaseError};
use super::models::User;
use super::tables::*;

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Store a new user and index its username.
    /// Returns `false` without writing anything if the username is already taken.
    pub fn create_user(&self, user: &User) -> Result<bool, DatabaseError> {
        debug_assert!(!user.id.is_empty(), "user id must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut usernames = write_txn.open_table(USERNAMES)?;
            if usernames.get(user.username.as_str())?.is_some() {
                return Ok(false);
            }
            usernames.insert(user.username.as_str(), user.id.as_str())?;
        }
        store(&write_txn, USERS, &user.id, user)?;
        if let Some(ref token) = user.access_token {
            let mut tokens = write_txn.open_table(TOKENS)?;
            tokens.insert(token.as_str(), user.id.as_str())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    /// Get a user by its UUID
    pub fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        load(&table, id)
    }

    /// Get a user by username (resolves username -> uuid -> user)
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let usernames = read_txn.open_table(USERNAMES)?;

        let id = match usernames.get(username)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let users = read_txn.open_table(USERS)?;
        load(&users, &id)
    }

    /// Get the user currently holding an access token
    pub fn get_user_by_token(&self, token: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let tokens = read_txn.open_table(TOKENS)?;

        let id = match tokens.get(token)? {
            Some(data) => data.value().to_string(),
            None => return Ok(None),
        };

        let users = read_txn.open_table(USERS)?;
        load(&users, &id)
    }

    /// Replace a user's access token, retiring the previous one.
    /// Returns `false` if the user does not exist.
    pub fn set_user_token(&self, user_id: &str, token: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: Option<User> = {
            let users = write_txn.open_table(USERS)?;
            load(&users, user_id)?
        };

        let updated = match existing {
            Some(mut user) => {
                {
                    let mut tokens = write_txn.open_table(TOKENS)?;
                    if let Some(ref old) = user.access_token {
                        tokens.remove(old.as_str())?;
                    }
                    tokens.insert(token, user_id)?;
                }
                user.access_token = Some(token.to_string());
                store(&write_txn, USERS, user_id, &user)?;
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(updated)
    }
}
