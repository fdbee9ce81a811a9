pub mod db;
pub mod models;
mod sessions;
mod tables;
mod users;
mod workspaces;

pub use db::{Database, DatabaseError};
pub use sessions::SessionEdit;
pub use tables::*;
