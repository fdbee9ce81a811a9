mod auth;
mod health;
mod uploads;
mod workspaces;

pub use auth::{login, me};
pub use health::health;
pub use uploads::{
    cancel_upload, create_session, get_progress, list_sessions, retry_upload, upload_files,
};
pub use workspaces::{list_workspaces, workspace_metadata};
