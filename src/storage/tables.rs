use redb::TableDefinition;

/// Every record table maps an id to a msgpack-encoded record.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Users: uuid -> User (msgpack)
pub const USERS: RecordTable = TableDefinition::new("users");

/// Username index: username -> user uuid
pub const USERNAMES: TableDefinition<&str, &str> = TableDefinition::new("usernames");

/// Token index: access token -> user uuid (for bearer lookups)
pub const TOKENS: TableDefinition<&str, &str> = TableDefinition::new("tokens");

/// Workspaces: workspace id -> Workspace (msgpack)
pub const WORKSPACES: RecordTable = TableDefinition::new("workspaces");

/// Upload sessions: uuid -> UploadSession (msgpack)
pub const SESSIONS: RecordTable = TableDefinition::new("upload_sessions");

/// Uploaded files: uuid -> UploadedFile (msgpack)
pub const FILES: RecordTable = TableDefinition::new("uploaded_files");

/// Session index: session uuid -> msgpack Vec of file UUIDs, in submission order
pub const SESSION_FILES: RecordTable = TableDefinition::new("session_files");
