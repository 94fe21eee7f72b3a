use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line on the wire. `params` defaults to null so methods
/// without arguments can omit it.
#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state: nothing survives a request except the selected workspace
/// and its open connection.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
