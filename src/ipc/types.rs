use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Deserialize;

use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Per-process state. At most one workspace is open; selecting another
/// replaces the connection.
#[derive(Default)]
pub struct AppState {
    workspace: Option<PathBuf>,
    db: Option<Connection>,
}

impl AppState {
    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub fn conn(&self) -> Option<&Connection> {
        self.db.as_ref()
    }

    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let conn = db::open_db(&path)?;
        self.db = Some(conn);
        self.workspace = Some(path);
        Ok(())
    }
}
