//! SQLite-backed store for everything the signature workflow mutates.
//!
//! One connection serves the signing, notification, alert and pipeline
//! traits, so that multi-row read-then-write sequences run under a single
//! lock or transaction.

mod alerts;
mod notifications;
mod pipeline;
mod schema;
mod signing;

pub use schema::WORKFLOW_VERSIONED_SCHEMAS;

use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteWorkflowStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWorkflowStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();
        let mut conn = Connection::open(path).context("Failed to open workflow database")?;
        open_versioned(&mut conn, WORKFLOW_VERSIONED_SCHEMAS, is_new_db, "workflow")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        open_versioned(&mut conn, WORKFLOW_VERSIONED_SCHEMAS, true, "workflow")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
