pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod repository;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub use repository::{
    MorningCallRepository, RelationshipRepository, StoreError, StoreResult, UserRepository,
};

/// SQLite-backed store implementing every repository trait.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn, &path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        info!("Database opened at {}", label);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

/// One handle per entity type, shared by the services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub relationships: Arc<dyn RelationshipRepository>,
    pub morning_calls: Arc<dyn MorningCallRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUserRepository::new()),
            relationships: Arc::new(memory::MemoryRelationshipRepository::new()),
            morning_calls: Arc::new(memory::MemoryMorningCallRepository::new()),
        }
    }

    pub fn sqlite(db: Arc<Database>) -> Self {
        Self {
            users: db.clone(),
            relationships: db.clone(),
            morning_calls: db,
        }
    }
}
