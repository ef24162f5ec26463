// src/db.rs
//! Key-value persistence port. Values are JSON documents addressed by a
//! small set of well-known keys.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

const DB_FILE_NAME: &str = "gym-tracker.sqlite";
const APP_DATA_DIR: &str = "gym-tracker";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(#[source] rusqlite::Error),
    #[error("Database write failed: {0}")]
    WriteFailed(#[source] rusqlite::Error),
    #[error("Stored value for '{key}' is not valid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Keys the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum StorageKey {
    #[strum(serialize = "workoutHistory")]
    WorkoutHistory,
    #[strum(serialize = "customWorkouts")]
    CustomWorkouts,
    #[strum(serialize = "bodyWeight")]
    BodyWeight,
}

/// Get/set of named JSON values.
pub trait Storage {
    /// # Errors
    /// Backend-specific read failures.
    fn get(&self, key: StorageKey) -> Result<Option<Value>, Error>;
    /// # Errors
    /// Backend-specific write failures.
    fn set(&self, key: StorageKey, value: &Value) -> Result<(), Error>;
    /// # Errors
    /// Backend-specific write failures.
    fn remove(&self, key: StorageKey) -> Result<(), Error>;
}

/// Reads `key` and decodes it, `None` when absent.
/// # Errors
/// Returns `Error::Decode` when the stored JSON does not match `T`.
pub fn load<T: DeserializeOwned>(storage: &dyn Storage, key: StorageKey) -> Result<Option<T>, Error> {
    storage
        .get(key)?
        .map(|value| {
            serde_json::from_value(value).map_err(|source| Error::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

/// Encodes `value` and writes it under `key`.
/// # Errors
/// Returns `Error::Encode` or a backend write error.
pub fn store<T: Serialize + ?Sized>(storage: &dyn Storage, key: StorageKey, value: &T) -> Result<Value, Error> {
    let json = serde_json::to_value(value).map_err(|source| Error::Encode {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &json)?;
    Ok(json)
}

/// Gets the path to the SQLite database file within the app's data directory.
/// Creates the directory if it doesn't exist.
pub fn get_db_path() -> Result<PathBuf, Error> {
    let data_dir = dirs::data_dir().ok_or(Error::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// SQLite-backed storage: one row per key, JSON text payload.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (and initializes) the database at `path`.
    /// # Errors
    /// Returns `Error::Connection` if the file cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(Error::Connection)?;
        Self::from_connection(conn)
    }

    /// # Errors
    /// Returns `Error::Connection` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(Error::Connection)?;
        Self::from_connection(conn)
    }

    /// # Errors
    /// Returns `Error::Connection` if the schema cannot be created.
    pub fn from_connection(conn: Connection) -> Result<Self, Error> {
        init_db(&conn)?;
        Ok(Self { conn })
    }
}

/// Initializes the key-value table if it doesn't exist.
pub fn init_db(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,       -- JSON document
            updated_at TEXT NOT NULL   -- RFC3339
        )",
        [],
    )
    .map_err(Error::Connection)?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn get(&self, key: StorageKey) -> Result<Option<Value>, Error> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key.as_ref()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::QueryFailed)?;
        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| Error::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn set(&self, key: StorageKey, value: &Value) -> Result<(), Error> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key.as_ref(), value.to_string(), Utc::now().to_rfc3339()],
            )
            .map_err(Error::WriteFailed)?;
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key.as_ref()])
            .map_err(Error::WriteFailed)?;
        Ok(())
    }
}

/// Process-local storage, nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RefCell<HashMap<StorageKey, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: StorageKey) -> Result<Option<Value>, Error> {
        Ok(self.values.borrow().get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &Value) -> Result<(), Error> {
        self.values.borrow_mut().insert(key, value.clone());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), Error> {
        self.values.borrow_mut().remove(&key);
        Ok(())
    }
}
