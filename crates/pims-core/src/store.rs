//! SQLite-backed person record store.
//!
//! [`PersonStore`] holds only the database location. Every caller opens its
//! own [`Session`] with [`PersonStore::connect`]; the connection lives exactly
//! as long as the session value, so there is no connection state shared
//! between concurrent callers.

use crate::types::{Bbox, BboxParseError, NewPerson, PersonRecord};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const TABLE_NAME: &str = "person_info";

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS person_info (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    image   TEXT NOT NULL,
    bbox    TEXT NOT NULL,
    name    TEXT NOT NULL,
    surname TEXT NOT NULL
);";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unsupported database scheme {0:?} — this build only ships the SQLite engine")]
    UnsupportedScheme(String),
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error("record {id} has a corrupt bbox column: {source}")]
    CorruptBbox {
        id: i64,
        #[source]
        source: BboxParseError,
    },
}

/// Rewrite the legacy `postgres://` scheme to `postgresql://`.
///
/// Some hosting providers still hand out connection strings with the old
/// prefix. Anything else is returned unchanged.
pub fn normalize_database_url(raw: &str) -> String {
    match raw.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => raw.to_string(),
    }
}

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    File(PathBuf),
    /// Private in-memory database. Every session gets a fresh, empty one.
    Memory,
}

impl DatabaseUrl {
    /// Parse a connection string after scheme normalization.
    ///
    /// Accepts `sqlite://<path>`, `sqlite:<path>`, `file:<path>`, a bare path,
    /// and `:memory:` / `sqlite::memory:`.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let url = normalize_database_url(raw.trim());

        if url == ":memory:" || url == "sqlite::memory:" {
            return Ok(Self::Memory);
        }

        let path = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if let Some(rest) = url.strip_prefix("file:") {
            rest
        } else if let Some((scheme, _)) = url.split_once("://") {
            return Err(StoreError::UnsupportedScheme(scheme.to_string()));
        } else {
            url.as_str()
        };

        if path.is_empty() {
            return Err(StoreError::InvalidUrl(raw.to_string()));
        }
        Ok(Self::File(PathBuf::from(path)))
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "sqlite://{}", path.display()),
            Self::Memory => f.write_str("sqlite::memory:"),
        }
    }
}

/// Handle to the person store. Cheap to clone; holds no connection.
#[derive(Debug, Clone)]
pub struct PersonStore {
    url: DatabaseUrl,
}

impl PersonStore {
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            url: DatabaseUrl::parse(url)?,
        })
    }

    pub fn url(&self) -> &DatabaseUrl {
        &self.url
    }

    /// Open a scoped session. The connection is closed when it is dropped.
    pub fn connect(&self) -> Result<Session, StoreError> {
        let conn = match &self.url {
            DatabaseUrl::File(path) => Connection::open(path)?,
            DatabaseUrl::Memory => Connection::open_in_memory()?,
        };
        Ok(Session {
            conn,
            staged: Vec::new(),
        })
    }

    /// Open a scoped session that can only read.
    ///
    /// Unlike [`connect`](Self::connect), a missing database file is an error
    /// rather than being created.
    pub fn connect_read_only(&self) -> Result<Session, StoreError> {
        let conn = match &self.url {
            DatabaseUrl::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            DatabaseUrl::Memory => Connection::open_in_memory()?,
        };
        Ok(Session {
            conn,
            staged: Vec::new(),
        })
    }

    /// Ensure the `person_info` table exists. Safe to call repeatedly.
    pub fn create_schema(&self) -> Result<(), StoreError> {
        self.connect()?.create_schema()
    }
}

/// One connection plus the records staged on it.
///
/// Staged records are discarded if the session is dropped without
/// [`commit_batch`](Session::commit_batch).
pub struct Session {
    conn: Connection,
    staged: Vec<NewPerson>,
}

impl Session {
    pub fn create_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(CREATE_TABLE_SQL)?;
        tracing::info!(table = TABLE_NAME, "schema ready");
        Ok(())
    }

    /// Stage a record. No id is assigned until the batch commits.
    pub fn insert(&mut self, person: NewPerson) {
        self.staged.push(person);
    }

    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    /// Write every staged record in a single transaction.
    ///
    /// Returns the assigned ids in staging order. On error the transaction is
    /// rolled back and nothing from the batch is visible.
    pub fn commit_batch(&mut self) -> Result<Vec<i64>, StoreError> {
        let staged = std::mem::take(&mut self.staged);
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(staged.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO person_info (image, bbox, name, surname) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for person in &staged {
                stmt.execute(params![
                    person.image,
                    person.bbox.to_string(),
                    person.name,
                    person.surname
                ])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        tracing::debug!(count = ids.len(), "batch committed");
        Ok(ids)
    }

    /// Look up a record by id. `Ok(None)` means no such record.
    pub fn get_by_id(&self, id: i64) -> Result<Option<PersonRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, image, bbox, name, surname FROM person_info WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, image, bbox, name, surname)) = row else {
            return Ok(None);
        };
        let bbox: Bbox = bbox
            .parse()
            .map_err(|source| StoreError::CorruptBbox { id, source })?;

        Ok(Some(PersonRecord {
            id,
            image,
            bbox,
            name,
            surname,
        }))
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM person_info", [], |row| row.get(0))?)
    }
}
