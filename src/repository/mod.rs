//! Persistence behind one async contract.
//!
//! A session picks exactly one [`Repository`] when it starts:
//! - [`LocalRepository`]: the whole [`Snapshot`] as one JSON document under a
//!   fixed key in the data directory.
//! - [`RemoteRepository`]: per-collection HTTP calls against a `daylog serve`
//!   instance, scoped by an owner identity.

mod local;
mod remote;

pub use local::{LocalRepository, STORAGE_KEY};
pub use remote::RemoteRepository;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Instant;
use crate::models::{DayMeta, Entry, NewEntry, Note, Snapshot, Templates};

/// Repository failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Short backend name for logs and status output.
    fn name(&self) -> &'static str;

    /// Full snapshot load at session start.
    async fn load_all(&self) -> Result<Snapshot, RepositoryError>;

    /// The stored record for `date`, creating a blank one only if none exists.
    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayMeta, RepositoryError>;

    /// Insert or replace a day's annotations; returns the record with its permanent id.
    async fn create_or_update_day(&self, meta: &DayMeta) -> Result<DayMeta, RepositoryError>;

    /// Persist a new entry; returns it with its permanent id and derived date.
    async fn create_entry(&self, input: &NewEntry) -> Result<Entry, RepositoryError>;

    /// Delete an entry. Deleting an absent id succeeds.
    async fn delete_entry(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Insert a note or refresh its `last_used`.
    async fn upsert_note(&self, text: &str, now: Instant) -> Result<Note, RepositoryError>;

    /// Persist templates where the backend keeps them.
    async fn save_templates(&self, templates: &Templates) -> Result<(), RepositoryError>;

    /// Replace all stored data with `snapshot`; returns what is now stored.
    async fn replace_all(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError>;
}
