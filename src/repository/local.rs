use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::clock::Instant;
use crate::models::{DayMeta, Entry, NewEntry, Note, Snapshot, Templates};

/// Key the snapshot document is stored under.
pub const STORAGE_KEY: &str = "daylog-snapshot-v1";

/// Durable single-document store.
///
/// Every write rewrites the whole snapshot (temp file + rename). Day records
/// are matched by id first, then by date, so a date never holds two records.
pub struct LocalRepository {
    path: Option<PathBuf>,
    doc: Mutex<Snapshot>,
}

impl LocalRepository {
    /// Open the document stored in `dir`, starting empty if none exists.
    pub async fn open(dir: &Path) -> Result<Self, RepositoryError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", STORAGE_KEY));

        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Snapshot::from_json(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Opened local store at {}", path.display());

        Ok(Self {
            path: Some(path),
            doc: Mutex::new(doc),
        })
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(Snapshot::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn persist(&self, doc: &Snapshot) -> Result<(), RepositoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = doc.to_json_pretty()?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the document and commit it only if it persists.
    async fn write<T, F>(&self, change: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Snapshot) -> T + Send,
        T: Send,
    {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        let out = change(&mut next);
        self.persist(&next).await?;
        *doc = next;
        Ok(out)
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn load_all(&self) -> Result<Snapshot, RepositoryError> {
        Ok(self.doc.lock().await.clone())
    }

    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayMeta, RepositoryError> {
        if let Some(day) = self.doc.lock().await.days.iter().find(|d| d.date == date) {
            return Ok(day.clone());
        }
        self.write(move |doc| match doc.days.iter().find(|d| d.date == date) {
            Some(day) => day.clone(),
            None => {
                let day = DayMeta::blank(date);
                doc.days.push(day.clone());
                day
            }
        })
        .await
    }

    async fn create_or_update_day(&self, meta: &DayMeta) -> Result<DayMeta, RepositoryError> {
        let meta = meta.clone();
        self.write(move |doc| {
            let slot = doc
                .days
                .iter()
                .position(|d| d.id == meta.id)
                .or_else(|| doc.days.iter().position(|d| d.date == meta.date));
            match slot {
                Some(i) => doc.days[i] = meta.clone(),
                None => doc.days.push(meta.clone()),
            }
            // An id match may have moved the record onto a date another record holds.
            let (id, date) = (meta.id, meta.date);
            doc.days.retain(|d| d.id == id || d.date != date);
            meta
        })
        .await
    }

    async fn create_entry(&self, input: &NewEntry) -> Result<Entry, RepositoryError> {
        input.validate().map_err(RepositoryError::BadRequest)?;
        let entry = input.clone().into_entry(Uuid::new_v4());
        self.write(move |doc| {
            doc.entries.push(entry.clone());
            entry
        })
        .await
    }

    async fn delete_entry(&self, id: Uuid) -> Result<(), RepositoryError> {
        if !self.doc.lock().await.entries.iter().any(|e| e.id == id) {
            return Ok(());
        }
        self.write(move |doc| doc.entries.retain(|e| e.id != id)).await
    }

    async fn upsert_note(&self, text: &str, now: Instant) -> Result<Note, RepositoryError> {
        let text = text.to_string();
        self.write(move |doc| match doc.notes.iter_mut().find(|n| n.text == text) {
            Some(note) => {
                note.last_used = now;
                note.clone()
            }
            None => {
                let note = Note { text, last_used: now };
                doc.notes.push(note.clone());
                note
            }
        })
        .await
    }

    async fn save_templates(&self, templates: &Templates) -> Result<(), RepositoryError> {
        let templates = templates.clone();
        self.write(move |doc| doc.templates = templates).await
    }

    async fn replace_all(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError> {
        let snapshot = snapshot.clone();
        self.write(move |doc| {
            *doc = snapshot;
            doc.clone()
        })
        .await
    }
}
