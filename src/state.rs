//! The session's data and the only path that mutates it.
//!
//! [`TimeLog`] owns an in-memory mirror of the [`Snapshot`] and one
//! [`Repository`]. Every mutator writes through the repository first and
//! touches the mirror only after the write is confirmed, so a failed write
//! leaves the mirror exactly as it was.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::aggregate::{self, RangeStats, RangeWindow};
use crate::clock::{self, Instant};
use crate::hierarchy::TimeSlot;
use crate::models::*;
use crate::repository::{Repository, RepositoryError};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

pub struct TimeLog {
    repo: Arc<dyn Repository>,
    mirror: RwLock<Snapshot>,
    /// Serializes read-then-write day operations per date.
    day_guards: DayGuards,
    clock: Clock,
}

impl TimeLog {
    /// A log over `repo` with an empty mirror. Call [`TimeLog::load`] next.
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            mirror: RwLock::new(Snapshot::default()),
            day_guards: Mutex::new(HashMap::new()),
            clock: Arc::new(clock::now),
        }
    }

    pub async fn open(repo: Arc<dyn Repository>) -> Result<Self, StateError> {
        let log = Self::new(repo);
        log.load().await?;
        Ok(log)
    }

    /// Replace the source of "now" used for note recency.
    pub fn with_clock(mut self, clock: impl Fn() -> Instant + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn backend(&self) -> &'static str {
        self.repo.name()
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.mirror.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.mirror.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the per-date lock until the returned guard drops.
    async fn lock_day(&self, date: NaiveDate) -> DayLock<'_> {
        let lock = {
            let mut guards = self.day_guards.lock().unwrap_or_else(PoisonError::into_inner);
            guards.entry(date).or_default().clone()
        };
        DayLock {
            guards: &self.day_guards,
            date,
            held: Some(lock.lock_owned().await),
        }
    }

    fn failed(&self, op: &'static str) -> impl Fn(RepositoryError) -> StateError + '_ {
        move |e| {
            tracing::warn!(backend = self.repo.name(), "{} failed: {}", op, e);
            StateError::Repository(e)
        }
    }

    // ============================================================
    // Mutators
    // ============================================================

    /// Reload the mirror from the repository.
    pub async fn load(&self) -> Result<(), StateError> {
        let snapshot = self.repo.load_all().await.map_err(self.failed("load"))?;
        tracing::debug!(
            backend = self.repo.name(),
            "Loaded {} days, {} entries, {} notes",
            snapshot.days.len(),
            snapshot.entries.len(),
            snapshot.notes.len()
        );
        *self.write() = snapshot;
        Ok(())
    }

    /// The day record for `date`, creating and persisting a blank one if absent.
    ///
    /// Concurrent calls for the same date create at most one record. A record
    /// the repository already holds for `date` is returned as stored, even if
    /// this session has not seen it yet.
    pub async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayMeta, StateError> {
        let _held = self.lock_day(date).await;

        if let Some(day) = self.day(date) {
            return Ok(day);
        }

        let stored = self
            .repo
            .get_or_create_day(date)
            .await
            .map_err(self.failed("create day"))?;
        merge_day(&mut self.write().days, stored.id, stored.clone());
        tracing::debug!("Opened day {}", date);
        Ok(stored)
    }

    /// Upsert a full day record.
    ///
    /// The stored record replaces whatever the mirror holds for its date or
    /// for the id that was sent, so a placeholder id is swapped for the
    /// permanent one everywhere.
    pub async fn update_day_meta(&self, meta: DayMeta) -> Result<DayMeta, StateError> {
        if let Some(wake) = &meta.wake_time {
            if clock::parse_clock(wake).is_none() {
                return Err(StateError::Validation(format!(
                    "Wake time must be HH:MM, got {:?}",
                    wake
                )));
            }
        }

        let _held = self.lock_day(meta.date).await;

        let stored = self
            .repo
            .create_or_update_day(&meta)
            .await
            .map_err(self.failed("update day"))?;
        merge_day(&mut self.write().days, meta.id, stored.clone());
        Ok(stored)
    }

    /// Log a new entry. A note text, if any, is also recorded as a recent note.
    pub async fn add_entry(&self, input: NewEntry) -> Result<Entry, StateError> {
        input.validate().map_err(StateError::Validation)?;

        let entry = self
            .repo
            .create_entry(&input)
            .await
            .map_err(self.failed("add entry"))?;
        self.write().entries.push(entry.clone());
        tracing::info!(
            "Logged {} {}–{} on {}",
            entry.category.as_str(),
            clock::clock_label(&entry.start),
            clock::clock_label(&entry.end),
            entry.date
        );

        if let Some(text) = &entry.note_text {
            // The entry is already stored; a failed note refresh only costs recency.
            if let Err(e) = self.upsert_note(text).await {
                tracing::warn!("Entry {} logged but its note was not recorded: {}", entry.id, e);
            }
        }
        Ok(entry)
    }

    /// Delete an entry. Deleting an unknown id is not an error.
    pub async fn remove_entry(&self, id: Uuid) -> Result<(), StateError> {
        self.repo
            .delete_entry(id)
            .await
            .map_err(self.failed("remove entry"))?;
        self.write().entries.retain(|e| e.id != id);
        Ok(())
    }

    /// Record use of a note text, refreshing `last_used` if it already exists.
    pub async fn upsert_note(&self, text: &str) -> Result<Note, StateError> {
        let text = normalize_note_text(text)
            .ok_or_else(|| StateError::Validation("Note text must not be empty".to_string()))?;
        let now = (self.clock)();

        let note = self
            .repo
            .upsert_note(&text, now)
            .await
            .map_err(self.failed("upsert note"))?;

        let mut mirror = self.write();
        match mirror.notes.iter_mut().find(|n| n.text == note.text) {
            Some(existing) => *existing = note.clone(),
            None => mirror.notes.push(note.clone()),
        }
        Ok(note)
    }

    /// Returns false when the text was empty or already listed.
    pub async fn add_template(&self, category: Category, text: &str) -> Result<bool, StateError> {
        let mut next = self.templates();
        if !next.add(category, text) {
            return Ok(false);
        }
        self.commit_templates(next).await?;
        Ok(true)
    }

    /// Returns false when the text was not listed.
    pub async fn remove_template(&self, category: Category, text: &str) -> Result<bool, StateError> {
        let mut next = self.templates();
        if !next.remove(category, text) {
            return Ok(false);
        }
        self.commit_templates(next).await?;
        Ok(true)
    }

    async fn commit_templates(&self, templates: Templates) -> Result<(), StateError> {
        self.repo
            .save_templates(&templates)
            .await
            .map_err(self.failed("save templates"))?;
        self.write().templates = templates;
        Ok(())
    }

    /// Replace all data with the document in `json`.
    ///
    /// A malformed document is rejected before anything is written.
    pub async fn import_json(&self, json: &str) -> Result<Snapshot, StateError> {
        let snapshot = Snapshot::from_json(json)
            .map_err(|e| StateError::Validation(format!("Malformed snapshot: {}", e)))?;
        let stored = self
            .repo
            .replace_all(&snapshot)
            .await
            .map_err(self.failed("import"))?;
        tracing::info!(
            "Imported {} days, {} entries, {} notes",
            stored.days.len(),
            stored.entries.len(),
            stored.notes.len()
        );
        *self.write() = stored.clone();
        Ok(stored)
    }

    pub fn export_json(&self) -> Result<String, StateError> {
        Ok(self.read().to_json_pretty()?)
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn snapshot(&self) -> Snapshot {
        self.read().clone()
    }

    pub fn day(&self, date: NaiveDate) -> Option<DayMeta> {
        self.read().days.iter().find(|d| d.date == date).cloned()
    }

    /// Entries dated `date`, in start order.
    pub fn entries_on(&self, date: NaiveDate) -> Vec<Entry> {
        let mut entries: Vec<Entry> = self
            .read()
            .entries
            .iter()
            .filter(|e| e.date == date)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.start);
        entries
    }

    /// Categories of every entry overlapping `slot`, whatever its date.
    pub fn slot_categories(&self, slot: &TimeSlot) -> BTreeSet<Category> {
        aggregate::categories_in_range(&self.read().entries, &slot.start, &slot.end)
    }

    /// Statistics for `anchor` and the days before it.
    pub fn range_stats(&self, anchor: NaiveDate, window: RangeWindow) -> RangeStats {
        let dates = aggregate::window_dates(anchor, window);
        aggregate::range_stats(&self.read().entries, &dates)
    }

    pub fn month_stats(&self, year: i32, month: u32) -> RangeStats {
        let dates = aggregate::month_dates(year, month);
        aggregate::range_stats(&self.read().entries, &dates)
    }

    /// Notes by most recent use.
    pub fn recent_notes(&self, limit: usize) -> Vec<Note> {
        let mut notes = self.read().notes.clone();
        notes.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        notes.truncate(limit);
        notes
    }

    /// Note texts to offer when logging `category`: its templates first, then
    /// recent notes not already offered.
    pub fn suggestions(&self, category: Category, limit: usize) -> Vec<String> {
        let mut out: Vec<String> = self.templates().get(category).to_vec();
        for note in self.recent_notes(usize::MAX) {
            if !out.contains(&note.text) {
                out.push(note.text);
            }
        }
        out.truncate(limit);
        out
    }

    pub fn templates(&self) -> Templates {
        self.read().templates.clone()
    }
}

/// Put `stored` in place of any record sharing its date, its id, or the id
/// it was sent under. Keeps the position of the first such record.
type DayGuards = Mutex<HashMap<NaiveDate, Arc<tokio::sync::Mutex<()>>>>;

/// A held per-date lock. Dropping it removes the date's entry once nobody
/// else holds or waits on it.
struct DayLock<'a> {
    guards: &'a DayGuards,
    date: NaiveDate,
    held: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for DayLock<'_> {
    fn drop(&mut self) {
        let mut guards = self.guards.lock().unwrap_or_else(PoisonError::into_inner);
        self.held.take();
        if guards.get(&self.date).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            guards.remove(&self.date);
        }
    }
}

fn merge_day(days: &mut Vec<DayMeta>, sent_id: Uuid, stored: DayMeta) {
    let same = |d: &DayMeta| d.date == stored.date || d.id == stored.id || d.id == sent_id;
    let at = days.iter().position(|d| same(d));
    days.retain(|d| !same(d));
    let at = at.unwrap_or(days.len()).min(days.len());
    days.insert(at, stored);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        clock::parse_date(s).unwrap()
    }

    #[test]
    fn merge_swaps_placeholder_for_permanent_id() {
        let placeholder = DayMeta::blank(date("2024-03-01"));
        let other = DayMeta::blank(date("2024-03-02"));
        let mut days = vec![placeholder.clone(), other.clone()];

        let stored = DayMeta {
            id: Uuid::new_v4(),
            goal: "ship".to_string(),
            ..placeholder.clone()
        };
        merge_day(&mut days, placeholder.id, stored.clone());

        assert_eq!(days, vec![stored, other]);
    }

    #[test]
    fn merge_appends_new_dates() {
        let mut days = vec![DayMeta::blank(date("2024-03-01"))];
        let fresh = DayMeta::blank(date("2024-03-05"));
        merge_day(&mut days, fresh.id, fresh.clone());
        assert_eq!(days.len(), 2);
        assert_eq!(days[1], fresh);
    }

    fn guard_count(log: &TimeLog) -> usize {
        log.day_guards.lock().unwrap().len()
    }

    #[tokio::test]
    async fn day_locks_are_dropped_after_use() {
        let log = TimeLog::new(Arc::new(crate::repository::LocalRepository::in_memory()));

        for day in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            let meta = log.get_or_create_day(date(day)).await.unwrap();
            log.update_day_meta(meta).await.unwrap();
        }
        assert_eq!(guard_count(&log), 0);

        let racing = create_twice(&log, date("2024-03-04")).await;
        assert_eq!(racing.0.id, racing.1.id);
        assert_eq!(guard_count(&log), 0);
    }

    #[tokio::test]
    async fn held_day_lock_stays_registered() {
        let log = TimeLog::new(Arc::new(crate::repository::LocalRepository::in_memory()));
        let held = log.lock_day(date("2024-03-01")).await;
        assert_eq!(guard_count(&log), 1);
        drop(held);
        assert_eq!(guard_count(&log), 0);
    }

    async fn create_twice(log: &TimeLog, day: NaiveDate) -> (DayMeta, DayMeta) {
        let (a, b) = tokio::join!(log.get_or_create_day(day), log.get_or_create_day(day));
        (a.unwrap(), b.unwrap())
    }
}
