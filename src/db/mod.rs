//! SQLite storage behind `daylog serve`.
//!
//! Each collection is scoped by an owner identity. `UNIQUE(owner, date)` on
//! days and `UNIQUE(owner, text)` on notes make their writes natural upserts,
//! so repeated or racing requests can never create duplicates.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::clock::{self, Instant};
use crate::models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "daylog")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("daylog-server.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Snapshot operations
    // ============================================================

    /// Everything stored for `owner`. Templates are never stored server-side.
    pub fn get_snapshot(&self, owner: &str) -> Result<Snapshot> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(Snapshot {
            days: query_days(&conn, owner)?,
            entries: query_entries(&conn, owner)?,
            notes: query_notes(&conn, owner)?,
            templates: Templates::default(),
        })
    }

    /// Replace all of `owner`'s records with those in `snapshot`.
    ///
    /// Imported records get fresh ids; the stored result is returned.
    pub fn replace_owner_data(&self, owner: &str, snapshot: &Snapshot) -> Result<Snapshot> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        for table in ["days", "entries", "notes"] {
            tx.execute(&format!("DELETE FROM {} WHERE owner = ?", table), [owner])?;
        }

        for day in &snapshot.days {
            tx.execute(
                "INSERT INTO days (id, owner, date, wake_time, mood, goal, review, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(owner, date) DO UPDATE SET
                    wake_time = excluded.wake_time, mood = excluded.mood,
                    goal = excluded.goal, review = excluded.review,
                    updated_at = excluded.updated_at",
                (
                    Uuid::new_v4().to_string(),
                    owner,
                    clock::format_date(day.date),
                    &day.wake_time,
                    day.mood.map(|m| m.name()),
                    &day.goal,
                    &day.review,
                    &now,
                ),
            )?;
        }

        for entry in &snapshot.entries {
            insert_entry(&tx, owner, &entry.clone().normalized(), Uuid::new_v4())?;
        }

        for note in &snapshot.notes {
            tx.execute(
                "INSERT INTO notes (id, owner, text, last_used) VALUES (?, ?, ?, ?)
                 ON CONFLICT(owner, text) DO UPDATE SET last_used = excluded.last_used",
                (
                    Uuid::new_v4().to_string(),
                    owner,
                    &note.text,
                    note.last_used.to_rfc3339(),
                ),
            )?;
        }

        tx.commit()?;
        drop(conn);

        tracing::info!(
            "Replaced data for owner {}: {} days, {} entries, {} notes",
            owner,
            snapshot.days.len(),
            snapshot.entries.len(),
            snapshot.notes.len()
        );
        self.get_snapshot(owner)
    }

    // ============================================================
    // Day operations
    // ============================================================

    pub fn get_day(&self, owner: &str, date: NaiveDate) -> Result<Option<DayMeta>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let day = conn
            .query_row(
                "SELECT id, date, wake_time, mood, goal, review
                 FROM days WHERE owner = ? AND date = ?",
                (owner, clock::format_date(date)),
                day_from_row,
            )
            .optional()?;
        Ok(day)
    }

    /// The owner's record for `date`, inserting a blank one only if none exists.
    ///
    /// An existing record is returned untouched.
    pub fn get_or_create_day(&self, owner: &str, date: NaiveDate) -> Result<DayMeta> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let inserted = conn.execute(
            "INSERT INTO days (id, owner, date, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(owner, date) DO NOTHING",
            (
                Uuid::new_v4().to_string(),
                owner,
                clock::format_date(date),
                Utc::now().to_rfc3339(),
            ),
        )?;
        if inserted > 0 {
            tracing::debug!("Created day {} for {}", date, owner);
        }

        let day = conn.query_row(
            "SELECT id, date, wake_time, mood, goal, review
             FROM days WHERE owner = ? AND date = ?",
            (owner, clock::format_date(date)),
            day_from_row,
        )?;
        Ok(day)
    }

    /// Upsert a day keyed by `(owner, date)`.
    ///
    /// The id is assigned here on first insert and kept on every later write;
    /// whatever id the caller sent is ignored.
    pub fn upsert_day(&self, owner: &str, meta: &DayMeta) -> Result<DayMeta> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id: String = conn.query_row(
            "INSERT INTO days (id, owner, date, wake_time, mood, goal, review, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(owner, date) DO UPDATE SET
                wake_time = excluded.wake_time, mood = excluded.mood,
                goal = excluded.goal, review = excluded.review,
                updated_at = excluded.updated_at
             RETURNING id",
            (
                Uuid::new_v4().to_string(),
                owner,
                clock::format_date(meta.date),
                &meta.wake_time,
                meta.mood.map(|m| m.name()),
                &meta.goal,
                &meta.review,
                Utc::now().to_rfc3339(),
            ),
            |row| row.get(0),
        )?;

        Ok(DayMeta {
            id: parse_uuid(0, id)?,
            ..meta.clone()
        })
    }

    // ============================================================
    // Entry operations
    // ============================================================

    pub fn create_entry(&self, owner: &str, input: NewEntry) -> Result<Entry> {
        input.validate().map_err(anyhow::Error::msg)?;
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let entry = input.into_entry(id);
        insert_entry(&conn, owner, &entry, id)?;
        Ok(entry)
    }

    pub fn get_entries_by_date(&self, owner: &str, date: NaiveDate) -> Result<Vec<Entry>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, date, start_at, end_at, granularity, category, note_text
             FROM entries WHERE owner = ? AND date = ? ORDER BY start_at",
        )?;
        let entries = stmt
            .query_map((owner, clock::format_date(date)), entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Returns false when no such entry existed.
    pub fn delete_entry(&self, owner: &str, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM entries WHERE owner = ? AND id = ?",
            (owner, id.to_string()),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Note operations
    // ============================================================

    pub fn upsert_note(&self, owner: &str, text: &str, now: Instant) -> Result<Note> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO notes (id, owner, text, last_used) VALUES (?, ?, ?, ?)
             ON CONFLICT(owner, text) DO UPDATE SET last_used = excluded.last_used",
            (Uuid::new_v4().to_string(), owner, text, now.to_rfc3339()),
        )?;
        Ok(Note {
            text: text.to_string(),
            last_used: now.with_timezone(&clock::fixed_offset()),
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn query_days(conn: &Connection, owner: &str) -> Result<Vec<DayMeta>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, wake_time, mood, goal, review
         FROM days WHERE owner = ? ORDER BY date",
    )?;
    let days = stmt
        .query_map([owner], day_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(days)
}

fn query_entries(conn: &Connection, owner: &str) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, start_at, end_at, granularity, category, note_text
         FROM entries WHERE owner = ? ORDER BY start_at",
    )?;
    let entries = stmt
        .query_map([owner], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn query_notes(conn: &Connection, owner: &str) -> Result<Vec<Note>> {
    let mut stmt = conn.prepare(
        "SELECT text, last_used FROM notes WHERE owner = ? ORDER BY last_used DESC",
    )?;
    let notes = stmt
        .query_map([owner], |row| {
            Ok(Note {
                text: row.get(0)?,
                last_used: parse_instant(1, row.get(1)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(notes)
}

fn insert_entry(conn: &Connection, owner: &str, entry: &Entry, id: Uuid) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO entries (id, owner, date, start_at, end_at, granularity, category, note_text, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            owner,
            clock::format_date(entry.date),
            entry.start.to_rfc3339(),
            entry.end.to_rfc3339(),
            entry.granularity.as_str(),
            entry.category.as_str(),
            &entry.note_text,
            Utc::now().to_rfc3339(),
        ),
    )
}

fn day_from_row(row: &Row) -> rusqlite::Result<DayMeta> {
    let mood = match row.get::<_, Option<String>>(3)? {
        Some(s) => Some(Mood::from_str(&s).ok_or_else(|| unknown(3, "mood", s))?),
        None => None,
    };
    Ok(DayMeta {
        id: parse_uuid(0, row.get(0)?)?,
        date: parse_date(1, row.get(1)?)?,
        wake_time: row.get(2)?,
        mood,
        goal: row.get(4)?,
        review: row.get(5)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    let granularity: String = row.get(4)?;
    let category: String = row.get(5)?;
    Ok(Entry {
        id: parse_uuid(0, row.get(0)?)?,
        date: parse_date(1, row.get(1)?)?,
        start: parse_instant(2, row.get(2)?)?,
        end: parse_instant(3, row.get(3)?)?,
        granularity: Granularity::from_str(&granularity)
            .ok_or_else(|| unknown(4, "granularity", granularity.clone()))?,
        category: Category::from_str(&category)
            .ok_or_else(|| unknown(5, "category", category.clone()))?,
        note_text: row.get(6)?,
    })
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
struct UnknownValue {
    kind: &'static str,
    value: String,
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn unknown(idx: usize, kind: &'static str, value: String) -> rusqlite::Error {
    conversion_error(idx, UnknownValue { kind, value })
}

fn parse_uuid(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_date(idx: usize, s: String) -> rusqlite::Result<NaiveDate> {
    clock::parse_date(&s).map_err(|e| conversion_error(idx, e))
}

fn parse_instant(idx: usize, s: String) -> rusqlite::Result<Instant> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&clock::fixed_offset()))
        .map_err(|e| conversion_error(idx, e))
}
