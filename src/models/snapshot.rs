use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{DayMeta, Entry, Note, Templates};

/// The complete data set: the shape loaded at session start and the
/// import/export document format.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default)]
    pub days: Vec<DayMeta>,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub templates: Templates,
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    days: Vec<DayMeta>,
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(default)]
    notes: Vec<Note>,
    #[serde(default)]
    templates: serde_json::Value,
}

impl Snapshot {
    /// Parse an exchange document.
    ///
    /// Missing fields default to empty. Templates are sanitized to the known
    /// categories, and the collections are brought back in line with their
    /// uniqueness keys: one day per date and one note per text (last wins).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawSnapshot = serde_json::from_str(json)?;
        Ok(Self {
            days: dedup_last_by(raw.days, |d| d.date),
            entries: raw.entries.into_iter().map(Entry::normalized).collect(),
            notes: dedup_last_by(raw.notes, |n| n.text.clone()),
            templates: Templates::sanitized(&raw.templates),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn dedup_last_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = items
        .into_iter()
        .rev()
        .filter(|item| seen.insert(key(item)))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[test]
    fn empty_document_yields_empty_snapshot() {
        let snapshot = Snapshot::from_json("{}").unwrap();
        assert!(snapshot.days.is_empty());
        assert!(snapshot.entries.is_empty());
        assert!(snapshot.notes.is_empty());
        assert_eq!(snapshot.templates, Templates::default());
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Snapshot::from_json("not json").is_err());
        assert!(Snapshot::from_json(r#"{"days": 3}"#).is_err());
    }

    #[test]
    fn duplicate_dates_and_texts_collapse() {
        let json = r#"{
            "days": [
                {"id":"00000000-0000-0000-0000-000000000001","date":"2024-03-01","goal":"old"},
                {"id":"00000000-0000-0000-0000-000000000002","date":"2024-03-01","goal":"new"}
            ],
            "notes": [
                {"text":"gym","lastUsed":"2024-03-01T08:00:00+08:00"},
                {"text":"gym","lastUsed":"2024-03-02T08:00:00+08:00"}
            ],
            "templates": {"investment": ["course", "course", ""]}
        }"#;
        let snapshot = Snapshot::from_json(json).unwrap();

        assert_eq!(snapshot.days.len(), 1);
        assert_eq!(snapshot.days[0].goal, "new");
        assert_eq!(snapshot.notes.len(), 1);
        assert_eq!(snapshot.templates.get(Category::Investment), ["course"]);
    }

    #[test]
    fn entry_dates_are_rederived_from_start() {
        let json = r#"{"entries": [{
            "id":"00000000-0000-0000-0000-000000000003",
            "date":"1999-01-01",
            "start":"2024-02-29T17:30:00Z",
            "end":"2024-02-29T18:30:00Z",
            "granularity":"hour",
            "category":"consumption"
        }]}"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        let entry = &snapshot.entries[0];

        assert_eq!(entry.date.to_string(), "2024-03-01");
        assert_eq!(entry.start.to_rfc3339(), "2024-03-01T01:30:00+08:00");
    }
}
