use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{self, Instant};

/// A categorized span of time logged by the user.
///
/// Entries are immutable once created; the only lifecycle transition is
/// deletion. `date` is always the calendar day `start` falls on in the fixed
/// offset and is never supplied independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start: Instant,
    pub end: Instant,
    /// Hierarchy level the entry was created from. Informational only.
    pub granularity: Granularity,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_text: Option<String>,
}

impl Entry {
    pub fn minutes(&self) -> i64 {
        clock::minutes_between(&self.start, &self.end)
    }

    /// Re-pin instants to the fixed offset and re-derive `date` from `start`.
    pub fn normalized(mut self) -> Self {
        let offset = clock::fixed_offset();
        self.start = self.start.with_timezone(&offset);
        self.end = self.end.with_timezone(&offset);
        self.date = clock::date_of(&self.start);
        self
    }
}

/// The fixed set of activity categories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Productivity,
    Investment,
    Consumption,
    Waste,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Self::Productivity,
        Self::Investment,
        Self::Consumption,
        Self::Waste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Productivity => "productivity",
            Self::Investment => "investment",
            Self::Consumption => "consumption",
            Self::Waste => "waste",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "productivity" => Some(Self::Productivity),
            "investment" => Some(Self::Investment),
            "consumption" => Some(Self::Consumption),
            "waste" => Some(Self::Waste),
            _ => None,
        }
    }
}

/// The hierarchy level an entry was logged against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Big,
    Hour,
    Quarter,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Big => "big",
            Self::Hour => "hour",
            Self::Quarter => "quarter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "big" => Some(Self::Big),
            "hour" => Some(Self::Hour),
            "quarter" => Some(Self::Quarter),
            _ => None,
        }
    }
}

/// Input for logging a new entry. The id and date are assigned on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub start: Instant,
    pub end: Instant,
    pub granularity: Granularity,
    pub category: Category,
    #[serde(default)]
    pub note_text: Option<String>,
}

impl NewEntry {
    pub fn validate(&self) -> Result<(), String> {
        if self.end <= self.start {
            return Err("entry end must be after entry start".to_string());
        }
        Ok(())
    }

    /// Materialize the entry under the given id, deriving `date` from `start`.
    pub fn into_entry(self, id: Uuid) -> Entry {
        let note_text = self
            .note_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Entry {
            id,
            date: clock::date_of(&self.start),
            start: self.start,
            end: self.end,
            granularity: self.granularity,
            category: self.category,
            note_text,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{instant_at, parse_date};

    #[test]
    fn date_is_derived_from_start_in_fixed_offset() {
        let start = instant_at(parse_date("2024-03-01").unwrap(), 0, 30, 0);
        let entry = NewEntry {
            start,
            end: clock::add_minutes(start, 15),
            granularity: Granularity::Quarter,
            category: Category::Waste,
            note_text: Some("  scrolling ".to_string()),
        }
        .into_entry(Uuid::new_v4());

        assert_eq!(entry.date, parse_date("2024-03-01").unwrap());
        assert_eq!(entry.note_text.as_deref(), Some("scrolling"));
        assert_eq!(entry.minutes(), 15);
    }

    #[test]
    fn rejects_empty_or_inverted_spans() {
        let start = instant_at(parse_date("2024-03-01").unwrap(), 9, 0, 0);
        let entry = NewEntry {
            start,
            end: start,
            granularity: Granularity::Hour,
            category: Category::Productivity,
            note_text: None,
        };
        assert!(entry.validate().is_err());
    }

    #[test]
    fn serializes_with_exchange_field_names() {
        let start = instant_at(parse_date("2024-03-01").unwrap(), 9, 0, 0);
        let entry = NewEntry {
            start,
            end: clock::add_minutes(start, 60),
            granularity: Granularity::Hour,
            category: Category::Investment,
            note_text: Some("reading".to_string()),
        }
        .into_entry(Uuid::nil());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["start"], "2024-03-01T09:00:00+08:00");
        assert_eq!(json["category"], "investment");
        assert_eq!(json["noteText"], "reading");
    }
}
