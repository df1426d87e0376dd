//! Category totals, range overlap queries and statistics windows.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::{self, Instant};
use crate::models::{Category, Entry};

/// Minutes per category. All four categories are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals(BTreeMap<Category, i64>);

impl Default for CategoryTotals {
    fn default() -> Self {
        Self(Category::ALL.into_iter().map(|c| (c, 0)).collect())
    }
}

impl CategoryTotals {
    pub fn get(&self, category: Category) -> i64 {
        self.0.get(&category).copied().unwrap_or(0)
    }

    pub fn add(&mut self, category: Category, minutes: i64) {
        *self.0.entry(category).or_insert(0) += minutes;
    }

    pub fn total(&self) -> i64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, i64)> + '_ {
        self.0.iter().map(|(c, m)| (*c, *m))
    }

    /// Share of the total per category, in percent. All zero when nothing is logged.
    pub fn percentages(&self) -> BTreeMap<Category, f64> {
        let total = self.total();
        self.iter()
            .map(|(c, minutes)| (c, percentage(minutes, total)))
            .collect()
    }

    pub fn merge(&mut self, other: &CategoryTotals) {
        for (category, minutes) in other.iter() {
            self.add(category, minutes);
        }
    }
}

/// `part` as a percentage of `total`, or 0 when `total` is not positive.
pub fn percentage(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

/// Sum entry durations per category.
pub fn aggregate_by_category<'a, I>(entries: I) -> CategoryTotals
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut totals = CategoryTotals::default();
    for entry in entries {
        totals.add(entry.category, entry.minutes());
    }
    totals
}

/// True when `[a_start, a_end)` and `[b_start, b_end)` share at least one instant.
pub fn overlaps(a_start: &Instant, a_end: &Instant, b_start: &Instant, b_end: &Instant) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// Categories of all entries overlapping the half-open range `[start, end)`.
pub fn categories_in_range<'a, I>(entries: I, start: &Instant, end: &Instant) -> BTreeSet<Category>
where
    I: IntoIterator<Item = &'a Entry>,
{
    entries
        .into_iter()
        .filter(|e| overlaps(start, end, &e.start, &e.end))
        .map(|e| e.category)
        .collect()
}

/// The supported statistics windows, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeWindow {
    Day,
    ThreeDays,
    Week,
    Month,
}

impl RangeWindow {
    pub fn days(&self) -> u32 {
        match self {
            Self::Day => 1,
            Self::ThreeDays => 3,
            Self::Week => 7,
            Self::Month => 30,
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            1 => Some(Self::Day),
            3 => Some(Self::ThreeDays),
            7 => Some(Self::Week),
            30 => Some(Self::Month),
            _ => None,
        }
    }
}

/// `anchor` and the preceding `window.days() - 1` days, oldest first.
pub fn window_dates(anchor: NaiveDate, window: RangeWindow) -> Vec<NaiveDate> {
    let span = window.days() as i64;
    (0..span)
        .rev()
        .map(|back| clock::add_days(anchor, -back))
        .collect()
}

/// Every date of the given calendar month. Empty for an invalid month.
pub fn month_dates(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };
    let mut dates = Vec::with_capacity(31);
    let mut day = first;
    while day.month() == month {
        dates.push(day);
        day = clock::add_days(day, 1);
    }
    dates
}

/// Aggregated statistics over a set of dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeStats {
    pub dates: Vec<NaiveDate>,
    pub totals: CategoryTotals,
    /// One totals map per date, in the order of `dates`.
    pub daily: Vec<(NaiveDate, CategoryTotals)>,
}

impl RangeStats {
    pub fn percentages(&self) -> BTreeMap<Category, f64> {
        self.totals.percentages()
    }
}

/// Aggregate all entries whose `date` is one of `dates`.
pub fn range_stats<'a, I>(entries: I, dates: &[NaiveDate]) -> RangeStats
where
    I: IntoIterator<Item = &'a Entry>,
{
    let wanted: HashSet<NaiveDate> = dates.iter().copied().collect();
    let mut per_day: BTreeMap<NaiveDate, CategoryTotals> = BTreeMap::new();
    for entry in entries.into_iter().filter(|e| wanted.contains(&e.date)) {
        per_day
            .entry(entry.date)
            .or_default()
            .add(entry.category, entry.minutes());
    }

    let daily: Vec<_> = dates
        .iter()
        .map(|d| (*d, per_day.remove(d).unwrap_or_default()))
        .collect();
    let mut totals = CategoryTotals::default();
    for (_, day) in &daily {
        totals.merge(day);
    }

    RangeStats {
        dates: dates.to_vec(),
        totals,
        daily,
    }
}
