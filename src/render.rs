//! Plain-text views for the terminal.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::aggregate::RangeStats;
use crate::clock;
use crate::hierarchy::{SlotNode, TimeSlot};
use crate::models::{Category, DayMeta, Entry, Note};

const PRODUCTIVITY: char = '●';
const INVESTMENT: char = '◆';
const CONSUMPTION: char = '○';
const WASTE: char = '✗';

pub fn category_symbol(category: Category) -> char {
    match category {
        Category::Productivity => PRODUCTIVITY,
        Category::Investment => INVESTMENT,
        Category::Consumption => CONSUMPTION,
        Category::Waste => WASTE,
    }
}

pub fn legend() -> String {
    Category::ALL
        .iter()
        .map(|c| format!("{} {}", category_symbol(*c), c.as_str()))
        .collect::<Vec<_>>()
        .join("  ")
}

/// `90` → `1h 30m`.
pub fn format_minutes(minutes: i64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}

/// Render a day's slot tree down to `depth` levels (1 = big blocks only).
///
/// Each slot shows its path, its span, and the symbols of the categories
/// logged against it:
/// ```text
/// 2024-03-01
/// ├── 1 06:00–12:00 ●✗
/// │   ├── 1.1 06:00–07:00 ●
/// │   └── ...
/// └── 4 00:00–06:00
/// ```
pub fn render_day<F>(date: NaiveDate, nodes: &[SlotNode], depth: usize, categories: F) -> String
where
    F: Fn(&TimeSlot) -> BTreeSet<Category>,
{
    let mut output = format!("{}\n", clock::format_date(date));
    for (i, node) in nodes.iter().enumerate() {
        let is_last = i == nodes.len() - 1;
        render_node(
            &mut output,
            node,
            &(i + 1).to_string(),
            "",
            is_last,
            depth,
            &categories,
        );
    }
    output
}

fn render_node<F>(
    output: &mut String,
    node: &SlotNode,
    path: &str,
    prefix: &str,
    is_last: bool,
    depth: usize,
    categories: &F,
) where
    F: Fn(&TimeSlot) -> BTreeSet<Category>,
{
    if depth == 0 {
        return;
    }

    let symbols: String = categories(&node.slot)
        .into_iter()
        .map(category_symbol)
        .collect();
    let branch = if is_last { "└── " } else { "├── " };
    output.push_str(prefix);
    output.push_str(branch);
    output.push_str(path);
    output.push(' ');
    output.push_str(&node.slot.label);
    if !symbols.is_empty() {
        output.push(' ');
        output.push_str(&symbols);
    }
    output.push('\n');

    let continuation = if is_last { "    " } else { "│   " };
    let child_prefix = format!("{}{}", prefix, continuation);
    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        let child_path = format!("{}.{}", path, i + 1);
        render_node(
            output,
            child,
            &child_path,
            &child_prefix,
            child_is_last,
            depth - 1,
            categories,
        );
    }
}

pub fn render_entries(entries: &[Entry]) -> String {
    if entries.is_empty() {
        return "No entries.\n".to_string();
    }
    let mut output = String::new();
    for entry in entries {
        output.push_str(&format!(
            "{}–{} {} {:<12} {:>7}",
            clock::clock_label(&entry.start),
            clock::clock_label(&entry.end),
            category_symbol(entry.category),
            entry.category.as_str(),
            format_minutes(entry.minutes()),
        ));
        if let Some(note) = &entry.note_text {
            output.push_str("  ");
            output.push_str(note);
        }
        output.push_str(&format!("  [{}]\n", entry.id));
    }
    output
}

pub fn render_day_meta(meta: &DayMeta) -> String {
    let mut output = String::new();
    if let Some(wake) = &meta.wake_time {
        output.push_str(&format!("Wake:   {}\n", wake));
    }
    if let Some(mood) = meta.mood {
        output.push_str(&format!("Mood:   {} {}\n", mood.as_str(), mood.name()));
    }
    if !meta.goal.is_empty() {
        output.push_str(&format!("Goal:   {}\n", meta.goal));
    }
    if !meta.review.is_empty() {
        output.push_str(&format!("Review: {}\n", meta.review));
    }
    output
}

/// Totals per category with percentages of the whole range.
pub fn render_stats(stats: &RangeStats) -> String {
    let mut output = match (stats.dates.first(), stats.dates.last()) {
        (Some(first), Some(last)) if first == last => format!("{}\n", first),
        (Some(first), Some(last)) => {
            format!("{} → {} ({} days)\n", first, last, stats.dates.len())
        }
        _ => String::from("(no dates)\n"),
    };

    let percentages = stats.percentages();
    for (category, minutes) in stats.totals.iter() {
        output.push_str(&format!(
            "{} {:<13}{:>9} {:>6.1}%\n",
            category_symbol(category),
            category.as_str(),
            format_minutes(minutes),
            percentages.get(&category).copied().unwrap_or(0.0),
        ));
    }
    output.push_str(&format!(
        "  {:<13}{:>9}\n",
        "total",
        format_minutes(stats.totals.total())
    ));
    output
}

/// One line per day: date, total, and a symbol bar of 15-minute units.
pub fn render_daily(stats: &RangeStats) -> String {
    let mut output = String::new();
    for (date, totals) in &stats.daily {
        let bar: String = totals
            .iter()
            .flat_map(|(c, m)| std::iter::repeat(category_symbol(c)).take((m / 15) as usize))
            .collect();
        output.push_str(&format!(
            "{} {:>7} {}\n",
            date,
            format_minutes(totals.total()),
            bar
        ));
    }
    output
}

pub fn render_notes(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|n| format!("{}  {}\n", n.last_used.format("%Y-%m-%d %H:%M"), n.text))
        .collect()
}
