//! The fixed day → big block → hour → quarter-hour partition.
//!
//! Every calendar day is split into four 6-hour big blocks, each big block
//! into hours, and each hour into four quarters. The big blocks are listed in
//! a fixed order that is *not* chronological:
//!
//! | index | span |
//! |-------|------|
//! | 0 | `06:00–12:00` |
//! | 1 | `12:00–18:00` |
//! | 2 | `18:00–00:00` (ends at midnight of the next day) |
//! | 3 | `00:00–06:00` |
//!
//! Consumers key default expand/collapse state on the index, so the order is
//! part of the contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::{self, Instant};
use crate::models::Granularity;

/// Start and end hour of each big block, in display order.
pub const BIG_BLOCK_HOURS: [(u32, u32); 4] = [(6, 12), (12, 18), (18, 24), (0, 6)];

pub const HOUR_MINUTES: i64 = 60;
pub const QUARTER_MINUTES: i64 = 15;

/// A node of the hierarchy. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    /// `HH:MM–HH:MM` in the fixed offset.
    pub label: String,
    pub start: Instant,
    pub end: Instant,
    pub granularity: Granularity,
}

impl TimeSlot {
    pub fn new(start: Instant, end: Instant, granularity: Granularity) -> Self {
        Self {
            label: format!("{}–{}", clock::clock_label(&start), clock::clock_label(&end)),
            start,
            end,
            granularity,
        }
    }

    pub fn minutes(&self) -> i64 {
        clock::minutes_between(&self.start, &self.end)
    }
}

/// A slot with its expanded sub-slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotNode {
    #[serde(flatten)]
    pub slot: TimeSlot,
    pub children: Vec<SlotNode>,
}

/// The four big blocks of `date`, in display order.
pub fn big_blocks(date: NaiveDate) -> Vec<TimeSlot> {
    BIG_BLOCK_HOURS
        .iter()
        .map(|&(from, to)| {
            TimeSlot::new(
                clock::instant_at(date, from, 0, 0),
                clock::instant_at(date, to, 0, 0),
                Granularity::Big,
            )
        })
        .collect()
}

/// The contiguous hours of a big block.
pub fn hour_blocks(block: &TimeSlot) -> Vec<TimeSlot> {
    split(block, HOUR_MINUTES, Granularity::Hour)
}

/// The four quarters of an hour block.
pub fn quarter_blocks(hour: &TimeSlot) -> Vec<TimeSlot> {
    split(hour, QUARTER_MINUTES, Granularity::Quarter)
}

fn split(slot: &TimeSlot, step: i64, granularity: Granularity) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    let mut cursor = slot.start;
    while cursor < slot.end {
        let next = clock::add_minutes(cursor, step).min(slot.end);
        slots.push(TimeSlot::new(cursor, next, granularity));
        cursor = next;
    }
    slots
}

/// The full three-level tree for `date`.
pub fn day_tree(date: NaiveDate) -> Vec<SlotNode> {
    big_blocks(date)
        .into_iter()
        .map(|block| {
            let hours = hour_blocks(&block)
                .into_iter()
                .map(|hour| SlotNode {
                    children: quarter_blocks(&hour)
                        .into_iter()
                        .map(|slot| SlotNode {
                            slot,
                            children: Vec::new(),
                        })
                        .collect(),
                    slot: hour,
                })
                .collect();
            SlotNode {
                slot: block,
                children: hours,
            }
        })
        .collect()
}

/// A 1-based address of a slot: `B`, `B.H` or `B.H.Q`.
///
/// `3.2.4` names the fourth quarter of the second hour of big block 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPath {
    pub big: usize,
    pub hour: Option<usize>,
    pub quarter: Option<usize>,
}

impl SlotPath {
    pub fn parse(s: &str) -> Option<Self> {
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.parse::<usize>().ok().filter(|n| *n >= 1))
            .collect::<Option<Vec<_>>>()?;
        match parts.as_slice() {
            [big] => Some(Self { big: *big, hour: None, quarter: None }),
            [big, hour] => Some(Self { big: *big, hour: Some(*hour), quarter: None }),
            [big, hour, quarter] => Some(Self {
                big: *big,
                hour: Some(*hour),
                quarter: Some(*quarter),
            }),
            _ => None,
        }
    }

    /// Look up the addressed slot within `date`'s hierarchy.
    pub fn resolve(&self, date: NaiveDate) -> Option<TimeSlot> {
        let block = big_blocks(date).into_iter().nth(self.big.checked_sub(1)?)?;
        let Some(hour_idx) = self.hour else {
            return Some(block);
        };
        let hour = hour_blocks(&block).into_iter().nth(hour_idx.checked_sub(1)?)?;
        let Some(quarter_idx) = self.quarter else {
            return Some(hour);
        };
        quarter_blocks(&hour).into_iter().nth(quarter_idx.checked_sub(1)?)
    }
}

impl std::fmt::Display for SlotPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.big)?;
        if let Some(hour) = self.hour {
            write!(f, ".{}", hour)?;
        }
        if let Some(quarter) = self.quarter {
            write!(f, ".{}", quarter)?;
        }
        Ok(())
    }
}
