//! Domain models for daylog.
//!
//! # Stored Entities
//!
//! - [`Entry`]: A categorized span of time. Immutable once created; only deleted.
//! - [`DayMeta`]: Per-day annotations (wake time, mood, goal, review), unique by date.
//! - [`Note`]: A recently used label, unique by text, with a `last_used` instant.
//! - [`Templates`]: Suggested note texts per [`Category`]. Local-only.
//!
//! ## Exchange
//!
//! - [`Snapshot`]: All of the above in one document, used for loading,
//!   import and export.
//!
//! Time slots are derived rather than stored; see [`crate::hierarchy`].

mod day;
mod entry;
mod note;
mod snapshot;
mod template;

pub use day::*;
pub use entry::*;
pub use note::*;
pub use snapshot::*;
pub use template::*;
