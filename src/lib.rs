//! daylog: a personal time log on a fixed UTC+8 clock.
//!
//! Every calendar day is split into 6-hour blocks, hours and quarter-hours
//! ([`hierarchy`]). Categorized entries are logged against those slots and
//! summed per category over days, windows and months ([`aggregate`]).
//! [`state::TimeLog`] holds the session's data and writes through a
//! [`repository::Repository`]: a local JSON document, or a `daylog serve`
//! instance ([`api`], [`db`]) shared by owner.

pub mod aggregate;
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod draft;
pub mod hierarchy;
pub mod models;
pub mod render;
pub mod repository;
pub mod state;
