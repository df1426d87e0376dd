//! Calendar and wall-clock helpers pinned to a fixed UTC+8 offset.
//!
//! Every wall-clock label, calendar day and minute-of-day in daylog is
//! interpreted in [`fixed_offset`], never the host timezone and never UTC.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// An absolute instant carrying the fixed offset.
pub type Instant = DateTime<FixedOffset>;

/// Offset applied to all wall-clock conversions, in seconds east of UTC.
pub const OFFSET_SECONDS: i32 = 8 * 3600;

pub const MINUTES_PER_DAY: i64 = 24 * 60;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn fixed_offset() -> FixedOffset {
    FixedOffset::east_opt(OFFSET_SECONDS).expect("UTC+8 is a valid offset")
}

/// The current instant, expressed in the fixed offset.
pub fn now() -> Instant {
    Utc::now().with_timezone(&fixed_offset())
}

/// Calendar day of "now" under the fixed offset.
pub fn today() -> NaiveDate {
    date_of(&now())
}

/// Calendar day an instant falls on under the fixed offset.
pub fn date_of(instant: &Instant) -> NaiveDate {
    instant.with_timezone(&fixed_offset()).date_naive()
}

/// Build an instant from a calendar day and a wall-clock time.
///
/// `hour` may be 24 (with zero minutes and seconds) to name midnight at the
/// end of `date`, which is how the evening block expresses its end.
pub fn instant_at(date: NaiveDate, hour: u32, minute: u32, second: u32) -> Instant {
    let offset = fixed_offset();
    let (date, hour) = if hour >= 24 {
        (add_days(date, (hour / 24) as i64), hour % 24)
    } else {
        (date, hour)
    };
    let time = NaiveTime::from_hms_opt(hour, minute.min(59), second.min(59))
        .unwrap_or(NaiveTime::MIN);
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .expect("fixed offsets have no ambiguous local times")
}

/// Midnight at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> Instant {
    instant_at(date, 0, 0, 0)
}

/// Calendar-day arithmetic on a date-only value.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(date)
}

/// Shift an instant by `minutes`, rolling the calendar day as needed.
///
/// The minute-of-day is normalized into `[0, 1440)` and the quotient is
/// applied as a day shift, so any magnitude of `minutes` lands on the same
/// wall-clock result as repeated single-minute steps would.
pub fn add_minutes(instant: Instant, minutes: i64) -> Instant {
    let date = date_of(&instant);
    let local = instant.with_timezone(&fixed_offset());
    let minute_of_day = (local.hour() * 60 + local.minute()) as i64;

    let shifted = minute_of_day + minutes;
    let day_shift = shifted.div_euclid(MINUTES_PER_DAY);
    let new_minute = shifted.rem_euclid(MINUTES_PER_DAY) as u32;

    let new_date = add_days(date, day_shift);
    let time = NaiveTime::from_hms_nano_opt(
        new_minute / 60,
        new_minute % 60,
        local.second(),
        local.nanosecond(),
    )
    .unwrap_or(NaiveTime::MIN);

    fixed_offset()
        .from_local_datetime(&new_date.and_time(time))
        .single()
        .expect("fixed offsets have no ambiguous local times")
}

/// Whole minutes from `from` to `to`, clamped at zero when `to` precedes `from`.
pub fn minutes_between(from: &Instant, to: &Instant) -> i64 {
    (*to - *from).num_minutes().max(0)
}

/// `HH:MM` wall-clock label of an instant.
pub fn clock_label(instant: &Instant) -> String {
    instant.with_timezone(&fixed_offset()).format("%H:%M").to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
}

/// Parse an `HH:MM` wall-clock time into `(hour, minute)`.
///
/// `24:00` is accepted as end-of-day midnight.
pub fn parse_clock(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.trim().split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    match (hour, minute) {
        (24, 0) => Some((24, 0)),
        (0..=23, 0..=59) => Some((hour, minute)),
        _ => None,
    }
}
