use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use daylog::aggregate::RangeWindow;
use daylog::clock::{self, add_minutes, instant_at, parse_date, Instant};
use daylog::hierarchy::SlotPath;
use daylog::models::*;
use daylog::repository::{LocalRepository, Repository, RepositoryError};
use daylog::state::{StateError, TimeLog};
use uuid::Uuid;

fn date(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
}

fn span(day: &str, hour: u32, minute: u32, minutes: i64, category: Category) -> NewEntry {
    let start = instant_at(date(day), hour, minute, 0);
    NewEntry {
        start,
        end: add_minutes(start, minutes),
        granularity: Granularity::Quarter,
        category,
        note_text: None,
    }
}

/// A clock that moves one minute forward on every read.
fn stepping_clock() -> impl Fn() -> Instant + Send + Sync + 'static {
    let base = instant_at(date("2024-03-01"), 8, 0, 0);
    let ticks = AtomicI64::new(0);
    move || add_minutes(base, ticks.fetch_add(1, Ordering::SeqCst))
}

fn memory_log() -> TimeLog {
    TimeLog::new(Arc::new(LocalRepository::in_memory())).with_clock(stepping_clock())
}

mod days {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let log = memory_log();

        let first = log.get_or_create_day(date("2024-03-01")).await.unwrap();
        let second = log.get_or_create_day(date("2024-03-01")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(log.snapshot().days.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_get_or_create_makes_one_record() {
        let log = memory_log();
        let d = date("2024-03-01");

        let (a, b) = tokio::join!(log.get_or_create_day(d), log.get_or_create_day(d));

        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(log.snapshot().days.len(), 1);
    }

    #[tokio::test]
    async fn update_replaces_the_record_for_its_date() {
        let log = memory_log();
        let day = log.get_or_create_day(date("2024-03-01")).await.unwrap();

        let mut edited = day.clone();
        edited.goal = "finish draft".to_string();
        edited.mood = Some(Mood::Great);
        log.update_day_meta(edited).await.unwrap();

        let stored = log.day(date("2024-03-01")).unwrap();
        assert_eq!(stored.id, day.id);
        assert_eq!(stored.goal, "finish draft");
        assert_eq!(log.snapshot().days.len(), 1);
    }

    #[tokio::test]
    async fn rejects_malformed_wake_time() {
        let log = memory_log();
        let mut meta = log.get_or_create_day(date("2024-03-01")).await.unwrap();
        meta.wake_time = Some("7am".to_string());

        assert!(matches!(
            log.update_day_meta(meta).await,
            Err(StateError::Validation(_))
        ));
    }
}

mod entries {
    use super::*;

    #[tokio::test]
    async fn date_comes_from_start() {
        let log = memory_log();
        let start = instant_at(date("2024-03-01"), 23, 45, 0);
        let entry = log
            .add_entry(NewEntry {
                start,
                end: add_minutes(start, 30),
                granularity: Granularity::Quarter,
                category: Category::Consumption,
                note_text: None,
            })
            .await
            .unwrap();

        assert_eq!(entry.date, date("2024-03-01"));
        assert_eq!(log.entries_on(date("2024-03-01")), vec![entry]);
        assert!(log.entries_on(date("2024-03-02")).is_empty());
    }

    #[tokio::test]
    async fn inverted_span_is_a_validation_error() {
        let log = memory_log();
        let mut input = span("2024-03-01", 9, 0, 15, Category::Waste);
        input.end = input.start;

        assert!(matches!(log.add_entry(input).await, Err(StateError::Validation(_))));
        assert!(log.snapshot().entries.is_empty());
    }

    #[tokio::test]
    async fn removing_twice_is_fine() {
        let log = memory_log();
        let entry = log.add_entry(span("2024-03-01", 9, 0, 15, Category::Waste)).await.unwrap();

        log.remove_entry(entry.id).await.unwrap();
        log.remove_entry(entry.id).await.unwrap();

        assert!(log.snapshot().entries.is_empty());
    }

    #[tokio::test]
    async fn note_text_is_recorded_as_recent_note() {
        let log = memory_log();
        let mut input = span("2024-03-01", 9, 0, 60, Category::Investment);
        input.note_text = Some("reading".to_string());
        log.add_entry(input).await.unwrap();

        let notes = log.recent_notes(5);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "reading");
    }

    #[tokio::test]
    async fn slot_categories_follow_half_open_overlap() {
        let log = memory_log();
        log.add_entry(span("2024-03-01", 12, 0, 15, Category::Productivity))
            .await
            .unwrap();

        let at_noon = SlotPath::parse("2.1.1").unwrap().resolve(date("2024-03-01")).unwrap();
        let after = SlotPath::parse("2.1.2").unwrap().resolve(date("2024-03-01")).unwrap();

        assert!(log.slot_categories(&at_noon).contains(&Category::Productivity));
        assert!(log.slot_categories(&after).is_empty());
    }
}

mod notes {
    use super::*;

    #[tokio::test]
    async fn upsert_refreshes_instead_of_duplicating() {
        let log = memory_log();

        let first = log.upsert_note("gym").await.unwrap();
        let second = log.upsert_note("gym").await.unwrap();

        assert!(second.last_used > first.last_used);
        let notes = log.snapshot().notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].last_used, second.last_used);
    }

    #[tokio::test]
    async fn blank_text_is_rejected() {
        let log = memory_log();
        assert!(matches!(log.upsert_note("  ").await, Err(StateError::Validation(_))));
    }

    #[tokio::test]
    async fn recent_notes_are_newest_first() {
        let log = memory_log();
        log.upsert_note("a").await.unwrap();
        log.upsert_note("b").await.unwrap();
        log.upsert_note("a").await.unwrap();

        let texts: Vec<_> = log.recent_notes(10).into_iter().map(|n| n.text).collect();
        assert_eq!(texts, ["a", "b"]);
        assert_eq!(log.recent_notes(1).len(), 1);
    }

    #[tokio::test]
    async fn suggestions_list_templates_before_recent_notes() {
        let log = memory_log();
        log.add_template(Category::Productivity, "deep work").await.unwrap();
        log.upsert_note("email").await.unwrap();
        log.upsert_note("deep work").await.unwrap();

        assert_eq!(
            log.suggestions(Category::Productivity, 10),
            ["deep work", "email"]
        );
        assert_eq!(log.suggestions(Category::Waste, 1), ["deep work"]);
    }
}

mod templates {
    use super::*;

    #[tokio::test]
    async fn add_and_remove_report_changes() {
        let log = memory_log();

        assert!(log.add_template(Category::Waste, "doomscroll").await.unwrap());
        assert!(!log.add_template(Category::Waste, "doomscroll").await.unwrap());
        assert!(log.remove_template(Category::Waste, "doomscroll").await.unwrap());
        assert!(!log.remove_template(Category::Waste, "doomscroll").await.unwrap());
    }

    #[tokio::test]
    async fn persist_in_the_local_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = LocalRepository::open(dir.path()).await.unwrap();
            let log = TimeLog::open(Arc::new(repo)).await.unwrap();
            log.add_template(Category::Investment, "course").await.unwrap();
            log.add_entry(span("2024-03-01", 6, 0, 60, Category::Productivity))
                .await
                .unwrap();
        }

        let repo = LocalRepository::open(dir.path()).await.unwrap();
        let log = TimeLog::open(Arc::new(repo)).await.unwrap();
        assert_eq!(log.templates().get(Category::Investment), ["course"]);
        assert_eq!(log.entries_on(date("2024-03-01")).len(), 1);
    }
}

mod statistics {
    use super::*;

    #[tokio::test]
    async fn week_window_matches_the_single_logged_day() {
        let log = memory_log();
        log.add_entry(span("2024-03-01", 6, 0, 60, Category::Productivity))
            .await
            .unwrap();
        log.add_entry(span("2024-03-01", 7, 0, 30, Category::Waste))
            .await
            .unwrap();

        let day = log.range_stats(date("2024-03-01"), RangeWindow::Day);
        let week = log.range_stats(date("2024-03-07"), RangeWindow::Week);

        for stats in [&day, &week] {
            assert_eq!(stats.totals.get(Category::Productivity), 60);
            assert_eq!(stats.totals.get(Category::Investment), 0);
            assert_eq!(stats.totals.get(Category::Consumption), 0);
            assert_eq!(stats.totals.get(Category::Waste), 30);
        }
        assert_eq!(week.dates.len(), 7);
        assert_eq!(week.dates[0], date("2024-03-01"));
    }

    #[tokio::test]
    async fn month_stats_cover_the_calendar_month() {
        let log = memory_log();
        log.add_entry(span("2024-02-29", 10, 0, 45, Category::Investment))
            .await
            .unwrap();
        log.add_entry(span("2024-03-01", 10, 0, 45, Category::Investment))
            .await
            .unwrap();

        let feb = log.month_stats(2024, 2);
        assert_eq!(feb.dates.len(), 29);
        assert_eq!(feb.totals.total(), 45);
    }
}

mod exchange {
    use super::*;

    #[tokio::test]
    async fn malformed_import_leaves_state_untouched() {
        let log = memory_log();
        log.add_entry(span("2024-03-01", 6, 0, 60, Category::Productivity))
            .await
            .unwrap();
        let before = log.snapshot();

        assert!(matches!(
            log.import_json("{\"entries\": 42}").await,
            Err(StateError::Validation(_))
        ));
        assert!(matches!(
            log.import_json("definitely not json").await,
            Err(StateError::Validation(_))
        ));
        assert_eq!(log.snapshot(), before);
    }

    #[tokio::test]
    async fn import_tolerates_missing_fields_and_sanitizes_templates() {
        let log = memory_log();

        let stored = log
            .import_json(r#"{"templates": {"waste": ["tv", "", "tv", 3], "sleep": ["nap"]}}"#)
            .await
            .unwrap();

        assert!(stored.days.is_empty());
        assert_eq!(stored.templates.get(Category::Waste), ["tv"]);
        assert_eq!(log.templates().iter().count(), 4);
    }

    #[tokio::test]
    async fn export_then_import_restores_everything() {
        let source = memory_log();
        source.get_or_create_day(date("2024-03-01")).await.unwrap();
        let mut input = span("2024-03-01", 6, 0, 60, Category::Productivity);
        input.note_text = Some("plan".to_string());
        source.add_entry(input).await.unwrap();
        source.add_template(Category::Productivity, "plan").await.unwrap();

        let json = source.export_json().unwrap();
        let target = memory_log();
        target.import_json(&json).await.unwrap();

        assert_eq!(target.snapshot(), source.snapshot());
    }
}

mod failures {
    use super::*;
    use tokio_test::assert_err;

    /// Reads succeed; every write fails.
    struct ReadOnly;

    #[async_trait]
    impl Repository for ReadOnly {
        fn name(&self) -> &'static str {
            "read-only"
        }
        async fn load_all(&self) -> Result<Snapshot, RepositoryError> {
            let mut snapshot = Snapshot::default();
            snapshot.days.push(DayMeta::blank(clock::parse_date("2024-03-01").unwrap()));
            Ok(snapshot)
        }
        async fn get_or_create_day(&self, _: NaiveDate) -> Result<DayMeta, RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn create_or_update_day(&self, _: &DayMeta) -> Result<DayMeta, RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn create_entry(&self, _: &NewEntry) -> Result<Entry, RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn delete_entry(&self, _: Uuid) -> Result<(), RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn upsert_note(&self, _: &str, _: Instant) -> Result<Note, RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn save_templates(&self, _: &Templates) -> Result<(), RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
        async fn replace_all(&self, _: &Snapshot) -> Result<Snapshot, RepositoryError> {
            Err(RepositoryError::Server("read-only".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_writes_leave_the_mirror_alone() {
        let log = TimeLog::open(Arc::new(ReadOnly)).await.unwrap();
        let before = log.snapshot();

        let mut meta = log.day(date("2024-03-01")).unwrap();
        meta.goal = "never stored".to_string();
        assert!(matches!(
            log.update_day_meta(meta).await,
            Err(StateError::Repository(_))
        ));
        assert_err!(log.get_or_create_day(date("2024-03-02")).await);
        assert_err!(log.add_entry(span("2024-03-01", 6, 0, 60, Category::Waste)).await);
        assert_err!(log.upsert_note("gym").await);
        assert_err!(log.add_template(Category::Waste, "tv").await);
        assert_err!(log.import_json("{}").await);

        assert_eq!(log.snapshot(), before);
    }
}
