//! Draft/commit editing of a day's annotations.
//!
//! ```text
//!   Idle ──edit──▶ Editing ──quiet period / commit_now──▶ Committing ──▶ Idle
//!                    ▲                                          │
//!                    └──────── edits made while writing ◀───────┘
//! ```
//!
//! Edits only touch the draft. A write happens once the draft has been quiet
//! for the autosave delay, or when the caller asks for it with
//! [`DayEditor::commit_now`]. Each new edit cancels the pending timer, so a
//! burst of keystrokes costs one write.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;

use crate::models::{DayMeta, DayMetaPatch};
use crate::state::{StateError, TimeLog};

pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Idle,
    Editing,
    Committing,
}

pub struct DayEditor {
    shared: Arc<Shared>,
}

struct Shared {
    log: Arc<TimeLog>,
    delay: Duration,
    inner: Mutex<EditorInner>,
    /// One write at a time per editor.
    commit_gate: tokio::sync::Mutex<()>,
}

struct EditorInner {
    committed: DayMeta,
    draft: DayMeta,
    phase: EditPhase,
    suppress_autosave: bool,
    /// Pending autosave; `None` once the timer has fired.
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    last_error: Option<String>,
}

impl EditorInner {
    fn diverged(&self) -> bool {
        !self.draft.same_content(&self.committed)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.timer_generation += 1;
    }

    fn settle_phase(&mut self) {
        if self.phase != EditPhase::Committing {
            self.phase = if self.diverged() {
                EditPhase::Editing
            } else {
                EditPhase::Idle
            };
        }
    }
}

impl DayEditor {
    /// Start editing `date`, creating its record if needed.
    pub async fn open(log: Arc<TimeLog>, date: NaiveDate, delay: Duration) -> Result<Self, StateError> {
        let meta = log.get_or_create_day(date).await?;
        Ok(Self {
            shared: Arc::new(Shared {
                log,
                delay,
                inner: Mutex::new(EditorInner {
                    committed: meta.clone(),
                    draft: meta,
                    phase: EditPhase::Idle,
                    suppress_autosave: false,
                    timer: None,
                    timer_generation: 0,
                    last_error: None,
                }),
                commit_gate: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.shared.lock().draft.date
    }

    pub fn phase(&self) -> EditPhase {
        self.shared.lock().phase
    }

    pub fn draft(&self) -> DayMeta {
        self.shared.lock().draft.clone()
    }

    pub fn committed(&self) -> DayMeta {
        self.shared.lock().committed.clone()
    }

    /// Message of the most recent failed write, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn has_pending_autosave(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// Apply `patch` to the draft and (re)arm the autosave timer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn edit(&self, patch: &DayMetaPatch) {
        let mut inner = self.shared.lock();
        patch.apply(&mut inner.draft);
        inner.settle_phase();
        Shared::rearm(&self.shared, &mut inner);
    }

    /// While set, edits never trigger a write on their own. Clearing it
    /// rearms the timer if the draft has unsaved changes.
    pub fn set_suppress_autosave(&self, suppress: bool) {
        let mut inner = self.shared.lock();
        inner.suppress_autosave = suppress;
        Shared::rearm(&self.shared, &mut inner);
    }

    /// Write the draft now. Returns the stored record, or `None` if there
    /// was nothing to write.
    pub async fn commit_now(&self) -> Result<Option<DayMeta>, StateError> {
        self.shared.lock().cancel_timer();
        self.shared.commit().await
    }

    /// Move the editor to another date.
    ///
    /// Unsaved changes to the current date are written under their own date
    /// first, and the editor only moves once that write is confirmed. If it
    /// fails the editor stays on the old date with its draft intact.
    pub async fn switch_date(&self, date: NaiveDate) -> Result<DayMeta, StateError> {
        let meta = self.shared.log.get_or_create_day(date).await?;
        let _gate = self.shared.commit_gate.lock().await;

        loop {
            let pending = {
                let mut inner = self.shared.lock();
                inner.cancel_timer();
                if !inner.diverged() {
                    inner.committed = meta.clone();
                    inner.draft = meta.clone();
                    inner.phase = EditPhase::Idle;
                    inner.last_error = None;
                    return Ok(meta);
                }
                inner.phase = EditPhase::Committing;
                inner.draft.clone()
            };

            tracing::debug!("Flushing unsaved edits for {} before switching", pending.date);
            let result = self.shared.log.update_day_meta(pending).await;
            // Edits made during the write stay in the draft and go round again.
            self.shared.settle(result)?;
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EditorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel any pending autosave and start a fresh one if it is wanted.
    fn rearm(this: &Arc<Self>, inner: &mut EditorInner) {
        inner.cancel_timer();
        if inner.suppress_autosave || !inner.diverged() {
            return;
        }
        let generation = inner.timer_generation;
        let shared = Arc::clone(this);
        inner.timer = Some(tokio::spawn(async move {
            shared.autosave(generation).await;
        }));
    }

    async fn autosave(&self, generation: u64) {
        tokio::time::sleep(self.delay).await;
        {
            let mut inner = self.lock();
            if inner.timer_generation != generation {
                return;
            }
            // Fired: from here on the write runs to completion.
            inner.timer = None;
        }
        if let Err(e) = self.commit().await {
            tracing::warn!("Autosave failed: {}", e);
        }
    }

    async fn commit(&self) -> Result<Option<DayMeta>, StateError> {
        let _gate = self.commit_gate.lock().await;

        let draft = {
            let mut inner = self.lock();
            if !inner.diverged() {
                inner.settle_phase();
                return Ok(None);
            }
            inner.phase = EditPhase::Committing;
            inner.draft.clone()
        };

        let result = self.log.update_day_meta(draft).await;
        self.settle(result).map(Some)
    }

    /// Record the outcome of a write of the draft.
    fn settle(&self, result: Result<DayMeta, StateError>) -> Result<DayMeta, StateError> {
        let mut inner = self.lock();
        inner.phase = EditPhase::Editing;
        match result {
            Ok(stored) => {
                inner.committed = stored.clone();
                inner.draft.id = stored.id;
                inner.last_error = None;
                inner.settle_phase();
                tracing::debug!("Committed day {}", stored.date);
                Ok(stored)
            }
            Err(e) => {
                inner.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::clock::{self, Instant};
    use crate::models::*;
    use crate::repository::{LocalRepository, Repository, RepositoryError};

    const DELAY: Duration = Duration::from_millis(500);

    /// Counts day writes and can be slowed down or made to fail.
    struct Probe {
        inner: LocalRepository,
        day_writes: AtomicUsize,
        latency: Duration,
        fail: std::sync::atomic::AtomicBool,
    }

    impl Probe {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                inner: LocalRepository::in_memory(),
                day_writes: AtomicUsize::new(0),
                latency,
                fail: Default::default(),
            })
        }

        fn writes(&self) -> usize {
            self.day_writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Repository for Probe {
        fn name(&self) -> &'static str {
            "probe"
        }
        async fn load_all(&self) -> Result<Snapshot, RepositoryError> {
            self.inner.load_all().await
        }
        async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayMeta, RepositoryError> {
            self.inner.get_or_create_day(date).await
        }
        async fn create_or_update_day(&self, meta: &DayMeta) -> Result<DayMeta, RepositoryError> {
            self.day_writes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepositoryError::Server("unavailable".to_string()));
            }
            self.inner.create_or_update_day(meta).await
        }
        async fn create_entry(&self, input: &NewEntry) -> Result<Entry, RepositoryError> {
            self.inner.create_entry(input).await
        }
        async fn delete_entry(&self, id: Uuid) -> Result<(), RepositoryError> {
            self.inner.delete_entry(id).await
        }
        async fn upsert_note(&self, text: &str, now: Instant) -> Result<Note, RepositoryError> {
            self.inner.upsert_note(text, now).await
        }
        async fn save_templates(&self, templates: &Templates) -> Result<(), RepositoryError> {
            self.inner.save_templates(templates).await
        }
        async fn replace_all(&self, snapshot: &Snapshot) -> Result<Snapshot, RepositoryError> {
            self.inner.replace_all(snapshot).await
        }
    }

    async fn editor(probe: &Arc<Probe>, day: &str) -> (Arc<TimeLog>, DayEditor) {
        let log = Arc::new(TimeLog::new(probe.clone()));
        let date = clock::parse_date(day).unwrap();
        let editor = DayEditor::open(log.clone(), date, DELAY).await.unwrap();
        (log, editor)
    }

    fn goal(text: &str) -> DayMetaPatch {
        DayMetaPatch {
            goal: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_commits_once() {
        let probe = Probe::new(Duration::ZERO);
        let (log, editor) = editor(&probe, "2024-03-01").await;
        let before = probe.writes();

        editor.edit(&goal("w"));
        tokio::time::sleep(DELAY / 2).await;
        editor.edit(&goal("wr"));
        tokio::time::sleep(DELAY / 2).await;
        editor.edit(&goal("write"));
        assert_eq!(editor.phase(), EditPhase::Editing);

        tokio::time::sleep(DELAY * 2).await;

        assert_eq!(probe.writes() - before, 1);
        assert_eq!(editor.phase(), EditPhase::Idle);
        assert_eq!(editor.committed().goal, "write");
        let date = editor.date();
        assert_eq!(log.day(date).unwrap().goal, "write");
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_edits_wait_for_explicit_commit() {
        let probe = Probe::new(Duration::ZERO);
        let (_log, editor) = editor(&probe, "2024-03-01").await;
        let before = probe.writes();

        editor.set_suppress_autosave(true);
        editor.edit(&goal("composing"));
        tokio::time::sleep(DELAY * 4).await;
        assert_eq!(probe.writes(), before);
        assert!(!editor.has_pending_autosave());

        let stored = editor.commit_now().await.unwrap().unwrap();
        assert_eq!(stored.goal, "composing");
        assert_eq!(probe.writes() - before, 1);
        assert_eq!(editor.commit_now().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reverting_the_draft_cancels_the_write() {
        let probe = Probe::new(Duration::ZERO);
        let (_log, editor) = editor(&probe, "2024-03-01").await;
        let before = probe.writes();

        editor.edit(&goal("maybe"));
        editor.edit(&goal(""));
        assert_eq!(editor.phase(), EditPhase::Idle);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(probe.writes(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_commit_keeps_the_draft() {
        let probe = Probe::new(Duration::ZERO);
        let (log, editor) = editor(&probe, "2024-03-01").await;

        probe.fail.store(true, Ordering::SeqCst);
        editor.edit(&goal("unsaved"));
        assert!(editor.commit_now().await.is_err());

        assert_eq!(editor.phase(), EditPhase::Editing);
        assert_eq!(editor.draft().goal, "unsaved");
        assert!(editor.last_error().is_some());
        assert_eq!(log.day(editor.date()).unwrap().goal, "");

        probe.fail.store(false, Ordering::SeqCst);
        editor.commit_now().await.unwrap();
        assert!(editor.last_error().is_none());
        assert_eq!(log.day(editor.date()).unwrap().goal, "unsaved");
    }

    #[tokio::test(start_paused = true)]
    async fn switching_waits_for_the_write_in_flight() {
        let probe = Probe::new(Duration::from_secs(2));
        let (log, editor) = editor(&probe, "2024-03-01").await;
        let first = editor.date();
        let second = clock::parse_date("2024-03-02").unwrap();
        log.get_or_create_day(second).await.unwrap();

        editor.edit(&goal("monday"));
        // Let the timer fire and the slow write begin.
        tokio::time::sleep(DELAY + Duration::from_millis(10)).await;
        assert_eq!(editor.phase(), EditPhase::Committing);

        let switched = editor.switch_date(second).await.unwrap();
        assert_eq!(switched.date, second);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(editor.date(), second);
        assert_eq!(editor.draft().goal, "");
        assert_eq!(editor.phase(), EditPhase::Idle);
        assert_eq!(log.day(first).unwrap().goal, "monday");
        assert_eq!(log.day(second).unwrap().goal, "");
        assert_eq!(probe.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_keeps_the_editor_on_the_old_date() {
        let probe = Probe::new(Duration::ZERO);
        let (log, editor) = editor(&probe, "2024-03-01").await;
        let first = editor.date();
        let second = clock::parse_date("2024-03-02").unwrap();

        editor.edit(&goal("x"));
        probe.fail.store(true, Ordering::SeqCst);
        assert!(editor.switch_date(second).await.is_err());

        assert_eq!(editor.date(), first);
        assert_eq!(editor.draft().goal, "x");
        assert_eq!(editor.phase(), EditPhase::Editing);
        assert!(editor.last_error().is_some());

        probe.fail.store(false, Ordering::SeqCst);
        editor.switch_date(second).await.unwrap();
        assert_eq!(editor.date(), second);
        assert_eq!(log.day(first).unwrap().goal, "x");
    }
}
