use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use phonix_core::{normalize_name, CancellationOverlay, Numerals, Table};
use phonix_matcher::{
    resolve_columns, ColumnLayout, DateFilter, MatchRecord, QueryError, RecordMatcher,
    SearchQuery,
};
use phonix_storage::{OverlayStore, StorageError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source::{FetchError, TableSource};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("A load is already in progress")]
    Busy,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Sheet query failed: {0}")]
    Sheet(String),
    #[error("Response has no table")]
    MissingTable,
    #[error("Table is empty")]
    EmptyTable,
    #[error("Fetch timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Load cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Records are not loaded yet")]
    Unavailable,
    #[error(transparent)]
    Query(#[from] QueryError),
}

#[derive(Debug, Error)]
pub enum CancelError {
    #[error("A record name is required")]
    BlankName,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why a load was started. Only silent loads hide the `Loading` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Initial,
    Silent,
    Manual,
}

impl LoadMode {
    fn shows_progress(self) -> bool {
        !matches!(self, Self::Silent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RefreshStatus {
    Idle,
    Loading,
    Ready { rows: usize, loaded_at: DateTime<Utc> },
    Failed { message: String, at: DateTime<Utc> },
}

/// A successfully fetched table with its layout resolved once.
#[derive(Debug)]
pub struct LoadedTable {
    pub table: Table,
    pub layout: ColumnLayout,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub rows: usize,
    pub columns: usize,
    pub header_row: usize,
    pub data_start: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub records: Vec<MatchRecord>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: RefreshStatus,
    pub loaded_at: Option<DateTime<Utc>>,
    pub busy: bool,
    pub cancelled: usize,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub fetch_timeout: Duration,
    pub refresh_interval: Duration,
    pub numerals: Numerals,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(15),
            refresh_interval: Duration::from_secs(80),
            numerals: Numerals::Arabic,
        }
    }
}

/// Message recorded when a load future is dropped before it finishes.
pub const LOAD_ABORTED: &str = "Load aborted";

/// Holds the busy flag for the lifetime of one load. Dropped without
/// [`LoadGuard::settle`], it records the load as failed.
struct LoadGuard<'a> {
    busy: &'a AtomicBool,
    status: &'a RwLock<RefreshStatus>,
    settled: bool,
}

impl<'a> LoadGuard<'a> {
    fn acquire(busy: &'a AtomicBool, status: &'a RwLock<RefreshStatus>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy, status, settled: false })
    }

    fn settle(&mut self, status: RefreshStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
        self.settled = true;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("load dropped before completion");
            *self.status.write().unwrap_or_else(PoisonError::into_inner) = RefreshStatus::Failed {
                message: LOAD_ABORTED.to_string(),
                at: Utc::now(),
            };
        }
        self.busy.store(false, Ordering::Release);
    }
}

pub struct LookupSession<S, O> {
    source: S,
    store: O,
    options: SessionOptions,
    matcher: RecordMatcher,
    table: RwLock<Option<Arc<LoadedTable>>>,
    overlay: RwLock<Arc<CancellationOverlay>>,
    status: RwLock<RefreshStatus>,
    busy: AtomicBool,
    cancel_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl<S: TableSource, O: OverlayStore> LookupSession<S, O> {
    /// Reads the persisted overlay and returns a session with no table yet.
    pub async fn open(source: S, store: O, options: SessionOptions) -> Result<Self, StorageError> {
        let overlay = store.load().await?;
        info!(cancelled = overlay.len(), "cancellation overlay loaded");

        Ok(Self {
            source,
            store,
            matcher: RecordMatcher::new(options.numerals),
            options,
            table: RwLock::new(None),
            overlay: RwLock::new(Arc::new(overlay)),
            status: RwLock::new(RefreshStatus::Idle),
            busy: AtomicBool::new(false),
            cancel_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        })
    }

    /// Fetches the table and, on success, replaces the current one.
    ///
    /// Fails with [`LoadError::Busy`] while another load runs. A failed load
    /// leaves the previous table in place.
    pub async fn load(&self, mode: LoadMode) -> Result<LoadSummary, LoadError> {
        let mut guard = LoadGuard::acquire(&self.busy, &self.status).ok_or(LoadError::Busy)?;
        if mode.shows_progress() {
            self.set_status(RefreshStatus::Loading);
        }

        match self.fetch_table().await {
            Ok(loaded) => {
                let summary = LoadSummary {
                    rows: loaded.table.row_count(),
                    columns: loaded.table.column_count(),
                    header_row: loaded.layout.header_row,
                    data_start: loaded.layout.data_start,
                    loaded_at: loaded.loaded_at,
                };
                *self.table.write().unwrap_or_else(PoisonError::into_inner) =
                    Some(Arc::new(loaded));
                guard.settle(RefreshStatus::Ready {
                    rows: summary.rows,
                    loaded_at: summary.loaded_at,
                });
                info!(?mode, rows = summary.rows, columns = summary.columns, "records loaded");
                Ok(summary)
            }
            Err(e) => {
                warn!(?mode, error = %e, "failed to load records");
                guard.settle(RefreshStatus::Failed {
                    message: e.to_string(),
                    at: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn fetch_table(&self) -> Result<LoadedTable, LoadError> {
        let timeout = self.options.fetch_timeout;
        let payload = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(LoadError::Cancelled),
            res = tokio::time::timeout(timeout, self.source.fetch()) => {
                res.map_err(|_| LoadError::TimedOut(timeout))??
            }
        };

        if let Some(message) = payload.error_message() {
            return Err(LoadError::Sheet(message));
        }
        let table = payload.table.ok_or(LoadError::MissingTable)?;
        if table.rows.is_empty() {
            return Err(LoadError::EmptyTable);
        }
        let layout = resolve_columns(&table);

        Ok(LoadedTable { table, layout, loaded_at: Utc::now() })
    }

    /// Runs a search against the current table and overlay.
    pub fn search(&self, name: &str, date: DateFilter) -> Result<SearchResults, SearchError> {
        let loaded = self.current().ok_or(SearchError::Unavailable)?;
        let query = SearchQuery::new(name, date)?;
        let overlay = self.overlay_snapshot();

        let records = self
            .matcher
            .find_matches(&loaded.table, &loaded.layout, &query, &overlay);
        debug!(name = query.name(), matches = records.len(), "search finished");

        Ok(SearchResults { records, loaded_at: loaded.loaded_at })
    }

    /// Marks `(name, date)` cancelled and persists the overlay. Returns
    /// whether the pair was new. Nothing changes in memory if the store
    /// rejects the write.
    pub async fn cancel(&self, name: &str, date: &str) -> Result<bool, CancelError> {
        if normalize_name(name).is_empty() {
            return Err(CancelError::BlankName);
        }

        let _serial = self.cancel_lock.lock().await;
        let mut next = CancellationOverlay::clone(&self.overlay_snapshot());
        if !next.add(name, date) {
            return Ok(false);
        }

        self.store.save(&next).await?;
        info!(cancelled = next.len(), "record cancelled");
        *self.overlay.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(true)
    }

    pub fn is_cancelled(&self, name: &str, date: &str) -> bool {
        self.overlay_snapshot().is_cancelled(name, date)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            status: self.status.read().unwrap_or_else(PoisonError::into_inner).clone(),
            loaded_at: self.current().map(|t| t.loaded_at),
            busy: self.is_busy(),
            cancelled: self.overlay_snapshot().len(),
        }
    }

    pub fn current(&self) -> Option<Arc<LoadedTable>> {
        self.table.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Stops the refresh loop and aborts any in-flight fetch.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn overlay_snapshot(&self) -> Arc<CancellationOverlay> {
        Arc::clone(&self.overlay.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_status(&self, status: RefreshStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl<S, O> LookupSession<S, O>
where
    S: TableSource + 'static,
    O: OverlayStore + 'static,
{
    /// Spawns the periodic silent refresh. A tick is skipped while a load is
    /// in flight or before the first successful load.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let period = session.options.refresh_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = session.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if session.current().is_none() || session.is_busy() {
                    debug!("skipping refresh");
                    continue;
                }
                // Failures are already logged and reflected in the status.
                let _ = session.load(LoadMode::Silent).await;
            }
            info!("refresh loop stopped");
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use phonix_core::{Row, SheetIssue, SheetPayload};
    use phonix_storage::MemoryOverlayStore;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    pub(crate) fn sheet(names: &[(&str, &str)]) -> SheetPayload {
        let mut rows: Vec<Row> = (0..9).map(|_| Row::default()).collect();
        let header = ["الاسم", "المرحلة", "الشعبة", "التاريخ", "نوع الورق", "السعر"];
        rows.push(Row::from_texts(&header));
        rows.extend(names.iter().map(|&(name, date)| {
            Row::from_texts(&[name, "الثالثة", "أ", date, "ملون", "3000"])
        }));
        SheetPayload {
            status: Some("ok".into()),
            errors: vec![],
            table: Some(Table::new(vec![], rows)),
        }
    }

    /// Hands out queued results in order; an exhausted queue fails.
    #[derive(Default)]
    pub(crate) struct QueueSource {
        results: StdMutex<VecDeque<Result<SheetPayload, FetchError>>>,
    }

    impl QueueSource {
        pub(crate) fn new(results: Vec<Result<SheetPayload, FetchError>>) -> Self {
            Self { results: StdMutex::new(results.into()) }
        }
    }

    impl TableSource for QueueSource {
        async fn fetch(&self) -> Result<SheetPayload, FetchError> {
            self.results.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(FetchError::Status { status: 503, message: "exhausted".into() })
            })
        }
    }

    struct HangingSource;

    impl TableSource for HangingSource {
        async fn fetch(&self) -> Result<SheetPayload, FetchError> {
            std::future::pending().await
        }
    }

    /// Each fetch waits for one `notify_one` on the gate.
    struct GatedSource {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    impl GatedSource {
        fn new(gate: Arc<Notify>) -> Self {
            Self { gate, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TableSource for GatedSource {
        async fn fetch(&self) -> Result<SheetPayload, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(sheet(&[("علي حسن", "15/01/2024")]))
        }
    }

    /// Gated fetches are released by the test, so the timeout stays out of the way.
    async fn gated_session(
        gate: Arc<Notify>,
    ) -> Arc<LookupSession<GatedSource, MemoryOverlayStore>> {
        let options = SessionOptions { fetch_timeout: Duration::from_secs(5), ..fast_options() };
        let store = MemoryOverlayStore::new();
        let session = LookupSession::open(GatedSource::new(gate), store, options)
            .await
            .unwrap();
        Arc::new(session)
    }

    async fn wait_until_busy<S: TableSource, O: OverlayStore>(session: &LookupSession<S, O>) {
        while !session.is_busy() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    pub(crate) struct FailingStore;

    impl OverlayStore for FailingStore {
        async fn load(&self) -> Result<CancellationOverlay, StorageError> {
            Ok(CancellationOverlay::new())
        }

        async fn save(&self, _overlay: &CancellationOverlay) -> Result<(), StorageError> {
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            Err(StorageError::Corrupt(err))
        }
    }

    fn fast_options() -> SessionOptions {
        SessionOptions {
            fetch_timeout: Duration::from_millis(50),
            refresh_interval: Duration::from_millis(20),
            numerals: Numerals::Latin,
        }
    }

    async fn session_with<S: TableSource>(source: S) -> LookupSession<S, MemoryOverlayStore> {
        LookupSession::open(source, MemoryOverlayStore::new(), fast_options())
            .await
            .unwrap()
    }

    // ── load ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn load_resolves_layout_and_reports_ready() {
        let first = sheet(&[("علي حسن", "15/01/2024")]);
        let session = session_with(QueueSource::new(vec![Ok(first)])).await;
        assert_eq!(session.status().status, RefreshStatus::Idle);

        let summary = session.load(LoadMode::Initial).await.unwrap();
        assert_eq!(summary.rows, 11);
        assert_eq!(summary.header_row, 9);
        assert_eq!(summary.data_start, 10);

        let report = session.status();
        assert!(matches!(report.status, RefreshStatus::Ready { rows: 11, .. }));
        assert_eq!(report.loaded_at, Some(summary.loaded_at));
        assert!(!report.busy);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_table() {
        let session = session_with(QueueSource::new(vec![
            Ok(sheet(&[("علي حسن", "15/01/2024")])),
            Err(FetchError::Status { status: 500, message: "boom".into() }),
        ]))
        .await;

        let first = session.load(LoadMode::Initial).await.unwrap();
        let err = session.load(LoadMode::Manual).await.unwrap_err();
        assert!(matches!(err, LoadError::Fetch(_)));

        let current = session.current().unwrap();
        assert_eq!(current.loaded_at, first.loaded_at);
        assert!(matches!(session.status().status, RefreshStatus::Failed { .. }));
        assert_eq!(session.search("علي", DateFilter::default()).unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn payload_without_rows_is_rejected() {
        let empty = SheetPayload { table: Some(Table::default()), ..SheetPayload::default() };
        let source = QueueSource::new(vec![Ok(SheetPayload::default()), Ok(empty)]);
        let session = session_with(source).await;

        assert!(matches!(session.load(LoadMode::Initial).await, Err(LoadError::MissingTable)));
        assert!(matches!(session.load(LoadMode::Manual).await, Err(LoadError::EmptyTable)));
        assert!(session.current().is_none());
    }

    #[tokio::test]
    async fn error_status_payload_is_reported() {
        let payload = SheetPayload {
            status: Some("error".into()),
            errors: vec![SheetIssue {
                reason: "access_denied".into(),
                message: "Access denied".into(),
                detailed_message: Some("Sheet is private".into()),
            }],
            table: None,
        };
        let session = session_with(QueueSource::new(vec![Ok(payload)])).await;

        match session.load(LoadMode::Initial).await {
            Err(LoadError::Sheet(message)) => assert_eq!(message, "Sheet is private"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(session.status().status, RefreshStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn hung_fetch_times_out_and_releases_busy() {
        let session = session_with(HangingSource).await;

        let err = session.load(LoadMode::Manual).await.unwrap_err();
        assert!(matches!(err, LoadError::TimedOut(d) if d == Duration::from_millis(50)));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn concurrent_load_is_busy() {
        let gate = Arc::new(Notify::new());
        let session = gated_session(gate.clone()).await;

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.load(LoadMode::Manual).await }
        });
        wait_until_busy(&session).await;
        assert!(matches!(session.status().status, RefreshStatus::Loading));

        assert!(matches!(session.load(LoadMode::Manual).await, Err(LoadError::Busy)));

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_fetch() {
        let session = gated_session(Arc::new(Notify::new())).await;
        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.load(LoadMode::Initial).await }
        });
        wait_until_busy(&session).await;

        session.shutdown();
        assert!(matches!(pending.await.unwrap(), Err(LoadError::Cancelled)));
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn aborted_load_does_not_stay_loading() {
        let session = gated_session(Arc::new(Notify::new())).await;
        let task = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.load(LoadMode::Manual).await }
        });
        wait_until_busy(&session).await;
        assert_eq!(session.status().status, RefreshStatus::Loading);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let report = session.status();
        assert!(!report.busy);
        match report.status {
            RefreshStatus::Failed { message, .. } => assert_eq!(message, LOAD_ABORTED),
            other => panic!("unexpected status: {other:?}"),
        }
    }

    // ── search ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn search_before_load_is_unavailable() {
        let session = session_with(QueueSource::default()).await;
        assert!(matches!(
            session.search("علي", DateFilter::default()),
            Err(SearchError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn search_validates_query() {
        let first = sheet(&[("علي حسن", "15/01/2024")]);
        let session = session_with(QueueSource::new(vec![Ok(first)])).await;
        session.load(LoadMode::Initial).await.unwrap();

        assert!(matches!(
            session.search("  ", DateFilter::default()),
            Err(SearchError::Query(QueryError::Empty))
        ));
        assert!(matches!(
            session.search("علي", DateFilter::new(None, Some(13), None)),
            Err(SearchError::Query(QueryError::InvalidMonth(13)))
        ));
    }

    // ── cancel ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancelled_record_disappears_from_search() {
        let session = session_with(QueueSource::new(vec![Ok(sheet(&[
            ("علي حسن", "15/01/2024"),
            ("علي حسن", "20/02/2024"),
        ]))]))
        .await;
        session.load(LoadMode::Initial).await.unwrap();
        assert_eq!(session.search("علي", DateFilter::default()).unwrap().records.len(), 2);

        assert!(session.cancel("  علي   حسن ", " 15/01/2024").await.unwrap());
        assert!(!session.cancel("علي حسن", "15/01/2024").await.unwrap());
        assert!(session.is_cancelled("علي حسن", "15/01/2024"));

        let records = session.search("علي", DateFilter::default()).unwrap().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "20/02/2024");
        assert_eq!(session.status().cancelled, 1);
    }

    #[tokio::test]
    async fn cancel_persists_to_store() {
        let store = MemoryOverlayStore::new();
        let session = LookupSession::open(QueueSource::default(), store, fast_options())
            .await
            .unwrap();
        session.cancel("Ali", "").await.unwrap();
        assert!(session.store.snapshot().is_cancelled("ali", ""));
    }

    #[tokio::test]
    async fn open_restores_persisted_overlay() {
        let mut overlay = CancellationOverlay::new();
        overlay.add("Ali", "2024");
        let session = LookupSession::open(
            QueueSource::default(),
            MemoryOverlayStore::with_overlay(overlay),
            fast_options(),
        )
        .await
        .unwrap();
        assert!(session.is_cancelled("ALI", " 2024 "));
    }

    #[tokio::test]
    async fn failed_persist_rolls_back() {
        let session = LookupSession::open(QueueSource::default(), FailingStore, fast_options())
            .await
            .unwrap();

        assert!(matches!(session.cancel("Ali", "2024").await, Err(CancelError::Storage(_))));
        assert!(!session.is_cancelled("Ali", "2024"));
    }

    #[tokio::test]
    async fn blank_name_cannot_be_cancelled() {
        let session = session_with(QueueSource::default()).await;
        assert!(matches!(session.cancel("   ", "2024").await, Err(CancelError::BlankName)));
    }

    // ── refresh loop ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn refresh_loop_skips_until_first_load() {
        let source = QueueSource::new(vec![Ok(sheet(&[("علي", "2024")]))]);
        let session = Arc::new(session_with(source).await);
        let handle = session.spawn_refresh_loop();

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(session.current().is_none());
        assert_eq!(session.status().status, RefreshStatus::Idle);

        session.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn refresh_loop_reloads_silently() {
        let session = Arc::new(
            session_with(QueueSource::new(vec![
                Ok(sheet(&[("علي", "2024")])),
                Ok(sheet(&[("علي", "2024"), ("سارة", "2024")])),
            ]))
            .await,
        );
        session.load(LoadMode::Initial).await.unwrap();
        let handle = session.spawn_refresh_loop();

        let mut rows = 0;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            rows = session.current().map_or(0, |t| t.table.row_count());
            if rows == 12 {
                break;
            }
        }
        assert_eq!(rows, 12);

        session.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn refresh_loop_waits_for_in_flight_load() {
        let gate = Arc::new(Notify::new());
        let session = gated_session(gate.clone()).await;
        gate.notify_one();
        session.load(LoadMode::Initial).await.unwrap();

        let manual = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.load(LoadMode::Manual).await }
        });
        wait_until_busy(&session).await;
        let handle = session.spawn_refresh_loop();

        // Several ticks pass while the manual load holds the busy flag.
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(session.source.calls(), 2);
        assert_eq!(session.status().status, RefreshStatus::Loading);

        gate.notify_one();
        assert!(manual.await.unwrap().is_ok());

        session.shutdown();
        handle.await.unwrap();
    }
}
