//! The feed synchronization and merge engine.
//!
//! [`FeedSync`] owns the in-memory view of one feed query: the hydrated
//! snapshot, the reading-list projection, and the locally filtered list the
//! presentation layer renders. All of it is a rebuildable cache over the
//! [`Database`]; losing it loses nothing.
//!
//! Locking discipline: `state` is a std `Mutex` taken only between
//! suspension points, never across an `await`. The single-flight guard is a
//! process-wide `AtomicBool`: a second `fetch_feed` for *any* query while
//! one is outstanding is rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use thiserror::Error;

use super::merge::reconcile;
use crate::connectivity::ConnectivityMonitor;
use crate::feed::{FeedSource, FetchError};
use crate::query::FeedQuery;
use crate::storage::{Database, Paper, ReadStatus, SnapshotMeta, StorageError, UpsertOutcome};

const OFFLINE_BANNER: &str = "You are offline. Showing cached results.";
const EMPTY_CATEGORIES_BANNER: &str = "Select at least one category";
const CACHE_LOAD_FAILED_BANNER: &str = "Failed to load cached feed";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    /// Validation: a network fetch needs at least one category
    #[error("Select at least one category")]
    EmptyCategories,
    /// Connectivity monitor reports offline; no I/O was attempted
    #[error("You are offline. Showing cached results.")]
    Offline,
    /// Another fetch is already in flight (single-flight, process-wide)
    #[error("A fetch is already in progress")]
    FetchInFlight,
    /// The upstream fetch failed; the local snapshot is untouched
    #[error("Feed fetch failed: {0}")]
    Upstream(#[from] FetchError),
    /// A local read/write failed; the user action did not persist
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The id is in neither the store nor any materialized view
    #[error("No such paper: {0}")]
    UnknownPaper(String),
}

/// Counts from one successful fetch-and-merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub inserted: usize,
    pub updated: usize,
    /// Upstream-reported total result count (informational).
    pub total_results: i64,
}

/// Which list the local filter applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Feed,
    ReadingList,
}

// ============================================================================
// View State
// ============================================================================

/// Everything the presentation layer reads. Rebuilt from the store at any
/// time; mutated only while holding the lock, between suspension points.
struct ViewState {
    query: FeedQuery,
    /// Hydrated snapshot in upstream order. No client-side re-sorting.
    feed: Vec<Paper>,
    /// Materialized reading-list projection (most-recently-bookmarked
    /// first). Reloaded on entry to [`ViewMode::ReadingList`].
    reading_list: Vec<Paper>,
    /// The active list after the local filter.
    filtered: Vec<Paper>,
    view_mode: ViewMode,
    local_filter: String,
    is_loading: bool,
    last_refresh: Option<i64>,
    /// User-visible error/banner message, `None` when all is well.
    banner: Option<String>,
}

impl ViewState {
    fn new(query: FeedQuery) -> Self {
        Self {
            query,
            feed: Vec::new(),
            reading_list: Vec::new(),
            filtered: Vec::new(),
            view_mode: ViewMode::Feed,
            local_filter: String::new(),
            is_loading: false,
            last_refresh: None,
            banner: None,
        }
    }

    fn active_list(&self) -> &[Paper] {
        match self.view_mode {
            ViewMode::Feed => &self.feed,
            ViewMode::ReadingList => &self.reading_list,
        }
    }

    /// Recompute `filtered` from the active list and the local filter.
    /// Case-insensitive substring OR-match over title, abstract, authors.
    fn recompute(&mut self) {
        let needle = self.local_filter.trim().to_lowercase();
        if needle.is_empty() {
            self.filtered = self.active_list().to_vec();
            return;
        }
        self.filtered = self
            .active_list()
            .iter()
            .filter(|paper| {
                paper.title.to_lowercase().contains(&needle)
                    || paper.abstract_text.to_lowercase().contains(&needle)
                    || paper
                        .authors
                        .iter()
                        .any(|a| a.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
    }

    /// Echo a record update into every materialized projection, not just
    /// the one being edited from.
    fn apply_record_update(&mut self, paper: &Paper) {
        if let Some(slot) = self.feed.iter_mut().find(|p| p.id == paper.id) {
            *slot = paper.clone();
        }
        let in_list = self.reading_list.iter().position(|p| p.id == paper.id);
        match (paper.bookmarked, in_list) {
            (true, Some(idx)) => self.reading_list[idx] = paper.clone(),
            // Freshly bookmarked goes to the front: most recent first.
            (true, None) => self.reading_list.insert(0, paper.clone()),
            (false, Some(idx)) => {
                self.reading_list.remove(idx);
            }
            (false, None) => {}
        }
        self.recompute();
    }
}

// ============================================================================
// Single-flight Guard
// ============================================================================

/// RAII claim on the process-wide in-flight flag.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct FeedSync<S> {
    db: Database,
    source: S,
    connectivity: ConnectivityMonitor,
    in_flight: AtomicBool,
    state: Mutex<ViewState>,
}

impl<S: FeedSource> FeedSync<S> {
    pub fn new(
        db: Database,
        source: S,
        connectivity: ConnectivityMonitor,
        query: FeedQuery,
    ) -> Self {
        Self {
            db,
            source,
            connectivity,
            in_flight: AtomicBool::new(false),
            state: Mutex::new(ViewState::new(query)),
        }
    }

    // ------------------------------------------------------------------
    // Query parameters
    // ------------------------------------------------------------------

    pub fn query(&self) -> FeedQuery {
        self.lock().query.clone()
    }

    /// Replace the category set. Does not fetch; callers decide when.
    pub fn set_categories(&self, categories: Vec<String>) {
        self.lock().query.categories = categories;
    }

    /// Replace the keyword string. Does not fetch; callers decide when.
    pub fn set_keywords(&self, keywords: impl Into<String>) {
        self.lock().query.keywords = keywords.into();
    }

    // ------------------------------------------------------------------
    // Cache load
    // ------------------------------------------------------------------

    /// Hydrate the feed from the persisted snapshot for the current query.
    ///
    /// Never touches the network and never fails from the caller's
    /// perspective: a storage error degrades to an empty feed with the
    /// banner set.
    pub async fn load_cached(&self) {
        let fingerprint = {
            let mut s = self.lock();
            s.is_loading = true;
            s.banner = None;
            s.query.fingerprint()
        };

        let result = self.read_snapshot(&fingerprint).await;

        let mut s = self.lock();
        s.is_loading = false;
        match result {
            Ok(Some((papers, last_refresh))) => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    papers = papers.len(),
                    "Loaded cached feed"
                );
                s.feed = papers;
                s.last_refresh = Some(last_refresh);
                s.recompute();
            }
            Ok(None) => {
                s.feed.clear();
                s.last_refresh = None;
                s.recompute();
            }
            Err(e) => {
                tracing::error!(fingerprint = %fingerprint, error = %e, "Failed to load cached feed");
                s.feed.clear();
                s.recompute();
                s.banner = Some(CACHE_LOAD_FAILED_BANNER.to_string());
            }
        }
    }

    async fn read_snapshot(
        &self,
        fingerprint: &str,
    ) -> Result<Option<(Vec<Paper>, i64)>, StorageError> {
        let Some(snapshot) = self.db.get_snapshot(fingerprint).await? else {
            return Ok(None);
        };
        let papers = self.db.get_papers_ordered(&snapshot.paper_ids).await?;
        Ok(Some((papers, snapshot.meta.last_refresh)))
    }

    // ------------------------------------------------------------------
    // Network fetch & merge
    // ------------------------------------------------------------------

    /// Fetch the feed for the current query, merge it with stored user
    /// state, and replace the snapshot for its fingerprint.
    ///
    /// Guards, in order: empty category set (validation, no I/O), offline
    /// (banner set, no I/O), fetch already in flight (state untouched).
    pub async fn fetch_feed(&self) -> Result<FetchStats, SyncError> {
        let query = {
            let mut s = self.lock();
            if s.query.categories.is_empty() {
                s.banner = Some(EMPTY_CATEGORIES_BANNER.to_string());
                return Err(SyncError::EmptyCategories);
            }
            s.query.clone()
        };

        if !self.connectivity.is_online() {
            tracing::debug!("Offline, skipping fetch");
            self.lock().banner = Some(OFFLINE_BANNER.to_string());
            return Err(SyncError::Offline);
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Already fetching, skipping");
            return Err(SyncError::FetchInFlight);
        };

        let fingerprint = query.fingerprint();
        let page = match self.source.fetch(&query).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Feed fetch failed");
                self.lock().banner = Some(e.to_string());
                return Err(SyncError::Upstream(e));
            }
        };

        // Everything below is local: merge each record against stored user
        // state, write it back, then swap the snapshot in one statement.
        // On any storage error the previous snapshot remains intact.
        let now = Utc::now().timestamp();
        let mut merged = Vec::with_capacity(page.papers.len());
        let mut inserted = 0;
        let mut updated = 0;

        for fetched in &page.papers {
            let existing = self.db.get_paper(&fetched.id).await?;
            match existing {
                Some(_) => updated += 1,
                None => inserted += 1,
            }
            let paper = reconcile(fetched, existing.as_ref(), now);
            self.db.put_paper(&paper).await?;
            merged.push(paper);
        }

        let ids: Vec<String> = merged.iter().map(|p| p.id.clone()).collect();
        let meta = SnapshotMeta {
            last_refresh: now,
            total_results: page.total_results,
        };
        self.db.put_snapshot(&fingerprint, &ids, &meta).await?;

        tracing::info!(
            fingerprint = %fingerprint,
            inserted = inserted,
            updated = updated,
            "Feed refreshed"
        );

        let mut s = self.lock();
        s.feed = merged;
        s.last_refresh = Some(now);
        s.banner = None; // a genuine fetch success clears the offline banner
        s.recompute();

        Ok(FetchStats {
            inserted,
            updated,
            total_results: meta.total_results,
        })
    }

    // ------------------------------------------------------------------
    // User state
    // ------------------------------------------------------------------

    /// Flip the bookmark flag on one paper.
    pub async fn toggle_bookmark(&self, id: &str) -> Result<Paper, SyncError> {
        let now = Utc::now().timestamp();
        let mut paper = self.persisted_or_in_memory(id).await?;
        paper.bookmarked = !paper.bookmarked;
        paper.bookmarked_at = if paper.bookmarked { Some(now) } else { None };
        paper.updated_at = now;
        self.write_user_state(paper).await
    }

    /// Set the read status on one paper.
    pub async fn set_status(&self, id: &str, status: ReadStatus) -> Result<Paper, SyncError> {
        let now = Utc::now().timestamp();
        let mut paper = self.persisted_or_in_memory(id).await?;
        paper.status = status;
        paper.updated_at = now;
        self.write_user_state(paper).await
    }

    /// Attach or clear the free-text note on one paper.
    pub async fn set_note(&self, id: &str, note: Option<String>) -> Result<Paper, SyncError> {
        let now = Utc::now().timestamp();
        let mut paper = self.persisted_or_in_memory(id).await?;
        paper.note = note;
        paper.updated_at = now;
        self.write_user_state(paper).await
    }

    /// The stored record, or, for an item visible in memory but never
    /// persisted, the current in-memory representation. The latter is a
    /// fallback path, not an error.
    async fn persisted_or_in_memory(&self, id: &str) -> Result<Paper, SyncError> {
        if let Some(paper) = self.db.get_paper(id).await? {
            return Ok(paper);
        }
        let s = self.lock();
        s.feed
            .iter()
            .chain(s.reading_list.iter())
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownPaper(id.to_string()))
    }

    async fn write_user_state(&self, paper: Paper) -> Result<Paper, SyncError> {
        let outcome = self.db.upsert_paper(&paper).await?;
        if outcome == UpsertOutcome::Inserted {
            tracing::debug!(id = %paper.id, "Persisted in-memory paper before user-state update");
        }
        self.lock().apply_record_update(&paper);
        Ok(paper)
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Set the local text filter over the active list. Pure and
    /// synchronous; matching is a case-insensitive substring OR across
    /// title, abstract, and author names.
    pub fn set_local_filter(&self, text: impl Into<String>) {
        let mut s = self.lock();
        s.local_filter = text.into();
        s.recompute();
    }

    /// Switch between the full feed and the reading-list projection.
    ///
    /// Resets the local filter and, when entering the reading list,
    /// reloads the projection from the store; it is derived, not kept
    /// incrementally in sync.
    pub async fn set_view_mode(&self, mode: ViewMode) -> Result<(), SyncError> {
        let reading_list = match mode {
            ViewMode::ReadingList => Some(self.db.reading_list().await?),
            ViewMode::Feed => None,
        };

        let mut s = self.lock();
        if let Some(list) = reading_list {
            s.reading_list = list;
        }
        s.view_mode = mode;
        s.local_filter.clear();
        s.recompute();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------

    /// React to a connectivity transition. Offline raises the banner;
    /// online clears it but deliberately does not fetch; that stays with
    /// the scheduler or an explicit caller.
    pub fn handle_connectivity_change(&self, online: bool) {
        let mut s = self.lock();
        if online {
            s.banner = None;
        } else {
            s.banner = Some(OFFLINE_BANNER.to_string());
        }
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The active list after the local filter, in display order.
    pub fn papers(&self) -> Vec<Paper> {
        self.lock().filtered.clone()
    }

    /// The unfiltered feed list, in upstream order.
    pub fn feed_papers(&self) -> Vec<Paper> {
        self.lock().feed.clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.lock().view_mode
    }

    pub fn local_filter(&self) -> String {
        self.lock().local_filter.clone()
    }

    /// Current user-visible banner/error message, if any.
    pub fn banner(&self) -> Option<String> {
        self.lock().banner.clone()
    }

    pub fn last_refresh(&self) -> Option<i64> {
        self.lock().last_refresh
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.lock().is_loading
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ViewState> {
        // The lock is only ever held between suspension points; a poisoned
        // mutex means a panic mid-update and there is no good recovery.
        self.state.lock().expect("view state lock poisoned")
    }
}
