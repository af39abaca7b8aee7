//! Search session orchestration.
//!
//! A [`SearchSession`] owns the mutable search state: the query, the
//! selected sources, the per-source page cache and the merged result list.
//! Operations fan out one fetch task per source and return immediately;
//! callers observe progress through [`snapshot`](SearchSession::snapshot).
//!
//! Superseded work is invalidated by generation stamping rather than task
//! cancellation: every fan-out bumps a counter and stamps its tasks, and a
//! completion whose stamp no longer matches is discarded without touching
//! cache, flags or errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::credential::CredentialGate;
use crate::source::{self, SourceAdapter};
use crate::{
    PageCache, PageRequest, Result, ResultMerger, RetryPolicy, SearchError, SearchQuery,
    SourceKey, SourcePage, Story,
};

/// Observable per-source fetch state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    /// A fetch for this source is in flight.
    pub loading: bool,
    /// The in-flight fetch is waiting to retry.
    pub retrying: bool,
    /// Retries performed by the most recent fetch. Survives completion so
    /// callers can report how many attempts a result cost.
    pub retries: u32,
    /// Message of the most recent failure, cleared on the next fetch.
    pub error: Option<String>,
    /// Whether the source reported further pages.
    pub has_more: bool,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Merged, deduplicated stories across the selected sources.
    pub stories: Vec<Story>,
    /// True while any targeted source is still loading.
    pub loading: bool,
    /// True if any selected source reports further pages.
    pub has_more: bool,
    /// Most recent error message, if any.
    pub error: Option<String>,
    /// Current page number, 1-indexed.
    pub page: u32,
    /// Fan-out counter; stale fetches carry an older value.
    pub generation: u64,
    /// Per-source fetch state.
    pub sources: HashMap<SourceKey, SourceStatus>,
}

/// Mutable session state behind the lock.
#[derive(Debug)]
struct SessionState {
    query: SearchQuery,
    selected: Vec<SourceKey>,
    cache: PageCache,
    statuses: HashMap<SourceKey, SourceStatus>,
    merged: Vec<Story>,
    loading: bool,
    has_more: bool,
    error: Option<String>,
    page: u32,
    generation: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            query: SearchQuery::default(),
            selected: Vec::new(),
            cache: PageCache::new(),
            statuses: HashMap::new(),
            merged: Vec::new(),
            loading: false,
            has_more: false,
            error: None,
            page: 1,
            generation: 0,
        }
    }
}

/// Outcome of one settled per-source fetch.
enum FetchOutcome {
    Success(SourcePage),
    Failure(SearchError),
}

/// One source's share of a fan-out, resolved while planning.
struct PlannedFetch {
    source: SourceKey,
    adapter: Arc<dyn SourceAdapter>,
    request: PageRequest,
}

/// Coordinates searches across the selected sources.
///
/// One independent fetch per source, wrapped in that source's
/// [`RetryPolicy`]; sources do not block each other, and one source's
/// failure never evicts another source's cached pages.
pub struct SearchSession {
    adapters: HashMap<SourceKey, Arc<dyn SourceAdapter>>,
    retries: HashMap<SourceKey, RetryPolicy>,
    credential_gate: Option<CredentialGate>,
    state: Arc<Mutex<SessionState>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SearchSession {
    /// Creates a session with no sources.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            retries: HashMap::new(),
            credential_gate: None,
            state: Arc::new(Mutex::new(SessionState::default())),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Registers a source adapter and selects its source.
    ///
    /// Registration order becomes the default interleaving order. Selection
    /// can be changed later with
    /// [`set_selected_sources`](Self::set_selected_sources).
    pub fn add_source<A: SourceAdapter + 'static>(&mut self, adapter: A) {
        let key = adapter.key();
        self.adapters.insert(key, Arc::new(adapter));
        let mut state = lock_state(&self.state);
        if !state.selected.contains(&key) {
            state.selected.push(key);
        }
    }

    /// Overrides the retry policy for a source.
    ///
    /// Without an override, the catalog profile's policy applies.
    pub fn set_retry_policy(&mut self, source: SourceKey, policy: RetryPolicy) {
        self.retries.insert(source, policy);
    }

    /// Attaches a credential gate.
    ///
    /// With a gate attached, credential-gated sources whose state is not
    /// ready fail locally instead of contacting their adapter.
    pub fn set_credential_gate(&mut self, gate: CredentialGate) {
        self.credential_gate = Some(gate);
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.adapters.len()
    }

    /// Replaces the query. Takes effect on the next fetch; callers that
    /// changed tags or sort usually follow with `search(true)`.
    pub fn set_query(&self, query: SearchQuery) {
        lock_state(&self.state).query = query;
    }

    /// Replaces the selected sources, keeping the given order for
    /// interleaving. Duplicates are dropped. The merged list is rebuilt
    /// immediately from cache; no fetch is issued.
    pub fn set_selected_sources(&self, sources: Vec<SourceKey>) {
        let mut seen = std::collections::HashSet::new();
        let selected: Vec<SourceKey> = sources.into_iter().filter(|s| seen.insert(*s)).collect();
        let mut state = lock_state(&self.state);
        state.selected = selected;
        recompute(&mut state);
    }

    /// Currently selected sources, in interleaving order.
    pub fn selected_sources(&self) -> Vec<SourceKey> {
        lock_state(&self.state).selected.clone()
    }

    /// Returns the fetch state of one source.
    pub fn source_status(&self, source: SourceKey) -> SourceStatus {
        lock_state(&self.state)
            .statuses
            .get(&source)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns a point-in-time view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock_state(&self.state);
        SessionSnapshot {
            stories: state.merged.clone(),
            loading: state.loading,
            has_more: state.has_more,
            error: state.error.clone(),
            page: state.page,
            generation: state.generation,
            sources: state.statuses.clone(),
        }
    }

    /// True while any targeted source is still loading.
    pub fn is_loading(&self) -> bool {
        lock_state(&self.state).loading
    }

    /// Starts a new logical search across the selected sources.
    ///
    /// With `reset`, the cache and has-more flags of exactly the selected
    /// sources are cleared and the page counter returns to 1; without it,
    /// the current page is re-fetched in place. Any in-flight fetches are
    /// superseded either way. Sources without include tags are skipped; if
    /// no selected source has tags, the search fails locally with
    /// [`SearchError::NoTagsSelected`] and contacts nothing. An empty
    /// selection clears aggregate state and contacts nothing.
    pub async fn search(&self, reset: bool) -> Result<()> {
        let (stamp, page, requests) = {
            let mut state = lock_state(&self.state);
            state.generation += 1;
            let stamp = state.generation;
            neutralize_inflight(&mut state);
            state.error = None;

            if state.selected.is_empty() {
                debug!("Search requested with no sources selected");
                recompute(&mut state);
                return Ok(());
            }

            let query = state.query.clone();
            let selected = state.selected.clone();
            if !selected.iter().any(|&s| query.has_tags(s)) {
                let err = SearchError::NoTagsSelected;
                state.error = Some(err.to_string());
                recompute(&mut state);
                return Err(err);
            }

            if reset {
                state.page = 1;
                for &source in &selected {
                    state.cache.clear(source);
                    state.statuses.entry(source).or_default().has_more = false;
                }
            }
            let page = state.page;

            let requests = plan_requests(&mut state, &self.adapters, &query, &selected, page);
            begin_fetches(&mut state, &requests);
            recompute(&mut state);
            debug!("Searching {} sources at page {}", requests.len(), page);
            (stamp, page, requests)
        };

        self.dispatch(stamp, page, requests).await;
        Ok(())
    }

    /// Fetches the next page from every selected source that reported more.
    ///
    /// No-op while a search is in flight, and no-op when no selected source
    /// has more pages.
    pub async fn load_more(&self) {
        let (stamp, page, requests) = {
            let mut state = lock_state(&self.state);
            if state.loading {
                debug!("Ignoring load_more while a search is in flight");
                return;
            }
            let query = state.query.clone();
            let selected = state.selected.clone();
            let next_page = state.page + 1;

            let mut requests = Vec::new();
            for &source in &selected {
                let more = state
                    .statuses
                    .get(&source)
                    .map(|s| s.has_more)
                    .unwrap_or(false);
                if !more {
                    continue;
                }
                if let Some(request) = PageRequest::from_query(&query, source, next_page) {
                    match self.adapters.get(&source) {
                        Some(adapter) => requests.push(PlannedFetch {
                            source,
                            adapter: Arc::clone(adapter),
                            request,
                        }),
                        None => warn!("No adapter registered for {}; skipping", source),
                    }
                }
            }
            if requests.is_empty() {
                return;
            }

            state.generation += 1;
            let stamp = state.generation;
            neutralize_inflight(&mut state);
            state.error = None;
            state.page = next_page;
            begin_fetches(&mut state, &requests);
            recompute(&mut state);
            debug!("Loading page {} from {} sources", next_page, requests.len());
            (stamp, next_page, requests)
        };

        self.dispatch(stamp, page, requests).await;
    }

    /// Re-fetches the current page for selected sources that are missing it.
    ///
    /// Sources whose current page is cached are not contacted, so a retry
    /// after a partial failure leaves the successful sources untouched.
    pub async fn retry(&self) {
        let (stamp, page, requests) = {
            let mut state = lock_state(&self.state);
            let query = state.query.clone();
            let selected = state.selected.clone();
            let page = state.page;

            let mut requests = Vec::new();
            for &source in &selected {
                if state.cache.get(source, page).is_some() {
                    continue;
                }
                let reachable = page == 1
                    || state
                        .statuses
                        .get(&source)
                        .map(|s| s.has_more)
                        .unwrap_or(false);
                if !reachable {
                    continue;
                }
                if let Some(request) = PageRequest::from_query(&query, source, page) {
                    match self.adapters.get(&source) {
                        Some(adapter) => requests.push(PlannedFetch {
                            source,
                            adapter: Arc::clone(adapter),
                            request,
                        }),
                        None => warn!("No adapter registered for {}; skipping", source),
                    }
                }
            }
            if requests.is_empty() {
                return;
            }

            state.generation += 1;
            let stamp = state.generation;
            neutralize_inflight(&mut state);
            state.error = None;
            begin_fetches(&mut state, &requests);
            recompute(&mut state);
            debug!("Retrying page {} for {} sources", page, requests.len());
            (stamp, page, requests)
        };

        self.dispatch(stamp, page, requests).await;
    }

    /// Waits until every spawned fetch has settled.
    ///
    /// Discarded stale fetches count as settled; this is a quiescence
    /// point for callers that want a final state, not a barrier the
    /// session itself ever waits on.
    pub async fn settled(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
                handles.drain(..).collect()
            };
            if handles.is_empty() {
                return;
            }
            let _ = join_all(handles).await;
        }
    }

    /// Resolved retry policy for a source.
    fn retry_for(&self, source: SourceKey) -> RetryPolicy {
        self.retries
            .get(&source)
            .cloned()
            .unwrap_or_else(|| source::profile(source).retry)
    }

    /// Gates on credentials, then spawns one fetch task per planned source.
    async fn dispatch(&self, stamp: u64, page: u32, plans: Vec<PlannedFetch>) {
        for plan in plans {
            let PlannedFetch {
                source,
                adapter,
                request,
            } = plan;
            if source::requires_credential(source) {
                if let Some(gate) = &self.credential_gate {
                    if !gate.ready(source).await {
                        let mut state = lock_state(&self.state);
                        apply_completion(
                            &mut state,
                            source,
                            page,
                            stamp,
                            FetchOutcome::Failure(SearchError::CredentialUnavailable(source)),
                        );
                        continue;
                    }
                }
            }

            let policy = self.retry_for(source);
            let state = Arc::clone(&self.state);

            let handle = tokio::spawn(async move {
                let retry_state = Arc::clone(&state);
                let outcome = policy
                    .run_with(
                        || adapter.fetch_page(&request),
                        |attempt| {
                            let mut guard = lock_state(&retry_state);
                            if guard.generation == stamp {
                                if let Some(status) = guard.statuses.get_mut(&source) {
                                    status.retrying = true;
                                    status.retries = attempt;
                                }
                            }
                        },
                    )
                    .await;
                let mut guard = lock_state(&state);
                match outcome {
                    Ok(data) => {
                        apply_completion(&mut guard, source, page, stamp, FetchOutcome::Success(data))
                    }
                    Err(err) => {
                        apply_completion(&mut guard, source, page, stamp, FetchOutcome::Failure(err))
                    }
                }
            });
            self.handles
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(handle);
        }
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the per-source fetch plan for one fan-out and resets the status of
/// sources that are selected but skipped.
fn plan_requests(
    state: &mut SessionState,
    adapters: &HashMap<SourceKey, Arc<dyn SourceAdapter>>,
    query: &SearchQuery,
    selected: &[SourceKey],
    page: u32,
) -> Vec<PlannedFetch> {
    let mut plans = Vec::new();
    for &source in selected {
        match PageRequest::from_query(query, source, page) {
            Some(request) => match adapters.get(&source) {
                Some(adapter) => plans.push(PlannedFetch {
                    source,
                    adapter: Arc::clone(adapter),
                    request,
                }),
                None => {
                    warn!("No adapter registered for {}; skipping", source);
                    state.statuses.insert(source, SourceStatus::default());
                }
            },
            None => {
                state.statuses.insert(source, SourceStatus::default());
            }
        }
    }
    plans
}

/// Marks every planned source as loading with a clean slate.
fn begin_fetches(state: &mut SessionState, plans: &[PlannedFetch]) {
    for plan in plans {
        let status = state.statuses.entry(plan.source).or_default();
        status.loading = true;
        status.retrying = false;
        status.retries = 0;
        status.error = None;
    }
}

/// Clears in-flight markers after a generation bump made that work stale.
fn neutralize_inflight(state: &mut SessionState) {
    for status in state.statuses.values_mut() {
        status.loading = false;
        status.retrying = false;
    }
}

/// Applies one settled fetch to the state, unless the fetch is stale.
///
/// A stale completion is discarded in full: no cache write, no flag or
/// error change, no recompute.
fn apply_completion(
    state: &mut SessionState,
    source: SourceKey,
    page: u32,
    stamp: u64,
    outcome: FetchOutcome,
) {
    if stamp != state.generation {
        debug!(
            "Discarding stale fetch for {} (generation {}, current {})",
            source, stamp, state.generation
        );
        return;
    }

    let status = state.statuses.entry(source).or_default();
    status.loading = false;
    status.retrying = false;
    match outcome {
        FetchOutcome::Success(data) => {
            debug!("Source {} returned {} stories for page {}", source, data.len(), page);
            status.error = None;
            status.has_more = data.has_more;
            state.cache.put(source, page, data);
        }
        FetchOutcome::Failure(err) => {
            let message = err.to_string();
            warn!("Source {} failed: {}", source, message);
            status.error = Some(message.clone());
            state.error = Some(message);
        }
    }
    recompute(state);
}

/// Rebuilds the merged list and the aggregate flags from current state.
fn recompute(state: &mut SessionState) {
    let merged = ResultMerger::new().rebuild(&state.selected, &state.cache);
    state.merged = merged;
    state.loading = state.statuses.values().any(|status| status.loading);
    state.has_more = state
        .selected
        .iter()
        .any(|source| {
            state
                .statuses
                .get(source)
                .map(|status| status.has_more)
                .unwrap_or(false)
        });
}
