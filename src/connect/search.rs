//! Debounced user search.
//!
//! Every query change re-arms a quiescence timer; only a timer that survives
//! the full window issues a lookup. Lookups are numbered and a response is
//! applied only if no newer lookup has been armed since, so a slow answer to
//! an old query can never overwrite the results of a newer one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::api::{ApiError, ApiResult, ConnectionCandidate, ConnectionsApi};

pub const MIN_QUERY_CHARS: usize = 2;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Whether `query` is long enough to be sent to the service
pub fn is_searchable(query: &str) -> bool {
    query.trim().chars().count() >= MIN_QUERY_CHARS
}

#[derive(Debug)]
enum SearchEvent {
    /// The debounce window elapsed and the lookup was issued
    Fired { seq: u64 },
    Finished {
        seq: u64,
        outcome: ApiResult<Vec<ConnectionCandidate>>,
    },
}

pub struct SearchResolver<A> {
    api: Arc<A>,
    current_user_id: Option<String>,
    debounce: Duration,
    query: String,
    results: Vec<ConnectionCandidate>,
    has_searched: bool,
    loading: bool,
    error: Option<String>,
    seq: u64,
    timer: Option<JoinHandle<()>>,
    tx: UnboundedSender<SearchEvent>,
    rx: UnboundedReceiver<SearchEvent>,
}

impl<A> SearchResolver<A>
where
    A: ConnectionsApi + 'static,
{
    pub fn new(api: Arc<A>, current_user_id: Option<String>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            current_user_id,
            debounce,
            query: String::new(),
            results: Vec::new(),
            has_searched: false,
            loading: false,
            error: None,
            seq: 0,
            timer: None,
            tx,
            rx,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn results(&self) -> &[ConnectionCandidate] {
        &self.results
    }

    /// True once a lookup has been issued for the current query
    pub fn has_searched(&self) -> bool {
        self.has_searched
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Update the query and re-arm the debounce timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.cancel_timer();
        // Anything still in flight now answers a superseded query
        self.seq += 1;

        if !is_searchable(&self.query) {
            self.results.clear();
            self.has_searched = false;
            self.loading = false;
            self.error = None;
            return;
        }

        let seq = self.seq;
        let debounce = self.debounce;
        let query = self.query.trim().to_string();
        let api = Arc::clone(&self.api);
        let exclude = self.current_user_id.clone();
        let tx = self.tx.clone();

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if tx.send(SearchEvent::Fired { seq }).is_err() {
                return;
            }
            // The lookup outlives a later re-arm; its answer is filtered by seq
            tokio::spawn(async move {
                tracing::debug!(seq, query = %query, "user search issued");
                let outcome = api.search_users(&query, exclude.as_deref()).await;
                let _ = tx.send(SearchEvent::Finished { seq, outcome });
            });
        }));
    }

    /// Drop the query, results and any pending timer
    pub fn reset(&mut self) {
        self.cancel_timer();
        self.seq += 1;
        self.query.clear();
        self.results.clear();
        self.has_searched = false;
        self.loading = false;
        self.error = None;
    }

    /// Apply everything that has arrived without waiting.
    ///
    /// Returns `true` if visible state changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.rx.try_recv() {
            changed |= self.apply(event);
        }
        changed
    }

    /// Wait for the next timer or lookup event and apply it.
    ///
    /// Returns `true` if visible state changed (stale answers do not).
    pub async fn next_update(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    /// Hand `candidate` to `on_select` if it can be connected to.
    ///
    /// Candidates with an existing relationship are ignored.
    pub fn select<F>(&self, candidate: &ConnectionCandidate, on_select: F) -> bool
    where
        F: FnOnce(&ConnectionCandidate),
    {
        if !candidate.is_selectable() {
            return false;
        }
        on_select(candidate);
        true
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn apply(&mut self, event: SearchEvent) -> bool {
        match event {
            SearchEvent::Fired { seq } => {
                if seq != self.seq {
                    return false;
                }
                self.loading = true;
                self.has_searched = true;
                true
            }
            SearchEvent::Finished { seq, outcome } => {
                if seq != self.seq {
                    tracing::debug!(seq, latest = self.seq, "discarding stale search response");
                    return false;
                }
                self.loading = false;
                match outcome {
                    Ok(users) => {
                        self.results = users;
                        self.error = None;
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "user search failed");
                        self.results.clear();
                        self.error = Some(search_error_message(&err));
                    }
                }
                true
            }
        }
    }
}

impl<A> Drop for SearchResolver<A> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Text shown when a lookup fails
pub fn search_error_message(err: &ApiError) -> String {
    if err.is_network() {
        return "Network error. Please check your connection.".to_string();
    }
    match err {
        ApiError::Rejected(reason) if !reason.trim().is_empty() => {
            format!("Search failed: {}", reason)
        }
        _ => "Search failed. Please try again.".to_string(),
    }
}
