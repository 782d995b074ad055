//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{FetchOutcome, SearchResult};
use crate::rotation::Egress;
use crate::traits::{Fetcher, ResultStore};

pub fn soft_block() -> FetchOutcome {
    FetchOutcome::SoftBlock {
        reason: "unusual traffic".into(),
    }
}

pub fn hard_failure() -> FetchOutcome {
    FetchOutcome::HardFailure {
        error: AppError::HttpError("HTTP 500".into()),
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with a queue of scripted outcomes.
///
/// Each call pops the first queued outcome; an empty queue falls back to
/// the configured success page, or a hard failure when none is set.
/// Clones share state so tests can inspect recorded calls.
#[derive(Clone)]
pub struct MockFetcher {
    outcomes: Arc<Mutex<Vec<FetchOutcome>>>,
    fallback_html: Arc<Option<String>>,
    calls: Arc<Mutex<Vec<String>>>,
    egress_keys: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    /// Every call succeeds with the given page.
    pub fn always_success(html: impl Into<String>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(Vec::new())),
            fallback_html: Arc::new(Some(html.into())),
            calls: Arc::new(Mutex::new(Vec::new())),
            egress_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Calls consume the queue in order; further calls hard-fail.
    pub fn with_outcomes(outcomes: Vec<FetchOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes)),
            fallback_html: Arc::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
            egress_keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Egress keys used so far, in call order.
    pub fn egress_keys(&self) -> Vec<String> {
        self.egress_keys.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, _identity: &Identity, egress: &Egress) -> FetchOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        self.egress_keys.lock().unwrap().push(egress.key.clone());

        let mut outcomes = self.outcomes.lock().unwrap();
        if !outcomes.is_empty() {
            return outcomes.remove(0);
        }
        match self.fallback_html.as_ref() {
            Some(html) => FetchOutcome::Success {
                html: html.clone(),
                status: 200,
            },
            None => hard_failure(),
        }
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock store recording every save.
#[derive(Clone)]
pub struct MockStore {
    pub saved_queries: Arc<Mutex<Vec<String>>>,
    pub saved_results: Arc<Mutex<Vec<(i64, Vec<SearchResult>)>>>,
    fail_saves: bool,
}

impl MockStore {
    pub fn empty() -> Self {
        Self {
            saved_queries: Arc::new(Mutex::new(Vec::new())),
            saved_results: Arc::new(Mutex::new(Vec::new())),
            fail_saves: false,
        }
    }

    /// Every save fails, for exercising degraded persistence.
    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::empty()
        }
    }
}

impl ResultStore for MockStore {
    async fn save_query(&self, query: &str) -> Result<i64, AppError> {
        if self.fail_saves {
            return Err(AppError::Generic("store unavailable".into()));
        }
        let mut queries = self.saved_queries.lock().unwrap();
        queries.push(query.to_string());
        Ok(queries.len() as i64)
    }

    async fn save_results(
        &self,
        query_id: i64,
        results: &[SearchResult],
    ) -> Result<(), AppError> {
        if self.fail_saves {
            return Err(AppError::Generic("store unavailable".into()));
        }
        self.saved_results
            .lock()
            .unwrap()
            .push((query_id, results.to_vec()));
        Ok(())
    }
}
