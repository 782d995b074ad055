//! Bulk execution over a bounded concurrency pool.
//!
//! Items run as independent tasks behind a semaphore. One failing item
//! becomes an error entry; siblings are unaffected. The returned Vec is
//! input-ordered with exactly one entry per item.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::identity::IdentityPool;
use crate::models::{BulkEntry, FetchOutcome, PageAudit, SerpResponse};
use crate::orchestrator::SearchOrchestrator;
use crate::page::audit_page;
use crate::rotation::RotationManager;
use crate::traits::{Fetcher, ResultStore};

/// Runs query batches and page-audit batches.
pub struct BulkRunner<F, R, S>
where
    F: Fetcher + 'static,
    R: Fetcher + 'static,
    S: ResultStore + 'static,
{
    orchestrator: Arc<SearchOrchestrator<F, R>>,
    fetcher: F,
    rotation: RotationManager,
    identities: IdentityPool,
    store: S,
    max_concurrency: usize,
}

impl<F, R, S> BulkRunner<F, R, S>
where
    F: Fetcher + 'static,
    R: Fetcher + 'static,
    S: ResultStore + 'static,
{
    pub fn new(
        orchestrator: SearchOrchestrator<F, R>,
        fetcher: F,
        rotation: RotationManager,
        store: S,
        config: &EngineConfig,
    ) -> Result<Self, AppError> {
        if config.max_concurrency == 0 {
            return Err(AppError::ConfigError(
                "max_concurrency must be at least 1".into(),
            ));
        }
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            fetcher,
            rotation,
            identities: IdentityPool::new(),
            store,
            max_concurrency: config.max_concurrency,
        })
    }

    /// Run every query, returning one entry per query in input order.
    ///
    /// Completed non-empty responses are persisted through the store;
    /// a store failure logs a warning and never invalidates the
    /// in-memory result.
    pub async fn run_queries(
        &self,
        queries: &[String],
        want: usize,
    ) -> Vec<BulkEntry<SerpResponse>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(queries.len());

        for query in queries {
            let semaphore = semaphore.clone();
            let orchestrator = self.orchestrator.clone();
            let store = self.store.clone();
            let query = query.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return BulkEntry::failed(query, e),
                };
                let response = orchestrator.search(&query, want).await;
                persist(&store, &response).await;
                BulkEntry::ok(query, response)
            }));
        }

        collect(queries, handles).await
    }

    /// Audit every URL, returning one entry per URL in input order.
    pub async fn run_audits(&self, urls: &[String]) -> Vec<BulkEntry<PageAudit>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let semaphore = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let rotation = self.rotation.clone();
            let identities = self.identities.clone();
            let url = url.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return BulkEntry::failed(url, e),
                };
                match audit_one(&fetcher, &rotation, &identities, &url).await {
                    Ok(audit) => BulkEntry::ok(url, audit),
                    Err(e) => BulkEntry::failed(url, e),
                }
            }));
        }

        collect(urls, handles).await
    }
}

async fn audit_one<F: Fetcher>(
    fetcher: &F,
    rotation: &RotationManager,
    identities: &IdentityPool,
    url: &str,
) -> Result<PageAudit, AppError> {
    let egress = rotation
        .acquire(false)
        .ok_or_else(|| AppError::ConfigError("no egress available".into()))?;
    let identity = identities.sample();

    let outcome = fetcher.fetch(url, &identity, &egress).await;
    rotation.report(&egress.key, &outcome);

    match outcome {
        FetchOutcome::Success { html, status } => audit_page(url, &html, status),
        FetchOutcome::SoftBlock { reason } => {
            Err(AppError::Generic(format!("blocked while auditing: {reason}")))
        }
        FetchOutcome::HardFailure { error } => Err(error),
    }
}

async fn persist<S: ResultStore>(store: &S, response: &SerpResponse) {
    if response.is_empty() {
        return;
    }
    match store.save_query(&response.query).await {
        Ok(id) => {
            if let Err(e) = store.save_results(id, &response.results).await {
                tracing::warn!(query = %response.query, error = %e, "Failed to save results");
            }
        }
        Err(e) => {
            tracing::warn!(query = %response.query, error = %e, "Failed to save query");
        }
    }
}

async fn collect<T>(
    items: &[String],
    handles: Vec<tokio::task::JoinHandle<BulkEntry<T>>>,
) -> Vec<BulkEntry<T>> {
    let mut entries = Vec::with_capacity(handles.len());
    for (item, handle) in items.iter().zip(handles) {
        match handle.await {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                tracing::error!(%item, error = %e, "Bulk task panicked");
                entries.push(BulkEntry::failed(item.clone(), e));
            }
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::orchestrator::BackoffConfig;
    use crate::rotation::RotationConfig;
    use crate::testutil::*;
    use crate::traits::NullStore;
    use std::time::Duration;

    fn fast_config(max_concurrency: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.max_concurrency = max_concurrency;
        config.max_retries = 1;
        config.backoff = BackoffConfig {
            base: Duration::from_millis(1),
            step: Duration::ZERO,
            jitter: Duration::ZERO,
        };
        config.rotation = RotationConfig {
            keys: vec!["us_ohio".into(), "us_texas".into()],
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            breaker: CircuitBreakerConfig {
                failure_threshold: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        config
    }

    fn runner<S: ResultStore + 'static>(
        fetcher: MockFetcher,
        store: S,
        config: &EngineConfig,
    ) -> BulkRunner<MockFetcher, MockFetcher, S> {
        let rotation = RotationManager::new(config.rotation.clone()).unwrap();
        let orchestrator = SearchOrchestrator::<_, MockFetcher>::new(
            fetcher.clone(),
            rotation.clone(),
            config,
        );
        BulkRunner::new(orchestrator, fetcher, rotation, store, config).unwrap()
    }

    fn serp_html(count: usize) -> String {
        let mut html = String::from("<html><body>");
        for i in 0..count {
            html.push_str(&format!(
                r#"<div class="g"><a href="https://example.com/{i}"><h3>Title {i}</h3></a><div class="VwiC3b">Desc</div></div>"#
            ));
        }
        html.push_str("</body></html>");
        html
    }

    #[test]
    fn zero_concurrency_is_a_config_error() {
        let config = fast_config(0);
        let rotation = RotationManager::new(config.rotation.clone()).unwrap();
        let fetcher = MockFetcher::always_success("<html></html>");
        let orchestrator = SearchOrchestrator::<_, MockFetcher>::new(
            fetcher.clone(),
            rotation.clone(),
            &config,
        );

        let result = BulkRunner::new(orchestrator, fetcher, rotation, NullStore, &config);
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[tokio::test]
    async fn query_batch_is_input_ordered_with_one_entry_each() {
        let config = fast_config(2);
        let runner = runner(MockFetcher::always_success(serp_html(3)), NullStore, &config);

        let queries: Vec<String> = (0..5).map(|i| format!("query {i}")).collect();
        let entries = runner.run_queries(&queries, 3).await;

        assert_eq!(entries.len(), 5);
        for (entry, query) in entries.iter().zip(&queries) {
            assert_eq!(&entry.item, query);
            assert!(entry.is_ok());
        }
    }

    #[tokio::test]
    async fn python_tutorial_scenario_caps_at_want() {
        let config = fast_config(3);
        let runner = runner(MockFetcher::always_success(serp_html(5)), NullStore, &config);

        let entries = runner
            .run_queries(&["python tutorial".to_string()], 3)
            .await;

        let response = entries[0].outcome.as_ref().unwrap();
        assert_eq!(response.results.len(), 3);
        let positions: Vec<u32> = response.results.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert!(response.results.iter().all(|r| r.query == "python tutorial"));
    }

    #[tokio::test]
    async fn successful_queries_are_persisted() {
        let config = fast_config(2);
        let store = MockStore::empty();
        let runner = runner(
            MockFetcher::always_success(serp_html(2)),
            store.clone(),
            &config,
        );

        runner
            .run_queries(&["a".to_string(), "b".to_string()], 6)
            .await;

        assert_eq!(store.saved_queries.lock().unwrap().len(), 2);
        assert_eq!(store.saved_results.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn store_failure_never_invalidates_results() {
        let config = fast_config(2);
        let runner = runner(
            MockFetcher::always_success(serp_html(2)),
            MockStore::failing(),
            &config,
        );

        let entries = runner.run_queries(&["a".to_string()], 6).await;

        assert!(entries[0].is_ok());
        assert_eq!(entries[0].outcome.as_ref().unwrap().results.len(), 2);
    }

    #[tokio::test]
    async fn empty_responses_are_ok_entries_and_not_persisted() {
        let config = fast_config(2);
        let store = MockStore::empty();
        // Every rung hard-fails; search yields empty responses.
        let runner = runner(MockFetcher::with_outcomes(Vec::new()), store.clone(), &config);

        let entries = runner.run_queries(&["a".to_string()], 6).await;

        assert!(entries[0].is_ok());
        assert!(entries[0].outcome.as_ref().unwrap().is_empty());
        assert!(store.saved_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn audit_failures_are_isolated() {
        let config = fast_config(1);
        let page = "<html><head><title>Ok</title></head><body><p>text</p></body></html>";
        let fetcher = MockFetcher::with_outcomes(vec![
            FetchOutcome::Success {
                html: page.into(),
                status: 200,
            },
            hard_failure(),
            FetchOutcome::Success {
                html: page.into(),
                status: 200,
            },
        ]);
        let runner = runner(fetcher, NullStore, &config);

        let urls: Vec<String> = (0..3).map(|i| format!("https://example.com/{i}")).collect();
        let entries = runner.run_audits(&urls).await;

        assert_eq!(entries.len(), 3);
        for (entry, url) in entries.iter().zip(&urls) {
            assert_eq!(&entry.item, url);
        }
        assert_eq!(entries.iter().filter(|e| e.is_ok()).count(), 2);
        let failed = entries.iter().find(|e| !e.is_ok()).unwrap();
        assert!(failed.error.as_deref().unwrap_or_default().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn audit_soft_block_becomes_error_entry() {
        let config = fast_config(1);
        let runner = runner(MockFetcher::with_outcomes(vec![soft_block()]), NullStore, &config);

        let entries = runner
            .run_audits(&["https://example.com/".to_string()])
            .await;

        assert!(!entries[0].is_ok());
        assert!(entries[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("blocked"));
    }
}
