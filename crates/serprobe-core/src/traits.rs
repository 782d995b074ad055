use std::future::Future;

use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{FetchOutcome, SearchResult};
use crate::rotation::Egress;

/// Fetches one URL through the given identity and egress, classifying
/// the response. Never returns `Err`: every failure mode is a
/// `FetchOutcome` variant.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        url: &str,
        identity: &Identity,
        egress: &Egress,
    ) -> impl Future<Output = FetchOutcome> + Send;
}

/// Persists completed query results.
pub trait ResultStore: Send + Sync + Clone {
    /// Register a query row. Returns its id for result rows to reference.
    fn save_query(&self, query: &str) -> impl Future<Output = Result<i64, AppError>> + Send;

    /// Save the ranked results for a previously registered query.
    fn save_results(
        &self,
        query_id: i64,
        results: &[SearchResult],
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Produces prose from a prompt (summaries, content briefs).
pub trait TextGenerator: Send + Sync + Clone {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// A no-op ResultStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullStore;

impl ResultStore for NullStore {
    async fn save_query(&self, _query: &str) -> Result<i64, AppError> {
        Ok(0)
    }

    async fn save_results(&self, _query_id: i64, _results: &[SearchResult]) -> Result<(), AppError> {
        Ok(())
    }
}

/// A TextGenerator for deployments without a generation backend; callers
/// degrade to no generated content.
#[derive(Debug, Clone)]
pub struct NullGenerator;

impl TextGenerator for NullGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, AppError> {
        Err(AppError::Generic("no text generator configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_store_accepts_everything() {
        let store = NullStore;
        let id = store.save_query("rust tutorial").await.unwrap();
        assert_eq!(id, 0);
        store.save_results(id, &[]).await.unwrap();
    }

    #[tokio::test]
    async fn null_generator_reports_absence() {
        let err = NullGenerator.generate("summarize this").await.unwrap_err();
        assert!(err.to_string().contains("no text generator"));
    }
}
