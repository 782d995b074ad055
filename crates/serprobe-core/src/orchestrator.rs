//! Query orchestration: strategy fallback, retries, backoff.
//!
//! One query walks an ordered list of strategies (engine × fetch mode).
//! Within a strategy, soft blocks are retried with a growing delay;
//! hard failures advance immediately. A query that exhausts every
//! strategy yields an empty response, never an error — per-attempt
//! failures are absorbed and logged.

use std::time::Duration;

use crate::config::EngineConfig;
use crate::engine::SearchEngine;
use crate::extract::ResultExtractor;
use crate::identity::IdentityPool;
use crate::models::{FetchOutcome, SerpResponse};
use crate::rotation::RotationManager;
use crate::traits::Fetcher;
use crate::util::rand_below;

/// Inter-retry delay: `base + attempt × step + jitter`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub step: Duration,
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            step: Duration::from_secs(5),
            jitter: Duration::from_secs(4),
        }
    }
}

impl BackoffConfig {
    /// Delay after the given zero-based failed attempt. Non-decreasing
    /// in `attempt` when jitter is zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand_below(jitter_ms))
        };
        self.base + self.step * attempt + jitter
    }
}

/// How a strategy reaches its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchVia {
    Direct,
    Rendered,
}

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Copy)]
struct Strategy {
    engine: SearchEngine,
    via: FetchVia,
}

impl Strategy {
    fn label(&self) -> String {
        let mode = match self.via {
            FetchVia::Direct => "direct",
            FetchVia::Rendered => "rendered",
        };
        format!("{}-{mode}", self.engine.name)
    }
}

/// Runs queries through the strategy ladder.
///
/// Generic over the direct and rendered fetchers via traits, enabling
/// dependency injection and testability without real HTTP or a browser.
pub struct SearchOrchestrator<F, R>
where
    F: Fetcher,
    R: Fetcher,
{
    direct: F,
    rendered: Option<R>,
    rotation: RotationManager,
    identities: IdentityPool,
    extractor: ResultExtractor,
    max_retries: u32,
    backoff: BackoffConfig,
}

impl<F, R> SearchOrchestrator<F, R>
where
    F: Fetcher,
    R: Fetcher,
{
    /// Create an orchestrator without a rendered-fetch fallback.
    pub fn new(direct: F, rotation: RotationManager, config: &EngineConfig) -> Self {
        Self {
            direct,
            rendered: None,
            rotation,
            identities: IdentityPool::new(),
            extractor: ResultExtractor::new(),
            max_retries: config.max_retries,
            backoff: config.backoff.clone(),
        }
    }

    /// Create an orchestrator with a rendered-fetch fallback rung.
    pub fn with_rendered(
        direct: F,
        rendered: R,
        rotation: RotationManager,
        config: &EngineConfig,
    ) -> Self {
        Self {
            rendered: Some(rendered),
            ..Self::new(direct, rotation, config)
        }
    }

    fn strategies(&self) -> Vec<Strategy> {
        let mut out = vec![
            Strategy {
                engine: SearchEngine::google(),
                via: FetchVia::Direct,
            },
            Strategy {
                engine: SearchEngine::duckduckgo(),
                via: FetchVia::Direct,
            },
            Strategy {
                engine: SearchEngine::bing(),
                via: FetchVia::Direct,
            },
        ];
        if self.rendered.is_some() {
            out.push(Strategy {
                engine: SearchEngine::google(),
                via: FetchVia::Rendered,
            });
        }
        out
    }

    /// Run one query, returning up to `want` ranked results.
    pub async fn search(&self, query: &str, want: usize) -> SerpResponse {
        for strategy in self.strategies() {
            let label = strategy.label();
            tracing::info!(%query, strategy = %label, "Trying strategy");

            if let Some(results) = self.try_strategy(&strategy, query, want).await {
                tracing::info!(
                    %query,
                    strategy = %label,
                    count = results.results.len(),
                    "Query satisfied"
                );
                return results;
            }
        }

        tracing::warn!(%query, "All strategies exhausted; returning empty response");
        SerpResponse::empty(query)
    }

    /// Run one strategy with retries. `None` means advance to the next
    /// rung.
    async fn try_strategy(
        &self,
        strategy: &Strategy,
        query: &str,
        want: usize,
    ) -> Option<SerpResponse> {
        for attempt in 0..self.max_retries {
            let egress = self.rotation.acquire(attempt > 0)?;
            let identity = self.identities.sample();
            let url = strategy.engine.search_url(query, want);

            let outcome = match strategy.via {
                FetchVia::Direct => self.direct.fetch(&url, &identity, &egress).await,
                FetchVia::Rendered => match &self.rendered {
                    Some(rendered) => rendered.fetch(&url, &identity, &egress).await,
                    None => return None,
                },
            };
            self.rotation.report(&egress.key, &outcome);

            match outcome {
                FetchOutcome::Success { html, status } => {
                    let results = self.extractor.extract(&strategy.engine, query, &html, want);
                    if results.is_empty() {
                        // A clean page with nothing extractable will not
                        // improve on retry; move on.
                        tracing::warn!(
                            %query,
                            strategy = %strategy.label(),
                            status,
                            "Fetched page yielded no results"
                        );
                        return None;
                    }
                    return Some(SerpResponse::new(query, results));
                }
                FetchOutcome::SoftBlock { reason } => {
                    tracing::warn!(
                        %query,
                        strategy = %strategy.label(),
                        attempt,
                        %reason,
                        "Soft block"
                    );
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(self.backoff.delay(attempt)).await;
                    }
                }
                FetchOutcome::HardFailure { error } => {
                    tracing::warn!(
                        %query,
                        strategy = %strategy.label(),
                        %error,
                        "Hard failure; advancing strategy"
                    );
                    return None;
                }
            }
        }
        None
    }
}
