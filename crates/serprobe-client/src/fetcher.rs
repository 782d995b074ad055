use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serprobe_core::blocklist::BlockDetector;
use serprobe_core::error::AppError;
use serprobe_core::identity::Identity;
use serprobe_core::limiter::RateLimiter;
use serprobe_core::models::FetchOutcome;
use serprobe_core::rotation::Egress;
use serprobe_core::traits::Fetcher;

/// HTTP fetcher using reqwest.
///
/// Each egress key gets its own lazily built client so the proxy can
/// differ per key; the rate limiter is awaited before every request and
/// the response is classified through the block detector. Clones share
/// the client cache and limiter state.
#[derive(Clone)]
pub struct HttpFetcher {
    clients: Arc<Mutex<HashMap<String, Client>>>,
    limiter: RateLimiter,
    detector: Arc<BlockDetector>,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(limiter: RateLimiter) -> Self {
        Self::with_timeout(limiter, Duration::from_secs(15))
    }

    pub fn with_timeout(limiter: RateLimiter, timeout: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            limiter,
            detector: Arc::new(BlockDetector::default()),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Replace the default block classification lists.
    pub fn with_detector(mut self, detector: BlockDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    fn client_for(&self, egress: &Egress) -> Result<Client, AppError> {
        let mut clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(client) = clients.get(&egress.key) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5));
        if let Some(proxy) = &egress.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy)
                    .map_err(|e| AppError::ConfigError(format!("invalid proxy URL: {e}")))?,
            );
        }
        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        clients.insert(egress.key.clone(), client.clone());
        tracing::debug!(egress = %egress.key, "Built HTTP client");
        Ok(client)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, identity: &Identity, egress: &Egress) -> FetchOutcome {
        self.limiter.wait().await;

        let client = match self.client_for(egress) {
            Ok(client) => client,
            Err(error) => return FetchOutcome::HardFailure { error },
        };

        let mut request = client.get(url);
        for (name, value) in identity.headers() {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let error = if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                };
                return FetchOutcome::HardFailure { error };
            }
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::HardFailure {
                error: AppError::HttpError(format!("HTTP {} for {}", status.as_u16(), url)),
            };
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                return FetchOutcome::HardFailure {
                    error: AppError::HttpError(format!("Failed to read response body: {e}")),
                };
            }
        };

        if let Some(reason) = self.detector.classify(&html) {
            tracing::warn!(%url, egress = %egress.key, %reason, "Response classified as block");
            return FetchOutcome::SoftBlock { reason };
        }

        FetchOutcome::Success {
            html,
            status: status.as_u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serprobe_core::limiter::LimiterConfig;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(RateLimiter::new(LimiterConfig::new(Duration::ZERO)))
    }

    fn egress(key: &str, proxy: Option<&str>) -> Egress {
        Egress {
            key: key.to_string(),
            proxy: proxy.map(String::from),
        }
    }

    #[test]
    fn clients_are_cached_per_egress_key() {
        let fetcher = fetcher();
        fetcher.client_for(&egress("us_ohio", None)).unwrap();
        fetcher.client_for(&egress("us_ohio", None)).unwrap();
        fetcher.client_for(&egress("us_texas", None)).unwrap();

        assert_eq!(fetcher.clients.lock().unwrap().len(), 2);
    }

    #[test]
    fn invalid_proxy_url_is_a_config_error() {
        let fetcher = fetcher();
        let err = fetcher
            .client_for(&egress("us_ohio", Some("not a proxy url")))
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_hard_failure() {
        let fetcher = fetcher();
        let identity = serprobe_core::identity::IdentityPool::new().sample();

        let outcome = fetcher
            .fetch("http://127.0.0.1:1/", &identity, &egress("us_ohio", None))
            .await;

        assert!(matches!(outcome, FetchOutcome::HardFailure { .. }));
    }
}
