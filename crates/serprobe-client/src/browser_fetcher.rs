use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serprobe_core::blocklist::BlockDetector;
use serprobe_core::error::AppError;
use serprobe_core::identity::Identity;
use serprobe_core::limiter::RateLimiter;
use serprobe_core::models::FetchOutcome;
use serprobe_core::rotation::Egress;
use serprobe_core::traits::Fetcher;

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Unlike [`super::HttpFetcher`], this renders JavaScript before
/// classifying the page, which gets past result pages that arrive as an
/// empty shell over plain HTTP.
///
/// A single Chromium process is shared across all clones of this struct;
/// each [`Fetcher::fetch`] call opens a new tab, applies the identity's
/// user agent, grabs the rendered HTML, and closes the tab. The shared
/// process means the egress proxy cannot vary per call; rotation still
/// varies the request identity.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    limiter: RateLimiter,
    detector: Arc<BlockDetector>,
    timeout: Duration,
}

impl BrowserFetcher {
    /// Launches a headless Chromium browser with a **45 s** navigation timeout.
    ///
    /// Requires a Chromium / Chrome binary reachable via `$PATH` (or the
    /// default locations checked by `chromiumoxide`). The limiter is shared
    /// with the direct fetcher so rendered and plain requests pace together.
    pub async fn new(limiter: RateLimiter) -> Result<Self, AppError> {
        Self::with_timeout(limiter, Duration::from_secs(45)).await
    }

    /// Launches a headless Chromium browser with a custom navigation timeout.
    pub async fn with_timeout(limiter: RateLimiter, timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags (--headless, --disable-gpu, …).  We try to
        // locate the *real* binary buried inside the snap, falling back
        // to any other Chrome/Chromium the user may have installed.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            limiter,
            detector: Arc::new(BlockDetector::default()),
            timeout,
        })
    }

    /// Replace the default block classification lists.
    pub fn with_detector(mut self, detector: BlockDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// On systems where Chromium is installed via **snap**, the wrapper at
    /// `/snap/bin/chromium` strips unknown CLI flags, breaking headless mode.
    /// We look for the real binary inside the snap first, then fall back to
    /// well-known system paths.  If nothing is found we return `None` and let
    /// `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            // Snap (Ubuntu default)
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            // Flatpak
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            // Common apt / manual installs
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        // Also honour an explicit override via env var.
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    async fn render(&self, url: &str, identity: &Identity) -> Result<String, AppError> {
        // Open a blank tab first; the user agent must be in place before
        // the real navigation goes out.
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open page: {e}")))?;

        page.set_user_agent(identity.user_agent)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to set user agent: {e}")))?;

        page.goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;

        // Wait until <body> is present — a minimal signal that the page
        // has rendered its main content.
        page.find_element("body")
            .await
            .map_err(|e| AppError::BrowserError(format!("Page did not render body: {e}")))?;

        // Grab the fully-rendered DOM.
        let html = page
            .content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))?;

        // Close the tab to free browser resources.
        let _ = page.close().await;

        Ok(html)
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, identity: &Identity, egress: &Egress) -> FetchOutcome {
        self.limiter.wait().await;

        if egress.proxy.is_some() {
            tracing::debug!(
                egress = %egress.key,
                "Shared browser process ignores per-key proxy"
            );
        }

        let rendered = tokio::time::timeout(self.timeout, self.render(url, identity)).await;
        let html = match rendered {
            Ok(Ok(html)) => html,
            Ok(Err(error)) => return FetchOutcome::HardFailure { error },
            Err(_) => {
                return FetchOutcome::HardFailure {
                    error: AppError::Timeout(self.timeout.as_secs()),
                };
            }
        };

        if let Some(reason) = self.detector.classify(&html) {
            tracing::warn!(%url, %reason, "Rendered page classified as block");
            return FetchOutcome::SoftBlock { reason };
        }

        FetchOutcome::Success { html, status: 200 }
    }
}
