//! Randomized request identities.
//!
//! Each outbound request borrows a plausible browser identity — user agent,
//! Accept-Language, referrer — drawn from fixed pools, plus a header set
//! shaped to match the claimed browser family. There is no persistent
//! identity; ownership is per call.

use crate::util::rand_choice;

const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35",
    // Firefox on Windows and macOS
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/112.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/113.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/112.0",
    // Safari on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
];

const REFERRERS: &[&str] = &[
    "https://www.google.com/",
    "https://www.bing.com/",
    "https://duckduckgo.com/",
    "https://www.yahoo.com/",
    "https://www.reddit.com/",
    "https://www.facebook.com/",
    "https://twitter.com/",
    "https://www.linkedin.com/",
];

const LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-US,en;q=0.8",
    "en-GB,en;q=0.9,en-US;q=0.8",
    "en-CA,en;q=0.9,fr-CA;q=0.8",
];

/// One request identity. Immutable, drawn randomly per request.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_agent: &'static str,
    pub accept_language: &'static str,
    pub referrer: &'static str,
}

impl Identity {
    fn is_firefox(&self) -> bool {
        self.user_agent.contains("Firefox")
    }

    fn is_safari(&self) -> bool {
        self.user_agent.contains("Safari") && !self.user_agent.contains("Chrome")
    }

    /// Full ordered header set for this identity. Accept varies by the
    /// claimed browser family so the fingerprint stays coherent.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let accept = if self.is_firefox() {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
        } else if self.is_safari() {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
        } else {
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"
        };

        vec![
            ("User-Agent", self.user_agent.to_string()),
            ("Accept", accept.to_string()),
            ("Accept-Language", self.accept_language.to_string()),
            ("Referer", self.referrer.to_string()),
            ("DNT", "1".to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", "same-origin".to_string()),
            ("Cache-Control", "max-age=0".to_string()),
        ]
    }
}

/// Fixed pool of plausible identities.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPool;

impl IdentityPool {
    pub fn new() -> Self {
        Self
    }

    /// Draw a fresh random identity.
    pub fn sample(&self) -> Identity {
        Identity {
            user_agent: *rand_choice(USER_AGENTS),
            accept_language: *rand_choice(LANGUAGES),
            referrer: *rand_choice(REFERRERS),
        }
    }
}
