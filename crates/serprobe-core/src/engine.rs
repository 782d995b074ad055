//! Search engine descriptions.
//!
//! Each supported engine is a data value: the query-URL builder plus the
//! selector sets the extraction chain needs. The orchestrator composes
//! these with a fetch mode instead of carrying one type per engine.

use url::Url;

use crate::util::rand_below;

/// Markup selectors for one engine's result page.
#[derive(Debug, Clone, Copy)]
pub struct SelectorSet {
    /// Result container candidates, tried in order until one matches.
    pub containers: &'static [&'static str],
    /// Title element within a container.
    pub title: &'static str,
    /// Anchor element carrying the result URL.
    pub link: &'static str,
    /// Description candidates within a container, tried in order.
    pub descriptions: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Google,
    Bing,
    DuckDuckGo,
}

/// A search engine the orchestrator can query.
#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    pub name: &'static str,
    kind: EngineKind,
    /// Hosts belonging to the engine itself; never returned as results.
    pub own_domains: &'static [&'static str],
    pub selectors: SelectorSet,
}

impl SearchEngine {
    pub fn google() -> Self {
        Self {
            name: "google",
            kind: EngineKind::Google,
            own_domains: &[
                "google.com",
                "gstatic.com",
                "googleusercontent.com",
                "googleadservices.com",
                "youtube.com",
            ],
            selectors: SelectorSet {
                // Google rotates its class names; newest first.
                containers: &[
                    "div.g",
                    "div.tF2Cxc",
                    "div.yuRUbf",
                    "div.rc",
                    "div[data-header-feature]",
                    "div.MjjYud",
                    "div.Gx5Zad",
                    "div.v7W49e",
                    "div.jtfYYd",
                    "div.Z26q7c",
                ],
                title: "h3",
                link: "a",
                descriptions: &[
                    "div.VwiC3b",
                    "span.st",
                    "div.s",
                    r#"div[data-content-feature="1"]"#,
                ],
            },
        }
    }

    pub fn bing() -> Self {
        Self {
            name: "bing",
            kind: EngineKind::Bing,
            own_domains: &["bing.com", "microsoft.com", "msn.com"],
            selectors: SelectorSet {
                containers: &[".b_algo"],
                title: "h2",
                link: "h2 a",
                descriptions: &[".b_caption p"],
            },
        }
    }

    pub fn duckduckgo() -> Self {
        Self {
            name: "duckduckgo",
            kind: EngineKind::DuckDuckGo,
            own_domains: &["duckduckgo.com"],
            selectors: SelectorSet {
                containers: &[".result"],
                title: ".result__title",
                link: ".result__title a",
                descriptions: &[".result__snippet"],
            },
        }
    }

    /// Build the query URL. Over-requests results so the extraction chain
    /// still fills the want count after own-domain filtering and dedup.
    pub fn search_url(&self, query: &str, want: usize) -> String {
        let padded = (want * 2).to_string();
        match self.kind {
            EngineKind::Google => {
                let mut url = Url::parse("https://www.google.com/search")
                    .expect("static base URL is valid");
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs
                        .append_pair("q", query)
                        .append_pair("num", &padded)
                        .append_pair("hl", "en")
                        .append_pair("gl", "us")
                        .append_pair("pws", "0");
                    // Occasional extra params so consecutive requests do
                    // not share a byte-identical shape.
                    if rand_below(2) == 0 {
                        pairs.append_pair("safe", "off");
                    }
                    if rand_below(10) < 7 {
                        pairs.append_pair("source", "hp");
                    }
                }
                url.to_string()
            }
            EngineKind::Bing => {
                let mut url =
                    Url::parse("https://www.bing.com/search").expect("static base URL is valid");
                url.query_pairs_mut()
                    .append_pair("q", query)
                    .append_pair("count", &padded)
                    .append_pair("setlang", "en-US");
                url.to_string()
            }
            EngineKind::DuckDuckGo => {
                let mut url = Url::parse("https://html.duckduckgo.com/html/")
                    .expect("static base URL is valid");
                url.query_pairs_mut()
                    .append_pair("q", query)
                    .append_pair("kl", "us-en")
                    .append_pair("kp", "-2")
                    .append_pair("kaf", "1");
                url.to_string()
            }
        }
    }

    /// True when the URL points back at the engine itself.
    pub fn is_own_url(&self, url: &str) -> bool {
        let host = match Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(h) => h.to_ascii_lowercase(),
                None => return false,
            },
            Err(_) => return false,
        };
        self.own_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}
