//! Result extraction from fetched result pages.
//!
//! Three stages, tried in order, stopping at the first that yields
//! anything: the engine's structured containers, a heuristic harvest of
//! bare anchors, and finally a regex sweep over the raw markup for pages
//! scraper cannot make sense of. All stages share the same acceptance
//! rules: absolute http(s) URLs only, engine-own domains skipped, dedup
//! by first-seen URL, 1-based contiguous positions, capped at the
//! requested count.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::engine::SearchEngine;
use crate::models::SearchResult;

const MIN_DESCRIPTION_LEN: usize = 50;
const MAX_DESCRIPTION_LEN: usize = 500;

/// Extracts ranked results from one engine's result markup.
pub struct ResultExtractor {
    anchor_re: Regex,
    raw_desc_re: Regex,
}

impl Default for ResultExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultExtractor {
    pub fn new() -> Self {
        Self {
            anchor_re: Regex::new(r#"<a href="(https?://[^"]+)"[^>]*>([^<]+)</a>"#)
                .expect("anchor pattern is valid"),
            raw_desc_re: Regex::new(r"<div[^>]*>([^<]{50,500})</div>")
                .expect("description pattern is valid"),
        }
    }

    /// Run the stage chain for one page.
    pub fn extract(
        &self,
        engine: &SearchEngine,
        query: &str,
        html: &str,
        want: usize,
    ) -> Vec<SearchResult> {
        if want == 0 {
            return Vec::new();
        }

        let document = Html::parse_document(html);

        let results = self.from_containers(engine, query, &document, want);
        if !results.is_empty() {
            tracing::debug!(
                engine = engine.name,
                count = results.len(),
                "Extracted via structured containers"
            );
            return results;
        }

        let results = self.from_link_harvest(engine, query, &document, want);
        if !results.is_empty() {
            tracing::debug!(
                engine = engine.name,
                count = results.len(),
                "Extracted via link harvest"
            );
            return results;
        }

        let results = self.from_raw_markup(engine, query, html, want);
        if !results.is_empty() {
            tracing::debug!(
                engine = engine.name,
                count = results.len(),
                "Extracted via raw markup sweep"
            );
        }
        results
    }

    /// Stage 1: the engine's known result containers. Container selector
    /// candidates are tried in order and the first that matches anything
    /// wins outright.
    fn from_containers(
        &self,
        engine: &SearchEngine,
        query: &str,
        document: &Html,
        want: usize,
    ) -> Vec<SearchResult> {
        let sel = engine.selectors;
        let title_sel = match Selector::parse(sel.title) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };
        let link_sel = match Selector::parse(sel.link) {
            Ok(s) => s,
            Err(_) => return Vec::new(),
        };

        for container in sel.containers {
            let Ok(container_sel) = Selector::parse(container) else {
                continue;
            };

            let mut collector = Collector::new(engine, query, want);
            for element in document.select(&container_sel) {
                let Some(title_el) = element.select(&title_sel).next() else {
                    continue;
                };
                let title = text_of(title_el);
                if title.is_empty() {
                    continue;
                }

                let href = element
                    .select(&link_sel)
                    .find_map(|a| a.value().attr("href"));
                let Some(href) = href else { continue };

                let description = sel
                    .descriptions
                    .iter()
                    .filter_map(|d| Selector::parse(d).ok())
                    .find_map(|d| element.select(&d).next())
                    .map(text_of)
                    .unwrap_or_default();

                collector.push(href, title, description);
                if collector.is_full() {
                    break;
                }
            }

            let results = collector.finish();
            if !results.is_empty() {
                return results;
            }
        }
        Vec::new()
    }

    /// Stage 2: harvest every anchor on the page. Title comes from the
    /// anchor text or an `h3` within three ancestor levels; description
    /// from the first nearby block of real prose that is not the title.
    fn from_link_harvest(
        &self,
        engine: &SearchEngine,
        query: &str,
        document: &Html,
        want: usize,
    ) -> Vec<SearchResult> {
        let Ok(anchor_sel) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        let Ok(h3_sel) = Selector::parse("h3") else {
            return Vec::new();
        };
        let Ok(block_sel) = Selector::parse("div, span, p") else {
            return Vec::new();
        };

        let mut collector = Collector::new(engine, query, want);
        for anchor in document.select(&anchor_sel) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };

            let mut title = text_of(anchor);
            if title.is_empty() {
                title = nearby_ancestors(anchor)
                    .into_iter()
                    .find_map(|a| a.select(&h3_sel).next())
                    .map(text_of)
                    .unwrap_or_default();
            }
            if title.is_empty() {
                continue;
            }

            let description = nearby_ancestors(anchor)
                .into_iter()
                .flat_map(|a| a.select(&block_sel))
                .map(text_of)
                .find(|t| t.len() > MIN_DESCRIPTION_LEN && *t != title)
                .unwrap_or_default();

            collector.push(href, title, description);
            if collector.is_full() {
                break;
            }
        }
        collector.finish()
    }

    /// Stage 3: regex over the raw markup, for pages too mangled to
    /// parse. Descriptions are a best-effort grab of the first prose-
    /// sized `div` following the anchor.
    fn from_raw_markup(
        &self,
        engine: &SearchEngine,
        query: &str,
        html: &str,
        want: usize,
    ) -> Vec<SearchResult> {
        let mut collector = Collector::new(engine, query, want);
        for caps in self.anchor_re.captures_iter(html) {
            let (Some(href), Some(title)) = (caps.get(1), caps.get(2)) else {
                continue;
            };

            let tail_start = title.end().min(html.len());
            let mut tail_end = html.len().min(tail_start + 4096);
            while !html.is_char_boundary(tail_end) {
                tail_end -= 1;
            }
            let tail = &html[tail_start..tail_end];
            let description = self
                .raw_desc_re
                .captures(tail)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();

            collector.push(href.as_str(), title.as_str().trim().to_string(), description);
            if collector.is_full() {
                break;
            }
        }
        collector.finish()
    }
}

/// Anchor plus up to three ancestor elements, nearest first.
fn nearby_ancestors(anchor: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut out = vec![anchor];
    out.extend(anchor.ancestors().filter_map(ElementRef::wrap).take(3));
    out
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Shared acceptance rules across stages.
struct Collector<'a> {
    engine: &'a SearchEngine,
    query: &'a str,
    want: usize,
    seen: Vec<String>,
    results: Vec<SearchResult>,
}

impl<'a> Collector<'a> {
    fn new(engine: &'a SearchEngine, query: &'a str, want: usize) -> Self {
        Self {
            engine,
            query,
            want,
            seen: Vec::new(),
            results: Vec::new(),
        }
    }

    fn push(&mut self, href: &str, title: String, description: String) {
        if self.is_full() {
            return;
        }

        let Some(url) = normalize_result_url(href) else {
            return;
        };
        if self.engine.is_own_url(&url) || self.seen.contains(&url) {
            return;
        }

        let mut description = description;
        if let Some((idx, _)) = description.char_indices().nth(MAX_DESCRIPTION_LEN) {
            description.truncate(idx);
        }

        self.seen.push(url.clone());
        self.results.push(SearchResult {
            position: self.results.len() as u32 + 1,
            title,
            url,
            description,
            query: self.query.to_string(),
        });
    }

    fn is_full(&self) -> bool {
        self.results.len() >= self.want
    }

    fn finish(self) -> Vec<SearchResult> {
        self.results
    }
}

/// Accept only absolute http(s) URLs, unwrapping DuckDuckGo's redirect
/// links (`//duckduckgo.com/l/?uddg=<target>`).
fn normalize_result_url(href: &str) -> Option<String> {
    let href = href.trim();

    if let Some(unwrapped) = unwrap_ddg_redirect(href) {
        return normalize_result_url(&unwrapped);
    }

    let parsed = Url::parse(href).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed.to_string()),
        _ => None,
    }
}

fn unwrap_ddg_redirect(href: &str) -> Option<String> {
    if !href.contains("duckduckgo.com/l/") {
        return None;
    }
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
}
