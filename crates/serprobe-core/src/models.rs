use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Outcome of a single fetch attempt against a search engine.
///
/// `SoftBlock` means the HTTP layer succeeded but the body carries
/// anti-automation content (CAPTCHA wall, "unusual traffic" notice).
#[derive(Debug)]
pub enum FetchOutcome {
    Success { html: String, status: u16 },
    SoftBlock { reason: String },
    HardFailure { error: AppError },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// One ranked listing extracted from a results page.
///
/// Within one query's result set, `url` is unique and `position` runs
/// contiguously from 1 in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub position: u32,
    pub title: String,
    pub url: String,
    pub description: String,
    pub query: String,
}

/// A completed results page for one query. Immutable once returned;
/// an empty `results` vector is a valid terminal value, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpResponse {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<SearchResult>,
}

impl SerpResponse {
    pub fn new(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            query: query.into(),
            timestamp: Utc::now(),
            results,
        }
    }

    pub fn empty(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Per-item entry in a bulk run. Failures are captured inline so one
/// bad item never aborts its siblings.
#[derive(Debug, Clone, Serialize)]
pub struct BulkEntry<T> {
    pub item: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> BulkEntry<T> {
    pub fn ok(item: impl Into<String>, outcome: T) -> Self {
        Self {
            item: item.into(),
            timestamp: Utc::now(),
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failed(item: impl Into<String>, error: impl ToString) -> Self {
        Self {
            item: item.into(),
            timestamp: Utc::now(),
            outcome: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Heading texts collected from a page, by level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageHeadings {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
}

/// Link counts split by whether the target stays on the page's host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLinks {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
}

/// Image counts with alt-text coverage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageImages {
    pub total: usize,
    pub with_alt: usize,
    pub without_alt: usize,
}

/// Structured metrics for one fetched page, consumed by downstream
/// reporting and the text-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAudit {
    pub url: String,
    pub status: u16,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub headings: PageHeadings,
    pub links: PageLinks,
    pub images: PageImages,
    pub word_count: usize,
    pub content_sample: String,
    pub page_size_kb: f64,
}
