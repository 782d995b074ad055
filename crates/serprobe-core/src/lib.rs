pub mod blocklist;
pub mod bulk;
pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod identity;
pub mod limiter;
pub mod models;
pub mod orchestrator;
pub mod page;
pub mod rotation;
#[cfg(test)]
pub mod testutil;
pub mod traits;
mod util;

pub use error::AppError;
pub use models::{FetchOutcome, SearchResult, SerpResponse};
pub use traits::{Fetcher, ResultStore, TextGenerator};
