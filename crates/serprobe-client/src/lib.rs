#[cfg(feature = "browser")]
pub mod browser_fetcher;
pub mod fetcher;

#[cfg(feature = "browser")]
pub use browser_fetcher::BrowserFetcher;
pub use fetcher::HttpFetcher;
