//! Page fetching: politeness limiting and rendered retrieval.

mod browserless;
mod page_fetcher;
mod rate_limit;

pub use browserless::BrowserlessBrowser;
pub use page_fetcher::PageFetcher;
pub use rate_limit::RateLimiter;
