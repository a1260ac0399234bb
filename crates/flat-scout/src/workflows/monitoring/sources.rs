use async_trait::async_trait;

use super::domain::{Listing, Source, UserFilter};

/// A marketplace search adapter. Implementations own paging, request headers and
/// response parsing; they hand back normalized listings only.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn source(&self) -> Source;

    /// Searches up to `pages` result pages for the filter. Returning fewer listings than
    /// the pages could hold is not an error.
    async fn search(&self, filter: &UserFilter, pages: u32) -> Result<Vec<Listing>, SourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("could not parse search results: {0}")]
    Parse(String),
    /// Captcha or anti-bot page served instead of results.
    #[error("request blocked by the marketplace")]
    Blocked,
    #[error("{0}")]
    Other(String),
}
