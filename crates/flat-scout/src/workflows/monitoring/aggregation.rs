use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::domain::{Listing, UserFilter};
use super::sources::ListingSource;

/// Queries every source concurrently and concatenates the results in source order.
///
/// A source that errors or exceeds `timeout` contributes nothing; malformed listings are
/// dropped one by one. Neither case affects the other sources.
pub async fn aggregate_listings(
    sources: &[Arc<dyn ListingSource>],
    filter: &UserFilter,
    pages: u32,
    timeout: Duration,
) -> Vec<Listing> {
    let searches = sources.iter().map(|source| async move {
        let outcome = tokio::time::timeout(timeout, source.search(filter, pages)).await;
        (source.source(), outcome)
    });

    let mut merged = Vec::new();
    for (source, outcome) in join_all(searches).await {
        let listings = match outcome {
            Ok(Ok(listings)) => listings,
            Ok(Err(err)) => {
                warn!(%source, user_id = %filter.user_id, error = %err, "source search failed");
                continue;
            }
            Err(_) => {
                warn!(
                    %source,
                    user_id = %filter.user_id,
                    timeout_secs = timeout.as_secs(),
                    "source search timed out"
                );
                continue;
            }
        };

        let fetched = listings.len();
        let before = merged.len();
        for listing in listings {
            match listing.validate() {
                Ok(()) => merged.push(listing),
                Err(err) => warn!(
                    %source,
                    listing_id = listing.listing_id,
                    error = %err,
                    "skipping malformed listing"
                ),
            }
        }
        debug!(%source, fetched, kept = merged.len() - before, "source search finished");
    }
    merged
}
