//! Listing monitoring: matching saved filters against scraped listings, tracking what each
//! user has already received, and dispatching new matches.

pub mod aggregation;
pub mod auth;
pub mod domain;
pub mod matching;
pub mod notifier;
pub mod repository;
pub mod router;
pub mod service;
pub mod sources;
pub mod store;
mod summary;

#[cfg(test)]
mod tests;

pub use aggregation::aggregate_listings;
pub use auth::{
    AuthError, InitDataVerifier, SignedUser, WebAppUser, DEFAULT_INIT_DATA_MAX_AGE,
    INIT_DATA_HEADER,
};
pub use domain::{
    FilterValidationError, Listing, ListingKey, MalformedListing, MetroTransport,
    RenovationType, Source, UserFilter, UserId, COMMISSION_UNCONSTRAINED, MAX_INITIAL_LISTINGS,
    MAX_TOLERANCE_PERCENT,
};
pub use matching::{
    describe, matches, matches_approx, parse_commission, Deviation, DeviationDirection,
    MatchOutcome, MatchingEngine, NumericCriterion, PhraseBook,
};
pub use notifier::{DeliveryError, Notifier};
pub use repository::{DeliveryTracker, FilterRepository, RepositoryError};
pub use router::{filter_router, FilterApi};
pub use service::{CycleReport, MonitorError, MonitorSettings, MonitoringService, UserCycleReport};
pub use sources::{ListingSource, SourceError};
pub use store::{InMemoryStore, SqliteStore};
