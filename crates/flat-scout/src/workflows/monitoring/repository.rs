use chrono::{DateTime, Utc};

use super::domain::{ListingKey, UserFilter, UserId};

/// Storage abstraction for saved searches, written by the configuration flow and read
/// once per monitoring cycle.
pub trait FilterRepository: Send + Sync {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError>;
    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError>;
    fn upsert(&self, filter: UserFilter) -> Result<(), RepositoryError>;
    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError>;
}

/// Durable record of what has been delivered to whom.
///
/// The `(source, listing_id, user_id)` triple is the only deduplication key. A source
/// that later reuses an id for a different ad will be treated as already delivered.
pub trait DeliveryTracker: Send + Sync {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError>;
    /// Idempotent: marking an already seen triple is a no-op.
    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError>;
    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError>;
    /// Re-arms the "nothing matches" notification after the user edits their filter.
    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError>;
    /// Drops delivery records delivered before `older_than`, returning how many were removed.
    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("storage failure: {0}")]
    Storage(String),
}
