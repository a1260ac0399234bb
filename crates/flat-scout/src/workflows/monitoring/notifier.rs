use async_trait::async_trait;

use super::domain::{Listing, UserId};
use super::matching::Deviation;

/// Outbound channel to the user. Formatting, photo batching and chat routing live
/// behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one listing. `deviations` is set for approximate matches only.
    async fn deliver(
        &self,
        user_id: UserId,
        listing: &Listing,
        deviations: Option<&[Deviation]>,
    ) -> Result<(), DeliveryError>;

    /// Tells the user that nothing currently matches their filter.
    async fn notify_empty(&self, user_id: UserId) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery transport unavailable: {0}")]
    Transport(String),
    #[error("recipient {0} rejected the message")]
    Rejected(UserId),
}
