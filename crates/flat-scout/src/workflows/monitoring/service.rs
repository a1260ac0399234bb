use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::aggregation::aggregate_listings;
use super::domain::{Listing, UserFilter, UserId};
use super::matching::{Deviation, MatchOutcome, MatchingEngine};
use super::notifier::Notifier;
use super::repository::{DeliveryTracker, FilterRepository, RepositoryError};
use super::sources::ListingSource;

/// The initial batch only looks at the first result page.
const INITIAL_BATCH_PAGES: u32 = 1;

/// Knobs for one monitoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub search_pages: u32,
    pub source_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            search_pages: 2,
            source_timeout: Duration::from_secs(30),
        }
    }
}

/// Orchestrates fetch, match, dedup and dispatch for every active filter.
///
/// Work for one user is serialized: the scheduled cycle and an initial batch never
/// interleave their seen-check, delivery and marking for the same user.
pub struct MonitoringService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    sources: Vec<Arc<dyn ListingSource>>,
    engine: MatchingEngine,
    settings: MonitorSettings,
    user_locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl<S, N> MonitoringService<S, N>
where
    S: FilterRepository + DeliveryTracker + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        sources: Vec<Arc<dyn ListingSource>>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            sources,
            engine: MatchingEngine::default(),
            settings,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_engine(mut self, engine: MatchingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// One pass over all active filters. Per-user failures are logged and counted.
    pub async fn run_cycle(&self) -> Result<CycleReport, MonitorError> {
        let filters = self.store.active_filters()?;
        let mut report = CycleReport::default();

        if filters.is_empty() {
            debug!("no active filters, skipping cycle");
            return Ok(report);
        }
        info!(users = filters.len(), "monitoring cycle started");

        for filter in &filters {
            report.users += 1;
            match self.process_user(filter).await {
                Ok(user) => report.absorb(&user),
                Err(err) => {
                    report.failed_users += 1;
                    error!(user_id = %filter.user_id, error = %err, "user cycle aborted");
                }
            }
        }

        info!(
            users = report.users,
            delivered = report.delivered,
            approximate = report.approximate,
            failed_deliveries = report.failed_deliveries,
            failed_users = report.failed_users,
            "monitoring cycle finished"
        );
        Ok(report)
    }

    /// Steady-state processing of one user's filter.
    pub async fn process_user(&self, filter: &UserFilter) -> Result<UserCycleReport, MonitorError> {
        let _exclusive = self.lock_user(filter.user_id).await;
        let listings = aggregate_listings(
            &self.sources,
            filter,
            self.settings.search_pages,
            self.settings.source_timeout,
        )
        .await;

        let mut report = UserCycleReport {
            candidates: listings.len(),
            ..UserCycleReport::default()
        };

        for listing in &listings {
            let outcome = self.engine.evaluate(filter, listing);
            if !outcome.is_match() {
                continue;
            }
            report.matching += 1;

            if self.store.is_seen(listing.key(), filter.user_id)? {
                continue;
            }

            if self.dispatch(filter, listing, outcome.deviations()).await? {
                report.delivered += 1;
                if matches!(outcome, MatchOutcome::Approximate(_)) {
                    report.approximate += 1;
                }
            } else {
                report.failed += 1;
            }
        }

        if report.matching == 0 {
            report.empty_notified = self.notify_empty_once(filter).await?;
        }

        if report.delivered > 0 {
            info!(
                user_id = %filter.user_id,
                delivered = report.delivered,
                approximate = report.approximate,
                "new listings delivered"
            );
        }
        Ok(report)
    }

    /// Bounded first-run delivery of up to `initial_listings_count` listings, strict
    /// matches ahead of approximate ones. Returns how many were delivered.
    pub async fn send_initial_listings(&self, filter: &UserFilter) -> Result<usize, MonitorError> {
        let limit = filter.initial_listings_count as usize;
        if limit == 0 {
            return Ok(0);
        }

        let _exclusive = self.lock_user(filter.user_id).await;
        let listings = aggregate_listings(
            &self.sources,
            filter,
            INITIAL_BATCH_PAGES,
            self.settings.source_timeout,
        )
        .await;

        let mut strict = Vec::new();
        let mut approximate = Vec::new();
        let mut matched_but_seen = false;

        for listing in &listings {
            let outcome = self.engine.evaluate(filter, listing);
            if !outcome.is_match() {
                continue;
            }
            if self.store.is_seen(listing.key(), filter.user_id)? {
                matched_but_seen = true;
                continue;
            }
            match outcome {
                MatchOutcome::Strict => strict.push(listing),
                MatchOutcome::Approximate(deviations) => approximate.push((listing, deviations)),
                MatchOutcome::Rejected => {}
            }
        }

        let queue = strict
            .into_iter()
            .map(|listing| (listing, None))
            .chain(
                approximate
                    .into_iter()
                    .map(|(listing, deviations)| (listing, Some(deviations))),
            )
            .take(limit);

        let mut sent = 0;
        let mut attempted = false;
        for (listing, deviations) in queue {
            attempted = true;
            if self.dispatch(filter, listing, deviations.as_deref()).await? {
                sent += 1;
            }
        }

        if !attempted && !matched_but_seen {
            self.notify_empty_once(filter).await?;
        }

        info!(user_id = %filter.user_id, sent, limit, "initial listings sent");
        Ok(sent)
    }

    /// Drops delivery records older than `older_than`.
    pub fn prune_expired(&self, older_than: DateTime<Utc>) -> Result<usize, MonitorError> {
        let removed = self.store.prune(older_than)?;
        if removed > 0 {
            info!(removed, %older_than, "expired delivery records pruned");
        }
        Ok(removed)
    }

    async fn lock_user(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Delivers one listing and records it as seen. `Ok(false)` means the notifier
    /// failed and the listing stays eligible for the next cycle.
    async fn dispatch(
        &self,
        filter: &UserFilter,
        listing: &Listing,
        deviations: Option<&[Deviation]>,
    ) -> Result<bool, MonitorError> {
        match self
            .notifier
            .deliver(filter.user_id, listing, deviations)
            .await
        {
            Ok(()) => {
                self.store.mark_seen(listing.key(), filter.user_id)?;
                Ok(true)
            }
            Err(err) => {
                warn!(
                    user_id = %filter.user_id,
                    source = %listing.source,
                    listing_id = listing.listing_id,
                    error = %err,
                    "listing delivery failed"
                );
                Ok(false)
            }
        }
    }

    async fn notify_empty_once(&self, filter: &UserFilter) -> Result<bool, MonitorError> {
        if filter.empty_notified_at.is_some() {
            return Ok(false);
        }
        // The caller's copy may predate a notification sent by the other path.
        let stored = self.store.fetch(filter.user_id)?;
        if stored.is_some_and(|current| current.empty_notified_at.is_some()) {
            return Ok(false);
        }
        match self.notifier.notify_empty(filter.user_id).await {
            Ok(()) => {
                self.store.mark_empty_notified(filter.user_id)?;
                info!(user_id = %filter.user_id, "empty result notification sent");
                Ok(true)
            }
            Err(err) => {
                warn!(user_id = %filter.user_id, error = %err, "empty result notification failed");
                Ok(false)
            }
        }
    }
}

/// Per-user counters for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserCycleReport {
    pub candidates: usize,
    /// Strict or approximate matches, including ones delivered in earlier cycles.
    pub matching: usize,
    pub delivered: usize,
    pub approximate: usize,
    pub failed: usize,
    pub empty_notified: bool,
}

/// Totals across all users for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub users: usize,
    pub delivered: usize,
    pub approximate: usize,
    pub failed_deliveries: usize,
    pub failed_users: usize,
    pub empty_notifications: usize,
}

impl CycleReport {
    fn absorb(&mut self, user: &UserCycleReport) {
        self.delivered += user.delivered;
        self.approximate += user.approximate;
        self.failed_deliveries += user.failed;
        if user.empty_notified {
            self.empty_notifications += 1;
        }
    }
}

/// Error raised by the monitoring service.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
