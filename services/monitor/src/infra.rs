use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flat_scout::workflows::monitoring::{
    describe, DeliveryError, DeliveryTracker, Deviation, FilterRepository, InMemoryStore, Listing,
    ListingKey, ListingSource, Notifier, RepositoryError, Source, SourceError, SqliteStore,
    UserFilter, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

/// Listings a fixture source hands out per requested page.
const FIXTURE_PAGE_SIZE: usize = 28;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Storage backend picked at startup from `MONITOR_DB_PATH`.
pub(crate) enum MonitorStore {
    Memory(InMemoryStore),
    Sqlite(SqliteStore),
}

impl MonitorStore {
    pub(crate) fn open(path: Option<&Path>) -> Result<Self, RepositoryError> {
        match path {
            Some(path) => SqliteStore::open(path).map(Self::Sqlite),
            None => {
                warn!("MONITOR_DB_PATH not set, delivery state will not survive restarts");
                Ok(Self::Memory(InMemoryStore::default()))
            }
        }
    }

    fn filters(&self) -> &dyn FilterRepository {
        match self {
            Self::Memory(store) => store,
            Self::Sqlite(store) => store,
        }
    }

    fn tracker(&self) -> &dyn DeliveryTracker {
        match self {
            Self::Memory(store) => store,
            Self::Sqlite(store) => store,
        }
    }
}

impl FilterRepository for MonitorStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        self.filters().active_filters()
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        self.filters().fetch(user_id)
    }

    fn upsert(&self, filter: UserFilter) -> Result<(), RepositoryError> {
        self.filters().upsert(filter)
    }

    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError> {
        self.filters().set_active(user_id, active)
    }
}

impl DeliveryTracker for MonitorStore {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError> {
        self.tracker().is_seen(key, user_id)
    }

    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError> {
        self.tracker().mark_seen(key, user_id)
    }

    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.tracker().mark_empty_notified(user_id)
    }

    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.tracker().clear_empty_notified(user_id)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.tracker().prune(older_than)
    }
}

/// Serves one marketplace's share of a JSON file of already-normalized listings.
///
/// Stands in for the portal scrapers; the file is re-read on every search so it can be
/// replaced while the service runs.
pub(crate) struct FixtureSource {
    source: Source,
    path: PathBuf,
}

impl FixtureSource {
    pub(crate) fn new(source: Source, path: PathBuf) -> Self {
        Self { source, path }
    }

    pub(crate) fn for_all_sources(path: Option<&Path>) -> Vec<Arc<dyn ListingSource>> {
        let Some(path) = path else {
            warn!("no listings file configured, monitoring cycles will see no candidates");
            return Vec::new();
        };
        Source::ordered()
            .into_iter()
            .map(|source| {
                Arc::new(FixtureSource::new(source, path.to_path_buf())) as Arc<dyn ListingSource>
            })
            .collect()
    }
}

#[async_trait]
impl ListingSource for FixtureSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(&self, _filter: &UserFilter, pages: u32) -> Result<Vec<Listing>, SourceError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|err| SourceError::Other(format!("{}: {err}", self.path.display())))?;
        let listings: Vec<Listing> =
            serde_json::from_slice(&raw).map_err(|err| SourceError::Parse(err.to_string()))?;

        let limit = FIXTURE_PAGE_SIZE.saturating_mul(pages as usize);
        Ok(listings
            .into_iter()
            .filter(|listing| listing.source == self.source)
            .take(limit)
            .collect())
    }
}

/// Writes deliveries to the log instead of a chat.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn deliver(
        &self,
        user_id: UserId,
        listing: &Listing,
        deviations: Option<&[Deviation]>,
    ) -> Result<(), DeliveryError> {
        let note = deviations
            .map(|deviations| describe(deviations).join("; "))
            .unwrap_or_default();
        info!(
            %user_id,
            source = %listing.source,
            listing_id = listing.listing_id,
            price = listing.price,
            url = %listing.url,
            approximate = deviations.is_some(),
            note = %note,
            "listing delivered"
        );
        Ok(())
    }

    async fn notify_empty(&self, user_id: UserId) -> Result<(), DeliveryError> {
        info!(%user_id, "no listings match the current filter");
        Ok(())
    }
}
