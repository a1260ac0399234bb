use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::workflows::monitoring::auth::InitDataVerifier;
use crate::workflows::monitoring::domain::{
    Listing, ListingKey, MetroTransport, Source, UserFilter, UserId,
};
use crate::workflows::monitoring::matching::Deviation;
use crate::workflows::monitoring::notifier::{DeliveryError, Notifier};
use crate::workflows::monitoring::repository::{
    DeliveryTracker, FilterRepository, RepositoryError,
};
use crate::workflows::monitoring::sources::{ListingSource, SourceError};
use crate::workflows::monitoring::store::InMemoryStore;
use crate::workflows::monitoring::{MonitorSettings, MonitoringService};

pub(super) const USER: UserId = UserId(42);

pub(super) const BOT_TOKEN: &str = "123456:TEST-TOKEN";

pub(super) fn verifier() -> InitDataVerifier {
    InitDataVerifier::new(BOT_TOKEN)
}

/// Fresh init data signed for `user`, as the Mini App would send it.
pub(super) fn init_data_for(user: UserId) -> String {
    let auth_date = Utc::now().timestamp().to_string();
    let profile = format!(r#"{{"id":{},"first_name":"Test"}}"#, user.0);
    verifier().sign(&[("auth_date", auth_date.as_str()), ("user", profile.as_str())])
}

/// Two-room euro flat that satisfies `filter()` exactly.
pub(super) fn listing(source: Source, listing_id: u64) -> Listing {
    Listing {
        source,
        listing_id,
        url: format!("https://{}.example/rent/{listing_id}", source.as_str()),
        title: "2-комн. квартира, 54 м²".to_string(),
        price: 95_000,
        address: "Москва, ул. Профсоюзная, 12".to_string(),
        metro_station: "Академическая".to_string(),
        metro_distance_min: 7,
        metro_transport: MetroTransport::Walk,
        total_area: 54.0,
        kitchen_area: 10.0,
        rooms: 2,
        floor: 4,
        total_floors: 12,
        renovation: Some(crate::workflows::monitoring::RenovationType::Euro),
        commission: "без комиссии".to_string(),
        description: "Светлая квартира рядом с парком.".to_string(),
        photos: vec![format!("https://img.example/{listing_id}/1.jpg")],
    }
}

pub(super) fn filter() -> UserFilter {
    let mut filter = UserFilter::new(USER, [1]);
    filter.rooms = [2].into_iter().collect();
    filter.price_max = 100_000;
    filter.area_min = 50.0;
    filter.is_active = true;
    filter.initial_listings_count = 5;
    filter
}

pub(super) fn settings() -> MonitorSettings {
    MonitorSettings {
        search_pages: 2,
        source_timeout: Duration::from_secs(5),
    }
}

/// Source returning a fixed batch, or failing every call.
pub(super) struct ScriptedSource {
    source: Source,
    listings: Vec<Listing>,
    fail: bool,
    pages_requested: Mutex<Vec<u32>>,
}

impl ScriptedSource {
    pub(super) fn new(source: Source, listings: Vec<Listing>) -> Self {
        Self {
            source,
            listings,
            fail: false,
            pages_requested: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn failing(source: Source) -> Self {
        Self {
            fail: true,
            ..Self::new(source, Vec::new())
        }
    }

    pub(super) fn pages_requested(&self) -> Vec<u32> {
        self.pages_requested.lock().expect("pages mutex").clone()
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(&self, _filter: &UserFilter, pages: u32) -> Result<Vec<Listing>, SourceError> {
        self.pages_requested.lock().expect("pages mutex").push(pages);
        if self.fail {
            return Err(SourceError::Http("connection reset".to_string()));
        }
        Ok(self.listings.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct Delivered {
    pub user_id: UserId,
    pub key: ListingKey,
    pub deviations: Option<Vec<Deviation>>,
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    delivered: Mutex<Vec<Delivered>>,
    empty: Mutex<Vec<UserId>>,
    failing_keys: Mutex<HashSet<ListingKey>>,
    latency: Option<Duration>,
}

impl RecordingNotifier {
    /// Every delivery takes `latency` before it is recorded, like a slow bot API.
    pub(super) fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub(super) fn fail_for(&self, key: ListingKey) {
        self.failing_keys.lock().expect("notifier mutex").insert(key);
    }

    pub(super) fn recover(&self) {
        self.failing_keys.lock().expect("notifier mutex").clear();
    }

    pub(super) fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().expect("notifier mutex").clone()
    }

    pub(super) fn delivered_keys(&self) -> Vec<ListingKey> {
        self.delivered().into_iter().map(|entry| entry.key).collect()
    }

    pub(super) fn empty_notifications(&self) -> Vec<UserId> {
        self.empty.lock().expect("notifier mutex").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(
        &self,
        user_id: UserId,
        listing: &Listing,
        deviations: Option<&[Deviation]>,
    ) -> Result<(), DeliveryError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self
            .failing_keys
            .lock()
            .expect("notifier mutex")
            .contains(&listing.key())
        {
            return Err(DeliveryError::Transport("bot api timeout".to_string()));
        }
        self.delivered.lock().expect("notifier mutex").push(Delivered {
            user_id,
            key: listing.key(),
            deviations: deviations.map(<[Deviation]>::to_vec),
        });
        Ok(())
    }

    async fn notify_empty(&self, user_id: UserId) -> Result<(), DeliveryError> {
        self.empty.lock().expect("notifier mutex").push(user_id);
        Ok(())
    }
}

/// In-memory store that counts calls the dispatch loop makes into the tracker.
#[derive(Default)]
pub(super) struct CountingStore {
    pub inner: InMemoryStore,
    empty_marks: AtomicUsize,
    seen_marks: AtomicUsize,
}

impl CountingStore {
    pub(super) fn with_filters(filters: impl IntoIterator<Item = UserFilter>) -> Self {
        Self {
            inner: InMemoryStore::with_filters(filters),
            ..Self::default()
        }
    }

    pub(super) fn empty_marks(&self) -> usize {
        self.empty_marks.load(Ordering::SeqCst)
    }

    pub(super) fn seen_marks(&self) -> usize {
        self.seen_marks.load(Ordering::SeqCst)
    }
}

impl FilterRepository for CountingStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        self.inner.active_filters()
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        self.inner.fetch(user_id)
    }

    fn upsert(&self, filter: UserFilter) -> Result<(), RepositoryError> {
        self.inner.upsert(filter)
    }

    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError> {
        self.inner.set_active(user_id, active)
    }
}

impl DeliveryTracker for CountingStore {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError> {
        self.inner.is_seen(key, user_id)
    }

    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError> {
        self.seen_marks.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_seen(key, user_id)
    }

    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.empty_marks.fetch_add(1, Ordering::SeqCst);
        self.inner.mark_empty_notified(user_id)
    }

    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner.clear_empty_notified(user_id)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.inner.prune(older_than)
    }
}

/// Store whose seen-state cannot be read for one user; everything else delegates.
pub(super) struct BrokenTrackerStore {
    pub inner: InMemoryStore,
    pub broken_user: UserId,
}

impl FilterRepository for BrokenTrackerStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        self.inner.active_filters()
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        self.inner.fetch(user_id)
    }

    fn upsert(&self, filter: UserFilter) -> Result<(), RepositoryError> {
        self.inner.upsert(filter)
    }

    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError> {
        self.inner.set_active(user_id, active)
    }
}

impl DeliveryTracker for BrokenTrackerStore {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError> {
        if user_id == self.broken_user {
            return Err(RepositoryError::Unavailable("database is locked".to_string()));
        }
        self.inner.is_seen(key, user_id)
    }

    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner.mark_seen(key, user_id)
    }

    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner.mark_empty_notified(user_id)
    }

    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        self.inner.clear_empty_notified(user_id)
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.inner.prune(older_than)
    }
}

/// Store that fails every call.
pub(super) struct UnavailableStore;

impl FilterRepository for UnavailableStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn fetch(&self, _user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn upsert(&self, _filter: UserFilter) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn set_active(&self, _user_id: UserId, _active: bool) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }
}

impl DeliveryTracker for UnavailableStore {
    fn is_seen(&self, _key: ListingKey, _user_id: UserId) -> Result<bool, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn mark_seen(&self, _key: ListingKey, _user_id: UserId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn mark_empty_notified(&self, _user_id: UserId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn clear_empty_notified(&self, _user_id: UserId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn prune(&self, _older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }
}

pub(super) fn sources(
    batches: Vec<(Source, Vec<Listing>)>,
) -> Vec<Arc<dyn ListingSource>> {
    batches
        .into_iter()
        .map(|(source, listings)| {
            Arc::new(ScriptedSource::new(source, listings)) as Arc<dyn ListingSource>
        })
        .collect()
}

pub(super) fn build_service<S>(
    store: Arc<S>,
    notifier: Arc<RecordingNotifier>,
    sources: Vec<Arc<dyn ListingSource>>,
) -> MonitoringService<S, RecordingNotifier>
where
    S: FilterRepository + DeliveryTracker + 'static,
{
    MonitoringService::new(store, notifier, sources, settings())
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
