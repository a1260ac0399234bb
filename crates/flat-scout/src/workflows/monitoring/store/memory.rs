use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::super::domain::{ListingKey, UserFilter, UserId};
use super::super::repository::{DeliveryTracker, FilterRepository, RepositoryError};

type FilterMap = BTreeMap<UserId, UserFilter>;
type SeenMap = HashMap<(ListingKey, UserId), DateTime<Utc>>;

/// Process-local store used when no database is configured and by tests.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    filters: Arc<Mutex<FilterMap>>,
    seen: Arc<Mutex<SeenMap>>,
}

impl InMemoryStore {
    pub fn with_filters(filters: impl IntoIterator<Item = UserFilter>) -> Self {
        let filters = filters
            .into_iter()
            .map(|filter| (filter.user_id, filter))
            .collect();
        Self {
            filters: Arc::new(Mutex::new(filters)),
            ..Self::default()
        }
    }

    /// Records a delivery with an explicit timestamp.
    pub fn mark_seen_at(
        &self,
        key: ListingKey,
        user_id: UserId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.seen()?.entry((key, user_id)).or_insert(sent_at);
        Ok(())
    }

    pub fn seen_count(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn filters(&self) -> Result<MutexGuard<'_, FilterMap>, RepositoryError> {
        self.filters
            .lock()
            .map_err(|_| RepositoryError::Unavailable("filter mutex poisoned".to_string()))
    }

    fn seen(&self) -> Result<MutexGuard<'_, SeenMap>, RepositoryError> {
        self.seen
            .lock()
            .map_err(|_| RepositoryError::Unavailable("seen mutex poisoned".to_string()))
    }
}

impl FilterRepository for InMemoryStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        let guard = self.filters()?;
        Ok(guard
            .values()
            .filter(|filter| filter.is_active)
            .cloned()
            .collect())
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        let guard = self.filters()?;
        Ok(guard.get(&user_id).cloned())
    }

    fn upsert(&self, mut filter: UserFilter) -> Result<(), RepositoryError> {
        let mut guard = self.filters()?;
        // The empty-notification stamp is owned by the tracker side.
        if let Some(existing) = guard.get(&filter.user_id) {
            filter.empty_notified_at = existing.empty_notified_at;
        }
        guard.insert(filter.user_id, filter);
        Ok(())
    }

    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError> {
        let mut guard = self.filters()?;
        match guard.get_mut(&user_id) {
            Some(filter) => {
                filter.is_active = active;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

impl DeliveryTracker for InMemoryStore {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError> {
        let guard = self.seen()?;
        Ok(guard.contains_key(&(key, user_id)))
    }

    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError> {
        self.mark_seen_at(key, user_id, Utc::now())
    }

    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut guard = self.filters()?;
        if let Some(filter) = guard.get_mut(&user_id) {
            filter.empty_notified_at = Some(Utc::now());
        }
        Ok(())
    }

    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut guard = self.filters()?;
        if let Some(filter) = guard.get_mut(&user_id) {
            filter.empty_notified_at = None;
        }
        Ok(())
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut guard = self.seen()?;
        let before = guard.len();
        guard.retain(|_, sent_at| *sent_at >= older_than);
        Ok(before - guard.len())
    }
}
