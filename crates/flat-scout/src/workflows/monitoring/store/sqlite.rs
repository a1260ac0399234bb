//! SQLite-backed filter and delivery-state storage.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::super::domain::{ListingKey, UserFilter, UserId};
use super::super::repository::{DeliveryTracker, FilterRepository, RepositoryError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_filters (
    user_id                INTEGER PRIMARY KEY,
    cities                 TEXT    NOT NULL DEFAULT '[]',
    rooms                  TEXT    NOT NULL DEFAULT '[]',
    price_min              INTEGER NOT NULL DEFAULT 0,
    price_max              INTEGER NOT NULL DEFAULT 0,
    area_min               REAL    NOT NULL DEFAULT 0,
    kitchen_area_min       REAL    NOT NULL DEFAULT 0,
    renovation_types       TEXT    NOT NULL DEFAULT '[]',
    pets_allowed           INTEGER NOT NULL DEFAULT 1,
    commission_max_percent INTEGER NOT NULL DEFAULT 100,
    tolerance_percent      INTEGER NOT NULL DEFAULT 0,
    initial_listings_count INTEGER NOT NULL DEFAULT 0,
    is_active              INTEGER NOT NULL DEFAULT 0,
    empty_notified_at      INTEGER
);

CREATE TABLE IF NOT EXISTS seen_listings (
    source     TEXT    NOT NULL,
    listing_id INTEGER NOT NULL,
    user_id    INTEGER NOT NULL,
    sent_at    INTEGER NOT NULL,
    PRIMARY KEY (source, listing_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_seen_listings_sent_at
    ON seen_listings(sent_at);
"#;

const FILTER_COLUMNS: &str = "user_id, cities, rooms, price_min, price_max, area_min, \
     kitchen_area_min, renovation_types, pets_allowed, commission_max_percent, \
     tolerance_percent, initial_listings_count, is_active, empty_notified_at";

/// Durable store. One connection guarded by a mutex; every statement is a single-row
/// insert/update, so SQLite's own atomicity covers concurrent callers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(storage_error)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_error)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "delivery store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA).map_err(storage_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// Records a delivery with an explicit timestamp.
    pub fn mark_seen_at(
        &self,
        key: ListingKey,
        user_id: UserId,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO seen_listings (source, listing_id, user_id, sent_at)
             VALUES (?, ?, ?, ?)",
            params![
                key.source.as_str(),
                key.listing_id as i64,
                user_id.0,
                sent_at.timestamp_millis()
            ],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    fn read_filters(
        conn: &Connection,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<UserFilter>, RepositoryError> {
        let mut statement = conn.prepare(sql).map_err(storage_error)?;
        let rows = statement
            .query_map(args, FilterRow::from_row)
            .map_err(storage_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_error)?;
        rows.into_iter().map(FilterRow::into_filter).collect()
    }
}

impl FilterRepository for SqliteStore {
    fn active_filters(&self) -> Result<Vec<UserFilter>, RepositoryError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FILTER_COLUMNS} FROM user_filters WHERE is_active = 1 ORDER BY user_id"
        );
        Self::read_filters(&conn, &sql, params![])
    }

    fn fetch(&self, user_id: UserId) -> Result<Option<UserFilter>, RepositoryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {FILTER_COLUMNS} FROM user_filters WHERE user_id = ?");
        let row = conn
            .query_row(&sql, params![user_id.0], FilterRow::from_row)
            .optional()
            .map_err(storage_error)?;
        row.map(FilterRow::into_filter).transpose()
    }

    fn upsert(&self, filter: UserFilter) -> Result<(), RepositoryError> {
        let cities = encode_json(&filter.cities)?;
        let rooms = encode_json(&filter.rooms)?;
        let renovation_types = encode_json(&filter.renovation_types)?;

        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO user_filters
                (user_id, cities, rooms, price_min, price_max, area_min, kitchen_area_min,
                 renovation_types, pets_allowed, commission_max_percent, tolerance_percent,
                 initial_listings_count, is_active, empty_notified_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                cities = excluded.cities,
                rooms = excluded.rooms,
                price_min = excluded.price_min,
                price_max = excluded.price_max,
                area_min = excluded.area_min,
                kitchen_area_min = excluded.kitchen_area_min,
                renovation_types = excluded.renovation_types,
                pets_allowed = excluded.pets_allowed,
                commission_max_percent = excluded.commission_max_percent,
                tolerance_percent = excluded.tolerance_percent,
                initial_listings_count = excluded.initial_listings_count,
                is_active = excluded.is_active"#,
            params![
                filter.user_id.0,
                cities,
                rooms,
                filter.price_min as i64,
                filter.price_max as i64,
                filter.area_min,
                filter.kitchen_area_min,
                renovation_types,
                filter.pets_allowed,
                filter.commission_max_percent,
                filter.tolerance_percent,
                filter.initial_listings_count,
                filter.is_active,
                filter.empty_notified_at.map(|at| at.timestamp_millis()),
            ],
        )
        .map_err(storage_error)?;
        debug!(user_id = %filter.user_id, "filter stored");
        Ok(())
    }

    fn set_active(&self, user_id: UserId, active: bool) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE user_filters SET is_active = ? WHERE user_id = ?",
                params![active, user_id.0],
            )
            .map_err(storage_error)?;
        if updated == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl DeliveryTracker for SqliteStore {
    fn is_seen(&self, key: ListingKey, user_id: UserId) -> Result<bool, RepositoryError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM seen_listings WHERE source = ? AND listing_id = ? AND user_id = ?",
                params![key.source.as_str(), key.listing_id as i64, user_id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_error)?;
        Ok(found.is_some())
    }

    fn mark_seen(&self, key: ListingKey, user_id: UserId) -> Result<(), RepositoryError> {
        self.mark_seen_at(key, user_id, Utc::now())
    }

    fn mark_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE user_filters SET empty_notified_at = ? WHERE user_id = ?",
            params![Utc::now().timestamp_millis(), user_id.0],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    fn clear_empty_notified(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE user_filters SET empty_notified_at = NULL WHERE user_id = ?",
            params![user_id.0],
        )
        .map_err(storage_error)?;
        Ok(())
    }

    fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let conn = self.conn()?;
        let removed = conn
            .execute(
                "DELETE FROM seen_listings WHERE sent_at < ?",
                params![older_than.timestamp_millis()],
            )
            .map_err(storage_error)?;
        Ok(removed)
    }
}

/// Raw column values; JSON decoding happens outside the rusqlite row callback.
struct FilterRow {
    user_id: i64,
    cities: String,
    rooms: String,
    price_min: i64,
    price_max: i64,
    area_min: f64,
    kitchen_area_min: f64,
    renovation_types: String,
    pets_allowed: bool,
    commission_max_percent: u8,
    tolerance_percent: u8,
    initial_listings_count: u32,
    is_active: bool,
    empty_notified_at: Option<i64>,
}

impl FilterRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            cities: row.get(1)?,
            rooms: row.get(2)?,
            price_min: row.get(3)?,
            price_max: row.get(4)?,
            area_min: row.get(5)?,
            kitchen_area_min: row.get(6)?,
            renovation_types: row.get(7)?,
            pets_allowed: row.get(8)?,
            commission_max_percent: row.get(9)?,
            tolerance_percent: row.get(10)?,
            initial_listings_count: row.get(11)?,
            is_active: row.get(12)?,
            empty_notified_at: row.get(13)?,
        })
    }

    fn into_filter(self) -> Result<UserFilter, RepositoryError> {
        Ok(UserFilter {
            user_id: UserId(self.user_id),
            cities: decode_json(&self.cities)?,
            rooms: decode_json(&self.rooms)?,
            price_min: self.price_min.max(0) as u64,
            price_max: self.price_max.max(0) as u64,
            area_min: self.area_min,
            kitchen_area_min: self.kitchen_area_min,
            renovation_types: decode_json(&self.renovation_types)?,
            pets_allowed: self.pets_allowed,
            commission_max_percent: self.commission_max_percent,
            tolerance_percent: self.tolerance_percent,
            initial_listings_count: self.initial_listings_count,
            is_active: self.is_active,
            empty_notified_at: self
                .empty_notified_at
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|err| RepositoryError::Storage(err.to_string()))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|err| RepositoryError::Storage(err.to_string()))
}

fn storage_error(err: rusqlite::Error) -> RepositoryError {
    RepositoryError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::monitoring::domain::{RenovationType, Source};
    use chrono::Duration as ChronoDuration;

    fn key(source: Source, listing_id: u64) -> ListingKey {
        ListingKey { source, listing_id }
    }

    fn filter(user_id: i64) -> UserFilter {
        let mut filter = UserFilter::new(UserId(user_id), [1, 2]);
        filter.rooms = [1, 2].into_iter().collect();
        filter.renovation_types = [RenovationType::Euro].into_iter().collect();
        filter.price_max = 120_000;
        filter.area_min = 40.5;
        filter.tolerance_percent = 10;
        filter.is_active = true;
        filter
    }

    #[test]
    fn filters_round_trip_through_json_columns() {
        let store = SqliteStore::open_in_memory().expect("store opens");
        store.upsert(filter(7)).expect("upsert succeeds");

        let loaded = store
            .fetch(UserId(7))
            .expect("fetch succeeds")
            .expect("filter present");
        assert_eq!(loaded, filter(7));
        assert_eq!(store.active_filters().expect("query").len(), 1);
    }

    #[test]
    fn set_active_reports_missing_user() {
        let store = SqliteStore::open_in_memory().expect("store opens");
        match store.set_active(UserId(404), true) {
            Err(RepositoryError::NotFound) => {}
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn mark_seen_is_idempotent_and_source_scoped() {
        let store = SqliteStore::open_in_memory().expect("store opens");
        let user = UserId(1);

        store.mark_seen(key(Source::Cian, 100), user).expect("first mark");
        store.mark_seen(key(Source::Cian, 100), user).expect("second mark");

        assert!(store.is_seen(key(Source::Cian, 100), user).expect("lookup"));
        assert!(!store
            .is_seen(key(Source::YandexRealty, 100), user)
            .expect("lookup"));
        assert!(!store.is_seen(key(Source::Cian, 100), UserId(2)).expect("lookup"));
    }

    #[test]
    fn empty_notification_stamp_survives_filter_edits_until_cleared() {
        let store = SqliteStore::open_in_memory().expect("store opens");
        store.upsert(filter(3)).expect("upsert");
        store.mark_empty_notified(UserId(3)).expect("mark");

        let mut edited = filter(3);
        edited.price_max = 90_000;
        store.upsert(edited).expect("edit");
        let loaded = store.fetch(UserId(3)).expect("fetch").expect("present");
        assert!(loaded.empty_notified_at.is_some());

        store.clear_empty_notified(UserId(3)).expect("clear");
        let loaded = store.fetch(UserId(3)).expect("fetch").expect("present");
        assert!(loaded.empty_notified_at.is_none());
    }

    #[test]
    fn prune_removes_only_expired_rows() {
        let store = SqliteStore::open_in_memory().expect("store opens");
        let now = Utc::now();
        let user = UserId(9);
        store
            .mark_seen_at(key(Source::Avito, 1), user, now - ChronoDuration::days(45))
            .expect("old row");
        store
            .mark_seen_at(key(Source::Avito, 2), user, now - ChronoDuration::days(2))
            .expect("fresh row");

        let removed = store
            .prune(now - ChronoDuration::days(30))
            .expect("prune succeeds");

        assert_eq!(removed, 1);
        assert!(!store.is_seen(key(Source::Avito, 1), user).expect("lookup"));
        assert!(store.is_seen(key(Source::Avito, 2), user).expect("lookup"));
    }
}
