use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace a listing was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cian,
    YandexRealty,
    Avito,
}

impl Source {
    pub const fn ordered() -> [Self; 3] {
        [Self::Cian, Self::YandexRealty, Self::Avito]
    }

    /// Stable discriminator used as part of the delivery key in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cian => "cian",
            Self::YandexRealty => "yandex_realty",
            Self::Avito => "avito",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cian => "CIAN",
            Self::YandexRealty => "Yandex Realty",
            Self::Avito => "Avito",
        }
    }

    pub fn from_key(value: &str) -> Option<Self> {
        Self::ordered()
            .into_iter()
            .find(|source| source.as_str() == value)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized renovation tag shared by every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenovationType {
    Cosmetic,
    Euro,
    Designer,
    NoRenovation,
}

impl RenovationType {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Cosmetic,
            Self::Euro,
            Self::Designer,
            Self::NoRenovation,
        ]
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Self::Cosmetic => "cosmetic",
            Self::Euro => "euro",
            Self::Designer => "designer",
            Self::NoRenovation => "no_renovation",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cosmetic => "Cosmetic",
            Self::Euro => "Euro",
            Self::Designer => "Designer",
            Self::NoRenovation => "No renovation",
        }
    }

    /// Parses a normalized tag. Empty or unknown tags map to `None`.
    pub fn from_tag(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ordered()
            .into_iter()
            .find(|kind| kind.tag().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetroTransport {
    #[default]
    Walk,
    Transport,
}

impl MetroTransport {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Walk => "on foot",
            Self::Transport => "by transport",
        }
    }
}

/// Owner of a filter and recipient of deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a listing. Ids are only unique within their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingKey {
    pub source: Source,
    pub listing_id: u64,
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.listing_id)
    }
}

/// One scraped rental offer, normalized across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub source: Source,
    pub listing_id: u64,
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Monthly rent in rubles.
    pub price: u64,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub metro_station: String,
    #[serde(default)]
    pub metro_distance_min: u32,
    #[serde(default)]
    pub metro_transport: MetroTransport,
    /// Square meters, `0.0` when the source does not report it.
    #[serde(default)]
    pub total_area: f64,
    #[serde(default)]
    pub kitchen_area: f64,
    /// `0` is a studio.
    #[serde(default)]
    pub rooms: u8,
    #[serde(default)]
    pub floor: u32,
    #[serde(default)]
    pub total_floors: u32,
    #[serde(default)]
    pub renovation: Option<RenovationType>,
    /// Agent fee exactly as the source printed it.
    #[serde(default)]
    pub commission: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photos: Vec<String>,
}

impl Listing {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            source: self.source,
            listing_id: self.listing_id,
        }
    }

    /// Title and description joined, the text scanned by the phrase heuristics.
    pub fn ad_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    pub fn validate(&self) -> Result<(), MalformedListing> {
        if self.listing_id == 0 {
            return Err(MalformedListing::MissingId);
        }
        if self.url.trim().is_empty() {
            return Err(MalformedListing::MissingUrl);
        }
        for (field, value) in [
            ("total_area", self.total_area),
            ("kitchen_area", self.kitchen_area),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MalformedListing::InvalidArea { field, value });
            }
        }
        Ok(())
    }
}

/// Reasons a scraped record cannot enter matching.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedListing {
    #[error("listing id is missing")]
    MissingId,
    #[error("listing url is missing")]
    MissingUrl,
    #[error("{field} has invalid value {value}")]
    InvalidArea { field: &'static str, value: f64 },
}

/// A user's saved search. Zero numeric bounds and empty sets mean "no constraint".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFilter {
    pub user_id: UserId,
    pub cities: BTreeSet<u32>,
    #[serde(default)]
    pub rooms: BTreeSet<u8>,
    #[serde(default)]
    pub price_min: u64,
    #[serde(default)]
    pub price_max: u64,
    #[serde(default)]
    pub area_min: f64,
    #[serde(default)]
    pub kitchen_area_min: f64,
    #[serde(default)]
    pub renovation_types: BTreeSet<RenovationType>,
    /// When set, listings whose text forbids animals are rejected.
    #[serde(default = "default_pets_allowed")]
    pub pets_allowed: bool,
    /// `0` accepts commission-free listings only, `100` disables the constraint.
    #[serde(default = "default_commission_max")]
    pub commission_max_percent: u8,
    /// `0` disables approximate matching.
    #[serde(default)]
    pub tolerance_percent: u8,
    #[serde(default)]
    pub initial_listings_count: u32,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub empty_notified_at: Option<DateTime<Utc>>,
}

fn default_pets_allowed() -> bool {
    true
}

fn default_commission_max() -> u8 {
    COMMISSION_UNCONSTRAINED
}

pub const COMMISSION_UNCONSTRAINED: u8 = 100;
pub const MAX_TOLERANCE_PERCENT: u8 = 50;
pub const MAX_INITIAL_LISTINGS: u32 = 30;

impl UserFilter {
    pub fn new(user_id: UserId, cities: impl IntoIterator<Item = u32>) -> Self {
        Self {
            user_id,
            cities: cities.into_iter().collect(),
            rooms: BTreeSet::new(),
            price_min: 0,
            price_max: 0,
            area_min: 0.0,
            kitchen_area_min: 0.0,
            renovation_types: BTreeSet::new(),
            pets_allowed: default_pets_allowed(),
            commission_max_percent: COMMISSION_UNCONSTRAINED,
            tolerance_percent: 0,
            initial_listings_count: 0,
            is_active: false,
            empty_notified_at: None,
        }
    }

    pub fn validate(&self) -> Result<(), FilterValidationError> {
        if self.cities.is_empty() {
            return Err(FilterValidationError::NoCities);
        }
        if self.tolerance_percent > MAX_TOLERANCE_PERCENT {
            return Err(FilterValidationError::ToleranceOutOfRange(
                self.tolerance_percent,
            ));
        }
        if self.commission_max_percent > COMMISSION_UNCONSTRAINED {
            return Err(FilterValidationError::CommissionOutOfRange(
                self.commission_max_percent,
            ));
        }
        if self.initial_listings_count > MAX_INITIAL_LISTINGS {
            return Err(FilterValidationError::InitialCountOutOfRange(
                self.initial_listings_count,
            ));
        }
        if self.price_min > 0 && self.price_max > 0 && self.price_min > self.price_max {
            return Err(FilterValidationError::InvertedPriceRange {
                min: self.price_min,
                max: self.price_max,
            });
        }
        for (field, value) in [
            ("area_min", self.area_min),
            ("kitchen_area_min", self.kitchen_area_min),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(FilterValidationError::InvalidArea { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterValidationError {
    #[error("at least one city must be selected")]
    NoCities,
    #[error("tolerance must be between 0 and 50% (got {0})")]
    ToleranceOutOfRange(u8),
    #[error("commission limit must be between 0 and 100% (got {0})")]
    CommissionOutOfRange(u8),
    #[error("initial batch must be between 0 and 30 listings (got {0})")]
    InitialCountOutOfRange(u32),
    #[error("minimum price {min} exceeds maximum price {max}")]
    InvertedPriceRange { min: u64, max: u64 },
    #[error("{field} must be a non-negative number (got {value})")]
    InvalidArea { field: &'static str, value: f64 },
}
