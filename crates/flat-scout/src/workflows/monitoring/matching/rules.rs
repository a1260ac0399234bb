use super::super::domain::{Listing, UserFilter, COMMISSION_UNCONSTRAINED};
use super::commission::parse_commission_with;
use super::deviation::{DeviationDirection, NumericCriterion};
use super::phrases::PhraseBook;

/// Absorbs binary rounding of decimal areas, in percentage points.
const PERCENT_EPSILON: f64 = 1e-9;

/// A numeric bound the listing currently misses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoundViolation {
    pub criterion: NumericCriterion,
    pub threshold: f64,
    pub value: f64,
}

impl BoundViolation {
    /// Distance from the threshold relative to the threshold itself.
    pub fn relative_miss(&self) -> f64 {
        match self.criterion.violation_direction() {
            DeviationDirection::Above => (self.value - self.threshold) / self.threshold,
            DeviationDirection::Below => (self.threshold - self.value) / self.threshold,
        }
    }

    /// Inclusive: a miss of exactly `tolerance_percent` is still tolerated.
    pub fn within_tolerance(&self, tolerance_percent: u8) -> bool {
        self.relative_miss() * 100.0 <= f64::from(tolerance_percent) + PERCENT_EPSILON
    }
}

/// Criteria that never bend to tolerance: rooms, renovation, pet ban, commission.
pub(crate) fn hard_criteria_hold(
    filter: &UserFilter,
    listing: &Listing,
    phrases: &PhraseBook,
) -> bool {
    rooms_accepted(filter, listing)
        && renovation_accepted(filter, listing)
        && !pet_ban_blocks(filter, listing, phrases)
        && commission_accepted(filter, listing, phrases)
}

fn rooms_accepted(filter: &UserFilter, listing: &Listing) -> bool {
    filter.rooms.is_empty() || filter.rooms.contains(&listing.rooms)
}

fn renovation_accepted(filter: &UserFilter, listing: &Listing) -> bool {
    if filter.renovation_types.is_empty() {
        return true;
    }
    listing
        .renovation
        .map(|kind| filter.renovation_types.contains(&kind))
        .unwrap_or(false)
}

fn pet_ban_blocks(filter: &UserFilter, listing: &Listing, phrases: &PhraseBook) -> bool {
    filter.pets_allowed && phrases.mentions_pet_ban(&listing.ad_text())
}

fn commission_accepted(filter: &UserFilter, listing: &Listing, phrases: &PhraseBook) -> bool {
    if filter.commission_max_percent >= COMMISSION_UNCONSTRAINED {
        return true;
    }
    parse_commission_with(&listing.commission, phrases)
        .map(|percent| percent <= filter.commission_max_percent)
        .unwrap_or(false)
}

/// Every numeric bound that is set and missed, in criterion order.
pub(crate) fn violated_bounds(filter: &UserFilter, listing: &Listing) -> Vec<BoundViolation> {
    let price = listing.price as f64;
    let checks = [
        (NumericCriterion::PriceMin, filter.price_min as f64, price),
        (NumericCriterion::PriceMax, filter.price_max as f64, price),
        (NumericCriterion::AreaMin, filter.area_min, listing.total_area),
        (
            NumericCriterion::KitchenAreaMin,
            filter.kitchen_area_min,
            listing.kitchen_area,
        ),
    ];

    checks
        .into_iter()
        .filter(|(_, threshold, _)| *threshold > 0.0)
        .filter(|(criterion, threshold, value)| match criterion.violation_direction() {
            DeviationDirection::Above => value > threshold,
            DeviationDirection::Below => value < threshold,
        })
        .map(|(criterion, threshold, value)| BoundViolation {
            criterion,
            threshold,
            value,
        })
        .collect()
}
