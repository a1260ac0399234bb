mod commission;
mod deviation;
pub mod phrases;
mod rules;

pub use commission::parse_commission;
pub use deviation::{describe, Deviation, DeviationDirection, NumericCriterion};
pub use phrases::PhraseBook;

use super::domain::{Listing, UserFilter};
use serde::{Deserialize, Serialize};

/// Stateless evaluator applying a user's filter to scraped listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchingEngine {
    phrases: PhraseBook,
}

impl MatchingEngine {
    pub fn new(phrases: PhraseBook) -> Self {
        Self { phrases }
    }

    pub fn phrases(&self) -> &PhraseBook {
        &self.phrases
    }

    /// Exact match: every criterion holds.
    pub fn matches(&self, filter: &UserFilter, listing: &Listing) -> bool {
        rules::hard_criteria_hold(filter, listing, &self.phrases)
            && rules::violated_bounds(filter, listing).is_empty()
    }

    /// Near match within the user's tolerance.
    ///
    /// Returns `None` when tolerance is disabled, a hard criterion fails, any missed
    /// bound is further off than the tolerance allows, or nothing was missed at all.
    pub fn matches_approx(&self, filter: &UserFilter, listing: &Listing) -> Option<Vec<Deviation>> {
        if filter.tolerance_percent == 0 {
            return None;
        }
        if !rules::hard_criteria_hold(filter, listing, &self.phrases) {
            return None;
        }

        let mut deviations = Vec::new();
        for violation in rules::violated_bounds(filter, listing) {
            if !violation.within_tolerance(filter.tolerance_percent) {
                return None;
            }
            deviations.push(Deviation::from_fraction(
                violation.criterion,
                violation.relative_miss(),
            ));
        }

        if deviations.is_empty() {
            None
        } else {
            Some(deviations)
        }
    }

    /// Classification used by dispatch: strict first, then approximate.
    pub fn evaluate(&self, filter: &UserFilter, listing: &Listing) -> MatchOutcome {
        if self.matches(filter, listing) {
            return MatchOutcome::Strict;
        }
        match self.matches_approx(filter, listing) {
            Some(deviations) => MatchOutcome::Approximate(deviations),
            None => MatchOutcome::Rejected,
        }
    }
}

/// Result of evaluating one listing against one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Strict,
    Approximate(Vec<Deviation>),
    Rejected,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchOutcome::Rejected)
    }

    pub fn deviations(&self) -> Option<&[Deviation]> {
        match self {
            MatchOutcome::Approximate(deviations) => Some(deviations),
            MatchOutcome::Strict | MatchOutcome::Rejected => None,
        }
    }
}

pub fn matches(filter: &UserFilter, listing: &Listing) -> bool {
    MatchingEngine::default().matches(filter, listing)
}

pub fn matches_approx(filter: &UserFilter, listing: &Listing) -> Option<Vec<Deviation>> {
    MatchingEngine::default().matches_approx(filter, listing)
}

impl UserFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        matches(self, listing)
    }

    pub fn matches_approx(&self, listing: &Listing) -> Option<Vec<Deviation>> {
        matches_approx(self, listing)
    }
}
