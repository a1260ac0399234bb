use std::fmt;

use serde::{Deserialize, Serialize};

/// Continuous criteria that tolerance may relax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericCriterion {
    PriceMin,
    PriceMax,
    AreaMin,
    KitchenAreaMin,
}

impl NumericCriterion {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::PriceMin,
            Self::PriceMax,
            Self::AreaMin,
            Self::KitchenAreaMin,
        ]
    }

    pub const fn field_label(self) -> &'static str {
        match self {
            Self::PriceMin | Self::PriceMax => "price",
            Self::AreaMin => "area",
            Self::KitchenAreaMin => "kitchen area",
        }
    }

    /// Direction a listing must miss this bound in to violate it.
    pub const fn violation_direction(self) -> DeviationDirection {
        match self {
            Self::PriceMax => DeviationDirection::Above,
            Self::PriceMin | Self::AreaMin | Self::KitchenAreaMin => DeviationDirection::Below,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationDirection {
    Above,
    Below,
}

impl DeviationDirection {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

/// How far one numeric criterion missed its threshold, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub criterion: NumericCriterion,
    pub direction: DeviationDirection,
    /// Relative miss in whole percent, rounded to nearest.
    pub percent: u32,
}

impl Deviation {
    pub(crate) fn from_fraction(criterion: NumericCriterion, fraction: f64) -> Self {
        Self {
            criterion,
            direction: criterion.violation_direction(),
            percent: (fraction * 100.0).round() as u32,
        }
    }
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} by {}%",
            self.criterion.field_label(),
            self.direction.label(),
            self.percent
        )
    }
}

/// Renders deviations the way notifications list them.
pub fn describe(deviations: &[Deviation]) -> Vec<String> {
    deviations.iter().map(ToString::to_string).collect()
}
