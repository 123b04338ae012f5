use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum score a single dimension can reach.
pub const MAX_DIMENSION_SCORE: f64 = 20.0;

/// Maximum overall score across the five dimensions.
pub const MAX_OVERALL_SCORE: f64 = 100.0;

/// One of the five fixed quality axes.
///
/// The declaration order is the evaluation and reporting order; `Ord` follows it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Validity,
    Completeness,
    Freshness,
    Consistency,
    Plausibility,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Validity,
        Dimension::Completeness,
        Dimension::Freshness,
        Dimension::Consistency,
        Dimension::Plausibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Validity => "validity",
            Dimension::Completeness => "completeness",
            Dimension::Freshness => "freshness",
            Dimension::Consistency => "consistency",
            Dimension::Plausibility => "plausibility",
        }
    }

    /// Short question answered by the dimension, used in narratives.
    pub fn question(&self) -> &'static str {
        match self {
            Dimension::Validity => "Do values have the expected types, formats and ranges?",
            Dimension::Completeness => "Are required fields present and populated?",
            Dimension::Freshness => "Is the data recent and regularly updated?",
            Dimension::Consistency => "Do fields agree with each other and share one representation?",
            Dimension::Plausibility => "Are values believable for the domain?",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        Dimension::ALL
            .into_iter()
            .find(|dimension| dimension.as_str() == normalized)
            .ok_or_else(|| CoreError::UnknownDimension(value.to_string()))
    }
}
