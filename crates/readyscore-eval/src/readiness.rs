use std::fmt;

use serde::{Deserialize, Serialize};

/// Qualitative label derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReadinessLevel {
    Inadequate,
    Limited,
    Basic,
    Proficient,
    Advanced,
}

impl ReadinessLevel {
    /// Map an overall score (0-100) to its band.
    pub fn from_score(score: f64) -> ReadinessLevel {
        if score >= 80.0 {
            ReadinessLevel::Advanced
        } else if score >= 60.0 {
            ReadinessLevel::Proficient
        } else if score >= 40.0 {
            ReadinessLevel::Basic
        } else if score >= 20.0 {
            ReadinessLevel::Limited
        } else {
            ReadinessLevel::Inadequate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessLevel::Inadequate => "Inadequate",
            ReadinessLevel::Limited => "Limited",
            ReadinessLevel::Basic => "Basic",
            ReadinessLevel::Proficient => "Proficient",
            ReadinessLevel::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for ReadinessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
