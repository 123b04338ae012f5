use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use readyscore_core::Dimension;

use crate::template::matching::DEFAULT_MIN_CONFIDENCE;

/// Declarative compliance template (for example an ML-training readiness profile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Template {
    pub template: TemplateInfo,
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<Dimension, DimensionNotes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_matching: Option<PatternMatching>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certification: Option<Certification>,
    /// Free-form metadata carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TemplateInfo {
    pub id: String,
    pub version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Requirements {
    /// Minimum overall score, 0-100.
    pub overall_minimum: f64,
    /// Flat per-dimension minimums, 0-20.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimension_minimums: BTreeMap<Dimension, f64>,
    /// Per-dimension minimums with optional required rules.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimension_requirements: BTreeMap<Dimension, DimensionRequirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mandatory_fields: Vec<String>,
    /// Fully qualified rule ids (`dimension.rule`) that must be evaluated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<CustomRule>,
}

impl Requirements {
    /// Effective minimum for a dimension; detailed requirements win over flat ones.
    pub fn dimension_minimum(&self, dimension: Dimension) -> Option<f64> {
        self.dimension_requirements
            .get(&dimension)
            .and_then(DimensionRequirement::minimum_score)
            .or_else(|| self.dimension_minimums.get(&dimension).copied())
    }

    /// Required rule ids in declaration order, qualified and deduplicated.
    pub fn required_rule_ids(&self) -> Vec<(Option<Dimension>, String)> {
        let mut ids: Vec<(Option<Dimension>, String)> = Vec::new();
        let mut push = |dimension: Option<Dimension>, id: String| {
            if !ids.iter().any(|(_, existing)| existing == &id) {
                ids.push((dimension, id));
            }
        };
        for (dimension, requirement) in &self.dimension_requirements {
            for rule in requirement.required_rules() {
                push(Some(*dimension), qualify_rule_id(*dimension, rule));
            }
        }
        for rule in &self.required_rules {
            let dimension = rule
                .split_once('.')
                .and_then(|(prefix, _)| prefix.parse::<Dimension>().ok());
            push(dimension, rule.clone());
        }
        ids
    }
}

/// Qualify a short rule name with its dimension prefix.
pub fn qualify_rule_id(dimension: Dimension, rule: &str) -> String {
    if rule.contains('.') {
        rule.to_string()
    } else {
        format!("{}.{}", dimension.as_str(), rule)
    }
}

/// Either a bare minimum score or a detailed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DimensionRequirement {
    Minimum(f64),
    Detailed(DetailedDimensionRequirement),
}

impl DimensionRequirement {
    pub fn minimum_score(&self) -> Option<f64> {
        match self {
            DimensionRequirement::Minimum(score) => Some(*score),
            DimensionRequirement::Detailed(detail) => detail.minimum_score,
        }
    }

    pub fn required_rules(&self) -> &[String] {
        match self {
            DimensionRequirement::Minimum(_) => &[],
            DimensionRequirement::Detailed(detail) => &detail.required_rules,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            DimensionRequirement::Minimum(_) => None,
            DimensionRequirement::Detailed(detail) => detail.description.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DetailedDimensionRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_rules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Boolean expression over the report scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CustomRule {
    pub name: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<GapSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DimensionNotes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Field-name matching hints for mandatory fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PatternMatching {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldPattern>,
}

impl Default for PatternMatching {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fields: BTreeMap::new(),
        }
    }
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldPattern {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    /// Regular expressions matched against the whole column name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Certification {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity_period_days: Option<u32>,
    /// Standards the badge attests to. Informational: copied onto the badge,
    /// never checked against the report.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub standards: Vec<String>,
    /// Overall score needed for the badge, 0-100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_score: Option<f64>,
    /// Score every dimension must reach for the badge, 0-20.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_floor: Option<f64>,
}

/// Severity of an unmet requirement, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum GapSeverity {
    Low,
    Medium,
    High,
    Blocking,
}

impl GapSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            GapSeverity::Low => "low",
            GapSeverity::Medium => "medium",
            GapSeverity::High => "high",
            GapSeverity::Blocking => "blocking",
        }
    }

    /// Remediation effort points contributed by one gap.
    pub fn effort_points(&self) -> u32 {
        match self {
            GapSeverity::Low => 1,
            GapSeverity::Medium => 3,
            GapSeverity::High => 5,
            GapSeverity::Blocking => 8,
        }
    }
}

impl std::fmt::Display for GapSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detailed_requirement_wins_over_flat_minimum() {
        let requirements: Requirements = serde_json::from_value(serde_json::json!({
            "overall_minimum": 70,
            "dimension_minimums": {"validity": 10, "freshness": 12},
            "dimension_requirements": {
                "validity": {"minimum_score": 15, "required_rules": ["type_consistency"]},
                "completeness": 14
            }
        }))
        .expect("requirements");

        assert_eq!(requirements.dimension_minimum(Dimension::Validity), Some(15.0));
        assert_eq!(requirements.dimension_minimum(Dimension::Completeness), Some(14.0));
        assert_eq!(requirements.dimension_minimum(Dimension::Freshness), Some(12.0));
        assert_eq!(requirements.dimension_minimum(Dimension::Plausibility), None);
    }

    #[test]
    fn required_rules_are_qualified_and_deduplicated() {
        let requirements: Requirements = serde_json::from_value(serde_json::json!({
            "overall_minimum": 0,
            "dimension_requirements": {
                "validity": {"required_rules": ["type_consistency"]}
            },
            "required_rules": ["validity.type_consistency", "completeness.required_fields"]
        }))
        .expect("requirements");

        assert_eq!(
            requirements.required_rule_ids(),
            vec![
                (
                    Some(Dimension::Validity),
                    "validity.type_consistency".to_string()
                ),
                (
                    Some(Dimension::Completeness),
                    "completeness.required_fields".to_string()
                ),
            ]
        );
    }

    #[test]
    fn severity_orders_blocking_last() {
        assert!(GapSeverity::Blocking > GapSeverity::High);
        assert!(GapSeverity::Medium > GapSeverity::Low);
        assert_eq!(GapSeverity::Blocking.effort_points(), 8);
    }
}
