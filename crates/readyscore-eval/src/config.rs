use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use readyscore_core::Dimension;
use readyscore_rules::{Rule, RuleRegistry};

use crate::errors::EvalError;

pub const DEFAULT_DIMENSION_WEIGHT: f64 = 1.0;

/// Typed assessment configuration.
///
/// Dimensions absent from the configuration, or present without a `rules`
/// list, run every built-in rule of that dimension with default params.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssessmentConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<Dimension, DimensionConfig>,
    /// Reference time for freshness rules; defaults to the time of assessment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionConfig {
    #[serde(default = "default_dimension_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RuleConfig>>,
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            weight: DEFAULT_DIMENSION_WEIGHT,
            rules: None,
        }
    }
}

fn default_dimension_weight() -> f64 {
    DEFAULT_DIMENSION_WEIGHT
}

/// One configured rule: its type (short or full identifier) and param overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RuleConfig {
    pub fn new(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Full `dimension.rule_name` identifier within `dimension`.
    pub fn rule_id(&self, dimension: Dimension) -> Result<String, EvalError> {
        let rule_type = self.rule_type.trim();
        match rule_type.split_once('.') {
            None => Ok(format!("{}.{rule_type}", dimension.as_str())),
            Some((prefix, _)) if prefix == dimension.as_str() => Ok(rule_type.to_string()),
            Some(_) => Err(EvalError::InvalidConfig(format!(
                "rule '{rule_type}' is configured under dimension '{dimension}'"
            ))),
        }
    }
}

impl AssessmentConfig {
    /// Load a configuration file; the format follows the extension
    /// (`.yaml`/`.yml`, `.json`, `.toml`).
    pub fn from_path(path: &Path) -> Result<Self, EvalError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        let contents = std::fs::read_to_string(path)?;
        match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&contents),
            Some("json") => Self::from_json_str(&contents),
            Some("toml") => Self::from_toml_str(&contents),
            _ => Err(EvalError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, EvalError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, EvalError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, EvalError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn dimension_weight(&self, dimension: Dimension) -> f64 {
        self.dimensions
            .get(&dimension)
            .map(|config| config.weight)
            .unwrap_or(DEFAULT_DIMENSION_WEIGHT)
    }

    /// Rule configurations of a dimension with defaults filled in from the registry.
    pub fn rule_configs(&self, dimension: Dimension, registry: &RuleRegistry) -> Vec<RuleConfig> {
        match self
            .dimensions
            .get(&dimension)
            .and_then(|config| config.rules.as_ref())
        {
            Some(rules) => rules.clone(),
            None => registry
                .rules_for_dimension(dimension)
                .into_iter()
                .map(RuleConfig::new)
                .collect(),
        }
    }

    /// Resolve every rule and weight once, before any rule runs.
    pub fn prepare(&self, registry: &RuleRegistry) -> Result<PreparedConfig, EvalError> {
        let mut dimensions = Vec::with_capacity(Dimension::ALL.len());
        let mut weight_sum = 0.0;
        for dimension in Dimension::ALL {
            let weight = self.dimension_weight(dimension);
            if !weight.is_finite() || weight < 0.0 {
                return Err(EvalError::InvalidConfig(format!(
                    "weight of dimension '{dimension}' must be a non-negative number"
                )));
            }
            weight_sum += weight;
            let rules = build_rules(registry, dimension, &self.rule_configs(dimension, registry))?;
            dimensions.push(PreparedDimension {
                dimension,
                weight,
                rules,
            });
        }
        if weight_sum <= 0.0 {
            return Err(EvalError::InvalidConfig(
                "dimension weights must not all be zero".to_string(),
            ));
        }
        Ok(PreparedConfig {
            dimensions,
            as_of: self.as_of.map(|as_of| as_of.naive_utc()),
        })
    }
}

/// Instantiate configured rules through the registry, in declaration order.
pub(crate) fn build_rules(
    registry: &RuleRegistry,
    dimension: Dimension,
    configs: &[RuleConfig],
) -> Result<Vec<Box<dyn Rule>>, EvalError> {
    configs
        .iter()
        .map(|config| -> Result<Box<dyn Rule>, EvalError> {
            let id = config.rule_id(dimension)?;
            Ok(registry.get_rule(&id, config.params.as_ref())?)
        })
        .collect()
}

/// Configuration with rules instantiated and weights validated.
pub struct PreparedConfig {
    dimensions: Vec<PreparedDimension>,
    as_of: Option<NaiveDateTime>,
}

pub struct PreparedDimension {
    pub dimension: Dimension,
    pub weight: f64,
    pub rules: Vec<Box<dyn Rule>>,
}

impl PreparedConfig {
    /// Dimensions in the fixed assessment order.
    pub fn dimensions(&self) -> &[PreparedDimension] {
        &self.dimensions
    }

    pub fn as_of(&self) -> Option<NaiveDateTime> {
        self.as_of
    }

    pub fn weights(&self) -> BTreeMap<Dimension, f64> {
        self.dimensions
            .iter()
            .map(|prepared| (prepared.dimension, prepared.weight))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static RuleRegistry {
        RuleRegistry::global().expect("registry")
    }

    #[test]
    fn missing_dimensions_use_default_rules() {
        let config = AssessmentConfig::from_yaml_str(
            "dimensions:\n  validity:\n    weight: 2.0\n    rules:\n      - type: range_validation\n        params:\n          ranges:\n            age: {min: 0, max: 120}\n",
        )
        .expect("config");
        let prepared = config.prepare(registry()).expect("prepare");
        let validity = &prepared.dimensions()[0];
        assert_eq!(validity.dimension, Dimension::Validity);
        assert_eq!(validity.weight, 2.0);
        assert_eq!(validity.rules.len(), 1);
        assert_eq!(prepared.dimensions()[1].rules.len(), 2);
        assert_eq!(prepared.dimensions()[2].weight, 1.0);
    }

    #[test]
    fn rejects_unknown_keys_and_rules() {
        let typo = AssessmentConfig::from_yaml_str("dimensons: {}\n");
        assert!(matches!(typo, Err(EvalError::Yaml(_))));

        let unknown = AssessmentConfig::from_yaml_str(
            "dimensions:\n  validity:\n    rules:\n      - type: spelling\n",
        )
        .expect("config")
        .prepare(registry());
        assert!(matches!(
            unknown,
            Err(EvalError::Rule(readyscore_rules::RuleError::UnknownRule(_)))
        ));
    }

    #[test]
    fn rejects_rules_under_the_wrong_dimension() {
        let config = AssessmentConfig::from_json_str(
            r#"{"dimensions": {"validity": {"rules": [{"type": "completeness.required_fields"}]}}}"#,
        )
        .expect("config");
        assert!(matches!(
            config.prepare(registry()),
            Err(EvalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_invalid_weights() {
        let mut config = AssessmentConfig::default();
        for dimension in Dimension::ALL {
            config.dimensions.insert(
                dimension,
                DimensionConfig {
                    weight: 0.0,
                    rules: None,
                },
            );
        }
        assert!(matches!(
            config.prepare(registry()),
            Err(EvalError::InvalidConfig(_))
        ));

        let negative = AssessmentConfig::from_toml_str("[dimensions.freshness]\nweight = -1.0\n")
            .expect("config");
        assert!(matches!(
            negative.prepare(registry()),
            Err(EvalError::InvalidConfig(_))
        ));
    }

    #[test]
    fn parses_as_of() {
        let config =
            AssessmentConfig::from_json_str(r#"{"as_of": "2024-06-15T00:00:00Z"}"#).expect("config");
        let prepared = config.prepare(registry()).expect("prepare");
        assert_eq!(
            prepared.as_of().map(|as_of| as_of.to_string()),
            Some("2024-06-15 00:00:00".to_string())
        );
    }
}
