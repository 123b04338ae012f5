use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

use readyscore_core::{Dataset, Dimension, MAX_DIMENSION_SCORE};
use readyscore_rules::{Rule, RuleContext, RuleError, RuleRegistry, RuleResult};

use crate::config::{RuleConfig, build_rules};
use crate::errors::EvalError;

/// Tolerance when comparing a weight sum with the standard 20 points.
const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Evaluated,
    Disabled,
    Failed,
}

/// Per-rule line of a dimension result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub status: RuleStatus,
    pub score: f64,
    pub max_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Aggregated outcome of one dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionResult {
    pub dimension: Dimension,
    /// Score in `[0, 20]`.
    pub score: f64,
    pub max_score: f64,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub rule_outcomes: Vec<RuleOutcome>,
    /// Identifiers of disabled rules.
    pub not_evaluated: Vec<String>,
}

impl DimensionResult {
    fn new(dimension: Dimension) -> Self {
        Self {
            dimension,
            score: 0.0,
            max_score: MAX_DIMENSION_SCORE,
            findings: Vec::new(),
            recommendations: Vec::new(),
            rule_outcomes: Vec::new(),
            not_evaluated: Vec::new(),
        }
    }

    /// Result carrying only a score, e.g. when rebuilding a report from stored scores.
    pub fn with_score(dimension: Dimension, score: f64) -> Self {
        Self {
            score: score.clamp(0.0, MAX_DIMENSION_SCORE),
            ..Self::new(dimension)
        }
    }

    /// Outcome of a rule by identifier.
    pub fn outcome(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.rule_outcomes
            .iter()
            .find(|outcome| outcome.rule_id == rule_id)
    }

    /// True when the rule ran (successfully or not) in this dimension.
    pub fn ran_rule(&self, rule_id: &str) -> bool {
        self.outcome(rule_id)
            .is_some_and(|outcome| outcome.status != RuleStatus::Disabled)
    }
}

/// Runs the configured rules of one dimension.
pub struct DimensionEvaluator<'r> {
    registry: &'r RuleRegistry,
}

impl<'r> DimensionEvaluator<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self { registry }
    }

    /// Instantiate `rule_configs` through the registry and evaluate them.
    pub fn evaluate(
        &self,
        dimension: Dimension,
        dataset: &dyn Dataset,
        rule_configs: &[RuleConfig],
        as_of: NaiveDateTime,
    ) -> Result<DimensionResult, EvalError> {
        let rules = build_rules(self.registry, dimension, rule_configs)?;
        Ok(evaluate_rules(
            dimension,
            &rules,
            &RuleContext::new(dataset, as_of),
        ))
    }
}

/// Evaluate already-built rules and aggregate them into a dimension score.
///
/// Enabled weights summing to 20 give the plain sum of rule scores; any other
/// sum is rescaled to 20 and reported as a finding. Rule faults score zero.
pub fn evaluate_rules(
    dimension: Dimension,
    rules: &[Box<dyn Rule>],
    ctx: &RuleContext<'_>,
) -> DimensionResult {
    let mut result = DimensionResult::new(dimension);
    let mut earned = 0.0;
    let mut enabled_weight = 0.0;
    let mut enabled_rules = 0usize;

    for rule in rules {
        let weight = rule.weight();
        if !rule.enabled() {
            result.not_evaluated.push(rule.id().to_string());
            result.rule_outcomes.push(RuleOutcome {
                rule_id: rule.id().to_string(),
                status: RuleStatus::Disabled,
                score: 0.0,
                max_score: weight,
                narrative: None,
                details: BTreeMap::new(),
            });
            continue;
        }
        enabled_rules += 1;
        enabled_weight += weight;

        match run_rule(rule.as_ref(), ctx) {
            Ok(rule_result) => {
                let score = if rule_result.score.is_nan() {
                    0.0
                } else {
                    rule_result.score.clamp(0.0, weight)
                };
                debug!(
                    event = "rule_evaluated",
                    rule = rule.id(),
                    score,
                    max_score = weight
                );
                earned += score;
                let narrative = rule.generate_narrative(&rule_result);
                result.findings.extend(rule_result.findings);
                result.recommendations.extend(rule_result.recommendations);
                result.rule_outcomes.push(RuleOutcome {
                    rule_id: rule.id().to_string(),
                    status: RuleStatus::Evaluated,
                    score,
                    max_score: weight,
                    narrative: Some(narrative),
                    details: rule_result.details,
                });
            }
            Err(message) => {
                warn!(event = "rule_failed", rule = rule.id(), error = %message);
                result.findings.push(format!(
                    "rule '{}' could not be evaluated: {message}",
                    rule.id()
                ));
                result.rule_outcomes.push(RuleOutcome {
                    rule_id: rule.id().to_string(),
                    status: RuleStatus::Failed,
                    score: 0.0,
                    max_score: weight,
                    narrative: None,
                    details: BTreeMap::new(),
                });
            }
        }
    }

    if enabled_rules == 0 {
        result
            .findings
            .push(format!("no enabled rules for {dimension}; dimension scored 0"));
        return result;
    }

    let score = if (enabled_weight - MAX_DIMENSION_SCORE).abs() <= WEIGHT_EPSILON {
        earned
    } else {
        warn!(
            event = "non_standard_weights",
            dimension = dimension.as_str(),
            weight_sum = enabled_weight
        );
        result.findings.push(format!(
            "non-standard rule configuration: enabled weights sum to {enabled_weight} (expected 20); score rescaled"
        ));
        if enabled_weight > 0.0 {
            earned / enabled_weight * MAX_DIMENSION_SCORE
        } else {
            0.0
        }
    };
    result.score = score.clamp(0.0, MAX_DIMENSION_SCORE);
    result
}

/// Run one rule, turning errors and panics into a message.
fn run_rule(rule: &dyn Rule, ctx: &RuleContext<'_>) -> Result<RuleResult, String> {
    match catch_unwind(AssertUnwindSafe(|| rule.evaluate(ctx))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(RuleError::Evaluation { message, .. })) => Err(message),
        Ok(Err(err)) => Err(err.to_string()),
        Err(panic) => Err(panic_message(panic)),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during rule evaluation".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use readyscore_core::Table;
    use readyscore_rules::{ParamKind, ParamSpec, RuleDescriptor, RuleParams, RuleSpec};

    use super::*;

    static RATIO_PARAMS: [ParamSpec; 1] = [ParamSpec::optional("ratio", ParamKind::Float)];

    static RATIO_RULE: RuleDescriptor = RuleDescriptor {
        id: "validity.fixed_ratio",
        dimension: Dimension::Validity,
        name: "Fixed ratio",
        description: "Scores a configured share of its weight.",
        default_weight: 10.0,
        params: &RATIO_PARAMS,
    };

    static BROKEN_RULE: RuleDescriptor = RuleDescriptor {
        id: "validity.broken",
        dimension: Dimension::Validity,
        name: "Broken",
        description: "Always fails.",
        default_weight: 10.0,
        params: &[],
    };

    static PANICKING_RULE: RuleDescriptor = RuleDescriptor {
        id: "validity.panicking",
        dimension: Dimension::Validity,
        name: "Panicking",
        description: "Always panics.",
        default_weight: 10.0,
        params: &[],
    };

    struct TestRule {
        descriptor: &'static RuleDescriptor,
        params: RuleParams,
    }

    impl Rule for TestRule {
        fn descriptor(&self) -> &'static RuleDescriptor {
            self.descriptor
        }

        fn params(&self) -> &RuleParams {
            &self.params
        }

        fn evaluate(&self, _ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
            match self.descriptor.id {
                "validity.broken" => Err(RuleError::evaluation(self.id(), "table is not tabular")),
                "validity.panicking" => panic!("boom"),
                _ => {
                    let mut result =
                        self.result_from_ratio(self.params.get_f64("ratio").unwrap_or(1.0));
                    result.add_finding(format!("{} ran", self.id()));
                    Ok(result)
                }
            }
        }
    }

    fn registry() -> RuleRegistry {
        fn ratio(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
            Ok(Box::new(TestRule {
                descriptor: &RATIO_RULE,
                params,
            }))
        }
        fn broken(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
            Ok(Box::new(TestRule {
                descriptor: &BROKEN_RULE,
                params,
            }))
        }
        fn panicking(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
            Ok(Box::new(TestRule {
                descriptor: &PANICKING_RULE,
                params,
            }))
        }

        let mut registry = RuleRegistry::new();
        registry
            .register(RuleSpec {
                descriptor: &RATIO_RULE,
                build: ratio,
            })
            .expect("register ratio");
        registry
            .register(RuleSpec {
                descriptor: &BROKEN_RULE,
                build: broken,
            })
            .expect("register broken");
        registry
            .register(RuleSpec {
                descriptor: &PANICKING_RULE,
                build: panicking,
            })
            .expect("register panicking");
        registry
    }

    fn evaluate(configs: &[RuleConfig]) -> DimensionResult {
        let registry = registry();
        let table = Table::from_text_rows("t", &["a"], &[vec!["1"]]).expect("table");
        let as_of = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("as_of");
        DimensionEvaluator::new(&registry)
            .evaluate(Dimension::Validity, &table, configs, as_of)
            .expect("evaluate")
    }

    #[test]
    fn standard_weights_give_the_plain_sum() {
        let result = evaluate(&[
            RuleConfig::new("fixed_ratio"),
            RuleConfig::new("fixed_ratio").with_params(json!({"ratio": 0.5})),
        ]);
        assert_eq!(result.score, 15.0);
        assert_eq!(
            result.findings,
            vec!["validity.fixed_ratio ran", "validity.fixed_ratio ran"]
        );
    }

    #[test]
    fn full_scores_reach_exactly_twenty() {
        let result = evaluate(&[
            RuleConfig::new("fixed_ratio").with_params(json!({"weight": 12})),
            RuleConfig::new("fixed_ratio").with_params(json!({"weight": 8})),
        ]);
        assert_eq!(result.score, 20.0);
    }

    #[test]
    fn non_standard_weights_are_rescaled_with_a_finding() {
        let result = evaluate(&[RuleConfig::new("fixed_ratio").with_params(json!({"ratio": 0.5}))]);
        assert_eq!(result.score, 10.0);
        assert!(result.findings.iter().any(|finding| finding
            == "non-standard rule configuration: enabled weights sum to 10 (expected 20); score rescaled"));
    }

    #[test]
    fn disabled_rules_are_listed_but_not_scored() {
        let result = evaluate(&[
            RuleConfig::new("fixed_ratio").with_params(json!({"weight": 20})),
            RuleConfig::new("fixed_ratio").with_params(json!({"enabled": false})),
        ]);
        assert_eq!(result.score, 20.0);
        assert_eq!(result.not_evaluated, vec!["validity.fixed_ratio"]);
        assert_eq!(result.rule_outcomes[1].status, RuleStatus::Disabled);
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn failing_rules_score_zero_without_aborting() {
        let result = evaluate(&[RuleConfig::new("broken"), RuleConfig::new("fixed_ratio")]);
        assert_eq!(result.score, 10.0);
        assert_eq!(
            result.findings[0],
            "rule 'validity.broken' could not be evaluated: table is not tabular"
        );
        assert_eq!(result.rule_outcomes[0].status, RuleStatus::Failed);
        assert!(result.ran_rule("validity.broken"));
    }

    #[test]
    fn panicking_rules_are_contained() {
        let result = evaluate(&[RuleConfig::new("panicking"), RuleConfig::new("fixed_ratio")]);
        assert_eq!(result.score, 10.0);
        assert_eq!(
            result.findings[0],
            "rule 'validity.panicking' could not be evaluated: boom"
        );
    }

    #[test]
    fn no_enabled_rules_score_zero() {
        let result = evaluate(&[]);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.findings.len(), 1);
    }
}
