use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;

use readyscore_core::{Dimension, Table};
use readyscore_rules::{RuleContext, RuleError, RuleRegistry, RuleResult};

fn as_of() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 15)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .expect("as_of")
}

fn run(id: &str, params: serde_json::Value, table: &Table) -> RuleResult {
    let registry = RuleRegistry::global().expect("registry");
    let rule = registry.get_rule(id, Some(&params)).expect("rule");
    rule.evaluate(&RuleContext::new(table, as_of()))
        .expect("evaluate")
}

fn customers(rows: &[Vec<&str>]) -> Table {
    Table::from_text_rows(
        "customers",
        &["id", "name", "email", "country", "age"],
        rows,
    )
    .expect("table")
}

#[test]
fn missing_required_column_costs_exactly_its_weight() {
    let table = Table::from_text_rows(
        "customers",
        &["id", "name", "email", "country"],
        &[vec!["1", "ana", "ana@example.com", "PT"], vec!["2", "rui", "rui@example.com", "BR"]],
    )
    .expect("table");
    let required = run(
        "completeness.required_fields",
        json!({"fields": ["id", "name", "email", "country", "age"]}),
        &table,
    );
    let density = run("completeness.population_density", json!({}), &table);

    assert_eq!(required.score, 0.0);
    assert_eq!(required.findings.len(), 1);
    assert!(required.findings[0].contains("'age'"));
    // Completeness drops from 20 by exactly the required-fields weight.
    assert_eq!(required.score + density.score, 20.0 - 10.0);
}

#[test]
fn domain_rule_on_prices_fails_every_row() {
    let table = Table::from_text_rows(
        "products",
        &["price"],
        &[vec!["9999.99"], vec!["5995.00"], vec!["14999.99"]],
    )
    .expect("table");
    let result = run(
        "plausibility.domain_specific",
        json!({"rules": [{"expression": "price < 2000"}], "max_examples": 5}),
        &table,
    );
    assert_eq!(result.score, 0.0);
    assert_eq!(result.details["failure_count"], json!(3));
    assert!(result.findings[0].contains("9999.99"));
    assert!(result.findings[0].contains("14999.99"));
}

#[test]
fn every_builtin_rule_stays_within_its_weight() {
    let table = customers(&[
        vec!["1", "Ana", "ana@example.com", "PT", "31"],
        vec!["1", "ana ", "not-an-email", "pt", "-4"],
        vec!["", "", "", "", "forty"],
        vec!["3", "Rui", "rui@example.com", "BR", "900"],
    ]);
    let registry = RuleRegistry::global().expect("registry");
    for descriptor in registry.descriptors() {
        let rule = registry.get_rule(descriptor.id, None).expect("rule");
        let result = rule
            .evaluate(&RuleContext::new(&table, as_of()))
            .expect("evaluate");
        assert!(result.score >= 0.0, "{} below zero", descriptor.id);
        assert!(
            result.score <= descriptor.default_weight,
            "{} above its weight",
            descriptor.id
        );
        assert!(!rule.generate_narrative(&result).is_empty());
    }
}

#[test]
fn additional_missing_value_never_raises_completeness() {
    let clean = customers(&[
        vec!["1", "Ana", "ana@example.com", "PT", "31"],
        vec!["2", "Rui", "rui@example.com", "BR", "40"],
    ]);
    let one_gap = customers(&[
        vec!["1", "Ana", "", "PT", "31"],
        vec!["2", "Rui", "rui@example.com", "BR", "40"],
    ]);
    let two_gaps = customers(&[
        vec!["1", "Ana", "", "PT", "31"],
        vec!["2", "Rui", "rui@example.com", "", "40"],
    ]);
    for id in ["completeness.required_fields", "completeness.population_density"] {
        let scores: Vec<f64> = [&clean, &one_gap, &two_gaps]
            .iter()
            .map(|table| run(id, json!({}), table).score)
            .collect();
        assert!(scores[0] >= scores[1] && scores[1] >= scores[2], "{id}: {scores:?}");
    }
}

fn single_column(name: &str, values: &[&str]) -> Table {
    let rows: Vec<Vec<&str>> = values.iter().map(|value| vec![*value]).collect();
    Table::from_text_rows("defects", &[name], &rows).expect("table")
}

/// Appends `defects` one at a time and returns the score after each step,
/// starting with the clean column.
fn scores_while_adding(id: &str, column: &str, clean: &[&str], defects: &[&str]) -> Vec<f64> {
    let mut values = clean.to_vec();
    let mut scores = vec![run(id, json!({}), &single_column(column, &values)).score];
    for defect in defects {
        values.push(*defect);
        scores.push(run(id, json!({}), &single_column(column, &values)).score);
    }
    scores
}

fn assert_non_increasing(id: &str, scores: &[f64]) {
    for pair in scores.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-12, "{id}: {scores:?}");
    }
    assert!(scores[scores.len() - 1] < scores[0], "{id}: {scores:?}");
}

#[test]
fn additional_defects_never_raise_rule_scores() {
    let cases: [(&str, &str, &[&str], &[&str]); 5] = [
        (
            "validity.type_consistency",
            "age",
            &["31", "40", "22", "35"],
            &["forty", "fifty", "sixty"],
        ),
        (
            "validity.format_validation",
            "email",
            &["ana@example.com", "rui@example.com", "eva@example.org"],
            &["not-an-email", "rui@", "eva at example"],
        ),
        ("consistency.key_uniqueness", "id", &["1", "2", "3"], &["3", "2", "1"]),
        (
            "consistency.uniform_representation",
            "country",
            &["PT", "PT", "PT", "BR"],
            &["pt", "Pt"],
        ),
        (
            "plausibility.outlier_detection",
            "amount",
            &["10", "11", "12", "13", "14", "15", "16", "17", "18", "19"],
            &["500", "600"],
        ),
    ];
    for (id, column, clean, defects) in cases {
        let scores = scores_while_adding(id, column, clean, defects);
        assert_non_increasing(id, &scores);
    }
}

#[test]
fn free_text_in_a_numeric_column_keeps_lowering_type_consistency() {
    let scores = scores_while_adding(
        "validity.type_consistency",
        "age",
        &["31", "40"],
        &["forty", "fifty", "sixty"],
    );
    assert_eq!(scores[0], 7.0);
    assert!((scores[2] - 3.5).abs() < 1e-9);
    assert!((scores[3] - 7.0 * 2.0 / 5.0).abs() < 1e-9);
    assert_non_increasing("validity.type_consistency", &scores);
}

#[test]
fn registry_lists_rules_per_dimension_in_order() {
    let registry = RuleRegistry::global().expect("registry");
    assert_eq!(
        registry.rules_for_dimension(Dimension::Validity),
        vec![
            "validity.type_consistency",
            "validity.format_validation",
            "validity.range_validation"
        ]
    );
    assert_eq!(
        registry.rules_for_dimension(Dimension::Freshness),
        vec!["freshness.timestamp_recency", "freshness.update_frequency"]
    );
}

#[test]
fn unknown_params_fail_at_construction() {
    let registry = RuleRegistry::global().expect("registry");
    let result = registry.get_rule(
        "completeness.required_fields",
        Some(&json!({"feilds": ["id"]})),
    );
    assert!(matches!(result, Err(RuleError::InvalidParams { .. })));
}
