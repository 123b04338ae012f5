use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::template::model::PatternMatching;

/// Share of the confidence awarded for a byte-identical column name.
pub const EXACT_MATCH_WEIGHT: f64 = 0.4;
/// Share awarded when a normalized name, synonym or pattern matches.
pub const ALIAS_MATCH_WEIGHT: f64 = 0.35;
/// Share scaled by the best edit-distance similarity.
pub const SIMILARITY_WEIGHT: f64 = 0.25;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

const CONFIDENCE_EPSILON: f64 = 1e-9;

/// Scored pairing between a template field and a dataset column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMatch {
    pub field: String,
    pub column: String,
    pub confidence: f64,
    pub exact: bool,
    pub alias: bool,
    pub similarity: f64,
}

#[derive(Debug, Default)]
struct FieldHints {
    synonyms: Vec<String>,
    patterns: Vec<Regex>,
}

/// Matches template field names against dataset columns.
#[derive(Debug)]
pub struct ColumnMatcher {
    min_confidence: f64,
    hints: BTreeMap<String, FieldHints>,
}

impl ColumnMatcher {
    /// Build a matcher from optional hints; patterns that fail to compile are skipped.
    pub fn new(pattern_matching: Option<&PatternMatching>) -> Self {
        let Some(config) = pattern_matching else {
            return Self {
                min_confidence: DEFAULT_MIN_CONFIDENCE,
                hints: BTreeMap::new(),
            };
        };
        let mut hints = BTreeMap::new();
        for (field, pattern) in &config.fields {
            let mut compiled = Vec::new();
            for source in &pattern.patterns {
                match Regex::new(&format!("^(?:{source})$")) {
                    Ok(regex) => compiled.push(regex),
                    Err(err) => warn!(
                        event = "pattern_skipped",
                        field = %field,
                        pattern = %source,
                        error = %err
                    ),
                }
            }
            hints.insert(
                field.clone(),
                FieldHints {
                    synonyms: pattern.synonyms.clone(),
                    patterns: compiled,
                },
            );
        }
        Self {
            min_confidence: config.min_confidence,
            hints,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Score one column against one field.
    pub fn score(&self, field: &str, column: &str) -> FieldMatch {
        let hints = self.hints.get(field);
        let exact = field == column;

        let normalized_column = normalize(column);
        let mut names: Vec<&str> = vec![field];
        if let Some(hints) = hints {
            names.extend(hints.synonyms.iter().map(String::as_str));
        }
        let alias = names
            .iter()
            .any(|name| normalize(name) == normalized_column)
            || hints.is_some_and(|hints| {
                hints
                    .patterns
                    .iter()
                    .any(|pattern| pattern.is_match(column))
            });
        let similarity = names
            .iter()
            .map(|name| similarity(name, column))
            .fold(0.0, f64::max);

        let confidence = EXACT_MATCH_WEIGHT * f64::from(u8::from(exact))
            + ALIAS_MATCH_WEIGHT * f64::from(u8::from(alias))
            + SIMILARITY_WEIGHT * similarity;
        FieldMatch {
            field: field.to_string(),
            column: column.to_string(),
            confidence: (confidence * 1000.0).round() / 1000.0,
            exact,
            alias,
            similarity,
        }
    }

    /// Best column for a field at or above the confidence threshold; ties keep column order.
    pub fn best_match(&self, field: &str, columns: &[String]) -> Option<FieldMatch> {
        let mut best: Option<FieldMatch> = None;
        for column in columns {
            let candidate = self.score(field, column);
            if candidate.confidence + CONFIDENCE_EPSILON < self.min_confidence {
                continue;
            }
            if best
                .as_ref()
                .is_none_or(|current| candidate.confidence > current.confidence)
            {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Normalized edit-distance similarity in `[0, 1]`.
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = normalize(left);
    let right = normalize(right);
    let longest = left.chars().count().max(right.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&left, &right) as f64 / longest as f64
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

fn levenshtein(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, l) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, r) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(l != *r);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::model::FieldPattern;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn levenshtein_counts_edits() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("email", "email"), 0);
    }

    #[test]
    fn exact_name_scores_full_confidence() {
        let matcher = ColumnMatcher::new(None);
        let found = matcher
            .best_match("email", &columns(&["id", "email"]))
            .expect("match");
        assert_eq!(found.column, "email");
        assert_eq!(found.confidence, 1.0);
        assert!(found.exact && found.alias);
    }

    #[test]
    fn case_and_separator_variants_match_by_alias() {
        let matcher = ColumnMatcher::new(None);
        let found = matcher
            .best_match("customer_id", &columns(&["Customer-ID"]))
            .expect("match");
        assert!(!found.exact);
        assert!(found.alias);
        assert_eq!(found.confidence, 0.6);
    }

    #[test]
    fn synonyms_and_patterns_count_as_aliases() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "email".to_string(),
            FieldPattern {
                synonyms: vec!["mail_address".to_string()],
                patterns: vec!["contact_.*mail".to_string()],
            },
        );
        let matcher = ColumnMatcher::new(Some(&PatternMatching {
            min_confidence: 0.5,
            fields,
        }));

        assert!(matcher.score("email", "MailAddress").alias);
        assert!(matcher.score("email", "contact_email").alias);
        assert!(!matcher.score("email", "phone").alias);
    }

    #[test]
    fn unrelated_columns_fall_below_threshold() {
        let matcher = ColumnMatcher::new(None);
        assert!(
            matcher
                .best_match("email", &columns(&["emial", "phone", "country"]))
                .is_none()
        );
    }

    #[test]
    fn best_match_prefers_higher_confidence() {
        let matcher = ColumnMatcher::new(None);
        let found = matcher
            .best_match("email", &columns(&["E_Mail", "email"]))
            .expect("match");
        assert_eq!(found.column, "email");
    }
}
