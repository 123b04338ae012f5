use serde_json::{Map, Value};

use crate::errors::RuleError;

/// Shape of a rule parameter as accepted in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
    /// Array of strings.
    StringList,
    /// Object whose values are strings.
    StringMap,
    /// Any JSON object; the rule validates its entries.
    Object,
    /// Any JSON array; the rule validates its items.
    List,
}

impl ParamKind {
    fn describe(&self) -> &'static str {
        match self {
            ParamKind::Bool => "a boolean",
            ParamKind::Int => "an integer",
            ParamKind::Float => "a number",
            ParamKind::String => "a string",
            ParamKind::StringList => "a list of strings",
            ParamKind::StringMap => "a map of strings",
            ParamKind::Object => "an object",
            ParamKind::List => "a list",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Bool => value.is_boolean(),
            ParamKind::Int => value.as_i64().is_some() || value.as_u64().is_some(),
            ParamKind::Float => value.as_f64().is_some(),
            ParamKind::String => value.is_string(),
            ParamKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            ParamKind::StringMap => value
                .as_object()
                .is_some_and(|map| map.values().all(Value::is_string)),
            ParamKind::Object => value.is_object(),
            ParamKind::List => value.is_array(),
        }
    }
}

/// Declared parameter of a rule.
#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub key: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    pub const fn new(key: &'static str, kind: ParamKind, required: bool) -> Self {
        Self {
            key,
            kind,
            required,
        }
    }

    pub const fn optional(key: &'static str, kind: ParamKind) -> Self {
        Self::new(key, kind, false)
    }
}

/// Parameters accepted by every rule.
pub const COMMON_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("enabled", ParamKind::Bool),
    ParamSpec::optional("weight", ParamKind::Float),
];

/// Validated parameters of one rule instance with defaults resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleParams {
    enabled: bool,
    weight: f64,
    values: Map<String, Value>,
}

impl RuleParams {
    /// Validate caller overrides against the rule's specs and merge defaults.
    ///
    /// Unknown keys, wrongly typed values and missing required keys are rejected.
    pub fn resolve(
        rule_id: &str,
        specs: &[ParamSpec],
        default_weight: f64,
        overrides: Option<&Value>,
    ) -> Result<RuleParams, RuleError> {
        let map = match overrides {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(RuleError::invalid_params(
                    rule_id,
                    "params must be an object",
                ));
            }
        };

        for (key, value) in &map {
            let Some(spec) = COMMON_PARAMS
                .iter()
                .chain(specs.iter())
                .find(|spec| spec.key == key.as_str())
            else {
                return Err(RuleError::invalid_params(
                    rule_id,
                    format!("unknown param '{key}'"),
                ));
            };
            if !spec.kind.accepts(value) {
                return Err(RuleError::invalid_params(
                    rule_id,
                    format!("param '{key}' must be {}", spec.kind.describe()),
                ));
            }
        }

        for spec in specs {
            if spec.required && !map.contains_key(spec.key) {
                return Err(RuleError::invalid_params(
                    rule_id,
                    format!("missing required param '{}'", spec.key),
                ));
            }
        }

        let enabled = map.get("enabled").and_then(Value::as_bool).unwrap_or(true);
        let weight = map
            .get("weight")
            .and_then(Value::as_f64)
            .unwrap_or(default_weight);
        if !weight.is_finite() || weight < 0.0 {
            return Err(RuleError::invalid_params(
                rule_id,
                "weight must be a non-negative number",
            ));
        }

        Ok(RuleParams {
            enabled,
            weight,
            values: map,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key)
            .and_then(Value::as_u64)
            .and_then(|value| usize::try_from(value).ok())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    /// String map as ordered `(key, value)` pairs, preserving declaration order.
    pub fn get_string_map(&self, key: &str) -> Option<Vec<(String, String)>> {
        self.get(key).and_then(Value::as_object).map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
    }

    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    pub fn get_list(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key).and_then(Value::as_array)
    }

    /// Positive number or the given default; zero and negatives are rejected.
    pub fn positive_f64(&self, rule_id: &str, key: &str, default: f64) -> Result<f64, RuleError> {
        match self.get_f64(key) {
            None => Ok(default),
            Some(value) if value.is_finite() && value > 0.0 => Ok(value),
            Some(_) => Err(RuleError::invalid_params(
                rule_id,
                format!("param '{key}' must be greater than zero"),
            )),
        }
    }
}
