use thiserror::Error;

/// Errors emitted by the rule registry and rule constructors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("rule already registered: {0}")]
    DuplicateRule(String),
    #[error("unknown rule: {0}")]
    UnknownRule(String),
    #[error("invalid params for rule '{rule}': {message}")]
    InvalidParams { rule: String, message: String },
    #[error("rule '{rule}' failed: {message}")]
    Evaluation { rule: String, message: String },
}

impl RuleError {
    pub fn invalid_params(rule: &str, message: impl Into<String>) -> Self {
        RuleError::InvalidParams {
            rule: rule.to_string(),
            message: message.into(),
        }
    }

    pub fn evaluation(rule: &str, message: impl Into<String>) -> Self {
        RuleError::Evaluation {
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}
