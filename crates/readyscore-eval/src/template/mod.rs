//! Compliance templates: model, loading, catalog and evaluation.

pub mod catalog;
pub mod evaluator;
pub mod loader;
pub mod matching;
pub mod model;

pub use catalog::TemplateCatalog;
pub use evaluator::{
    CertificationBadge, Gap, RemediationEffort, RequirementKind, TemplateEvaluation,
    TemplateEvaluator, assess_with_templates, evaluate_template,
};
pub use loader::{
    TemplateFormat, ValidatedTemplate, load_template_path, load_template_str,
    template_json_schema, validate_template, validate_template_json, validate_template_value,
};
pub use matching::{ColumnMatcher, FieldMatch};
pub use model::{
    Certification, CustomRule, DimensionRequirement, FieldPattern, GapSeverity, PatternMatching,
    Requirements, Template, TemplateInfo,
};
