//! Rule contract, registry and built-in rules for readiness scoring.
//!
//! A rule inspects a dataset through the `Dataset` trait and returns a
//! bounded sub-score plus findings. Rules are built by the [`RuleRegistry`]
//! from configuration; the registry is an explicit object populated by
//! [`RuleRegistry::with_builtin_rules`], with a read-only process-wide
//! instance available through [`RuleRegistry::global`].

pub mod errors;
pub mod params;
pub mod registry;
pub mod rule;
pub mod rules;

pub use errors::RuleError;
pub use params::{ParamKind, ParamSpec, RuleParams};
pub use registry::{RuleRegistry, RuleSpec};
pub use rule::{Rule, RuleContext, RuleDescriptor, RuleResult};
