use std::collections::HashMap;
use std::sync::LazyLock;

use readyscore_core::Dimension;

use crate::errors::RuleError;
use crate::params::RuleParams;
use crate::rule::{Rule, RuleDescriptor};
use crate::rules;

/// Constructor building a rule instance from validated params.
pub type RuleBuilder = fn(RuleParams) -> Result<Box<dyn Rule>, RuleError>;

/// Registration entry: descriptor plus constructor.
#[derive(Clone, Copy)]
pub struct RuleSpec {
    pub descriptor: &'static RuleDescriptor,
    pub build: RuleBuilder,
}

impl std::fmt::Debug for RuleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSpec")
            .field("id", &self.descriptor.id)
            .finish()
    }
}

static GLOBAL: LazyLock<Result<RuleRegistry, RuleError>> =
    LazyLock::new(RuleRegistry::with_builtin_rules);

/// Catalog of rule constructors keyed by identifier.
///
/// Registration order is kept so listings and default configurations are stable.
#[derive(Debug, Default, Clone)]
pub struct RuleRegistry {
    specs: Vec<RuleSpec>,
    index: HashMap<&'static str, usize>,
}

impl RuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in rule.
    pub fn with_builtin_rules() -> Result<Self, RuleError> {
        let mut registry = Self::new();
        rules::register(&mut registry)?;
        Ok(registry)
    }

    /// Shared read-only registry with the built-in rules, built on first use.
    pub fn global() -> Result<&'static RuleRegistry, RuleError> {
        GLOBAL.as_ref().map_err(Clone::clone)
    }

    pub fn register(&mut self, spec: RuleSpec) -> Result<(), RuleError> {
        check_identifier(spec.descriptor)?;
        if self.index.contains_key(spec.descriptor.id) {
            return Err(RuleError::DuplicateRule(spec.descriptor.id.to_string()));
        }
        self.index.insert(spec.descriptor.id, self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Register, replacing an existing rule with the same identifier in place.
    pub fn register_override(&mut self, spec: RuleSpec) -> Result<(), RuleError> {
        check_identifier(spec.descriptor)?;
        match self.index.get(spec.descriptor.id) {
            Some(&idx) => self.specs[idx] = spec,
            None => {
                self.index.insert(spec.descriptor.id, self.specs.len());
                self.specs.push(spec);
            }
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn spec(&self, id: &str) -> Result<&RuleSpec, RuleError> {
        self.index
            .get(id)
            .map(|&idx| &self.specs[idx])
            .ok_or_else(|| RuleError::UnknownRule(id.to_string()))
    }

    /// Build a rule, merging its default params with `overrides`.
    pub fn get_rule(
        &self,
        id: &str,
        overrides: Option<&serde_json::Value>,
    ) -> Result<Box<dyn Rule>, RuleError> {
        let spec = self.spec(id)?;
        let descriptor = spec.descriptor;
        let params = RuleParams::resolve(
            descriptor.id,
            descriptor.params,
            descriptor.default_weight,
            overrides,
        )?;
        tracing::debug!(
            event = "rule_built",
            rule = descriptor.id,
            enabled = params.enabled(),
            weight = params.weight()
        );
        (spec.build)(params)
    }

    /// Identifiers of a dimension's rules in registration order.
    pub fn rules_for_dimension(&self, dimension: Dimension) -> Vec<&'static str> {
        self.specs
            .iter()
            .filter(|spec| spec.descriptor.dimension == dimension)
            .map(|spec| spec.descriptor.id)
            .collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static RuleDescriptor> + '_ {
        self.specs.iter().map(|spec| spec.descriptor)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

fn check_identifier(descriptor: &RuleDescriptor) -> Result<(), RuleError> {
    let prefix = descriptor.id.split_once('.').map(|(prefix, _)| prefix);
    if prefix != Some(descriptor.dimension.as_str()) {
        return Err(RuleError::invalid_params(
            descriptor.id,
            format!(
                "identifier must start with '{}.'",
                descriptor.dimension.as_str()
            ),
        ));
    }
    Ok(())
}
