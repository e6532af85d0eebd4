//! Compiled override tables shared by discovery and policy resolution.

use std::collections::HashMap;

use common::config::{BudgetConfig, DiscoveryFilter, Overrides, PolicyConfig};
use tracing::warn;

use crate::pattern::{CandidatePath, PathFilter, PathPattern, PatternError};

#[derive(Debug, Clone, Default)]
pub struct NamespaceRules {
    pub policy: Option<PolicyConfig>,
    pub discovery: Option<PathFilter>,
    pub budgets: Option<BudgetConfig>,
}

#[derive(Debug, Clone)]
struct PathRule {
    pattern: PathPattern,
    policy: Option<PolicyConfig>,
    discovery: Option<PathFilter>,
}

/// Namespace and path overrides with every glob compiled up front.
///
/// Path rules keep their configured order; lookups return the first rule
/// that carries the requested section and whose pattern matches.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    namespaces: HashMap<String, NamespaceRules>,
    paths: Vec<PathRule>,
}

fn compile_filter(filter: &Option<DiscoveryFilter>) -> Result<Option<PathFilter>, PatternError> {
    filter
        .as_ref()
        .map(|f| PathFilter::compile(&f.include, &f.exclude))
        .transpose()
}

impl OverrideSet {
    pub fn compile(overrides: &Overrides) -> Result<Self, PatternError> {
        let mut namespaces = HashMap::with_capacity(overrides.namespaces.len());
        for (name, ns) in &overrides.namespaces {
            namespaces.insert(
                name.clone(),
                NamespaceRules {
                    policy: ns.policy.clone(),
                    discovery: compile_filter(&ns.discovery)?,
                    budgets: ns.budgets.clone(),
                },
            );
        }

        let paths = overrides
            .paths
            .iter()
            .map(|rule| {
                Ok(PathRule {
                    pattern: PathPattern::new(&rule.pattern)?,
                    policy: rule.policy.clone(),
                    discovery: compile_filter(&rule.discovery)?,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self { namespaces, paths })
    }

    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceRules> {
        self.namespaces.get(namespace)
    }

    pub fn namespace_policy(&self, namespace: &str) -> Option<&PolicyConfig> {
        self.namespace(namespace).and_then(|ns| ns.policy.as_ref())
    }

    pub fn namespace_filter(&self, namespace: &str) -> Option<&PathFilter> {
        self.namespace(namespace).and_then(|ns| ns.discovery.as_ref())
    }

    pub fn path_policy(&self, candidate: &CandidatePath) -> Option<&PolicyConfig> {
        self.paths
            .iter()
            .filter(|rule| rule.policy.is_some())
            .find(|rule| rule.pattern.matches(candidate))
            .and_then(|rule| rule.policy.as_ref())
    }

    pub fn path_filter(&self, candidate: &CandidatePath) -> Option<&PathFilter> {
        self.paths
            .iter()
            .filter(|rule| rule.discovery.is_some())
            .find(|rule| rule.pattern.matches(candidate))
            .and_then(|rule| rule.discovery.as_ref())
    }

    /// Namespaces that configure their own budget.
    pub fn budget_overrides(&self) -> impl Iterator<Item = (&str, &BudgetConfig)> {
        self.namespaces
            .iter()
            .filter_map(|(name, ns)| ns.budgets.as_ref().map(|b| (name.as_str(), b)))
    }

    /// Warn once per namespace budget override; eviction only honors the
    /// global limit.
    pub fn warn_unused_budgets(&self) -> usize {
        let mut count = 0;
        for (namespace, budget) in self.budget_overrides() {
            warn!(
                namespace = %namespace,
                configured = %budget.per_namespace_bytes,
                "Per-namespace budget override is not enforced; the global budget applies"
            );
            count += 1;
        }
        count
    }
}
