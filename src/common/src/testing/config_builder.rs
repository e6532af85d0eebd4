//! Test configuration builder for scratch log trees.

use std::path::Path;
use std::time::Duration;

use crate::config::{
    ByteSize, Configuration, DiscoveryFilter, NamespaceOverride, PathOverride, PolicyConfig,
    RotationTechnique,
};

/// Builder for configurations pointing at a temporary log tree.
///
/// Starts from the production defaults with compression disabled, so tests
/// only see background work they asked for.
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let temp = tempfile::tempdir().unwrap();
/// let config = TestConfigBuilder::new(temp.path())
///     .with_size_threshold(ByteSize::mib(1))
///     .with_namespace_policy("payments", PolicyConfig { keep_files: 2, ..Default::default() })
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl TestConfigBuilder {
    /// Create a builder rooted at `root`, journaling into `root/.state/journal.json`.
    pub fn new(root: &Path) -> Self {
        let mut config = Configuration::default();
        config.defaults.discovery.path = root.to_path_buf();
        config.defaults.policy.compress_after = Duration::ZERO;
        config.daemon.journal_path = root.join(".state").join("journal.json");
        config.daemon.listen = "127.0.0.1:0".to_string();
        Self { config }
    }

    pub fn with_size_threshold(mut self, size: ByteSize) -> Self {
        self.config.defaults.policy.size = size;
        self
    }

    /// Disable the age and inactivity triggers so only size rotates files.
    pub fn size_only(mut self) -> Self {
        self.config.defaults.policy.age = Duration::ZERO;
        self.config.defaults.policy.inactive = Duration::ZERO;
        self
    }

    pub fn with_technique(mut self, technique: RotationTechnique) -> Self {
        self.config.defaults.policy.technique = Some(technique);
        self
    }

    pub fn with_keep_files(mut self, keep_files: u32) -> Self {
        self.config.defaults.policy.keep_files = keep_files;
        self
    }

    pub fn with_keep_days(mut self, keep_days: u32) -> Self {
        self.config.defaults.policy.keep_days = keep_days;
        self
    }

    pub fn with_compress_after(mut self, delay: Duration) -> Self {
        self.config.defaults.policy.compress_after = delay;
        self
    }

    pub fn with_budget(mut self, bytes: ByteSize) -> Self {
        self.config.defaults.budgets.per_namespace_bytes = bytes;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.config.defaults.discovery.max_depth = max_depth;
        self
    }

    pub fn with_include(mut self, pattern: &str) -> Self {
        self.config
            .defaults
            .discovery
            .include
            .push(pattern.to_string());
        self
    }

    pub fn with_exclude(mut self, pattern: &str) -> Self {
        self.config
            .defaults
            .discovery
            .exclude
            .push(pattern.to_string());
        self
    }

    pub fn with_namespace_policy(mut self, namespace: &str, policy: PolicyConfig) -> Self {
        self.namespace_entry(namespace).policy = Some(policy);
        self
    }

    pub fn with_namespace_discovery(mut self, namespace: &str, filter: DiscoveryFilter) -> Self {
        self.namespace_entry(namespace).discovery = Some(filter);
        self
    }

    /// Append a path override; order of calls is the match order.
    pub fn with_path_override(
        mut self,
        pattern: &str,
        policy: Option<PolicyConfig>,
        discovery: Option<DiscoveryFilter>,
    ) -> Self {
        self.config.overrides.paths.push(PathOverride {
            pattern: pattern.to_string(),
            policy,
            discovery,
        });
        self
    }

    pub fn with_reconciled_budget(mut self) -> Self {
        self.config.daemon.reconcile_budget_on_startup = true;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }

    fn namespace_entry(&mut self, namespace: &str) -> &mut NamespaceOverride {
        self.config
            .overrides
            .namespaces
            .entry(namespace.to_string())
            .or_default()
    }
}
