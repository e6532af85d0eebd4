//! Effective policy resolution: defaults, then namespace, then path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::config::PolicyConfig;

use crate::metrics::{MetricsSink, OverrideKind};
use crate::overrides::OverrideSet;
use crate::pattern::CandidatePath;

/// Copy every non-zero field of `overlay` onto `base`.
pub fn merge_policy(base: &mut PolicyConfig, overlay: &PolicyConfig) {
    if !overlay.size.is_zero() {
        base.size = overlay.size;
    }
    if !overlay.age.is_zero() {
        base.age = overlay.age;
    }
    if !overlay.inactive.is_zero() {
        base.inactive = overlay.inactive;
    }
    if overlay.keep_files != 0 {
        base.keep_files = overlay.keep_files;
    }
    if overlay.keep_days != 0 {
        base.keep_days = overlay.keep_days;
    }
    if !overlay.compress_after.is_zero() {
        base.compress_after = overlay.compress_after;
    }
    if overlay.technique.is_some() {
        base.technique = overlay.technique;
    }
}

pub struct PolicyResolver {
    root: PathBuf,
    defaults: PolicyConfig,
    overrides: Arc<OverrideSet>,
    metrics: Arc<dyn MetricsSink>,
}

impl PolicyResolver {
    pub fn new(
        root: impl Into<PathBuf>,
        defaults: PolicyConfig,
        overrides: Arc<OverrideSet>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            root: root.into(),
            defaults,
            overrides,
            metrics,
        }
    }

    /// Policy for the file at `path` in `namespace`.
    ///
    /// Only the first path override carrying a policy is applied. Each
    /// applied override bumps its counter.
    pub fn effective_policy(&self, namespace: &str, path: &Path) -> PolicyConfig {
        let mut effective = self.defaults.clone();

        if let Some(policy) = self.overrides.namespace_policy(namespace) {
            merge_policy(&mut effective, policy);
            self.metrics.record_override_applied(OverrideKind::Namespace);
        }

        let candidate = CandidatePath::new(&self.root, path);
        if let Some(policy) = self.overrides.path_policy(&candidate) {
            merge_policy(&mut effective, policy);
            self.metrics.record_override_applied(OverrideKind::Path);
        }

        effective
    }
}
