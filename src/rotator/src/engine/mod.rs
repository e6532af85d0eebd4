//! Rotation of a single discovered file and the work that follows it.

pub mod compress;
mod copytruncate;
mod rename;
pub mod retention;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::config::{PolicyConfig, RotationTechnique};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::budget::BudgetTracker;
use crate::discovery::DiscoveredFile;
use crate::error::RotateError;
use crate::eviction::EvictionSweeper;
use crate::journal::{ACTION_ROTATED, Journal};
use crate::metrics::{ErrorKind, MetricsSink};
use crate::tasks::TaskPool;

/// Highest numeric suffix probed for a rotation target.
pub const MAX_ROTATION_SUFFIX: u32 = 1000;

/// Which threshold made a file eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    Size,
    Age,
    Inactivity,
}

impl RotationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationTrigger::Size => "size",
            RotationTrigger::Age => "age",
            RotationTrigger::Inactivity => "inactivity",
        }
    }
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a file against its policy, in size, age, inactivity order.
/// Zero thresholds are disabled.
pub fn evaluate(
    file: &DiscoveredFile,
    policy: &PolicyConfig,
    now: SystemTime,
) -> Option<RotationTrigger> {
    let since_modified = now
        .duration_since(file.modified_at())
        .unwrap_or(Duration::ZERO);

    if !policy.size.is_zero() && file.size_bytes >= policy.size.as_u64() {
        Some(RotationTrigger::Size)
    } else if !policy.age.is_zero() && since_modified >= policy.age {
        Some(RotationTrigger::Age)
    } else if !policy.inactive.is_zero() && since_modified >= policy.inactive {
        Some(RotationTrigger::Inactivity)
    } else {
        None
    }
}

pub fn suffixed_path(path: &Path, index: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    match fs::symlink_metadata(path).await {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

/// First `<path>.N` with neither `<path>.N` nor its gzip artifact present.
pub(crate) async fn next_rotation_target(path: &Path) -> Result<PathBuf, RotateError> {
    for index in 1..=MAX_ROTATION_SUFFIX {
        let candidate = suffixed_path(path, index);
        if !exists(&candidate).await && !exists(&compress::gzip_path(&candidate)).await {
            return Ok(candidate);
        }
    }
    Err(RotateError::SuffixExhausted {
        path: path.to_path_buf(),
    })
}

/// Result of a rotation technique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rotated {
    pub target: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub source: PathBuf,
    pub target: PathBuf,
    pub bytes: u64,
    pub technique: RotationTechnique,
    pub trigger: RotationTrigger,
    pub namespace_usage: u64,
    pub eviction_scheduled: bool,
    pub compression_scheduled: bool,
}

pub struct RotationEngine {
    journal: Arc<Journal>,
    budget: Arc<BudgetTracker>,
    sweeper: Arc<EvictionSweeper>,
    metrics: Arc<dyn MetricsSink>,
    tasks: TaskPool,
}

impl RotationEngine {
    pub fn new(
        journal: Arc<Journal>,
        budget: Arc<BudgetTracker>,
        sweeper: Arc<EvictionSweeper>,
        metrics: Arc<dyn MetricsSink>,
        tasks: TaskPool,
    ) -> Self {
        Self {
            journal,
            budget,
            sweeper,
            metrics,
            tasks,
        }
    }

    pub fn budget(&self) -> &Arc<BudgetTracker> {
        &self.budget
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub fn tasks(&self) -> &TaskPool {
        &self.tasks
    }

    pub async fn process_file(
        &self,
        file: &DiscoveredFile,
        policy: &PolicyConfig,
    ) -> Result<Option<RotationOutcome>, RotateError> {
        self.process_file_at(file, policy, SystemTime::now()).await
    }

    /// Rotate `file` if `policy` makes it eligible at `now`, then prune its
    /// rotated siblings.
    ///
    /// Retention also runs when the technique fails part way. Suffix
    /// exhaustion returns before touching anything.
    pub async fn process_file_at(
        &self,
        file: &DiscoveredFile,
        policy: &PolicyConfig,
        now: SystemTime,
    ) -> Result<Option<RotationOutcome>, RotateError> {
        let Some(trigger) = evaluate(file, policy, now) else {
            return Ok(None);
        };
        let technique = policy.rotation_technique();
        debug!(
            file = %file.path.display(),
            trigger = %trigger,
            technique = %technique,
            "Rotating file"
        );

        let rotated = match technique {
            RotationTechnique::Rename => rename::rotate_by_rename(&file.path).await,
            RotationTechnique::CopyTruncate => {
                copytruncate::rotate_by_copy_truncate(&file.path).await
            }
        };
        let outcome = match rotated {
            Ok(rotated) => Ok(self
                .after_rotation(file, policy, technique, trigger, rotated)
                .await),
            Err(e @ RotateError::SuffixExhausted { .. }) => return Err(e),
            Err(e) => Err(e),
        };

        self.apply_retention(&file.path, policy, now).await;
        outcome.map(Some)
    }

    async fn apply_retention(&self, path: &Path, policy: &PolicyConfig, now: SystemTime) {
        let target = path.to_path_buf();
        let (keep_files, keep_days) = (policy.keep_files, policy.keep_days);
        let pruned = tokio::task::spawn_blocking(move || {
            retention::enforce_retention(&target, keep_files, keep_days, now)
        })
        .await;

        match pruned {
            Ok(Ok(pruned)) if pruned.removed_by_age + pruned.removed_by_count > 0 => {
                debug!(
                    file = %path.display(),
                    removed_by_age = pruned.removed_by_age,
                    removed_by_count = pruned.removed_by_count,
                    "Pruned rotated files"
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!(file = %path.display(), error = %e, "Retention skipped");
            }
            Err(e) => {
                debug!(file = %path.display(), error = %e, "Retention task failed");
            }
        }
    }

    async fn after_rotation(
        &self,
        file: &DiscoveredFile,
        policy: &PolicyConfig,
        technique: RotationTechnique,
        trigger: RotationTrigger,
        rotated: Rotated,
    ) -> RotationOutcome {
        if let Err(e) = self.journal.record(&file.path, ACTION_ROTATED).await {
            warn!(file = %file.path.display(), error = %e, "Failed to update journal");
            self.metrics.record_error(ErrorKind::Journal);
        }

        let namespace = file.namespace.as_str();
        self.metrics.record_rotation(namespace, technique);
        self.metrics.record_bytes_rotated(namespace, rotated.bytes);
        let namespace_usage = self.budget.add(namespace, rotated.bytes);
        self.metrics.set_namespace_usage(namespace, namespace_usage);

        let eviction_scheduled =
            self.budget.over_limit(namespace) && self.schedule_eviction(namespace);

        let compression_scheduled = !policy.compress_after.is_zero();
        if compression_scheduled {
            self.schedule_compression(rotated.target.clone(), policy.compress_after);
        }

        info!(
            file = %file.path.display(),
            target = %rotated.target.display(),
            namespace = %namespace,
            bytes = rotated.bytes,
            trigger = %trigger,
            technique = %technique,
            "Rotated file"
        );

        RotationOutcome {
            source: file.path.clone(),
            target: rotated.target,
            bytes: rotated.bytes,
            technique,
            trigger,
            namespace_usage,
            eviction_scheduled,
            compression_scheduled,
        }
    }

    fn schedule_eviction(&self, namespace: &str) -> bool {
        let Some(guard) = self.sweeper.try_begin(namespace) else {
            debug!(namespace = %namespace, "Eviction already running");
            return false;
        };
        info!(
            namespace = %namespace,
            usage = self.budget.get(namespace),
            limit = self.budget.limit(),
            "Namespace over budget, scheduling eviction"
        );

        let sweeper = self.sweeper.clone();
        let metrics = self.metrics.clone();
        let cancel = self.tasks.token();
        self.tasks.spawn_blocking(move || {
            let namespace = guard.namespace().to_string();
            let outcome = sweeper.sweep(&namespace, &cancel);
            for _ in 0..outcome.failed {
                metrics.record_error(ErrorKind::Eviction);
            }
            drop(guard);
        });
        true
    }

    fn schedule_compression(&self, target: PathBuf, delay: Duration) {
        let metrics = self.metrics.clone();
        let cancel = self.tasks.token();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(file = %target.display(), "Compression cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let source = target.clone();
            match tokio::task::spawn_blocking(move || compress::compress_gzip(&source)).await {
                Ok(Ok(compressed)) => {
                    debug!(file = %compressed.display(), "Compressed rotated file");
                }
                Ok(Err(e)) => {
                    warn!(file = %target.display(), error = %e, "Compression failed");
                    metrics.record_error(ErrorKind::Compress);
                }
                Err(e) => {
                    warn!(file = %target.display(), error = %e, "Compression task failed");
                    metrics.record_error(ErrorKind::Compress);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::ByteSize;

    fn file(size_bytes: u64, modified_ago: Duration, now: SystemTime) -> DiscoveredFile {
        DiscoveredFile::new(
            PathBuf::from("/logs/payments/pod1/app.log"),
            "payments".to_string(),
            "pod1".to_string(),
            size_bytes,
            now - modified_ago,
        )
    }

    fn policy(size: u64, age_secs: u64, inactive_secs: u64) -> PolicyConfig {
        PolicyConfig {
            size: ByteSize::bytes(size),
            age: Duration::from_secs(age_secs),
            inactive: Duration::from_secs(inactive_secs),
            ..Default::default()
        }
    }

    #[test]
    fn test_size_checked_first() {
        let now = SystemTime::now();
        let f = file(200, Duration::from_secs(10_000), now);
        assert_eq!(
            evaluate(&f, &policy(100, 60, 60), now),
            Some(RotationTrigger::Size)
        );
    }

    #[test]
    fn test_size_threshold_is_inclusive() {
        let now = SystemTime::now();
        let f = file(100, Duration::ZERO, now);
        assert_eq!(evaluate(&f, &policy(100, 0, 0), now), Some(RotationTrigger::Size));
        let f = file(99, Duration::ZERO, now);
        assert_eq!(evaluate(&f, &policy(100, 0, 0), now), None);
    }

    #[test]
    fn test_age_before_inactivity() {
        let now = SystemTime::now();
        let f = file(1, Duration::from_secs(120), now);
        assert_eq!(evaluate(&f, &policy(100, 60, 60), now), Some(RotationTrigger::Age));
        assert_eq!(
            evaluate(&f, &policy(100, 600, 60), now),
            Some(RotationTrigger::Inactivity)
        );
    }

    #[test]
    fn test_zero_thresholds_disable_checks() {
        let now = SystemTime::now();
        let f = file(u64::MAX / 2, Duration::from_secs(1_000_000), now);
        assert_eq!(evaluate(&f, &policy(0, 0, 0), now), None);
    }

    #[test]
    fn test_future_mtime_counts_as_fresh() {
        let now = SystemTime::now();
        let f = DiscoveredFile::new(
            PathBuf::from("/logs/payments/pod1/app.log"),
            "payments".to_string(),
            "pod1".to_string(),
            1,
            now + Duration::from_secs(3600),
        );
        assert_eq!(evaluate(&f, &policy(100, 60, 60), now), None);
    }

    #[test]
    fn test_suffixed_path() {
        assert_eq!(
            suffixed_path(Path::new("/logs/a/b/app.log"), 7),
            PathBuf::from("/logs/a/b/app.log.7")
        );
    }

    #[tokio::test]
    async fn test_next_target_skips_taken_and_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app.log");
        std::fs::write(&base, b"x").unwrap();
        assert_eq!(next_rotation_target(&base).await.unwrap(), suffixed_path(&base, 1));

        std::fs::write(suffixed_path(&base, 1), b"").unwrap();
        std::fs::write(compress::gzip_path(&suffixed_path(&base, 2)), b"").unwrap();
        assert_eq!(next_rotation_target(&base).await.unwrap(), suffixed_path(&base, 3));
    }
}
