//! Oldest-first deletion of archives once a namespace is over budget.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::engine::retention::is_rotated_artifact;

/// A rotated file found below a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: SystemTime,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub cancelled: bool,
}

type InProgress = Arc<Mutex<HashSet<String>>>;

/// Marks a namespace as being swept until dropped.
#[derive(Debug)]
pub struct SweepGuard {
    namespace: String,
    in_progress: InProgress,
}

impl SweepGuard {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.namespace);
    }
}

#[derive(Debug)]
pub struct EvictionSweeper {
    root: PathBuf,
    limit: u64,
    in_progress: InProgress,
}

impl EvictionSweeper {
    pub fn new(root: impl Into<PathBuf>, limit: u64) -> Self {
        Self {
            root: root.into(),
            limit,
            in_progress: Arc::default(),
        }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Claim the namespace for a sweep. Returns `None` while another sweep of
    /// the same namespace holds its guard.
    pub fn try_begin(&self, namespace: &str) -> Option<SweepGuard> {
        let mut in_progress = self
            .in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !in_progress.insert(namespace.to_string()) {
            return None;
        }
        Some(SweepGuard {
            namespace: namespace.to_string(),
            in_progress: self.in_progress.clone(),
        })
    }

    pub fn is_running(&self, namespace: &str) -> bool {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(namespace)
    }

    /// Archives of `namespace`, oldest first.
    pub fn namespace_archives(&self, namespace: &str) -> Vec<Archive> {
        let mut archives: Vec<Archive> = self
            .walk_archives(Some(namespace))
            .into_iter()
            .map(|(_, archive)| archive)
            .collect();
        archives.sort_by_key(|a| a.modified_at);
        archives
    }

    /// Archived bytes on disk per namespace.
    pub fn archived_bytes_by_namespace(&self) -> HashMap<String, u64> {
        let mut totals = HashMap::new();
        for (namespace, archive) in self.walk_archives(None) {
            *totals.entry(namespace).or_insert(0u64) += archive.size_bytes;
        }
        totals
    }

    /// Delete the namespace's oldest archives until their total size is at
    /// or below the limit. Blocking; run it off the async workers.
    ///
    /// `bytes_after` counts every attempted deletion as freed.
    pub fn sweep(&self, namespace: &str, cancel: &CancellationToken) -> SweepOutcome {
        let outcome = self.evict(self.namespace_archives(namespace), cancel);
        info!(
            namespace = %namespace,
            candidates = outcome.candidates,
            deleted = outcome.deleted,
            failed = outcome.failed,
            bytes_before = outcome.bytes_before,
            bytes_after = outcome.bytes_after,
            cancelled = outcome.cancelled,
            "Eviction sweep finished"
        );
        outcome
    }

    /// Delete from the front of `archives` until within the limit.
    fn evict(&self, archives: Vec<Archive>, cancel: &CancellationToken) -> SweepOutcome {
        let total: u64 = archives.iter().map(|a| a.size_bytes).sum();
        let mut outcome = SweepOutcome {
            candidates: archives.len(),
            bytes_before: total,
            bytes_after: total,
            ..Default::default()
        };

        for archive in archives {
            if outcome.bytes_after <= self.limit {
                break;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            match std::fs::remove_file(&archive.path) {
                Ok(()) => {
                    debug!(path = %archive.path.display(), size = archive.size_bytes, "Evicted archive");
                    outcome.deleted += 1;
                }
                Err(e) => {
                    debug!(path = %archive.path.display(), error = %e, "Failed to evict archive");
                    outcome.failed += 1;
                }
            }
            // Subtracted either way so an undeletable archive cannot stall the sweep
            outcome.bytes_after = outcome.bytes_after.saturating_sub(archive.size_bytes);
        }
        outcome
    }

    fn walk_archives(&self, namespace: Option<&str>) -> Vec<(String, Archive)> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| keep_descending(entry, namespace));

        let mut archives = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry during eviction walk");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ns) = archive_namespace(&self.root, entry.path()) else {
                continue;
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            archives.push((
                ns,
                Archive {
                    path: entry.into_path(),
                    size_bytes: metadata.len(),
                    modified_at: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                },
            ));
        }
        archives
    }
}

fn keep_descending(entry: &DirEntry, namespace: Option<&str>) -> bool {
    match namespace {
        Some(ns) if entry.depth() == 1 && entry.file_type().is_dir() => {
            entry.file_name().to_string_lossy() == ns
        }
        _ => true,
    }
}

/// Namespace of an archive at `<root>/<namespace>/<pod>/.../<name>`.
fn archive_namespace(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.len() < 3 || !is_rotated_artifact(parts.last()?) {
        return None;
    }
    Some(parts[0].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::Duration;

    fn write_archive(root: &Path, relative: &str, size: usize, age_secs: u64) -> PathBuf {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![b'x'; size]).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
        path
    }

    #[test]
    fn test_sweep_deletes_oldest_until_within_limit() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let oldest = write_archive(root, "payments/pod1/app.log.3.gz", 100, 300);
        let middle = write_archive(root, "payments/pod1/app.log.2", 100, 200);
        let newest = write_archive(root, "payments/pod2/app.log.1", 100, 100);
        let live = write_archive(root, "payments/pod1/app.log", 500, 1000);
        let other_ns = write_archive(root, "search/pod1/app.log.1", 100, 1000);

        let sweeper = EvictionSweeper::new(root, 150);
        let outcome = sweeper.sweep("payments", &CancellationToken::new());

        assert_eq!(outcome.candidates, 3);
        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.bytes_before, 300);
        assert_eq!(outcome.bytes_after, 100);
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(newest.exists());
        assert!(live.exists());
        assert!(other_ns.exists());
    }

    #[test]
    fn test_sweep_within_limit_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "payments/pod1/app.log.1", 100, 10);

        let sweeper = EvictionSweeper::new(dir.path(), 100);
        let outcome = sweeper.sweep("payments", &CancellationToken::new());
        assert_eq!(outcome.deleted, 0);
    }

    #[test]
    fn test_cancelled_sweep_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "payments/pod1/app.log.1", 100, 10);
        write_archive(dir.path(), "payments/pod1/app.log.2", 100, 20);

        let token = CancellationToken::new();
        token.cancel();
        let sweeper = EvictionSweeper::new(dir.path(), 0);
        let outcome = sweeper.sweep("payments", &token);
        assert!(outcome.cancelled);
        assert_eq!(outcome.deleted, 0);
    }

    #[test]
    fn test_shallow_files_are_not_archives() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = write_archive(dir.path(), "payments/app.log.1", 100, 10);

        let sweeper = EvictionSweeper::new(dir.path(), 0);
        assert!(sweeper.namespace_archives("payments").is_empty());
        sweeper.sweep("payments", &CancellationToken::new());
        assert!(shallow.exists());
    }

    #[test]
    fn test_failed_delete_still_counts_as_freed() {
        let dir = tempfile::tempdir().unwrap();
        let stuck = dir.path().join("payments/pod1/app.log.1");
        fs::create_dir_all(&stuck).unwrap();
        let gone = write_archive(dir.path(), "payments/pod1/app.log.2", 100, 10);

        let archives = vec![
            Archive {
                path: stuck.clone(),
                size_bytes: 100,
                modified_at: SystemTime::UNIX_EPOCH,
            },
            Archive {
                path: gone.clone(),
                size_bytes: 100,
                modified_at: SystemTime::now(),
            },
        ];
        let sweeper = EvictionSweeper::new(dir.path(), 0);
        let outcome = sweeper.evict(archives, &CancellationToken::new());

        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.bytes_after, 0);
        assert!(stuck.exists());
        assert!(!gone.exists());
    }

    #[test]
    fn test_single_flight_guard() {
        let sweeper = EvictionSweeper::new("/nonexistent", 0);
        let guard = sweeper.try_begin("payments").unwrap();
        assert_eq!(guard.namespace(), "payments");
        assert!(sweeper.is_running("payments"));
        assert!(sweeper.try_begin("payments").is_none());
        assert!(sweeper.try_begin("search").is_some());

        drop(guard);
        assert!(!sweeper.is_running("payments"));
        assert!(sweeper.try_begin("payments").is_some());
    }

    #[test]
    fn test_archived_bytes_by_namespace() {
        let dir = tempfile::tempdir().unwrap();
        write_archive(dir.path(), "payments/pod1/app.log.1", 10, 10);
        write_archive(dir.path(), "payments/pod2/app.log.1.gz", 5, 10);
        write_archive(dir.path(), "search/pod1/app.log.1", 7, 10);
        write_archive(dir.path(), "search/pod1/app.log", 1000, 10);

        let sweeper = EvictionSweeper::new(dir.path(), 0);
        let totals = sweeper.archived_bytes_by_namespace();
        assert_eq!(totals.get("payments"), Some(&15));
        assert_eq!(totals.get("search"), Some(&7));
    }
}
