//! Walks the log tree and reports candidate files.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::config::DiscoveryConfig;
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::engine::retention::is_rotated_artifact;
use crate::overrides::OverrideSet;
use crate::pattern::{CandidatePath, PathFilter, PatternError};

/// A log file found by a scan. Recomputed every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub namespace: String,
    pub pod: String,
    pub size_bytes: u64,
    pub modified_at_ms: i64,
}

impl DiscoveredFile {
    pub fn new(
        path: PathBuf,
        namespace: String,
        pod: String,
        size_bytes: u64,
        modified: SystemTime,
    ) -> Self {
        Self {
            path,
            namespace,
            pod,
            size_bytes,
            modified_at_ms: to_millis(modified),
        }
    }

    pub fn modified_at(&self) -> SystemTime {
        let offset = Duration::from_millis(self.modified_at_ms.unsigned_abs());
        if self.modified_at_ms >= 0 {
            UNIX_EPOCH + offset
        } else {
            UNIX_EPOCH - offset
        }
    }
}

fn to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_millis())
            .map(|ms| -ms)
            .unwrap_or(i64::MIN),
    }
}

/// Namespace and pod of `path`, which must sit at least
/// `<root>/<namespace>/<pod>/<file>` deep.
pub fn namespace_and_pod(root: &Path, path: &Path) -> Option<(String, String)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return None,
        }
    }
    if parts.len() < 3 {
        return None;
    }
    let mut parts = parts.into_iter();
    Some((parts.next()?, parts.next()?))
}

pub struct Discovery {
    root: PathBuf,
    max_depth: usize,
    filter: PathFilter,
    overrides: Arc<OverrideSet>,
}

impl Discovery {
    pub fn new(config: &DiscoveryConfig, overrides: Arc<OverrideSet>) -> Result<Self, PatternError> {
        Ok(Self {
            root: config.path.clone(),
            max_depth: config.max_depth,
            filter: PathFilter::compile(&config.include, &config.exclude)?,
            overrides,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree once.
    ///
    /// Only an unusable root is an error; unreadable entries are skipped.
    pub fn scan(&self) -> io::Result<Vec<DiscoveredFile>> {
        let canonical_root = fs::canonicalize(&self.root)?;
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.too_deep(entry));

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            // Symlinks report their own type since links are not followed
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(file) = self.inspect(&entry, &canonical_root) {
                files.push(file);
            }
        }
        Ok(files)
    }

    fn too_deep(&self, entry: &DirEntry) -> bool {
        self.max_depth > 0 && entry.file_type().is_dir() && entry.depth() > self.max_depth
    }

    fn inspect(&self, entry: &DirEntry, canonical_root: &Path) -> Option<DiscoveredFile> {
        let path = entry.path();
        if is_archive(path) {
            trace!(path = %path.display(), "Skipping rotated archive");
            return None;
        }
        match fs::canonicalize(path) {
            Ok(resolved) if resolved.starts_with(canonical_root) => {}
            Ok(resolved) => {
                debug!(path = %path.display(), resolved = %resolved.display(), "Skipping file outside root");
                return None;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unresolvable file");
                return None;
            }
        }

        let (namespace, pod) = namespace_and_pod(&self.root, path)?;
        let candidate = CandidatePath::new(&self.root, path);
        if !self.admits(&namespace, &candidate) {
            trace!(path = %path.display(), "Filtered out");
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping file without metadata");
                return None;
            }
        };
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);

        Some(DiscoveredFile::new(
            path.to_path_buf(),
            namespace,
            pod,
            metadata.len(),
            modified,
        ))
    }

    /// Global filter, then the namespace filter, then the first path rule
    /// carrying one. Each must admit the path on its own.
    fn admits(&self, namespace: &str, candidate: &CandidatePath) -> bool {
        self.filter.allows(candidate)
            && self
                .overrides
                .namespace_filter(namespace)
                .is_none_or(|filter| filter.allows(candidate))
            && self
                .overrides
                .path_filter(candidate)
                .is_none_or(|filter| filter.allows(candidate))
    }
}

/// Our own output: `<name>.<digits>`, `<name>.<digits>.gz` or any other `.gz`.
fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
        || path
            .file_name()
            .is_some_and(|name| is_rotated_artifact(&name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_and_pod() {
        let root = Path::new("/logs");
        assert_eq!(
            namespace_and_pod(root, Path::new("/logs/payments/pod1/app.log")),
            Some(("payments".to_string(), "pod1".to_string()))
        );
        assert_eq!(
            namespace_and_pod(root, Path::new("/logs/payments/pod1/nested/app.log")),
            Some(("payments".to_string(), "pod1".to_string()))
        );
        assert_eq!(namespace_and_pod(root, Path::new("/logs/payments/app.log")), None);
        assert_eq!(namespace_and_pod(root, Path::new("/other/a/b/c.log")), None);
    }

    #[test]
    fn test_millis_round_trip_keeps_precision() {
        let stamp = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let file = DiscoveredFile::new(
            PathBuf::from("/logs/a/b/c.log"),
            "a".to_string(),
            "b".to_string(),
            0,
            stamp,
        );
        assert_eq!(file.modified_at_ms, 1_700_000_000_123);
        assert_eq!(file.modified_at(), stamp);
    }

    #[test]
    fn test_archives_are_recognized() {
        assert!(is_archive(Path::new("/logs/a/b/app.log.1")));
        assert!(is_archive(Path::new("/logs/a/b/app.log.12.gz")));
        assert!(is_archive(Path::new("/logs/a/b/bundle.gz")));
        assert!(!is_archive(Path::new("/logs/a/b/app.log")));
        assert!(!is_archive(Path::new("/logs/a/b/app.log.old")));
    }

    #[test]
    fn test_pre_epoch_mtime() {
        let stamp = UNIX_EPOCH - Duration::from_millis(5000);
        assert_eq!(to_millis(stamp), -5000);
    }
}
