//! Pruning of rotated siblings by age and count.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
const GZIP_SUFFIX: &str = ".gz";

/// Split a rotated artifact name `<stem>.<digits>` or `<stem>.<digits>.gz`
/// into its stem.
pub fn rotated_stem(name: &str) -> Option<&str> {
    let name = name.strip_suffix(GZIP_SUFFIX).unwrap_or(name);
    let (stem, index) = name.rsplit_once('.')?;
    if stem.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(stem)
}

pub fn is_rotated_artifact(name: &str) -> bool {
    rotated_stem(name).is_some()
}

/// True if `candidate` is a rotated sibling of the live file `base_name`.
pub fn is_rotated_sibling(base_name: &str, candidate: &str) -> bool {
    rotated_stem(candidate) == Some(base_name)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionOutcome {
    pub removed_by_age: usize,
    pub removed_by_count: usize,
}

/// Prune rotated siblings of `path`.
///
/// Siblings older than `keep_days` go first, then the oldest remaining ones
/// until at most `keep_files` are left. A zero disables the matching pass.
pub fn enforce_retention(
    path: &Path,
    keep_files: u32,
    keep_days: u32,
    now: SystemTime,
) -> io::Result<RetentionOutcome> {
    let mut outcome = RetentionOutcome::default();
    let (Some(dir), Some(base)) = (path.parent(), path.file_name()) else {
        return Ok(outcome);
    };
    let base = base.to_string_lossy();
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };

    if keep_days > 0 {
        let max_age = Duration::from_secs(u64::from(keep_days) * SECONDS_PER_DAY);
        if let Some(cutoff) = now.checked_sub(max_age) {
            for (sibling, modified) in list_siblings(dir, &base)? {
                if modified < cutoff && remove_quietly(&sibling) {
                    outcome.removed_by_age += 1;
                }
            }
        }
    }

    if keep_files > 0 {
        let mut siblings = list_siblings(dir, &base)?;
        let keep = keep_files as usize;
        if siblings.len() > keep {
            siblings.sort_by_key(|(_, modified)| *modified);
            let excess = siblings.len() - keep;
            for (sibling, _) in siblings.into_iter().take(excess) {
                if remove_quietly(&sibling) {
                    outcome.removed_by_count += 1;
                }
            }
        }
    }

    Ok(outcome)
}

fn list_siblings(dir: &Path, base: &str) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut siblings = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        if !is_rotated_sibling(base, &name.to_string_lossy()) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        siblings.push((entry.path(), modified));
    }
    Ok(siblings)
}

fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to remove rotated file");
            false
        }
    }
}
