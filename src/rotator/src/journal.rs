//! Persistent record of the last action taken per file.
//!
//! The journal is written for operators and is never read back to make
//! rotation decisions. It is stored as pretty-printed JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "files": {
//!     "/pang/logs/payments/pod1/app.log": "rotated"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::JournalError;

pub const JOURNAL_VERSION: u32 = 1;
pub const ACTION_ROTATED: &str = "rotated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalState {
    pub version: u32,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl Default for JournalState {
    fn default() -> Self {
        Self {
            version: JOURNAL_VERSION,
            files: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    state: Mutex<JournalState>,
}

impl Journal {
    /// Open the journal at `path`. A missing or unreadable file starts an
    /// empty journal.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<JournalState>(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring malformed journal");
                    JournalState::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No journal yet, starting empty");
                JournalState::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read journal, starting empty");
                JournalState::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `action` for `file` and rewrite the journal.
    ///
    /// The in-memory entry is kept even when the write fails.
    pub async fn record(&self, file: &Path, action: &str) -> Result<(), JournalError> {
        let mut state = self.state.lock().await;
        state
            .files
            .insert(file.to_string_lossy().into_owned(), action.to_string());
        self.save(&state).await
    }

    pub async fn last_action(&self, file: &Path) -> Option<String> {
        self.state
            .lock()
            .await
            .files
            .get(&*file.to_string_lossy())
            .cloned()
    }

    pub async fn snapshot(&self) -> JournalState {
        self.state.lock().await.clone()
    }

    // Called with the state lock held so concurrent records never interleave
    // their writes.
    async fn save(&self, state: &JournalState) -> Result<(), JournalError> {
        let encoded = serde_json::to_vec_pretty(state)?;
        let io_err = |source: io::Error| JournalError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, &encoded).await.map_err(io_err)?;
        fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_journal_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::load(dir.path().join("state.json")).await;
        let state = journal.snapshot().await;
        assert_eq!(state.version, JOURNAL_VERSION);
        assert!(state.files.is_empty());
    }

    #[tokio::test]
    async fn test_record_persists_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let journal = Journal::load(&path).await;

        journal
            .record(Path::new("/logs/payments/pod1/app.log"), ACTION_ROTATED)
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["files"]["/logs/payments/pod1/app.log"], "rotated");
        assert!(!dir.path().join("nested").join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reload_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let journal = Journal::load(&path).await;
            journal
                .record(Path::new("/logs/a/b/c.log"), ACTION_ROTATED)
                .await
                .unwrap();
        }

        let journal = Journal::load(&path).await;
        assert_eq!(
            journal.last_action(Path::new("/logs/a/b/c.log")).await,
            Some("rotated".to_string())
        );
        assert_eq!(journal.last_action(Path::new("/logs/x/y/z.log")).await, None);
    }

    #[tokio::test]
    async fn test_malformed_journal_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();

        let journal = Journal::load(&path).await;
        assert!(journal.snapshot().await.files.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_entry() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the parent directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let journal = Journal::load(blocker.join("state.json")).await;

        let result = journal
            .record(Path::new("/logs/a/b/c.log"), ACTION_ROTATED)
            .await;
        assert!(result.is_err());
        assert_eq!(
            journal.last_action(Path::new("/logs/a/b/c.log")).await,
            Some("rotated".to_string())
        );
    }

    #[tokio::test]
    async fn test_concurrent_records() {
        let dir = tempfile::tempdir().unwrap();
        let journal = Arc::new(Journal::load(dir.path().join("state.json")).await);

        let mut handles = Vec::new();
        for i in 0..16 {
            let journal = journal.clone();
            handles.push(tokio::spawn(async move {
                let file = format!("/logs/ns/pod/{i}.log");
                journal.record(Path::new(&file), ACTION_ROTATED).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let reloaded = Journal::load(dir.path().join("state.json")).await;
        assert_eq!(reloaded.snapshot().await.files.len(), 16);
    }
}
