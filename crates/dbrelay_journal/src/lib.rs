//! Append-only query journal with size-based rotation and deterministic
//! replay (§4.5). Every line is one JSON-encoded `JournalEntry`.

mod replay;
mod timestamp;

pub use replay::{ReplayError, ReplayReport, replay};

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_BACKUP_COUNT: u32 = 5;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One executed statement, written once and never mutated (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: String,
    pub sql: String,
    pub params: JsonValue,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Inner {
    file: File,
    path: PathBuf,
}

pub struct QueryJournal {
    max_bytes: u64,
    backup_count: u32,
    inner: Mutex<Inner>,
}

impl QueryJournal {
    /// Opens (creating parent directories as needed) a journal file for
    /// appending.
    pub fn open(path: impl Into<PathBuf>, max_bytes: u64, backup_count: u32) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            max_bytes,
            backup_count,
            inner: Mutex::new(Inner { file, path }),
        })
    }

    pub fn open_with_defaults(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        Self::open(path, DEFAULT_MAX_BYTES, DEFAULT_BACKUP_COUNT)
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().expect("journal mutex poisoned").path.clone()
    }

    /// Appends one entry, rotating first if the file has grown past
    /// `max_bytes`. A write failure is logged, not propagated — the journal
    /// is best-effort bookkeeping, never the source of truth for a request's
    /// outcome (§4.5).
    pub fn write(
        &self,
        sql: &str,
        params: JsonValue,
        transaction_id: Option<&str>,
        success: bool,
        error: Option<&str>,
    ) {
        let mut inner = self.inner.lock().expect("journal mutex poisoned");
        if let Err(e) = self.rotate_if_needed(&mut inner) {
            log::warn!("query journal rotation failed: {e}");
        }

        let entry = JournalEntry {
            ts: timestamp::now_iso8601(),
            sql: sql.to_string(),
            params,
            success,
            transaction_id: transaction_id.map(str::to_string),
            error: error.map(str::to_string),
        };
        let line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("query journal serialization failed: {e}");
                return;
            }
        };
        if let Err(e) = writeln!(inner.file, "{line}").and_then(|_| inner.file.flush()) {
            log::warn!("query journal write failed: {e}");
        }
    }

    fn rotate_if_needed(&self, inner: &mut Inner) -> Result<(), JournalError> {
        if self.max_bytes == 0 {
            return Ok(());
        }
        inner.file.flush()?;
        let size = std::fs::metadata(&inner.path).map(|m| m.len()).unwrap_or(0);
        if size < self.max_bytes {
            return Ok(());
        }

        for i in (1..self.backup_count).rev() {
            let old = backup_path(&inner.path, i);
            let new = backup_path(&inner.path, i + 1);
            if old.exists() {
                if new.exists() {
                    std::fs::remove_file(&new)?;
                }
                std::fs::rename(&old, &new)?;
            }
        }
        std::fs::rename(&inner.path, backup_path(&inner.path, 1))?;
        inner.file = OpenOptions::new().create(true).append(true).open(&inner.path)?;
        Ok(())
    }
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(format!(".{n}"));
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn lines_of(path: &Path) -> Vec<String> {
        let f = File::open(path).unwrap();
        std::io::BufReader::new(f).lines().map(|l| l.unwrap()).collect()
    }

    #[test]
    fn write_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = QueryJournal::open_with_defaults(&path).unwrap();

        journal.write("INSERT INTO t(v) VALUES(1)", serde_json::json!(null), None, true, None);
        journal.write("INSERT INTO t(v) VALUES(2)", serde_json::json!([2]), None, false, Some("boom"));

        let lines = lines_of(&path);
        assert_eq!(lines.len(), 2);
        let second: JournalEntry = serde_json::from_str(&lines[1]).unwrap();
        assert!(!second.success);
        assert_eq!(second.error.as_deref(), Some("boom"));
    }

    #[test]
    fn rotation_moves_current_file_to_dot_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        // Tiny max_bytes forces rotation on the very first write.
        let journal = QueryJournal::open(&path, 1, 5).unwrap();

        journal.write("INSERT INTO t(v) VALUES(1)", serde_json::json!(null), None, true, None);
        journal.write("INSERT INTO t(v) VALUES(2)", serde_json::json!(null), None, true, None);

        assert!(backup_path(&path, 1).exists());
        assert_eq!(lines_of(&path).len(), 1);
    }
}
