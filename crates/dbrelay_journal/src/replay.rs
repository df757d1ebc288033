use std::io::BufRead;
use std::path::Path;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::JournalEntry;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Clone)]
pub struct ReplayReport {
    pub replayed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Re-executes journal entries against `execute` (§4.5). Unparseable lines
/// and `execute` failures both count toward `failed` without stopping the
/// scan. `only_success` skips entries recorded with `success=false`;
/// `limit` caps the number of entries attempted (successes + failures).
pub fn replay<F>(
    journal_path: &Path,
    only_success: bool,
    limit: Option<usize>,
    mut execute: F,
) -> Result<ReplayReport, ReplayError>
where
    F: FnMut(&str, &JsonValue) -> Result<(), String>,
{
    let mut report = ReplayReport::default();
    if !journal_path.exists() {
        report.errors.push("journal file not found".to_string());
        return Ok(report);
    }

    let file = std::fs::File::open(journal_path)?;
    for line in std::io::BufReader::new(file).lines() {
        if let Some(limit) = limit {
            if report.replayed + report.failed >= limit {
                break;
            }
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: JournalEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push(format!("invalid JSON: {e}"));
                report.failed += 1;
                continue;
            }
        };

        if only_success && !entry.success {
            continue;
        }

        match execute(&entry.sql, &entry.params) {
            Ok(()) => report.replayed += 1,
            Err(e) => {
                report.failed += 1;
                let preview: String = entry.sql.chars().take(50).collect();
                report.errors.push(format!("{preview}...: {e}"));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryJournal;
    use std::cell::RefCell;

    #[test]
    fn replays_successful_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = QueryJournal::open_with_defaults(&path).unwrap();
        journal.write(
            "INSERT INTO data(id,value) VALUES(?,?)",
            serde_json::json!([1, "one"]),
            None,
            true,
            None,
        );
        journal.write(
            "INSERT INTO data(id,value) VALUES(?,?)",
            serde_json::json!([2, "two"]),
            None,
            true,
            None,
        );
        journal.write(
            "UPDATE data SET value=? WHERE id=?",
            serde_json::json!(["ONE", 1]),
            None,
            true,
            None,
        );
        journal.write("skip me", serde_json::json!(null), None, false, Some("failed"));

        let executed = RefCell::new(Vec::new());
        let report = replay(&path, true, None, |sql, params| {
            executed.borrow_mut().push((sql.to_string(), params.clone()));
            Ok(())
        })
        .unwrap();

        assert_eq!(report.replayed, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(executed.borrow().len(), 3);
    }

    #[test]
    fn execute_failures_are_counted_without_aborting_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let journal = QueryJournal::open_with_defaults(&path).unwrap();
        journal.write("BAD SQL", serde_json::json!(null), None, true, None);
        journal.write("INSERT INTO t(v) VALUES(1)", serde_json::json!(null), None, true, None);

        let report = replay(&path, true, None, |sql, _| {
            if sql == "BAD SQL" { Err("syntax error".to_string()) } else { Ok(()) }
        })
        .unwrap();

        assert_eq!(report.replayed, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn missing_journal_file_reports_zero_with_an_error() {
        let report = replay(Path::new("/nonexistent/path.jsonl"), true, None, |_, _| Ok(())).unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.errors.len(), 1);
    }
}
