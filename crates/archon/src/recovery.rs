//! Crash-recovery journal for multi-file operations staged under
//! `.archon/tmp/`: a journal entry records a batch of staged files and
//! their final destinations. Replaying the journal on open either finishes
//! a batch (every staged file survived the crash) or discards it (some
//! did not) — the same all-or-nothing guarantee the single-file atomic
//! write protocol gives a single destination, extended to a batch.
//!
//! `replay` runs on every open. `stage`/`commit` have no caller yet: the
//! node store's own multi-file writes (move, reorder, delete touching a
//! parent and child) already order their per-file atomic writes so a crash
//! mid-sequence leaves a journal-replayable state without registering a
//! batch here. They exist for the next operation that can't make that same
//! ordering guarantee on its own — a staged import, say.

use std::fs;
use std::path::PathBuf;

use archon_core::ArchonError;
use archon_layout::ProjectLayout;
use serde::{Deserialize, Serialize};

const JOURNAL_FILE_NAME: &str = "journal.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedFile {
    pub staged_path: PathBuf,
    pub final_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub operation: String,
    pub files: Vec<StagedFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Journal {
    entries: Vec<JournalEntry>,
}

fn journal_path(layout: &ProjectLayout) -> PathBuf {
    layout.tmp_dir().join(JOURNAL_FILE_NAME)
}

/// Records a batch in the journal. Call once every file in `files` has
/// actually been written to its `staged_path`, before any is moved into
/// its final location.
pub fn stage(layout: &ProjectLayout, operation: &str, files: Vec<StagedFile>) -> Result<(), ArchonError> {
    let mut journal = load(layout)?;
    journal.entries.retain(|e| e.operation != operation);
    journal.entries.push(JournalEntry { operation: operation.to_string(), files });
    save(layout, &journal)
}

/// Moves every staged file in `operation`'s batch into its final path and
/// drops the batch from the journal.
pub fn commit(layout: &ProjectLayout, operation: &str) -> Result<(), ArchonError> {
    let mut journal = load(layout)?;
    if let Some(pos) = journal.entries.iter().position(|e| e.operation == operation) {
        let entry = journal.entries.remove(pos);
        move_batch(&entry)?;
    }
    save(layout, &journal)
}

/// Replays the journal at project-open time: a batch whose every staged
/// file is still present is completed; a batch missing any staged file is
/// discarded (its surviving staged files are deleted). Returns the
/// operation names that were completed. The journal is empty once this
/// returns either way.
pub fn replay(layout: &ProjectLayout) -> Result<Vec<String>, ArchonError> {
    let journal = load(layout)?;
    let mut completed = Vec::new();

    for entry in &journal.entries {
        let all_present = entry.files.iter().all(|f| f.staged_path.exists());
        if all_present {
            move_batch(entry)?;
            completed.push(entry.operation.clone());
        } else {
            for file in &entry.files {
                if file.staged_path.exists() {
                    fs::remove_file(&file.staged_path)
                        .map_err(|e| ArchonError::io("discard partial staged file", &e))?;
                }
            }
        }
    }

    save(layout, &Journal::default())?;
    Ok(completed)
}

fn move_batch(entry: &JournalEntry) -> Result<(), ArchonError> {
    for file in &entry.files {
        if let Some(parent) = file.final_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchonError::io("create destination directory", &e))?;
        }
        fs::rename(&file.staged_path, &file.final_path).map_err(|e| ArchonError::io("move staged file into place", &e))?;
    }
    Ok(())
}

fn load(layout: &ProjectLayout) -> Result<Journal, ArchonError> {
    let Ok(bytes) = fs::read(journal_path(layout)) else {
        return Ok(Journal::default());
    };
    Ok(serde_json::from_slice(&bytes).unwrap_or_default())
}

fn save(layout: &ProjectLayout, journal: &Journal) -> Result<(), ArchonError> {
    archon_layout::atomic_write_with(&journal_path(layout), |file| {
        serde_json::to_writer_pretty(file, journal).map_err(std::io::Error::other)
    })
}

#[cfg(test)]
mod tests {
    use archon_core::path::AbsPathBuf;
    use tempfile::tempdir;

    use super::*;

    fn layout() -> (tempfile::TempDir, ProjectLayout) {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(AbsPathBuf::new(dir.path().to_path_buf()).unwrap());
        layout.create_skeleton().unwrap();
        (dir, layout)
    }

    #[test]
    fn replay_finishes_a_batch_whose_staged_files_all_survived() {
        let (_dir, layout) = layout();
        let staged_path = layout.tmp_dir().join("a.staged");
        let final_path = layout.root().as_path().join("a.json");
        fs::write(&staged_path, b"payload").unwrap();

        stage(&layout, "import-a", vec![StagedFile { staged_path: staged_path.clone(), final_path: final_path.clone() }]).unwrap();

        let completed = replay(&layout).unwrap();
        assert_eq!(completed, vec!["import-a".to_string()]);
        assert!(final_path.exists());
        assert!(!staged_path.exists());
    }

    #[test]
    fn replay_discards_a_batch_missing_any_staged_file() {
        let (_dir, layout) = layout();
        let present = layout.tmp_dir().join("present.staged");
        let missing = layout.tmp_dir().join("missing.staged");
        fs::write(&present, b"payload").unwrap();

        stage(
            &layout,
            "import-b",
            vec![
                StagedFile { staged_path: present.clone(), final_path: layout.root().as_path().join("present.json") },
                StagedFile { staged_path: missing, final_path: layout.root().as_path().join("missing.json") },
            ],
        )
        .unwrap();

        let completed = replay(&layout).unwrap();
        assert!(completed.is_empty());
        assert!(!present.exists());
        assert!(!layout.root().as_path().join("present.json").exists());
    }

    #[test]
    fn replay_of_an_empty_journal_is_a_no_op() {
        let (_dir, layout) = layout();
        assert!(replay(&layout).unwrap().is_empty());
    }
}
