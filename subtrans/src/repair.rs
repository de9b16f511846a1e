//! Recovery of subtitle files corrupted by leaked unresolved-call reprs.
//!
//! Repair works on the file path alone and may run long after the run that
//! wrote the file. It takes no lock: concurrent repairs of the same path must
//! be serialized by the caller.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::render;
use crate::subtitle;
use crate::types::Segment;
use crate::validate::MARKER_PATTERNS;

/// Text substituted for every corruption marker.
pub const PLACEHOLDER: &str = "[translation error]";

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n[ \t\r]*\n+").expect("valid blank-run regex"));

static DECIMAL_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2})\.(\d{3})").expect("valid timestamp regex"));

/// Where a file ended up in the repair state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Clean,
    Corrupted,
    BackedUp,
    Rewritten,
    Revalidated,
    Repaired,
    RolledBack,
}

impl RepairState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RepairState::Clean | RepairState::Repaired | RepairState::RolledBack
        )
    }

    /// Whether the file is usable after repair.
    pub fn is_ok(&self) -> bool {
        matches!(self, RepairState::Clean | RepairState::Repaired)
    }
}

/// Result of repairing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub state: RepairState,
    pub backup: Option<PathBuf>,
    /// Number of marker occurrences replaced.
    pub replacements: usize,
    /// Entries in the file after repair (or as found, if clean).
    pub entries: usize,
}

/// Counts from a directory repair run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub scanned: usize,
    pub fixed: usize,
    pub failed: usize,
}

fn transition(path: &Path, state: RepairState) {
    debug!(path = %path.display(), ?state, "repair state");
}

/// Entry count if `content` needs no repair.
fn clean_entries(content: &str) -> Option<usize> {
    if DECIMAL_TIMESTAMP.is_match(content) || BLANK_RUN.is_match(content) {
        return None;
    }
    render::self_check(content, None).ok()
}

/// Apply the textual repair passes. Returns the new content and the number of
/// marker occurrences replaced.
pub fn fix_content(content: &str) -> (String, usize) {
    let mut fixed = content.replace("\r\n", "\n");
    let mut replacements = 0;

    for pattern in MARKER_PATTERNS.iter() {
        let found = pattern.find_iter(&fixed).count();
        if found > 0 {
            debug!(pattern = pattern.as_str(), found, "replacing corruption markers");
            replacements += found;
            fixed = pattern.replace_all(&fixed, PLACEHOLDER).into_owned();
        }
    }

    let fixed = BLANK_RUN.replace_all(&fixed, "\n\n");
    let fixed = DECIMAL_TIMESTAMP.replace_all(&fixed, "$1,$2");
    (fixed.into_owned(), replacements)
}

/// Rebuild a clean document from repaired text, dropping placeholder-only
/// entries and renumbering through the renderer.
fn rebuild(fixed: &str) -> Option<String> {
    let segments: Vec<Segment> = subtitle::parse_srt_lenient(fixed)
        .entries
        .into_iter()
        .filter(|e| {
            let text = e.text.trim();
            !text.is_empty() && text != PLACEHOLDER
        })
        .map(|e| Segment::new(e.start, e.end, e.text))
        .collect();
    render::render(&segments).ok().map(|doc| doc.to_srt())
}

/// Pick a backup path that does not exist yet:
/// `<stem>.backup-<unix-secs>.srt`, then `…-1.srt`, `…-2.srt`, …
fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "subtitle".to_string());
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut candidate = path.with_file_name(format!("{stem}.backup-{secs}.srt"));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{stem}.backup-{secs}-{n}.srt"));
        n += 1;
    }
    candidate
}

/// Whether `path` names a backup written by this module.
pub fn is_backup(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(".backup-"))
        .unwrap_or(false)
}

/// Repair one subtitle file, reporting every detail of what happened.
///
/// A clean file is left untouched and no backup is written. Otherwise the
/// original content is backed up first, and restored if the rewritten file
/// does not pass the self-check.
pub fn repair_file(path: &Path) -> Result<RepairOutcome> {
    let original = std::fs::read_to_string(path)?;

    if let Some(entries) = clean_entries(&original) {
        transition(path, RepairState::Clean);
        return Ok(RepairOutcome {
            state: RepairState::Clean,
            backup: None,
            replacements: 0,
            entries,
        });
    }
    transition(path, RepairState::Corrupted);

    let backup = backup_path(path);
    std::fs::write(&backup, &original)?;
    transition(path, RepairState::BackedUp);
    info!(path = %path.display(), backup = %backup.display(), "backup written");

    let (fixed, replacements) = fix_content(&original);
    let rolled_back = |entries| {
        transition(path, RepairState::RolledBack);
        RepairOutcome {
            state: RepairState::RolledBack,
            backup: Some(backup.clone()),
            replacements,
            entries,
        }
    };

    let Some(rebuilt) = rebuild(&fixed) else {
        warn!(path = %path.display(), "no valid entries left after repair; file left as it was");
        return Ok(rolled_back(0));
    };

    render::write_atomic(path, &rebuilt)?;
    transition(path, RepairState::Rewritten);

    let check = render::check_file(path, None)?;
    transition(path, RepairState::Revalidated);

    match check {
        Ok(entries) => {
            transition(path, RepairState::Repaired);
            info!(path = %path.display(), replacements, entries, "subtitle file repaired");
            Ok(RepairOutcome {
                state: RepairState::Repaired,
                backup: Some(backup.clone()),
                replacements,
                entries,
            })
        }
        Err(failure) => {
            warn!(path = %path.display(), %failure, "repaired file failed validation; restoring backup");
            render::write_atomic(path, &original)?;
            Ok(rolled_back(0))
        }
    }
}

/// Repair one subtitle file. Returns `true` if the file is clean afterwards.
pub fn repair(path: &Path) -> Result<bool> {
    Ok(repair_file(path)?.state.is_ok())
}

/// Repair every `.srt` file directly inside `dir`, skipping backups.
pub fn repair_dir(dir: &Path) -> Result<RepairSummary> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("srt")))
        .filter(|p| !is_backup(p))
        .collect();
    files.sort();

    let mut summary = RepairSummary::default();
    for file in &files {
        summary.scanned += 1;
        match repair_file(file) {
            Ok(outcome) => match outcome.state {
                RepairState::Repaired => summary.fixed += 1,
                RepairState::Clean => {}
                _ => summary.failed += 1,
            },
            Err(e) => {
                warn!(path = %file.display(), error = %e, "repair failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        dir = %dir.display(),
        scanned = summary.scanned,
        fixed = summary.fixed,
        failed = summary.failed,
        "repair run finished"
    );
    Ok(summary)
}
