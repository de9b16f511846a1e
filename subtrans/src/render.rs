//! Segment list → subtitle file, with a post-write self-check.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::repair::{self, RepairState};
use crate::subtitle::{self, SubtitleDocument};
use crate::timecode;
use crate::types::Segment;
use crate::validate;

/// Reason a written subtitle file failed its self-check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckFailure {
    #[error("file is empty")]
    Empty,
    #[error("file contains an unresolved-call marker")]
    CorruptionMarker,
    #[error("file has no valid timing line")]
    NoTimingLine,
    #[error("file does not parse: {0}")]
    Unparseable(String),
    #[error("expected {expected} entries, parsed {found}")]
    EntryCount { expected: usize, found: usize },
}

/// Normalize one segment's text for display, or `None` if it should be skipped.
fn cue_text(text: &str) -> Option<String> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let text = lines.join("\n");
    if validate::contains_corruption_marker(&text) {
        return None;
    }
    Some(text)
}

/// Build a subtitle document from segments.
///
/// Segments with empty or marker-bearing text are skipped and the surviving
/// entries are numbered from 1 without gaps.
pub fn render(segments: &[Segment]) -> Result<SubtitleDocument> {
    let mut cues = Vec::with_capacity(segments.len());
    for (i, seg) in segments.iter().enumerate() {
        match cue_text(&seg.text) {
            Some(text) => cues.push((seg.start, seg.end, text)),
            None if seg.text.trim().is_empty() => {
                debug!(segment = i, "skipping segment with empty text")
            }
            None => warn!(segment = i, "skipping segment with unresolved-call marker"),
        }
    }

    if cues.is_empty() {
        return Err(Error::NoValidSegments);
    }

    let doc = SubtitleDocument::from_cues(cues);
    debug!(
        entries = doc.len(),
        skipped = segments.len() - doc.len(),
        "subtitle document rendered"
    );
    Ok(doc)
}

/// Check written SRT content. Returns the number of entries on success.
///
/// With `expected`, the parsed entry count must match it exactly.
pub fn self_check(content: &str, expected: Option<usize>) -> std::result::Result<usize, CheckFailure> {
    if content.trim().is_empty() {
        return Err(CheckFailure::Empty);
    }
    if content.lines().any(validate::contains_corruption_marker) {
        return Err(CheckFailure::CorruptionMarker);
    }
    if !content.lines().any(timecode::is_timing_line) {
        return Err(CheckFailure::NoTimingLine);
    }
    let doc = subtitle::parse_srt(content).map_err(|e| CheckFailure::Unparseable(e.to_string()))?;
    match expected {
        Some(expected) if expected != doc.len() => Err(CheckFailure::EntryCount {
            expected,
            found: doc.len(),
        }),
        _ => Ok(doc.len()),
    }
}

/// Read `path` back and self-check it.
pub fn check_file(path: &Path, expected: Option<usize>) -> Result<std::result::Result<usize, CheckFailure>> {
    let content = std::fs::read_to_string(path)?;
    Ok(self_check(&content, expected))
}

/// Write `content` through a `.part` file and rename it into place.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut part_name = path.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part = path.with_file_name(part_name);

    std::fs::write(&part, content)?;
    std::fs::rename(&part, path)?;
    Ok(())
}

/// Write `doc` as SRT to `path` and verify the result.
///
/// If the written file fails its self-check, one repair pass is attempted
/// before giving up. The returned path always points at a checked file.
pub fn write_srt(doc: &SubtitleDocument, path: &Path) -> Result<PathBuf> {
    if doc.is_empty() {
        return Err(Error::NoValidSegments);
    }
    write_atomic(path, &doc.to_srt())?;

    let failure = match check_file(path, Some(doc.len()))? {
        Ok(entries) => {
            info!(path = %path.display(), entries, "subtitle file written");
            return Ok(path.to_path_buf());
        }
        Err(failure) => failure,
    };

    warn!(path = %path.display(), %failure, "subtitle self-check failed, attempting repair");
    let outcome = repair::repair_file(path)?;
    if outcome.state != RepairState::Repaired {
        return Err(Error::SelfCheck {
            path: path.to_path_buf(),
            reason: format!("{failure}; repair ended {:?}", outcome.state),
        });
    }

    match check_file(path, Some(doc.len()))? {
        Ok(entries) => {
            info!(path = %path.display(), entries, "subtitle file written after repair");
            Ok(path.to_path_buf())
        }
        Err(after) => {
            if let Some(backup) = &outcome.backup {
                std::fs::copy(backup, path)?;
            }
            Err(Error::SelfCheck {
                path: path.to_path_buf(),
                reason: format!("{failure}; after repair: {after}"),
            })
        }
    }
}

/// Write `doc` as WebVTT to `path`.
pub fn write_vtt(doc: &SubtitleDocument, path: &Path) -> Result<PathBuf> {
    if doc.is_empty() {
        return Err(Error::NoValidSegments);
    }
    write_atomic(path, &doc.to_vtt())?;
    info!(path = %path.display(), entries = doc.len(), "webvtt file written");
    Ok(path.to_path_buf())
}

/// Render `segments` and write them as a checked SRT file.
pub fn render_to_file(segments: &[Segment], path: &Path) -> Result<PathBuf> {
    let doc = render(segments)?;
    write_srt(&doc, path)
}
