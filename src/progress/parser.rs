// src/progress/parser.rs

//! Frame progress derived from a render log.
//!
//! The render engine does not report structured status, so progress is
//! inferred from markers in its output:
//! - `Args: [...]` near the top (written by the launcher) carries the
//!   `-s <start>` / `-e <end>` frame range;
//! - every line containing `Saved:` counts as one finished frame;
//! - the last `Fra:<n>` seen is the frame currently being rendered.
//!
//! Parsing never fails. Malformed or missing markers yield zeros.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::ProgressSection;

const ARGS_MARKER: &str = "Args:";
const SAVED_MARKER: &str = "Saved:";

static FRAME_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Fra:(\d+)").expect("frame marker regex is valid"));

/// Knobs for [`parse_log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Number of trailing lines returned as `content`.
    pub tail_lines: usize,
    /// Number of leading lines searched for the `Args:` marker.
    pub args_lookahead: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            tail_lines: 50,
            args_lookahead: 5,
        }
    }
}

impl From<&ProgressSection> for ParseOptions {
    fn from(section: &ProgressSection) -> Self {
        Self {
            tail_lines: section.tail_lines,
            args_lookahead: section.args_lookahead,
        }
    }
}

/// Progress snapshot of one task log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Trailing lines of the log, joined with `\n`.
    pub content: String,
    /// `completed_frames / total_frames * 100`, or 0 without a frame range.
    /// Not clamped: extra `Saved:` lines can push it past 100.
    pub progress: f64,
    pub current_frame: u64,
    pub total_frames: u64,
    pub completed_frames: u64,
}

/// Derive progress from the full text of a log.
pub fn parse_log(text: &str, opts: &ParseOptions) -> ProgressReport {
    let lines: Vec<&str> = text.split('\n').collect();

    let total_frames = total_frames(&lines, opts.args_lookahead);
    let completed_frames = lines.iter().filter(|l| l.contains(SAVED_MARKER)).count() as u64;
    let current_frame = current_frame(&lines);

    let progress = if total_frames > 0 {
        completed_frames as f64 / total_frames as f64 * 100.0
    } else {
        0.0
    };

    let tail_start = lines.len().saturating_sub(opts.tail_lines);
    let content = lines[tail_start..].join("\n");

    ProgressReport {
        content,
        progress,
        current_frame,
        total_frames,
        completed_frames,
    }
}

/// Frame count from the first usable `Args:` line within the lookahead.
fn total_frames(lines: &[&str], lookahead: usize) -> u64 {
    lines
        .iter()
        .take(lookahead)
        .filter_map(|line| line.strip_prefix(ARGS_MARKER))
        .find_map(|rest| frame_range(rest.trim()))
        .unwrap_or(0)
}

/// `end - start + 1` from a JSON argv, or `None` when it cannot be read.
/// An inverted range counts as zero frames.
fn frame_range(args_json: &str) -> Option<u64> {
    let args: Vec<String> = serde_json::from_str(args_json).ok()?;
    let start = flag_value(&args, "-s")?;
    let end = flag_value(&args, "-e")?;
    let count = end.checked_sub(start).and_then(|d| d.checked_add(1));
    Some(count.and_then(|n| u64::try_from(n).ok()).unwrap_or(0))
}

fn flag_value(args: &[String], flag: &str) -> Option<i64> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.trim().parse().ok()
}

/// Value of the last `Fra:<n>` marker in the log. Numbers too large for a
/// `u64` saturate rather than falling back to an earlier marker.
fn current_frame(lines: &[&str]) -> u64 {
    lines
        .iter()
        .rev()
        .find_map(|line| FRAME_MARKER.captures_iter(line).last())
        .map(|caps| caps[1].parse().unwrap_or(u64::MAX))
        .unwrap_or(0)
}
