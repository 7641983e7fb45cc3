//! Per-file results and the single aggregation point that totals them.

use crate::constants::{
    DELETE_PREFIX, ERROR_PREFIX, INFO_PREFIX, SKIP_PREFIX, SUCCESS_PREFIX, WARNING_PREFIX,
};
use crate::error::{PipelineError, Result};
use crate::utils::{display_relative, format_file_size, percent_saved};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Skipped,
    Transcoded,
    DeletedDuplicate,
    DeletedUuidJunk,
    Composited,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub input_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub before_bytes: u64,
    pub after_bytes: u64,
    pub action: Action,
    pub error_detail: Option<String>,
    /// Why a file was skipped or what a planned action refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// A `-mobile` / `-placeholder` output made alongside the main one.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub derivative: bool,
}

impl ProcessingResult {
    /// A plan entry: the action is decided but nothing has happened yet.
    pub fn planned(input_path: impl Into<PathBuf>, action: Action, before_bytes: u64) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: None,
            before_bytes,
            after_bytes: 0,
            action,
            error_detail: None,
            note: None,
            derivative: false,
        }
    }

    pub fn skipped(input_path: impl Into<PathBuf>, before_bytes: u64, note: impl Into<String>) -> Self {
        Self::planned(input_path, Action::Skipped, before_bytes).with_note(note)
    }

    pub fn transcoded(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        before_bytes: u64,
        after_bytes: u64,
    ) -> Self {
        Self {
            output_path: Some(output_path.into()),
            after_bytes,
            ..Self::planned(input_path, Action::Transcoded, before_bytes)
        }
    }

    pub fn composited(
        output_path: impl Into<PathBuf>,
        before_bytes: u64,
        after_bytes: u64,
    ) -> Self {
        let output_path = output_path.into();
        Self {
            output_path: Some(output_path.clone()),
            after_bytes,
            ..Self::planned(output_path, Action::Composited, before_bytes)
        }
    }

    pub fn failed(input_path: impl Into<PathBuf>, before_bytes: u64, error: &PipelineError) -> Self {
        Self {
            error_detail: Some(error.to_string()),
            ..Self::planned(input_path, Action::Error, before_bytes)
        }
    }

    pub fn cancelled(input_path: impl Into<PathBuf>, before_bytes: u64) -> Self {
        Self::planned(input_path, Action::Cancelled, before_bytes)
    }

    pub fn with_output(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output_path.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn as_derivative(mut self) -> Self {
        self.derivative = true;
        self
    }

    /// Whether the result carries before/after sizes that belong in the totals.
    pub fn is_processed(&self) -> bool {
        matches!(self.action, Action::Transcoded | Action::Composited)
    }

    pub fn is_failure(&self) -> bool {
        self.action == Action::Error
    }

    pub fn percent_saved(&self) -> Option<f64> {
        if self.is_processed() {
            percent_saved(self.before_bytes, self.after_bytes)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    pub processed: usize,
    pub before_bytes: u64,
    pub after_bytes: u64,
}

impl Totals {
    fn add(&mut self, before: u64, after: u64) {
        self.processed += 1;
        self.before_bytes += before;
        self.after_bytes += after;
    }

    pub fn saved_bytes(&self) -> i64 {
        self.before_bytes as i64 - self.after_bytes as i64
    }

    /// `None` means no eligible files, never NaN.
    pub fn percent_saved(&self) -> Option<f64> {
        if self.processed == 0 {
            return None;
        }
        percent_saved(self.before_bytes, self.after_bytes)
    }

    fn describe(&self) -> String {
        match self.percent_saved() {
            None => "no files processed".to_string(),
            Some(percent) => format!(
                "{} files, {} → {} ({:.1}% saved)",
                self.processed,
                format_file_size(self.before_bytes),
                format_file_size(self.after_bytes),
                percent
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Counters {
    pub skipped: usize,
    pub deleted_duplicates: usize,
    pub deleted_junk: usize,
    pub reclaimed_bytes: u64,
    pub derivatives: usize,
    pub derivative_bytes: u64,
    pub failed: usize,
    pub cancelled: usize,
}

/// Owned by exactly one collector; workers only ever send results to it.
#[derive(Debug, Clone, Serialize)]
pub struct ReportAggregator {
    root: PathBuf,
    results: Vec<ProcessingResult>,
    folders: BTreeMap<String, Totals>,
    totals: Totals,
    counters: Counters,
}

impl ReportAggregator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            results: Vec::new(),
            folders: BTreeMap::new(),
            totals: Totals::default(),
            counters: Counters::default(),
        }
    }

    pub fn record(&mut self, result: ProcessingResult) {
        // Every primary result keys its folder, transcoded or not.
        if !result.derivative {
            let folder = self.folder_key(&result);
            self.folders.entry(folder).or_default();
        }
        match result.action {
            Action::Transcoded if result.derivative => {
                self.counters.derivatives += 1;
                self.counters.derivative_bytes += result.after_bytes;
            }
            Action::Transcoded | Action::Composited => {
                let folder = self.folder_key(&result);
                self.folders
                    .entry(folder)
                    .or_default()
                    .add(result.before_bytes, result.after_bytes);
                self.totals.add(result.before_bytes, result.after_bytes);
            }
            Action::Skipped => self.counters.skipped += 1,
            Action::DeletedDuplicate => {
                self.counters.deleted_duplicates += 1;
                self.counters.reclaimed_bytes += result.before_bytes;
            }
            Action::DeletedUuidJunk => {
                self.counters.deleted_junk += 1;
                self.counters.reclaimed_bytes += result.before_bytes;
            }
            Action::Error => self.counters.failed += 1,
            Action::Cancelled => self.counters.cancelled += 1,
        }
        self.results.push(result);
    }

    fn folder_key(&self, result: &ProcessingResult) -> String {
        let path = result.output_path.as_ref().unwrap_or(&result.input_path);
        let folder = path.parent().unwrap_or_else(|| Path::new(""));
        let relative = display_relative(folder, &self.root);
        if relative.is_empty() {
            ".".to_string()
        } else {
            relative
        }
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn folder_totals(&self) -> &BTreeMap<String, Totals> {
        &self.folders
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn failed_count(&self) -> usize {
        self.counters.failed
    }

    pub fn cancelled_count(&self) -> usize {
        self.counters.cancelled
    }

    /// Number of files written to disk, derivatives included.
    pub fn writes(&self) -> usize {
        self.totals.processed + self.counters.derivatives
    }

    pub fn format_line(&self, result: &ProcessingResult) -> String {
        let input = display_relative(&result.input_path, &self.root);
        let output_name = result
            .output_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match result.action {
            Action::Transcoded => format!(
                "{} {} → {}: {} → {} ({})",
                SUCCESS_PREFIX,
                input,
                output_name,
                format_file_size(result.before_bytes),
                format_file_size(result.after_bytes),
                describe_percent(result.percent_saved())
            ),
            Action::Composited => format!(
                "{} {}: sources {} → {}",
                SUCCESS_PREFIX,
                output_name,
                format_file_size(result.before_bytes),
                format_file_size(result.after_bytes)
            ),
            Action::Skipped => format!(
                "{} {}: skipped ({})",
                SKIP_PREFIX,
                input,
                result.note.as_deref().unwrap_or("nothing to do")
            ),
            Action::DeletedDuplicate => format!(
                "{} {}: removed {} ({} kept)",
                DELETE_PREFIX,
                input,
                format_file_size(result.before_bytes),
                output_name
            ),
            Action::DeletedUuidJunk => format!(
                "{} {}: removed screenshot/UUID file ({})",
                DELETE_PREFIX,
                input,
                format_file_size(result.before_bytes)
            ),
            Action::Error => format!(
                "{} {}: {}",
                ERROR_PREFIX,
                input,
                result.error_detail.as_deref().unwrap_or("unknown error")
            ),
            Action::Cancelled => format!("{} {}: cancelled", WARNING_PREFIX, input),
        }
    }

    /// What a dry run would do with a planned result.
    pub fn format_plan_line(&self, planned: &ProcessingResult) -> String {
        let input = display_relative(&planned.input_path, &self.root);
        let output = planned
            .output_path
            .as_ref()
            .map(|p| display_relative(p, &self.root))
            .unwrap_or_default();
        match planned.action {
            Action::Transcoded => format!(
                "{} would transcode {} ({}) → {}",
                INFO_PREFIX,
                input,
                format_file_size(planned.before_bytes),
                output
            ),
            Action::DeletedDuplicate => {
                format!("{} would remove {} ({} exists)", DELETE_PREFIX, input, output)
            }
            Action::DeletedUuidJunk => {
                format!("{} would remove screenshot/UUID file {}", DELETE_PREFIX, input)
            }
            _ => self.format_line(planned),
        }
    }

    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n📊 Summary:");
        match self.totals.percent_saved() {
            None => {
                let _ = writeln!(out, "  📁 No files processed");
            }
            Some(percent) => {
                let _ = writeln!(out, "  📁 Files processed: {}", self.totals.processed);
                let _ = writeln!(
                    out,
                    "  📊 Total before: {}",
                    format_file_size(self.totals.before_bytes)
                );
                let _ = writeln!(
                    out,
                    "  📊 Total after: {}",
                    format_file_size(self.totals.after_bytes)
                );
                let saved = self.totals.saved_bytes();
                let _ = writeln!(
                    out,
                    "  💾 Total saved: {}{} ({:.1}%)",
                    if saved < 0 { "-" } else { "" },
                    format_file_size(saved.unsigned_abs()),
                    percent
                );
            }
        }

        if self.folders.len() > 1 {
            let _ = writeln!(out, "  {} Per folder:", INFO_PREFIX);
            for (folder, totals) in &self.folders {
                let _ = writeln!(out, "    {}: {}", folder, totals.describe());
            }
        }

        let c = &self.counters;
        if c.derivatives > 0 {
            let _ = writeln!(
                out,
                "  {} Derivatives written: {} ({})",
                SUCCESS_PREFIX,
                c.derivatives,
                format_file_size(c.derivative_bytes)
            );
        }
        if c.skipped > 0 {
            let _ = writeln!(out, "  {} Skipped: {}", SKIP_PREFIX, c.skipped);
        }
        if c.deleted_duplicates + c.deleted_junk > 0 {
            let _ = writeln!(
                out,
                "  {} Removed: {} duplicates, {} junk ({} reclaimed)",
                DELETE_PREFIX,
                c.deleted_duplicates,
                c.deleted_junk,
                format_file_size(c.reclaimed_bytes)
            );
        }
        if c.cancelled > 0 {
            let _ = writeln!(out, "  {} Cancelled: {}", WARNING_PREFIX, c.cancelled);
        }
        if c.failed > 0 {
            let _ = writeln!(out, "  {} Failed files: {}", ERROR_PREFIX, c.failed);
        }
        out
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| PipelineError::filesystem(path, e))?;
        Ok(())
    }
}

fn describe_percent(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p >= 0.0 => format!("{:.1}% saved", p),
        Some(p) => format!("{:.1}% larger", p.abs()),
        None => "n/a".to_string(),
    }
}
