//! Per-row driver: decide, render, save, print, write back.
//!
//! Rows are handled strictly in source order. A per-row failure is
//! logged, counted and left behind. A fatal error (the sheet lost a column
//! the run depends on) fails that row and stops the batch.

use crate::cleanup::TextCleaner;
use crate::config::Config;
use crate::error::{NoticeError, Result};
use crate::print::Printer;
use crate::render::Renderer;
use crate::sequencer::{next_letter, Decision};
use crate::table::{CellValue, Columns, IdentityKey, Row};
use crate::types::{sent_marker, Slot, TemplateRef};
use crate::writeback::{StatusStore, WritebackOutcome};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Generated,
    /// Dry run: a letter would be generated.
    Planned,
    UpToDate,
    NotYetDue,
    Failed,
}

impl RowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Generated => "generated",
            RowStatus::Planned => "planned",
            RowStatus::UpToDate => "up_to_date",
            RowStatus::NotYetDue => "not_yet_due",
            RowStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub key: String,
    pub row: u32,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<Slot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writeback: Option<WritebackOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowReport {
    fn new(key: String, row: u32, status: RowStatus) -> Self {
        Self {
            key,
            row,
            status,
            slot: None,
            template: None,
            due: None,
            output: None,
            writeback: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub generated: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: Vec<RowReport>,
    pub warnings: Vec<String>,
    /// Set when a fatal error stopped the batch early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl Report {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.aborted.is_some()
    }

    fn push(&mut self, row: RowReport) {
        match row.status {
            RowStatus::Generated => self.generated += 1,
            RowStatus::Planned => self.planned += 1,
            RowStatus::UpToDate | RowStatus::NotYetDue => self.skipped += 1,
            RowStatus::Failed => self.failed += 1,
        }
        self.rows.push(row);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    config: &'a Config,
    columns: &'a Columns,
    renderer: Renderer<'a>,
    printer: &'a dyn Printer,
    store: &'a dyn StatusStore,
    today: NaiveDate,
    dry_run: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a Config,
        columns: &'a Columns,
        cleaner: &'a dyn TextCleaner,
        printer: &'a dyn Printer,
        store: &'a dyn StatusStore,
    ) -> Self {
        Self {
            config,
            columns,
            renderer: Renderer::new(config, cleaner),
            printer,
            store,
            today: chrono::Local::now().date_naive(),
            dry_run: false,
        }
    }

    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Report decisions only; nothing is rendered, printed or written.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn process(&self, rows: &mut [Row]) -> Report {
        let mut report = Report::default();
        if !self.dry_run {
            if let Err(e) = self.store.check() {
                tracing::error!(error = %e, "status sheet check failed, nothing sent");
                report.aborted = Some(e.to_string());
                return report;
            }
        }

        let mut written = HashSet::new();
        for row in rows.iter_mut() {
            let key = IdentityKey::of(row, self.columns);
            let label = key
                .as_ref()
                .map(|k| k.value.clone())
                .unwrap_or_else(|| format!("row {}", row.line));
            let line = row.line;

            let mut batch = Batch {
                warnings: &mut report.warnings,
                written: &mut written,
            };
            let result = self.process_row(row, key.as_ref(), &label, &mut batch);
            match result {
                Ok(entry) => report.push(entry),
                Err(e) => {
                    tracing::error!(key = %label, row = line, error = %e, "letter failed");
                    let mut entry = RowReport::new(label, line, RowStatus::Failed);
                    entry.error = Some(e.to_string());
                    report.push(entry);
                    if e.is_fatal() {
                        tracing::error!(row = line, "fatal error, stopping the batch");
                        report.aborted = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        tracing::info!(
            generated = report.generated,
            planned = report.planned,
            skipped = report.skipped,
            failed = report.failed,
            aborted = report.aborted.is_some(),
            "batch finished"
        );
        report
    }

    fn process_row(
        &self,
        row: &mut Row,
        key: Option<&IdentityKey>,
        label: &str,
        batch: &mut Batch<'_>,
    ) -> Result<RowReport> {
        let choice = match next_letter(row, self.columns, self.config, self.today) {
            Decision::Complete => {
                tracing::debug!(key = %label, row = row.line, "all letters sent");
                return Ok(RowReport::new(label.to_string(), row.line, RowStatus::UpToDate));
            }
            Decision::NotYetDue { slot, due } => {
                tracing::debug!(
                    key = %label,
                    row = row.line,
                    slot = %slot,
                    %due,
                    "next letter not yet due"
                );
                let mut entry = RowReport::new(label.to_string(), row.line, RowStatus::NotYetDue);
                entry.slot = Some(slot);
                entry.due = Some(due);
                return Ok(entry);
            }
            Decision::Send(choice) => choice,
        };

        let mut entry = RowReport::new(label.to_string(), row.line, RowStatus::Planned);
        entry.slot = Some(choice.slot);
        entry.template = Some(choice.template.clone());
        let key = key.ok_or(NoticeError::UnidentifiedRow(row.line))?;
        if self.dry_run {
            return Ok(entry);
        }

        let doc = self
            .renderer
            .render(&choice.template, row, self.columns, self.today)?;
        let path = unused_path(
            &self.config.output_dir(),
            &doc.file_name,
            row.line,
            choice.slot,
            batch.written,
        );
        crate::io::atomic_write(&path, &doc.bytes)?;
        batch.written.insert(path.clone());
        tracing::info!(
            key = %key,
            row = row.line,
            slot = %choice.slot,
            template = %choice.template,
            path = %path.display(),
            "letter saved"
        );

        if let Err(e) = self.printer.print(&path) {
            tracing::warn!(key = %key, error = %e, "print failed");
            batch.warnings.push(format!("{key}: print failed: {e}"));
        }

        let outcome = self.store.mark_sent(key, choice.slot, self.today)?;
        match &outcome {
            WritebackOutcome::Updated { .. } => {}
            WritebackOutcome::Ambiguous { row: updated, matches } => {
                batch.warnings.push(format!(
                    "{key}: {matches} rows match, status written to row {updated}"
                ))
            }
            WritebackOutcome::NotFound => batch
                .warnings
                .push(format!("{key}: row not found at writeback, status not recorded")),
        }
        row.set(
            self.columns.letter(choice.slot),
            CellValue::text(sent_marker(self.today)),
        );

        entry.status = RowStatus::Generated;
        entry.output = Some(path);
        entry.writeback = Some(outcome);
        Ok(entry)
    }
}

/// Mutable state shared by the rows of one batch.
struct Batch<'r> {
    warnings: &'r mut Vec<String>,
    written: &'r mut HashSet<PathBuf>,
}

/// `dir/file_name` unless this batch already wrote it or it is still waiting
/// in the output directory; then `<stem>_r<line>_<slot>`, then `-2`, `-3`...
fn unused_path(
    dir: &Path,
    file_name: &str,
    line: u32,
    slot: Slot,
    written: &HashSet<PathBuf>,
) -> PathBuf {
    let free = |p: &PathBuf| !written.contains(p) && !p.exists();
    let first = dir.join(file_name);
    if free(&first) {
        return first;
    }
    let stem = file_name.strip_suffix(".docx").unwrap_or(file_name);
    let base = format!("{stem}_r{line}_{}", slot.number());
    let mut candidate = dir.join(format!("{base}.docx"));
    let mut n = 2;
    while !free(&candidate) {
        candidate = dir.join(format!("{base}-{n}.docx"));
        n += 1;
    }
    tracing::debug!(taken = %first.display(), path = %candidate.display(), "output name in use");
    candidate
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
