use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use advisor_sdk::{AdvisorSession, FetchContext, FetchError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub mod aggregate;
pub mod chart;
pub mod credentials;
pub mod flow;
pub mod pdf;
pub mod schema;
pub mod scope;
pub mod summary;
pub mod table;

#[cfg(test)]
mod testing;

pub use aggregate::{Aggregation, FailurePolicy, ScopeFailure, aggregate};
pub use chart::{DEFAULT_TOP_K, Histogram};
pub use credentials::{CredentialProvider, InteractiveCredentialProvider, StaticCredentialProvider};
pub use flow::{EmptyResult, FlowState, Outcome, ReportFlow, ReportRequest, run_report};
pub use scope::{ScopeMode, ScopeSelection, resolve_scopes};
pub use summary::ReportSummary;
pub use table::{Column, ReportMode, ResourceDimension, Table, format_table};

/// Anything that can stop a report run.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Bad credential or scope input; raised before any network call.
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("table has no '{0}' column")]
    MissingColumn(Column),
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub mode: ReportMode,
    pub label: Option<String>,
}

impl ReportMetadata {
    pub fn generated_at_utc(&self) -> Option<DateTime<Utc>> {
        let seconds = self.generated_at.parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp(seconds, 0)
    }

    pub fn generated_at_iso8601(&self) -> String {
        self.generated_at_utc()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Read-only snapshot of one run: the table plus its summary.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub table: Table,
    pub summary: ReportSummary,
    /// Scopes dropped under [`FailurePolicy::Skip`].
    pub skipped: Vec<ScopeFailure>,
}

impl Report {
    pub fn new(
        table: Table,
        mode: ReportMode,
        label: Option<String>,
        skipped: Vec<ScopeFailure>,
    ) -> Self {
        let generated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|_| "0".to_string());

        let summary = ReportSummary::from_table(&table);

        Self {
            metadata: ReportMetadata {
                generated_at,
                mode,
                label,
            },
            table,
            summary,
            skipped,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.metadata.label.as_deref()
    }

    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "metadata": {
                "generated_at": self.metadata.generated_at,
                "mode": self.metadata.mode,
                "label": self.metadata.label,
            },
            "columns": self.table.columns(),
            "rows": self.table.rows(),
            "summary": self.summary,
            "skipped": self.skipped,
        })
    }

    pub fn chart(&self, column: Column, top_k: usize) -> Result<Histogram, RenderError> {
        Histogram::from_table(&self.table, column, top_k)
    }

    pub fn to_markdown(&self) -> Result<String, RenderError> {
        render::render_markdown(self).map_err(Into::into)
    }

    pub fn to_html(&self, chart: Option<&Histogram>) -> Result<String, RenderError> {
        render::render_html(self, chart).map_err(Into::into)
    }

    /// Aligned plain-text table for terminals.
    pub fn to_text(&self) -> String {
        render::render_text(self)
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, RenderError> {
        pdf::build_pdf(&self.table, self.label())
    }

    pub fn pdf_filename(&self) -> String {
        pdf::pdf_filename(self.label())
    }

    /// Writes the PDF into `dir` under [`Report::pdf_filename`].
    pub fn write_pdf(&self, dir: &Path) -> Result<PathBuf, RenderError> {
        let bytes = self.to_pdf()?;
        let path = dir.join(self.pdf_filename());
        fs::write(&path, bytes).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "wrote PDF report");
        Ok(path)
    }
}

/// Looks up a registered source and opens a session with the provider's
/// credential. Credential validation happens before any network call.
pub fn open_session(
    source_id: &str,
    provider: &dyn credentials::CredentialProvider,
    ctx: &FetchContext,
) -> Result<Box<dyn AdvisorSession>, AdvisorError> {
    let source = advisor_sdk::find_source(source_id).ok_or_else(|| {
        let known: Vec<_> = advisor_sdk::iter_registered_sources()
            .map(|entry| (entry.constructor)().metadata().id)
            .collect();
        AdvisorError::Validation(format!(
            "unknown source '{source_id}' (available: {})",
            known.join(", ")
        ))
    })?;

    let credential = provider.credential()?;
    debug!(
        source = source_id,
        provider = provider.kind(),
        "opening advisor session"
    );
    Ok(source.connect(&credential, ctx)?)
}

mod render {
    use askama::Template;

    use super::Report;
    use crate::chart::Histogram;
    use crate::pdf::{REPORT_TITLE, summary_lines};

    #[derive(Template)]
    #[template(path = "report.md", escape = "none")]
    struct MarkdownReport<'a> {
        title: &'static str,
        report: &'a Report,
        generated: String,
        header_line: String,
        divider_line: String,
        rows: Vec<String>,
        summary: Vec<String>,
        skipped: Vec<SkippedView>,
    }

    #[derive(Template)]
    #[template(path = "report.html")]
    struct HtmlReport<'a> {
        title: &'static str,
        report: &'a Report,
        generated: String,
        headers: Vec<&'static str>,
        summary: Vec<String>,
        chart_title: Option<String>,
        chart_svg: Option<String>,
        skipped: Vec<SkippedView>,
    }

    struct SkippedView {
        scope: String,
        message: String,
    }

    fn skipped_views(report: &Report) -> Vec<SkippedView> {
        report
            .skipped
            .iter()
            .map(|failure| SkippedView {
                scope: failure.scope.to_string(),
                message: failure.error.to_string(),
            })
            .collect()
    }

    pub fn render_markdown(report: &Report) -> askama::Result<String> {
        let headers = report.table.headers();
        MarkdownReport {
            title: REPORT_TITLE,
            report,
            generated: report.metadata.generated_at_iso8601(),
            header_line: markdown_row(headers.iter().copied()),
            divider_line: markdown_row(headers.iter().map(|_| "---")),
            rows: report
                .table
                .rows()
                .iter()
                .map(|row| markdown_row(row.iter().map(String::as_str)))
                .collect(),
            summary: summary_lines(&report.summary),
            skipped: skipped_views(report),
        }
        .render()
    }

    pub fn render_html(report: &Report, chart: Option<&Histogram>) -> askama::Result<String> {
        HtmlReport {
            title: REPORT_TITLE,
            report,
            generated: report.metadata.generated_at_iso8601(),
            headers: report.table.headers(),
            summary: summary_lines(&report.summary),
            chart_title: chart.map(Histogram::title),
            chart_svg: chart.map(Histogram::to_svg),
            skipped: skipped_views(report),
        }
        .render()
    }

    fn markdown_row<'a>(cells: impl Iterator<Item = &'a str>) -> String {
        let cells: Vec<String> = cells
            .map(|cell| cell.replace('|', "\\|").replace('\n', " "))
            .collect();
        format!("| {} |", cells.join(" | "))
    }

    pub fn render_text(report: &Report) -> String {
        let headers = report.table.headers();
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in report.table.rows() {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: Vec<&str>| {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            padded.join("  ").trim_end().to_string()
        };

        let mut out = Vec::with_capacity(report.table.len() + 4);
        out.push(line(headers.clone()));
        let dividers: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push(line(dividers.iter().map(String::as_str).collect()));
        for row in report.table.rows() {
            out.push(line(row.iter().map(String::as_str).collect()));
        }
        out.push(String::new());
        out.extend(summary_lines(&report.summary));
        out.join("\n")
    }
}
