//! `tradeflow-reporting`: printed documents and register reports.
//!
//! Documents are laid out on fixed field coordinates ([`DocumentLayout`]) and
//! rendered to PDF. Registers are [`TabularReport`]s rendered to PDF or Excel.

pub mod document;
pub mod error;
pub mod layout;
pub mod pdf;
pub mod report;
pub mod xlsx;

pub use document::{Directory, PrintableDocument};
pub use error::RenderError;
pub use layout::DocumentLayout;
pub use report::{Cell, Column, ReportFormat, ReportKind, TabularReport};

/// Render a register in the requested format.
pub fn render(report: &TabularReport, format: ReportFormat) -> Result<Vec<u8>, RenderError> {
    let bytes = match format {
        ReportFormat::Pdf => pdf::render_report(report)?,
        ReportFormat::Xlsx => xlsx::render_report(report)?,
    };
    tracing::debug!(report = report.kind.slug(), rows = report.rows.len(), bytes = bytes.len(), "report rendered");
    Ok(bytes)
}
