//! PDF rendering with printpdf's builtin Helvetica.

use std::io::BufWriter;
use std::ops::Range;

use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point,
};

use crate::document::PrintableDocument;
use crate::error::RenderError;
use crate::layout::{A4_HEIGHT_MM, A4_WIDTH_MM, DocumentLayout, FieldPlacement, TableLayout};
use crate::report::TabularReport;

const MARGIN: f32 = 15.0;
const PT_TO_MM: f32 = 0.3528;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

impl Fonts {
    fn load(doc: &PdfDocumentReference) -> Result<Self, RenderError> {
        Ok(Self {
            regular: doc.add_builtin_font(BuiltinFont::Helvetica)?,
            bold: doc.add_builtin_font(BuiltinFont::HelveticaBold)?,
        })
    }

    fn pick(&self, bold: bool) -> &IndirectFontRef {
        if bold { &self.bold } else { &self.regular }
    }
}

/// Split `rows` into page-sized ranges. There is always at least one page.
pub(crate) fn page_ranges(rows: usize, per_page: usize) -> Vec<Range<usize>> {
    let per_page = per_page.max(1);
    if rows == 0 {
        return vec![0..0];
    }
    (0..rows)
        .step_by(per_page)
        .map(|start| start..(start + per_page).min(rows))
        .collect()
}

/// Cut `text` so it fits `width` millimetres at `font_size`.
pub(crate) fn fit(text: &str, width: f32, font_size: f32) -> String {
    let avg_char = font_size * 0.5 * PT_TO_MM;
    let max_chars = ((width - 1.0) / avg_char).floor().max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(2)).collect();
    cut.push_str("..");
    cut
}

fn rule(layer: &PdfLayerReference, x1: f32, x2: f32, y: f32) {
    layer.add_line(Line {
        points: vec![(Point::new(Mm(x1), Mm(y)), false), (Point::new(Mm(x2), Mm(y)), false)],
        is_closed: false,
    });
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>, RenderError> {
    let mut writer = BufWriter::new(Vec::<u8>::new());
    doc.save(&mut writer)?;
    writer.into_inner().map_err(|e| RenderError::Pdf(e.to_string()))
}

fn new_page(
    doc: &PdfDocumentReference,
    first: &mut Option<PdfLayerReference>,
    width: f32,
    height: f32,
) -> PdfLayerReference {
    if let Some(layer) = first.take() {
        return layer;
    }
    let (page, layer) = doc.add_page(Mm(width), Mm(height), "Layer 1");
    doc.get_page(page).get_layer(layer)
}

// ───────────────────────────────────────────────────────────────────────────
// Documents

fn draw_field(layer: &PdfLayerReference, fonts: &Fonts, placement: &FieldPlacement, value: &str) {
    let text = format!("{}{}", placement.label, value);
    let width = A4_WIDTH_MM - MARGIN - placement.x;
    layer.use_text(
        fit(&text, width, placement.font_size),
        placement.font_size,
        Mm(placement.x),
        Mm(placement.y),
        fonts.pick(placement.bold),
    );
}

fn draw_table_header(layer: &PdfLayerReference, fonts: &Fonts, table: &TableLayout) {
    for column in table.columns {
        layer.use_text(
            fit(column.header, column.width, table.font_size),
            table.font_size,
            Mm(column.x),
            Mm(table.top),
            &fonts.bold,
        );
    }
    rule(layer, MARGIN, A4_WIDTH_MM - MARGIN, table.top - 2.0);
}

/// Render one document on its layout, continuing the line table on further
/// pages when it does not fit.
pub fn render_document(document: &PrintableDocument) -> Result<Vec<u8>, RenderError> {
    let layout = DocumentLayout::for_kind(document.kind);
    let title = document.field("number").unwrap_or(document.kind.title());
    let (doc, page, layer) = PdfDocument::new(title, Mm(layout.page_width), Mm(layout.page_height), "Layer 1");
    let fonts = Fonts::load(&doc)?;
    let mut first = Some(doc.get_page(page).get_layer(layer));

    let table = &layout.table;
    let pages = page_ranges(document.rows.len(), table.rows_per_page());
    let page_count = pages.len();

    for (index, range) in pages.into_iter().enumerate() {
        let layer = new_page(&doc, &mut first, layout.page_width, layout.page_height);

        if index == 0 {
            for placement in layout.header {
                if let Some(value) = document.field(placement.key) {
                    draw_field(&layer, &fonts, placement, value);
                }
            }
        } else {
            let continued = format!(
                "{} {} (continued)",
                document.kind.title(),
                document.field("number").unwrap_or_default()
            );
            layer.use_text(continued, 12.0, Mm(MARGIN), Mm(layout.page_height - 17.0), &fonts.bold);
        }

        draw_table_header(&layer, &fonts, table);
        let mut y = table.top - table.row_height - 1.0;
        for row in &document.rows[range] {
            for (column, value) in table.columns.iter().zip(row) {
                layer.use_text(fit(value, column.width, table.font_size), table.font_size, Mm(column.x), Mm(y), &fonts.regular);
            }
            y -= table.row_height;
        }

        if index + 1 == page_count {
            rule(&layer, MARGIN, A4_WIDTH_MM - MARGIN, table.bottom);
            for placement in layout.footer {
                if let Some(value) = document.field(placement.key) {
                    draw_field(&layer, &fonts, placement, value);
                }
            }
        }
        layer.use_text(
            format!("Page {} of {page_count}", index + 1),
            8.0,
            Mm(A4_WIDTH_MM - MARGIN - 25.0),
            Mm(10.0),
            &fonts.regular,
        );
    }

    save(doc)
}

// ───────────────────────────────────────────────────────────────────────────
// Tabular reports

const REPORT_TOP: f32 = 270.0;
const REPORT_BOTTOM: f32 = 20.0;
const REPORT_ROW: f32 = 5.5;
const REPORT_FONT: f32 = 8.0;

/// Column x positions scaled from the spreadsheet widths to the printable width.
fn report_columns(report: &TabularReport) -> Vec<(f32, f32)> {
    let total: f32 = report.columns.iter().map(|c| f32::from(c.width)).sum::<f32>().max(1.0);
    let printable = A4_WIDTH_MM - 2.0 * MARGIN;
    let mut x = MARGIN;
    report
        .columns
        .iter()
        .map(|c| {
            let width = printable * f32::from(c.width) / total;
            let placed = (x, width);
            x += width;
            placed
        })
        .collect()
}

pub fn render_report(report: &TabularReport) -> Result<Vec<u8>, RenderError> {
    let (doc, page, layer) = PdfDocument::new(report.title.as_str(), Mm(A4_WIDTH_MM), Mm(A4_HEIGHT_MM), "Layer 1");
    let fonts = Fonts::load(&doc)?;
    let mut first = Some(doc.get_page(page).get_layer(layer));

    let columns = report_columns(report);
    let per_page = ((REPORT_TOP - REPORT_ROW - REPORT_BOTTOM) / REPORT_ROW).floor() as usize;
    let pages = page_ranges(report.rows.len(), per_page);
    let page_count = pages.len();

    for (index, range) in pages.into_iter().enumerate() {
        let layer = new_page(&doc, &mut first, A4_WIDTH_MM, A4_HEIGHT_MM);
        layer.use_text(report.title.as_str(), 14.0, Mm(MARGIN), Mm(282.0), &fonts.bold);
        layer.use_text(
            format!("As of {}   Page {} of {page_count}", report.generated_on, index + 1),
            8.0,
            Mm(MARGIN),
            Mm(277.0),
            &fonts.regular,
        );

        for (column, (x, width)) in report.columns.iter().zip(&columns) {
            layer.use_text(fit(column.header, *width, REPORT_FONT), REPORT_FONT, Mm(*x), Mm(REPORT_TOP), &fonts.bold);
        }
        rule(&layer, MARGIN, A4_WIDTH_MM - MARGIN, REPORT_TOP - 1.5);

        let mut y = REPORT_TOP - REPORT_ROW;
        for row in &report.rows[range] {
            for (cell, (x, width)) in row.iter().zip(&columns) {
                layer.use_text(fit(&cell.display(), *width, REPORT_FONT), REPORT_FONT, Mm(*x), Mm(y), &fonts.regular);
            }
            y -= REPORT_ROW;
        }
    }

    save(doc)
}
