//! Excel export of tabular reports.

use rust_xlsxwriter::{Format, Workbook};

use crate::error::RenderError;
use crate::report::{Cell, TabularReport};

const MONEY_FORMAT: &str = "#,##0.00";

/// Sheet names are capped at 31 characters and may not contain `[]:*?/\`.
fn sheet_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect()
}

pub fn render_report(report: &TabularReport) -> Result<Vec<u8>, RenderError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(&report.title))?;

    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format(MONEY_FORMAT);

    sheet.write_string_with_format(0, 0, report.title.as_str(), &bold)?;
    sheet.write_string(1, 0, format!("As of {}", report.generated_on))?;

    let header_row = 3;
    for (col, column) in report.columns.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(header_row, col, column.header, &bold)?;
        sheet.set_column_width(col, column.width)?;
    }

    for (offset, row) in report.rows.iter().enumerate() {
        let r = header_row + 1 + offset as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => {
                    sheet.write_string(r, col, s.as_str())?;
                }
                Cell::Integer(n) => {
                    sheet.write_number(r, col, *n as f64)?;
                }
                Cell::Money(m) => {
                    sheet.write_number_with_format(r, col, m.cents() as f64 / 100.0, &money)?;
                }
                Cell::Date(d) => {
                    sheet.write_string(r, col, d.to_string())?;
                }
                Cell::Empty => {}
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_sanitised() {
        assert_eq!(sheet_name("Stock on Hand"), "Stock on Hand");
        assert_eq!(sheet_name("A/B [draft]?"), "AB draft");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }
}
