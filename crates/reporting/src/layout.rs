//! Field-coordinate page layouts for printed documents.
//!
//! Coordinates are millimetres from the bottom-left corner of an A4 page, the
//! way PDF addresses them.

use tradeflow_workflow::DocumentKind;

pub const A4_WIDTH_MM: f32 = 210.0;
pub const A4_HEIGHT_MM: f32 = 297.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FieldPlacement {
    /// Key into [`crate::PrintableDocument::fields`].
    pub key: &'static str,
    /// Printed before the value; empty for none.
    pub label: &'static str,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub bold: bool,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColumnPlacement {
    pub header: &'static str,
    pub x: f32,
    pub width: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TableLayout {
    /// Baseline of the header row.
    pub top: f32,
    /// Rows never go below this line.
    pub bottom: f32,
    pub row_height: f32,
    pub font_size: f32,
    pub columns: &'static [ColumnPlacement],
}

impl TableLayout {
    pub fn rows_per_page(&self) -> usize {
        let usable = self.top - self.row_height - self.bottom;
        ((usable / self.row_height).floor() as usize).max(1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DocumentLayout {
    pub kind: DocumentKind,
    pub page_width: f32,
    pub page_height: f32,
    /// Drawn on the first page.
    pub header: &'static [FieldPlacement],
    pub table: TableLayout,
    /// Drawn below the table on the last page.
    pub footer: &'static [FieldPlacement],
}

impl DocumentLayout {
    pub fn for_kind(kind: DocumentKind) -> &'static DocumentLayout {
        match kind {
            DocumentKind::PurchaseRequest => &PURCHASE_REQUEST,
            DocumentKind::PurchaseOrder => &PURCHASE_ORDER,
            DocumentKind::CustomerOrder => &CUSTOMER_ORDER,
            DocumentKind::DeliveryOrder => &DELIVERY_ORDER,
            DocumentKind::SalesInvoice => &SALES_INVOICE,
        }
    }

    /// Every field key this layout prints.
    pub fn field_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.header.iter().chain(self.footer.iter()).map(|f| f.key)
    }
}

const fn field(key: &'static str, label: &'static str, x: f32, y: f32) -> FieldPlacement {
    FieldPlacement { key, label, x, y, font_size: 10.0, bold: false }
}

const fn heading(key: &'static str, x: f32, y: f32, font_size: f32) -> FieldPlacement {
    FieldPlacement { key, label: "", x, y, font_size, bold: true }
}

const fn col(header: &'static str, x: f32, width: f32) -> ColumnPlacement {
    ColumnPlacement { header, x, width }
}

const fn table(columns: &'static [ColumnPlacement]) -> TableLayout {
    TableLayout { top: 205.0, bottom: 62.0, row_height: 6.0, font_size: 9.0, columns }
}

const fn layout(
    kind: DocumentKind,
    header: &'static [FieldPlacement],
    columns: &'static [ColumnPlacement],
    footer: &'static [FieldPlacement],
) -> DocumentLayout {
    DocumentLayout {
        kind,
        page_width: A4_WIDTH_MM,
        page_height: A4_HEIGHT_MM,
        header,
        table: table(columns),
        footer,
    }
}

// ───────────────────────────────────────────────────────────────────────────

static PURCHASE_REQUEST: DocumentLayout = layout(
    DocumentKind::PurchaseRequest,
    &[
        heading("title", 15.0, 280.0, 18.0),
        heading("number", 145.0, 280.0, 12.0),
        field("status", "Status: ", 145.0, 273.0),
        field("requested_by", "Requested by: ", 15.0, 255.0),
        field("department", "Department: ", 15.0, 249.0),
        field("remarks", "Remarks: ", 15.0, 235.0),
    ],
    &[
        col("#", 15.0, 8.0),
        col("Code", 23.0, 25.0),
        col("Item", 48.0, 55.0),
        col("Qty", 103.0, 15.0),
        col("Unit", 118.0, 12.0),
        col("Required by", 130.0, 22.0),
        col("Warehouse", 152.0, 25.0),
        col("Ordered", 177.0, 18.0),
    ],
    &[field("approval", "Approval: ", 15.0, 45.0)],
);

static PURCHASE_ORDER: DocumentLayout = layout(
    DocumentKind::PurchaseOrder,
    &[
        heading("title", 15.0, 280.0, 18.0),
        heading("number", 145.0, 280.0, 12.0),
        field("status", "Status: ", 145.0, 273.0),
        field("date", "Order date: ", 145.0, 267.0),
        field("expected_date", "Expected: ", 145.0, 261.0),
        heading("party", 15.0, 255.0, 11.0),
        field("party_address", "", 15.0, 249.0),
        field("warehouse", "Deliver to: ", 15.0, 237.0),
        field("reference", "Request: ", 145.0, 237.0),
    ],
    &[
        col("#", 15.0, 8.0),
        col("Code", 23.0, 25.0),
        col("Item", 48.0, 55.0),
        col("Qty", 103.0, 15.0),
        col("Unit", 118.0, 12.0),
        col("Price", 130.0, 22.0),
        col("Amount", 152.0, 25.0),
        col("Received", 177.0, 18.0),
    ],
    &[
        heading("total", 152.0, 50.0, 12.0),
        field("approval", "Approval: ", 15.0, 45.0),
    ],
);

static CUSTOMER_ORDER: DocumentLayout = layout(
    DocumentKind::CustomerOrder,
    &[
        heading("title", 15.0, 280.0, 18.0),
        heading("number", 145.0, 280.0, 12.0),
        field("status", "Status: ", 145.0, 273.0),
        field("date", "Order date: ", 145.0, 267.0),
        field("expected_date", "Delivery: ", 145.0, 261.0),
        heading("party", 15.0, 255.0, 11.0),
        field("party_address", "", 15.0, 249.0),
        field("reference", "Your ref: ", 145.0, 237.0),
    ],
    &[
        col("#", 15.0, 8.0),
        col("Code", 23.0, 25.0),
        col("Item", 48.0, 55.0),
        col("Qty", 103.0, 15.0),
        col("Unit", 118.0, 12.0),
        col("Price", 130.0, 22.0),
        col("Amount", 152.0, 25.0),
        col("Delivered", 177.0, 18.0),
    ],
    &[
        heading("total", 152.0, 50.0, 12.0),
        field("approval", "Approval: ", 15.0, 45.0),
    ],
);

static DELIVERY_ORDER: DocumentLayout = layout(
    DocumentKind::DeliveryOrder,
    &[
        heading("title", 15.0, 280.0, 18.0),
        heading("number", 145.0, 280.0, 12.0),
        field("status", "Status: ", 145.0, 273.0),
        field("date", "Delivery date: ", 145.0, 267.0),
        heading("party", 15.0, 255.0, 11.0),
        field("party_address", "Ship to: ", 15.0, 249.0),
        field("warehouse", "From: ", 15.0, 237.0),
        field("reference", "Order: ", 145.0, 237.0),
    ],
    &[
        col("#", 15.0, 8.0),
        col("Order line", 23.0, 20.0),
        col("Code", 43.0, 30.0),
        col("Item", 73.0, 80.0),
        col("Qty", 153.0, 20.0),
        col("Unit", 173.0, 22.0),
    ],
    &[
        field("received_by", "Received by: ____________________", 15.0, 50.0),
        field("approval", "Approval: ", 15.0, 42.0),
    ],
);

static SALES_INVOICE: DocumentLayout = layout(
    DocumentKind::SalesInvoice,
    &[
        heading("title", 15.0, 280.0, 18.0),
        heading("number", 145.0, 280.0, 12.0),
        field("status", "Status: ", 145.0, 273.0),
        field("date", "Invoice date: ", 145.0, 267.0),
        field("due_date", "Due: ", 145.0, 261.0),
        heading("party", 15.0, 255.0, 11.0),
        field("party_address", "", 15.0, 249.0),
        field("reference", "Delivery: ", 145.0, 237.0),
    ],
    &[
        col("#", 15.0, 8.0),
        col("Code", 23.0, 25.0),
        col("Item", 48.0, 60.0),
        col("Qty", 108.0, 15.0),
        col("Unit", 123.0, 12.0),
        col("Price", 135.0, 27.0),
        col("Amount", 162.0, 33.0),
    ],
    &[
        field("subtotal", "Subtotal: ", 140.0, 55.0),
        field("tax", "Tax: ", 140.0, 49.0),
        heading("total", 140.0, 42.0, 12.0),
        field("notes", "Notes: ", 15.0, 55.0),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_document_kind_has_a_layout() {
        for kind in DocumentKind::ALL {
            let layout = DocumentLayout::for_kind(kind);
            assert_eq!(layout.kind, kind);
            assert!(layout.field_keys().any(|k| k == "number"));
        }
    }

    #[test]
    fn columns_stay_on_the_page_and_do_not_overlap() {
        for kind in DocumentKind::ALL {
            let columns = DocumentLayout::for_kind(kind).table.columns;
            for pair in columns.windows(2) {
                assert!(pair[0].x + pair[0].width <= pair[1].x + 0.01, "{kind:?}: {} overlaps", pair[0].header);
            }
            let last = columns[columns.len() - 1];
            assert!(last.x + last.width <= A4_WIDTH_MM - 10.0);
        }
    }

    #[test]
    fn footer_sits_below_the_table() {
        for kind in DocumentKind::ALL {
            let layout = DocumentLayout::for_kind(kind);
            assert!(layout.footer.iter().all(|f| f.y < layout.table.bottom));
            assert!(layout.header.iter().all(|f| f.y > layout.table.top));
        }
    }

    #[test]
    fn rows_per_page_counts_whole_rows() {
        assert_eq!(PURCHASE_ORDER.table.rows_per_page(), 22);
    }
}
