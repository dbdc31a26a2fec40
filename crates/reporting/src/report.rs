//! Tabular registers built from the read models.

use core::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;

use tradeflow_core::{DomainError, Money};
use tradeflow_workflow::{WorkflowDocument, WorkflowStatus};

use crate::document::{Directory, bps_percent};
use crate::error::RenderError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    OutstandingPurchaseOrders,
    OutstandingCustomerOrders,
    InvoiceRegister,
    StockOnHand,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::OutstandingPurchaseOrders,
        ReportKind::OutstandingCustomerOrders,
        ReportKind::InvoiceRegister,
        ReportKind::StockOnHand,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::OutstandingPurchaseOrders => "outstanding-purchase-orders",
            ReportKind::OutstandingCustomerOrders => "outstanding-customer-orders",
            ReportKind::InvoiceRegister => "invoice-register",
            ReportKind::StockOnHand => "stock-on-hand",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ReportKind::OutstandingPurchaseOrders => "Outstanding Purchase Orders",
            ReportKind::OutstandingCustomerOrders => "Outstanding Customer Orders",
            ReportKind::InvoiceRegister => "Sales Invoice Register",
            ReportKind::StockOnHand => "Stock on Hand",
        }
    }
}

impl FromStr for ReportKind {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportKind::ALL
            .into_iter()
            .find(|k| k.slug() == s)
            .ok_or_else(|| RenderError::UnknownReport(s.to_string()))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Xlsx,
}

impl ReportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(ReportFormat::Pdf),
            "xlsx" | "excel" => Ok(ReportFormat::Xlsx),
            other => Err(RenderError::UnknownReport(format!("format {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Text(String),
    Integer(i64),
    Money(Money),
    Date(NaiveDate),
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn date(value: Option<NaiveDate>) -> Self {
        value.map(Cell::Date).unwrap_or(Cell::Empty)
    }

    /// How the cell reads on paper.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Integer(n) => n.to_string(),
            Cell::Money(m) => m.to_string(),
            Cell::Date(d) => d.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub header: &'static str,
    /// Width in spreadsheet characters; PDF columns are scaled from it.
    pub width: u16,
}

const fn column(header: &'static str, width: u16) -> Column {
    Column { header, width }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabularReport {
    pub kind: ReportKind,
    pub title: String,
    pub generated_on: NaiveDate,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl TabularReport {
    fn new(kind: ReportKind, generated_on: NaiveDate, columns: Vec<Column>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            generated_on,
            columns,
            rows: Vec::new(),
        }
    }

    pub fn file_name(&self, format: ReportFormat) -> String {
        format!("{}-{}.{}", self.kind.slug(), self.generated_on, format.extension())
    }

    /// Build `kind` for the directory's tenant.
    pub fn build(kind: ReportKind, dir: &Directory<'_>, generated_on: NaiveDate) -> Result<Self, DomainError> {
        match kind {
            ReportKind::OutstandingPurchaseOrders => outstanding_purchase_orders(dir, generated_on),
            ReportKind::OutstandingCustomerOrders => outstanding_customer_orders(dir, generated_on),
            ReportKind::InvoiceRegister => Ok(invoice_register(dir, generated_on)),
            ReportKind::StockOnHand => Ok(stock_on_hand(dir, generated_on)),
        }
    }
}

fn open_for_fulfilment(status: WorkflowStatus) -> bool {
    status == WorkflowStatus::Approved
}

/// One row per approved PO line still awaiting goods.
pub fn outstanding_purchase_orders(dir: &Directory<'_>, generated_on: NaiveDate) -> Result<TabularReport, DomainError> {
    let mut report = TabularReport::new(
        ReportKind::OutstandingPurchaseOrders,
        generated_on,
        vec![
            column("PO", 12),
            column("Supplier", 28),
            column("Expected", 12),
            column("Item", 14),
            column("Description", 30),
            column("Ordered", 10),
            column("Received", 10),
            column("Outstanding", 12),
            column("Open value", 14),
        ],
    );

    let mut orders = dir.read_models().purchase_orders.list(dir.tenant_id());
    orders.retain(|po| open_for_fulfilment(po.approval().status()));
    orders.sort_by(|a, b| a.number().cmp(b.number()));

    for po in &orders {
        let supplier = po.supplier_id().map(|s| dir.party_name(s)).unwrap_or_default();
        for line in po.lines().iter().filter(|l| l.outstanding() > 0) {
            let (code, name, _) = dir.item(line.data.item_id);
            report.rows.push(vec![
                Cell::text(po.number()),
                Cell::text(supplier.clone()),
                Cell::date(po.expected_date()),
                Cell::Text(code),
                Cell::Text(name),
                Cell::Integer(line.data.quantity),
                Cell::Integer(line.received.fulfilled()),
                Cell::Integer(line.outstanding()),
                Cell::Money(Money::line_amount(line.data.unit_price, line.outstanding())?),
            ]);
        }
    }
    Ok(report)
}

/// One row per approved customer order line still to be delivered.
pub fn outstanding_customer_orders(dir: &Directory<'_>, generated_on: NaiveDate) -> Result<TabularReport, DomainError> {
    let mut report = TabularReport::new(
        ReportKind::OutstandingCustomerOrders,
        generated_on,
        vec![
            column("CO", 12),
            column("Customer", 28),
            column("Requested", 12),
            column("Item", 14),
            column("Description", 30),
            column("Ordered", 10),
            column("Delivered", 10),
            column("Outstanding", 12),
            column("Open value", 14),
        ],
    );

    let mut orders = dir.read_models().customer_orders.list(dir.tenant_id());
    orders.retain(|co| open_for_fulfilment(co.approval().status()));
    orders.sort_by(|a, b| a.number().cmp(b.number()));

    for co in &orders {
        let customer = co.customer_id().map(|c| dir.party_name(c)).unwrap_or_default();
        for line in co.lines().iter().filter(|l| l.outstanding() > 0) {
            let (code, name, _) = dir.item(line.data.item_id);
            report.rows.push(vec![
                Cell::text(co.number()),
                Cell::text(customer.clone()),
                Cell::date(co.requested_delivery_date()),
                Cell::Text(code),
                Cell::Text(name),
                Cell::Integer(line.data.quantity),
                Cell::Integer(line.delivered.fulfilled()),
                Cell::Integer(line.outstanding()),
                Cell::Money(Money::line_amount(line.data.unit_price, line.outstanding())?),
            ]);
        }
    }
    Ok(report)
}

/// Every sales invoice, cancelled ones included with their status.
pub fn invoice_register(dir: &Directory<'_>, generated_on: NaiveDate) -> TabularReport {
    let mut report = TabularReport::new(
        ReportKind::InvoiceRegister,
        generated_on,
        vec![
            column("Invoice", 12),
            column("Date", 12),
            column("Due", 12),
            column("Customer", 28),
            column("Status", 16),
            column("Tax rate", 10),
            column("Subtotal", 14),
            column("Tax", 12),
            column("Total", 14),
        ],
    );

    let mut invoices = dir.read_models().sales_invoices.list(dir.tenant_id());
    invoices.sort_by(|a, b| (a.invoice_date(), a.number()).cmp(&(b.invoice_date(), b.number())));

    for si in &invoices {
        let totals = si.totals();
        report.rows.push(vec![
            Cell::text(si.number()),
            Cell::date(si.invoice_date()),
            Cell::date(si.due_date()),
            Cell::text(si.customer_id().map(|c| dir.party_name(c)).unwrap_or_default()),
            Cell::text(si.approval().status().to_string()),
            Cell::text(bps_percent(si.tax_rate_bps())),
            Cell::Money(totals.subtotal),
            Cell::Money(totals.tax),
            Cell::Money(totals.total),
        ]);
    }
    report
}

pub fn stock_on_hand(dir: &Directory<'_>, generated_on: NaiveDate) -> TabularReport {
    let mut report = TabularReport::new(
        ReportKind::StockOnHand,
        generated_on,
        vec![
            column("Warehouse", 20),
            column("Item", 14),
            column("Description", 30),
            column("Unit", 8),
            column("Received", 12),
            column("Dispatched", 12),
            column("On hand", 12),
        ],
    );

    let mut rows: Vec<_> = dir
        .read_models()
        .stock
        .list(dir.tenant_id())
        .into_iter()
        .map(|level| {
            let warehouse = dir.warehouse_name(level.warehouse_id);
            let (code, name, unit) = dir.item(level.item_id);
            (warehouse, code, name, unit, level)
        })
        .collect();
    rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    for (warehouse, code, name, unit, level) in rows {
        report.rows.push(vec![
            Cell::Text(warehouse),
            Cell::Text(code),
            Cell::Text(name),
            Cell::Text(unit),
            Cell::Integer(level.received),
            Cell::Integer(level.dispatched),
            Cell::Integer(level.on_hand()),
        ]);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_kinds_parse_from_their_slugs() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.slug().parse::<ReportKind>().unwrap(), kind);
        }
        assert!(matches!("ledger".parse::<ReportKind>(), Err(RenderError::UnknownReport(_))));
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("PDF".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert_eq!("excel".parse::<ReportFormat>().unwrap(), ReportFormat::Xlsx);
        assert!("csv".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn cells_display_like_the_printed_page() {
        assert_eq!(Cell::Money(Money::from_cents(123_456)).display(), "1234.56");
        assert_eq!(Cell::date(None).display(), "");
        assert_eq!(Cell::Integer(-3).display(), "-3");
    }
}
