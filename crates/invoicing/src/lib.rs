//! Invoicing domain module (event-sourced).
//!
//! Sales invoices billed against dispatched delivery orders, implemented purely
//! as deterministic domain logic (no IO, no HTTP, no storage).

pub mod invoice;

pub use invoice::{
    CreateSalesInvoice, InvoiceLine, InvoiceTotals, MAX_TAX_RATE_BPS, NewInvoiceLine,
    SalesInvoice, SalesInvoiceCommand, SalesInvoiceCreated, SalesInvoiceEvent, SalesInvoiceId,
};
