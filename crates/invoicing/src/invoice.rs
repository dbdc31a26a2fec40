use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_catalog::ItemId;
use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use tradeflow_events::Event;
use tradeflow_parties::PartyId;
use tradeflow_sales::DeliveryOrderId;
use tradeflow_workflow::{
    ApprovalState, DocumentKind, WorkflowCommand, WorkflowDocument, WorkflowEvent,
};

/// Highest accepted flat tax rate, 100%.
pub const MAX_TAX_RATE_BPS: u32 = 10_000;

/// Sales invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SalesInvoiceId(pub AggregateId);

impl SalesInvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SalesInvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice line billed from a delivery order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_no: u32,
    pub delivery_line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: Money,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl InvoiceTotals {
    /// Sum the lines and apply a flat tax rate, rounding the tax half-up.
    pub fn compute(lines: &[InvoiceLine], tax_rate_bps: u32) -> Result<Self, DomainError> {
        let subtotal = lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.amount))?;
        let tax = subtotal.percentage_bps(tax_rate_bps);
        Ok(Self {
            subtotal,
            tax,
            total: subtotal.checked_add(tax)?,
        })
    }
}

/// Aggregate root: a sales invoice billing one delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesInvoice {
    id: SalesInvoiceId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    delivery_order_id: Option<DeliveryOrderId>,
    invoice_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    tax_rate_bps: u32,
    lines: Vec<InvoiceLine>,
    totals: InvoiceTotals,
    notes: Option<String>,
    approval: ApprovalState,
    version: u64,
    created: bool,
}

impl SalesInvoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesInvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            delivery_order_id: None,
            invoice_date: None,
            due_date: None,
            tax_rate_bps: 0,
            lines: Vec::new(),
            totals: InvoiceTotals::default(),
            notes: None,
            approval: ApprovalState::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesInvoiceId {
        self.id
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn delivery_order_id(&self) -> Option<DeliveryOrderId> {
        self.delivery_order_id
    }

    pub fn invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn tax_rate_bps(&self) -> u32 {
        self.tax_rate_bps
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

impl AggregateRoot for SalesInvoice {
    type Id = SalesInvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceLine {
    pub delivery_line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Command: CreateSalesInvoice. The caller resolves the uninvoiced delivery
/// lines and the customer's payment terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSalesInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub number: String,
    pub customer_id: PartyId,
    pub delivery_order_id: DeliveryOrderId,
    pub invoice_date: NaiveDate,
    pub payment_terms_days: u32,
    pub tax_rate_bps: u32,
    pub lines: Vec<NewInvoiceLine>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesInvoiceCommand {
    CreateSalesInvoice(CreateSalesInvoice),
    Workflow(WorkflowCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesInvoiceCreated {
    pub tenant_id: TenantId,
    pub invoice_id: SalesInvoiceId,
    pub number: String,
    pub customer_id: PartyId,
    pub delivery_order_id: DeliveryOrderId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_rate_bps: u32,
    pub lines: Vec<InvoiceLine>,
    pub totals: InvoiceTotals,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesInvoiceEvent {
    SalesInvoiceCreated(SalesInvoiceCreated),
    Workflow(WorkflowEvent),
}

impl Event for SalesInvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesInvoiceEvent::SalesInvoiceCreated(_) => "invoicing.invoice.created",
            SalesInvoiceEvent::Workflow(_) => "invoicing.invoice.workflow",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesInvoiceEvent::SalesInvoiceCreated(e) => e.occurred_at,
            SalesInvoiceEvent::Workflow(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesInvoice {
    type Command = SalesInvoiceCommand;
    type Event = SalesInvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesInvoiceEvent::SalesInvoiceCreated(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.delivery_order_id = Some(e.delivery_order_id);
                self.invoice_date = Some(e.invoice_date);
                self.due_date = Some(e.due_date);
                self.tax_rate_bps = e.tax_rate_bps;
                self.lines = e.lines.clone();
                self.totals = e.totals;
                self.notes = e.notes.clone();
                self.created = true;
            }
            SalesInvoiceEvent::Workflow(e) => self.approval.apply(e),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesInvoiceCommand::CreateSalesInvoice(cmd) => self.handle_create(cmd),
            SalesInvoiceCommand::Workflow(cmd) => self.handle_workflow(cmd),
        }
    }
}

impl WorkflowDocument for SalesInvoice {
    const KIND: DocumentKind = DocumentKind::SalesInvoice;

    fn empty(id: AggregateId) -> Self {
        SalesInvoice::empty(SalesInvoiceId::new(id))
    }

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command {
        SalesInvoiceCommand::Workflow(cmd)
    }

    fn approval(&self) -> &ApprovalState {
        &self.approval
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn number(&self) -> &str {
        &self.number
    }

    fn is_created(&self) -> bool {
        self.created
    }

    fn workflow_event(event: &Self::Event) -> Option<&WorkflowEvent> {
        match event {
            SalesInvoiceEvent::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

impl SalesInvoice {
    fn handle_create(&self, cmd: &CreateSalesInvoice) -> Result<Vec<SalesInvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales invoice already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("nothing left to invoice on this delivery order"));
        }
        if cmd.tax_rate_bps > MAX_TAX_RATE_BPS {
            return Err(DomainError::validation("tax rate cannot exceed 100%"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (i, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            lines.push(InvoiceLine {
                line_no: i as u32 + 1,
                delivery_line_no: line.delivery_line_no,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                amount: Money::line_amount(line.unit_price, line.quantity)?,
            });
        }
        let totals = InvoiceTotals::compute(&lines, cmd.tax_rate_bps)?;
        let due_date = cmd
            .invoice_date
            .checked_add_days(Days::new(u64::from(cmd.payment_terms_days)))
            .ok_or_else(|| DomainError::validation("due date out of range"))?;

        Ok(vec![SalesInvoiceEvent::SalesInvoiceCreated(SalesInvoiceCreated {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            customer_id: cmd.customer_id,
            delivery_order_id: cmd.delivery_order_id,
            invoice_date: cmd.invoice_date,
            due_date,
            tax_rate_bps: cmd.tax_rate_bps,
            lines,
            totals,
            notes: cmd.notes.clone().filter(|n| !n.trim().is_empty()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_workflow(&self, cmd: &WorkflowCommand) -> Result<Vec<SalesInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id.0 != cmd.document_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        let event = self.approval.handle(DocumentKind::SalesInvoice, &self.number, cmd)?;
        Ok(vec![SalesInvoiceEvent::Workflow(event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tradeflow_core::UserId;
    use tradeflow_events::execute;
    use tradeflow_workflow::{Actor, ApprovalRoute, WorkflowAction, WorkflowStatus};

    fn line(delivery_line_no: u32, quantity: i64, cents: u64) -> NewInvoiceLine {
        NewInvoiceLine {
            delivery_line_no,
            item_id: ItemId::new(AggregateId::new()),
            quantity,
            unit_price: Money::from_cents(cents),
        }
    }

    fn create_cmd(lines: Vec<NewInvoiceLine>, tax_rate_bps: u32) -> CreateSalesInvoice {
        CreateSalesInvoice {
            tenant_id: TenantId::new(),
            invoice_id: SalesInvoiceId::new(AggregateId::new()),
            number: "SI-000001".into(),
            customer_id: PartyId::new(AggregateId::new()),
            delivery_order_id: DeliveryOrderId::new(AggregateId::new()),
            invoice_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            payment_terms_days: 30,
            tax_rate_bps,
            lines,
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    fn created(lines: Vec<NewInvoiceLine>, tax_rate_bps: u32) -> SalesInvoice {
        let cmd = create_cmd(lines, tax_rate_bps);
        let mut invoice = SalesInvoice::empty(cmd.invoice_id);
        execute(&mut invoice, &SalesInvoiceCommand::CreateSalesInvoice(cmd)).unwrap();
        invoice
    }

    #[test]
    fn totals_and_due_date() {
        let invoice = created(vec![line(1, 3, 1_000), line(2, 1, 499)], 1_000);
        let totals = invoice.totals();
        assert_eq!(totals.subtotal, Money::from_cents(3_499));
        // 349.9 rounds half-up to 350.
        assert_eq!(totals.tax, Money::from_cents(350));
        assert_eq!(totals.total, Money::from_cents(3_849));
        assert_eq!(invoice.due_date(), NaiveDate::from_ymd_opt(2026, 2, 14));
        assert_eq!(invoice.lines()[1].line_no, 2);
    }

    #[test]
    fn tax_rounds_half_up_at_exact_half() {
        // 5% of 10 cents is exactly 0.5 cents.
        let invoice = created(vec![line(1, 1, 10)], 500);
        assert_eq!(invoice.totals().tax, Money::from_cents(1));
    }

    #[test]
    fn rejects_empty_and_out_of_range_input() {
        let empty = SalesInvoice::empty(SalesInvoiceId::new(AggregateId::new()));
        let err = empty
            .handle(&SalesInvoiceCommand::CreateSalesInvoice(create_cmd(vec![], 0)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = empty
            .handle(&SalesInvoiceCommand::CreateSalesInvoice(create_cmd(vec![line(1, 1, 1)], 10_001)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn approval_then_close() {
        let mut invoice = created(vec![line(1, 2, 250)], 0);
        let tenant_id = invoice.tenant_id.unwrap();
        let accountant = Actor::new(UserId::new(), ["accountant"]);
        let manager = Actor::new(UserId::new(), ["manager"]);
        let wf = |actor: &Actor, action| {
            SalesInvoiceCommand::Workflow(WorkflowCommand {
                tenant_id,
                document_id: invoice.id.0,
                actor: actor.clone(),
                action,
                occurred_at: Utc::now(),
            })
        };

        let submit = wf(&accountant, WorkflowAction::Submit { route: ApprovalRoute::of_roles(["manager"]).unwrap() });
        let approve = wf(&manager, WorkflowAction::Approve { comment: Some("ok".into()) });
        let close = wf(&accountant, WorkflowAction::Close);
        execute(&mut invoice, &submit).unwrap();
        execute(&mut invoice, &approve).unwrap();
        execute(&mut invoice, &close).unwrap();
        assert_eq!(invoice.approval().status(), WorkflowStatus::Closed);
        assert_eq!(invoice.approval().history().len(), 3);
    }

    proptest! {
        #[test]
        fn total_is_subtotal_plus_tax(
            quantities in proptest::collection::vec((1i64..50, 1u64..100_000), 1..8),
            bps in 0u32..=10_000,
        ) {
            let lines = quantities
                .iter()
                .enumerate()
                .map(|(i, (q, p))| line(i as u32 + 1, *q, *p))
                .collect();
            let invoice = created(lines, bps);
            let t = invoice.totals();
            prop_assert_eq!(t.total.cents(), t.subtotal.cents() + t.tax.cents());
            prop_assert!(t.tax.cents() <= t.subtotal.cents());
        }
    }
}
