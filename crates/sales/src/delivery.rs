use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_catalog::{ItemId, WarehouseId};
use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use tradeflow_events::Event;
use tradeflow_parties::PartyId;
use tradeflow_workflow::{
    ApprovalState, DocumentKind, Fulfillment, LineQuantity, WorkflowCommand, WorkflowDocument,
    WorkflowEvent, WorkflowStatus, WorkflowTransition, validate_line_quantities,
};

use crate::order::CustomerOrderId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryOrderId(pub AggregateId);

impl DeliveryOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeliveryOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A delivery line as copied from the customer order line it fulfils.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryLineData {
    pub line_no: u32,
    pub order_line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl DeliveryLineData {
    pub fn amount(&self) -> Result<Money, DomainError> {
        Money::line_amount(self.unit_price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryLine {
    pub data: DeliveryLineData,
    /// Quantity billed on sales invoices.
    pub invoiced: Fulfillment,
}

impl DeliveryLine {
    pub fn uninvoiced(&self) -> i64 {
        self.invoiced.outstanding()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Aggregate root: goods shipped to a customer against one customer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOrder {
    id: DeliveryOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_order_id: Option<CustomerOrderId>,
    customer_id: Option<PartyId>,
    warehouse_id: Option<WarehouseId>,
    delivery_date: Option<NaiveDate>,
    shipping_address: Option<String>,
    lines: Vec<DeliveryLine>,
    dispatched: bool,
    approval: ApprovalState,
    version: u64,
    created: bool,
}

impl DeliveryOrder {
    pub fn empty(id: DeliveryOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_order_id: None,
            customer_id: None,
            warehouse_id: None,
            delivery_date: None,
            shipping_address: None,
            lines: Vec::new(),
            dispatched: false,
            approval: ApprovalState::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> DeliveryOrderId {
        self.id
    }

    pub fn customer_order_id(&self) -> Option<CustomerOrderId> {
        self.customer_order_id
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn lines(&self) -> &[DeliveryLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&DeliveryLine> {
        self.lines.iter().find(|l| l.data.line_no == line_no)
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.data.amount()?))
    }

    /// Lines that still have quantity to bill, at their uninvoiced quantity.
    pub fn uninvoiced_lines(&self) -> Vec<LineQuantity> {
        self.lines
            .iter()
            .filter(|l| l.uninvoiced() > 0)
            .map(|l| LineQuantity {
                line_no: l.data.line_no,
                quantity: l.uninvoiced(),
            })
            .collect()
    }
}

impl AggregateRoot for DeliveryOrder {
    type Id = DeliveryOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDeliveryLine {
    pub order_line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Create a delivery order. The lines are resolved from the customer order by
/// the caller, which also allocates the quantities on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeliveryOrder {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub number: String,
    pub customer_order_id: CustomerOrderId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub delivery_date: NaiveDate,
    pub shipping_address: Option<String>,
    pub lines: Vec<NewDeliveryLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInvoiced {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub sales_invoice_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInvoiced {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub sales_invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOrderCommand {
    CreateDeliveryOrder(CreateDeliveryOrder),
    Workflow(WorkflowCommand),
    RecordInvoiced(RecordInvoiced),
    ReleaseInvoiced(ReleaseInvoiced),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOrderCreated {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub number: String,
    pub customer_order_id: CustomerOrderId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub delivery_date: NaiveDate,
    pub shipping_address: Option<String>,
    pub lines: Vec<DeliveryLineData>,
    pub occurred_at: DateTime<Utc>,
}

/// Goods left the warehouse. Emitted together with the approving workflow event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDispatched {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub customer_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub lines: Vec<DispatchedLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicedQuantitiesRecorded {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub sales_invoice_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicedQuantitiesReleased {
    pub tenant_id: TenantId,
    pub delivery_id: DeliveryOrderId,
    pub sales_invoice_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOrderEvent {
    DeliveryOrderCreated(DeliveryOrderCreated),
    Workflow(WorkflowEvent),
    DeliveryDispatched(DeliveryDispatched),
    InvoicedQuantitiesRecorded(InvoicedQuantitiesRecorded),
    InvoicedQuantitiesReleased(InvoicedQuantitiesReleased),
}

impl Event for DeliveryOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeliveryOrderEvent::DeliveryOrderCreated(_) => "sales.delivery.created",
            DeliveryOrderEvent::Workflow(_) => "sales.delivery.workflow",
            DeliveryOrderEvent::DeliveryDispatched(_) => "sales.delivery.dispatched",
            DeliveryOrderEvent::InvoicedQuantitiesRecorded(_) => "sales.delivery.invoiced_recorded",
            DeliveryOrderEvent::InvoicedQuantitiesReleased(_) => "sales.delivery.invoiced_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DeliveryOrderEvent::DeliveryOrderCreated(e) => e.occurred_at,
            DeliveryOrderEvent::Workflow(e) => e.occurred_at,
            DeliveryOrderEvent::DeliveryDispatched(e) => e.occurred_at,
            DeliveryOrderEvent::InvoicedQuantitiesRecorded(e) => e.occurred_at,
            DeliveryOrderEvent::InvoicedQuantitiesReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DeliveryOrder {
    type Command = DeliveryOrderCommand;
    type Event = DeliveryOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DeliveryOrderEvent::DeliveryOrderCreated(e) => {
                self.id = e.delivery_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_order_id = Some(e.customer_order_id);
                self.customer_id = Some(e.customer_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.delivery_date = Some(e.delivery_date);
                self.shipping_address = e.shipping_address.clone();
                self.lines = e
                    .lines
                    .iter()
                    .map(|d| DeliveryLine {
                        data: d.clone(),
                        invoiced: Fulfillment::new(d.quantity),
                    })
                    .collect();
                self.created = true;
            }
            DeliveryOrderEvent::Workflow(e) => self.approval.apply(e),
            DeliveryOrderEvent::DeliveryDispatched(_) => self.dispatched = true,
            DeliveryOrderEvent::InvoicedQuantitiesRecorded(e) => {
                for q in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == q.line_no) {
                        line.invoiced.allocate(e.sales_invoice_id, q.quantity);
                    }
                }
            }
            DeliveryOrderEvent::InvoicedQuantitiesReleased(e) => {
                for line in &mut self.lines {
                    line.invoiced.release(e.sales_invoice_id);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DeliveryOrderCommand::CreateDeliveryOrder(cmd) => self.handle_create(cmd),
            DeliveryOrderCommand::Workflow(cmd) => self.handle_workflow(cmd),
            DeliveryOrderCommand::RecordInvoiced(cmd) => self.handle_record_invoiced(cmd),
            DeliveryOrderCommand::ReleaseInvoiced(cmd) => self.handle_release_invoiced(cmd),
        }
    }
}

impl WorkflowDocument for DeliveryOrder {
    const KIND: DocumentKind = DocumentKind::DeliveryOrder;

    fn empty(id: AggregateId) -> Self {
        DeliveryOrder::empty(DeliveryOrderId::new(id))
    }

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command {
        DeliveryOrderCommand::Workflow(cmd)
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
            DeliveryOrderEvent::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

/// Whether applying `transition` leaves the document approved.
fn approves(transition: &WorkflowTransition) -> bool {
    match transition {
        WorkflowTransition::Submitted { route } => route.is_empty(),
        WorkflowTransition::StepApproved { final_step, .. } => *final_step,
        _ => false,
    }
}

impl DeliveryOrder {
    fn ensure_existing(&self, tenant_id: TenantId, delivery_id: DeliveryOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != delivery_id {
            return Err(DomainError::invariant("delivery_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateDeliveryOrder) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("delivery order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a delivery order needs at least one line"));
        }
        let mut seen = std::collections::HashSet::new();
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (i, line) in cmd.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if !seen.insert(line.order_line_no) {
                return Err(DomainError::validation(format!(
                    "order line {} listed twice",
                    line.order_line_no
                )));
            }
            Money::line_amount(line.unit_price, line.quantity)?;
            lines.push(DeliveryLineData {
                line_no: i as u32 + 1,
                order_line_no: line.order_line_no,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        Ok(vec![DeliveryOrderEvent::DeliveryOrderCreated(DeliveryOrderCreated {
            tenant_id: cmd.tenant_id,
            delivery_id: cmd.delivery_id,
            number: cmd.number.clone(),
            customer_order_id: cmd.customer_order_id,
            customer_id: cmd.customer_id,
            warehouse_id: cmd.warehouse_id,
            delivery_date: cmd.delivery_date,
            shipping_address: cmd.shipping_address.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_workflow(&self, cmd: &WorkflowCommand) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, DeliveryOrderId::new(cmd.document_id))?;
        let event = self.approval.handle(DocumentKind::DeliveryOrder, &self.number, cmd)?;
        let dispatch = approves(&event.transition) && !self.dispatched;

        let mut events = vec![DeliveryOrderEvent::Workflow(event)];
        if dispatch {
            let customer_id = self
                .customer_id
                .ok_or_else(|| DomainError::invariant("customer must be set"))?;
            let warehouse_id = self
                .warehouse_id
                .ok_or_else(|| DomainError::invariant("warehouse must be set"))?;
            events.push(DeliveryOrderEvent::DeliveryDispatched(DeliveryDispatched {
                tenant_id: cmd.tenant_id,
                delivery_id: self.id,
                customer_id,
                warehouse_id,
                lines: self
                    .lines
                    .iter()
                    .map(|l| DispatchedLine {
                        line_no: l.data.line_no,
                        item_id: l.data.item_id,
                        quantity: l.data.quantity,
                    })
                    .collect(),
                occurred_at: cmd.occurred_at,
            }));
        }
        Ok(events)
    }

    fn handle_record_invoiced(&self, cmd: &RecordInvoiced) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.delivery_id)?;
        self.approval.ensure_fulfillable().map_err(|e| match e {
            DomainError::InvariantViolation(msg) => {
                DomainError::invariant(format!("cannot invoice delivery: {msg}"))
            }
            other => other,
        })?;
        validate_line_quantities(&cmd.lines)?;
        if self.lines.iter().any(|l| l.invoiced.allocated_to(cmd.sales_invoice_id) > 0) {
            return Err(DomainError::conflict("sales invoice already recorded"));
        }
        for q in &cmd.lines {
            let line = self
                .line(q.line_no)
                .ok_or_else(|| DomainError::validation(format!("line {} does not exist", q.line_no)))?;
            line.invoiced.check_allocate(q.quantity).map_err(|e| match e {
                DomainError::InvariantViolation(msg) => {
                    DomainError::invariant(format!("line {}: {msg}", q.line_no))
                }
                other => other,
            })?;
        }

        Ok(vec![DeliveryOrderEvent::InvoicedQuantitiesRecorded(InvoicedQuantitiesRecorded {
            tenant_id: cmd.tenant_id,
            delivery_id: cmd.delivery_id,
            sales_invoice_id: cmd.sales_invoice_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release_invoiced(&self, cmd: &ReleaseInvoiced) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.delivery_id)?;
        let lines: Vec<LineQuantity> = self
            .lines
            .iter()
            .map(|l| LineQuantity {
                line_no: l.data.line_no,
                quantity: l.invoiced.allocated_to(cmd.sales_invoice_id),
            })
            .filter(|q| q.quantity > 0)
            .collect();
        if lines.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![DeliveryOrderEvent::InvoicedQuantitiesReleased(InvoicedQuantitiesReleased {
            tenant_id: cmd.tenant_id,
            delivery_id: cmd.delivery_id,
            sales_invoice_id: cmd.sales_invoice_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// True once the delivery is approved and its goods have left the warehouse.
    pub fn is_open_for_invoicing(&self) -> bool {
        self.dispatched && self.approval.status() == WorkflowStatus::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_core::UserId;
    use tradeflow_events::execute;
    use tradeflow_workflow::{Actor, ApprovalRoute, WorkflowAction};

    struct Fixture {
        tenant_id: TenantId,
        delivery_id: DeliveryOrderId,
        clerk: Actor,
        delivery: DeliveryOrder,
    }

    fn created() -> Fixture {
        let tenant_id = TenantId::new();
        let delivery_id = DeliveryOrderId::new(AggregateId::new());
        let mut delivery = DeliveryOrder::empty(delivery_id);
        execute(
            &mut delivery,
            &DeliveryOrderCommand::CreateDeliveryOrder(CreateDeliveryOrder {
                tenant_id,
                delivery_id,
                number: "DO-000001".into(),
                customer_order_id: CustomerOrderId::new(AggregateId::new()),
                customer_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                delivery_date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
                shipping_address: Some("Dock 4".into()),
                lines: vec![
                    NewDeliveryLine {
                        order_line_no: 1,
                        item_id: ItemId::new(AggregateId::new()),
                        quantity: 6,
                        unit_price: Money::from_cents(500),
                    },
                    NewDeliveryLine {
                        order_line_no: 3,
                        item_id: ItemId::new(AggregateId::new()),
                        quantity: 2,
                        unit_price: Money::from_cents(1_250),
                    },
                ],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        Fixture {
            tenant_id,
            delivery_id,
            clerk: Actor::new(UserId::new(), ["warehouse"]),
            delivery,
        }
    }

    fn workflow(f: &mut Fixture, actor: &Actor, action: WorkflowAction) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        execute(
            &mut f.delivery,
            &DeliveryOrderCommand::Workflow(WorkflowCommand {
                tenant_id: f.tenant_id,
                document_id: f.delivery_id.0,
                actor: actor.clone(),
                action,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn record(f: &mut Fixture, invoice: AggregateId, lines: Vec<LineQuantity>) -> Result<Vec<DeliveryOrderEvent>, DomainError> {
        execute(
            &mut f.delivery,
            &DeliveryOrderCommand::RecordInvoiced(RecordInvoiced {
                tenant_id: f.tenant_id,
                delivery_id: f.delivery_id,
                sales_invoice_id: invoice,
                lines,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn final_approval_dispatches_goods() {
        let mut f = created();
        let clerk = f.clerk.clone();
        let manager = Actor::new(UserId::new(), ["manager"]);

        let events = workflow(
            &mut f,
            &clerk,
            WorkflowAction::Submit { route: ApprovalRoute::of_roles(["manager"]).unwrap() },
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert!(!f.delivery.is_dispatched());

        let events = workflow(&mut f, &manager, WorkflowAction::Approve { comment: None }).unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            DeliveryOrderEvent::DeliveryDispatched(d) => {
                assert_eq!(d.lines.len(), 2);
                assert_eq!(d.lines[0].quantity, 6);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
        assert!(f.delivery.is_dispatched());
        assert!(f.delivery.is_open_for_invoicing());
        assert_eq!(f.delivery.total().unwrap(), Money::from_cents(5_500));
    }

    #[test]
    fn empty_route_dispatches_on_submit() {
        let mut f = created();
        let clerk = f.clerk.clone();
        let events = workflow(&mut f, &clerk, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();
        assert_eq!(events.len(), 2);
        assert!(f.delivery.is_dispatched());
    }

    #[test]
    fn invoicing_requires_approval() {
        let mut f = created();
        let err = record(&mut f, AggregateId::new(), vec![LineQuantity { line_no: 1, quantity: 1 }]).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn invoiced_quantities_are_bounded_and_releasable() {
        let mut f = created();
        let clerk = f.clerk.clone();
        workflow(&mut f, &clerk, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();

        let invoice = AggregateId::new();
        record(&mut f, invoice, vec![LineQuantity { line_no: 1, quantity: 6 }]).unwrap();
        assert_eq!(f.delivery.uninvoiced_lines(), vec![LineQuantity { line_no: 2, quantity: 2 }]);

        assert!(record(&mut f, AggregateId::new(), vec![LineQuantity { line_no: 1, quantity: 1 }]).is_err());

        let released = execute(
            &mut f.delivery,
            &DeliveryOrderCommand::ReleaseInvoiced(ReleaseInvoiced {
                tenant_id: f.tenant_id,
                delivery_id: f.delivery_id,
                sales_invoice_id: invoice,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(f.delivery.line(1).unwrap().uninvoiced(), 6);
    }

    #[test]
    fn cancel_only_before_dispatch() {
        let mut f = created();
        let clerk = f.clerk.clone();
        workflow(&mut f, &clerk, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();
        let err = workflow(&mut f, &clerk, WorkflowAction::Cancel { reason: "wrong truck".into() }).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn duplicate_order_lines_are_rejected() {
        let tenant_id = TenantId::new();
        let delivery_id = DeliveryOrderId::new(AggregateId::new());
        let item = ItemId::new(AggregateId::new());
        let line = NewDeliveryLine {
            order_line_no: 1,
            item_id: item,
            quantity: 1,
            unit_price: Money::from_cents(1),
        };
        let err = DeliveryOrder::empty(delivery_id)
            .handle(&DeliveryOrderCommand::CreateDeliveryOrder(CreateDeliveryOrder {
                tenant_id,
                delivery_id,
                number: "DO-000002".into(),
                customer_order_id: CustomerOrderId::new(AggregateId::new()),
                customer_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                delivery_date: NaiveDate::from_ymd_opt(2026, 10, 12).unwrap(),
                shipping_address: None,
                lines: vec![line.clone(), line],
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
