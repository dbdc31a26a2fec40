use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_catalog::ItemId;
use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId};
use tradeflow_events::Event;
use tradeflow_parties::PartyId;
use tradeflow_workflow::{
    ApprovalState, DocumentKind, Fulfillment, LineQuantity, WorkflowAction, WorkflowCommand,
    WorkflowDocument, WorkflowEvent, validate_line_quantities,
};

/// Customer order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerOrderId(pub AggregateId);

impl CustomerOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: i64,
    /// Unit price in smallest currency unit (cents).
    pub unit_price: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineData {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderLineData {
    pub fn amount(&self) -> Result<Money, DomainError> {
        Money::line_amount(self.unit_price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub data: OrderLineData,
    /// Quantity allocated to delivery orders.
    pub delivered: Fulfillment,
}

impl OrderLine {
    pub fn outstanding(&self) -> i64 {
        self.delivered.outstanding()
    }
}

/// Aggregate root: a customer's sales order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerOrder {
    id: CustomerOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    customer_id: Option<PartyId>,
    order_date: Option<NaiveDate>,
    requested_delivery_date: Option<NaiveDate>,
    customer_reference: Option<String>,
    lines: Vec<OrderLine>,
    next_line_no: u32,
    approval: ApprovalState,
    version: u64,
    created: bool,
}

impl CustomerOrder {
    pub fn empty(id: CustomerOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            customer_id: None,
            order_date: None,
            requested_delivery_date: None,
            customer_reference: None,
            lines: Vec::new(),
            next_line_no: 1,
            approval: ApprovalState::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerOrderId {
        self.id
    }

    pub fn customer_id(&self) -> Option<PartyId> {
        self.customer_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn requested_delivery_date(&self) -> Option<NaiveDate> {
        self.requested_delivery_date
    }

    pub fn customer_reference(&self) -> Option<&str> {
        self.customer_reference.as_deref()
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.data.line_no == line_no)
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.data.amount()?))
    }

    pub fn is_fully_delivered(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.delivered.is_complete())
    }
}

impl AggregateRoot for CustomerOrder {
    type Id = CustomerOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerOrder {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub number: String,
    pub customer_id: PartyId,
    pub order_date: NaiveDate,
    pub requested_delivery_date: Option<NaiveDate>,
    pub customer_reference: Option<String>,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line: NewOrderLine,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line_no: u32,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Reserve outstanding quantity for a delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateDelivery {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub delivery_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

/// Return everything a delivery order held (it was cancelled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDelivery {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub delivery_order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerOrderCommand {
    CreateCustomerOrder(CreateCustomerOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    Workflow(WorkflowCommand),
    AllocateDelivery(AllocateDelivery),
    ReleaseDelivery(ReleaseDelivery),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub number: String,
    pub customer_id: PartyId,
    pub order_date: NaiveDate,
    pub requested_delivery_date: Option<NaiveDate>,
    pub customer_reference: Option<String>,
    pub lines: Vec<OrderLineData>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line: OrderLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line: OrderLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAllocated {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub delivery_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReleased {
    pub tenant_id: TenantId,
    pub order_id: CustomerOrderId,
    pub delivery_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerOrderEvent {
    CustomerOrderCreated(CustomerOrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    Workflow(WorkflowEvent),
    DeliveryAllocated(DeliveryAllocated),
    DeliveryReleased(DeliveryReleased),
}

impl Event for CustomerOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerOrderEvent::CustomerOrderCreated(_) => "sales.order.created",
            CustomerOrderEvent::LineAdded(_) => "sales.order.line_added",
            CustomerOrderEvent::LineUpdated(_) => "sales.order.line_updated",
            CustomerOrderEvent::LineRemoved(_) => "sales.order.line_removed",
            CustomerOrderEvent::Workflow(_) => "sales.order.workflow",
            CustomerOrderEvent::DeliveryAllocated(_) => "sales.order.delivery_allocated",
            CustomerOrderEvent::DeliveryReleased(_) => "sales.order.delivery_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerOrderEvent::CustomerOrderCreated(e) => e.occurred_at,
            CustomerOrderEvent::LineAdded(e) => e.occurred_at,
            CustomerOrderEvent::LineUpdated(e) => e.occurred_at,
            CustomerOrderEvent::LineRemoved(e) => e.occurred_at,
            CustomerOrderEvent::Workflow(e) => e.occurred_at,
            CustomerOrderEvent::DeliveryAllocated(e) => e.occurred_at,
            CustomerOrderEvent::DeliveryReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CustomerOrder {
    type Command = CustomerOrderCommand;
    type Event = CustomerOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerOrderEvent::CustomerOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.customer_id = Some(e.customer_id);
                self.order_date = Some(e.order_date);
                self.requested_delivery_date = e.requested_delivery_date;
                self.customer_reference = e.customer_reference.clone();
                self.lines = e
                    .lines
                    .iter()
                    .map(|d| OrderLine {
                        data: d.clone(),
                        delivered: Fulfillment::new(d.quantity),
                    })
                    .collect();
                self.next_line_no = e.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
                self.created = true;
            }
            CustomerOrderEvent::LineAdded(e) => {
                self.lines.push(OrderLine {
                    data: e.line.clone(),
                    delivered: Fulfillment::new(e.line.quantity),
                });
                self.next_line_no = self.next_line_no.max(e.line.line_no + 1);
            }
            CustomerOrderEvent::LineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == e.line.line_no) {
                    line.delivered.set_ordered(e.line.quantity);
                    line.data = e.line.clone();
                }
            }
            CustomerOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.data.line_no != e.line_no);
            }
            CustomerOrderEvent::Workflow(e) => self.approval.apply(e),
            CustomerOrderEvent::DeliveryAllocated(e) => {
                for q in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == q.line_no) {
                        line.delivered.allocate(e.delivery_order_id, q.quantity);
                    }
                }
            }
            CustomerOrderEvent::DeliveryReleased(e) => {
                for line in &mut self.lines {
                    line.delivered.release(e.delivery_order_id);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerOrderCommand::CreateCustomerOrder(cmd) => self.handle_create(cmd),
            CustomerOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            CustomerOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            CustomerOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            CustomerOrderCommand::Workflow(cmd) => self.handle_workflow(cmd),
            CustomerOrderCommand::AllocateDelivery(cmd) => self.handle_allocate(cmd),
            CustomerOrderCommand::ReleaseDelivery(cmd) => self.handle_release(cmd),
        }
    }
}

impl WorkflowDocument for CustomerOrder {
    const KIND: DocumentKind = DocumentKind::CustomerOrder;

    fn empty(id: AggregateId) -> Self {
        CustomerOrder::empty(CustomerOrderId::new(id))
    }

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command {
        CustomerOrderCommand::Workflow(cmd)
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
            CustomerOrderEvent::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

fn validate_line(quantity: i64, unit_price: Money) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Money::line_amount(unit_price, quantity)?;
    Ok(())
}

impl CustomerOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: CustomerOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn existing_line(&self, line_no: u32) -> Result<&OrderLine, DomainError> {
        self.line(line_no)
            .ok_or_else(|| DomainError::validation(format!("line {line_no} does not exist")))
    }

    fn handle_create(&self, cmd: &CreateCustomerOrder) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        if let Some(requested) = cmd.requested_delivery_date {
            if requested < cmd.order_date {
                return Err(DomainError::validation(
                    "requested delivery date cannot be before the order date",
                ));
            }
        }
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (i, line) in cmd.lines.iter().enumerate() {
            validate_line(line.quantity, line.unit_price)?;
            lines.push(OrderLineData {
                line_no: i as u32 + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        Ok(vec![CustomerOrderEvent::CustomerOrderCreated(CustomerOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            number: cmd.number.clone(),
            customer_id: cmd.customer_id,
            order_date: cmd.order_date,
            requested_delivery_date: cmd.requested_delivery_date,
            customer_reference: cmd.customer_reference.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        validate_line(cmd.line.quantity, cmd.line.unit_price)?;

        Ok(vec![CustomerOrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line: OrderLineData {
                line_no: self.next_line_no,
                item_id: cmd.line.item_id,
                quantity: cmd.line.quantity,
                unit_price: cmd.line.unit_price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        let line = self.existing_line(cmd.line_no)?;
        let quantity = cmd.quantity.unwrap_or(line.data.quantity);
        let unit_price = cmd.unit_price.unwrap_or(line.data.unit_price);
        line.delivered.check_reorder(quantity)?;
        validate_line(quantity, unit_price)?;

        Ok(vec![CustomerOrderEvent::LineUpdated(LineUpdated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line: OrderLineData {
                quantity,
                unit_price,
                ..line.data.clone()
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        let line = self.existing_line(cmd.line_no)?;
        if line.delivered.fulfilled() > 0 {
            return Err(DomainError::invariant("line already has delivered quantity"));
        }

        Ok(vec![CustomerOrderEvent::LineRemoved(LineRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_workflow(&self, cmd: &WorkflowCommand) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, CustomerOrderId::new(cmd.document_id))?;
        if matches!(cmd.action, WorkflowAction::Submit { .. }) && self.lines.is_empty() {
            return Err(DomainError::validation("cannot submit a customer order without lines"));
        }
        let event = self.approval.handle(DocumentKind::CustomerOrder, &self.number, cmd)?;
        Ok(vec![CustomerOrderEvent::Workflow(event)])
    }

    fn handle_allocate(&self, cmd: &AllocateDelivery) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_fulfillable()?;
        validate_line_quantities(&cmd.lines)?;
        if self.lines.iter().any(|l| l.delivered.allocated_to(cmd.delivery_order_id) > 0) {
            return Err(DomainError::conflict("delivery order already allocated"));
        }
        for q in &cmd.lines {
            let line = self.existing_line(q.line_no)?;
            line.delivered.check_allocate(q.quantity).map_err(|e| match e {
                DomainError::InvariantViolation(msg) => {
                    DomainError::invariant(format!("line {}: {msg}", q.line_no))
                }
                other => other,
            })?;
        }

        Ok(vec![CustomerOrderEvent::DeliveryAllocated(DeliveryAllocated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            delivery_order_id: cmd.delivery_order_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseDelivery) -> Result<Vec<CustomerOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        let lines: Vec<LineQuantity> = self
            .lines
            .iter()
            .map(|l| LineQuantity {
                line_no: l.data.line_no,
                quantity: l.delivered.allocated_to(cmd.delivery_order_id),
            })
            .filter(|q| q.quantity > 0)
            .collect();
        if lines.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![CustomerOrderEvent::DeliveryReleased(DeliveryReleased {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            delivery_order_id: cmd.delivery_order_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }
}
