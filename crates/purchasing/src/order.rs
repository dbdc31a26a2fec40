use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_catalog::{ItemId, WarehouseId};
use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money, TenantId, UserId};
use tradeflow_events::Event;
use tradeflow_parties::PartyId;
use tradeflow_workflow::{
    ApprovalState, DocumentKind, Fulfillment, LineQuantity, WorkflowAction, WorkflowCommand,
    WorkflowDocument, WorkflowEvent, validate_line_quantities,
};

use crate::request::PurchaseRequestId;

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The purchase request line an order line was converted from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineRef {
    pub request_id: PurchaseRequestId,
    pub line_no: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
    pub source: Option<RequestLineRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineData {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
    pub source: Option<RequestLineRef>,
}

impl OrderLineData {
    pub fn amount(&self) -> Result<Money, DomainError> {
        Money::line_amount(self.unit_price, self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderLine {
    pub data: OrderLineData,
    pub received: Fulfillment,
}

impl PurchaseOrderLine {
    pub fn outstanding(&self) -> i64 {
        self.received.outstanding()
    }
}

/// Quantity of one order line taken into stock by a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    supplier_id: Option<PartyId>,
    warehouse_id: Option<WarehouseId>,
    order_date: Option<NaiveDate>,
    expected_date: Option<NaiveDate>,
    source_request: Option<PurchaseRequestId>,
    lines: Vec<PurchaseOrderLine>,
    next_line_no: u32,
    receipts: Vec<AggregateId>,
    approval: ApprovalState,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            supplier_id: None,
            warehouse_id: None,
            order_date: None,
            expected_date: None,
            source_request: None,
            lines: Vec::new(),
            next_line_no: 1,
            receipts: Vec::new(),
            approval: ApprovalState::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn order_date(&self) -> Option<NaiveDate> {
        self.order_date
    }

    pub fn expected_date(&self) -> Option<NaiveDate> {
        self.expected_date
    }

    pub fn source_request(&self) -> Option<PurchaseRequestId> {
        self.source_request
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|l| l.data.line_no == line_no)
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        self.lines
            .iter()
            .try_fold(Money::ZERO, |acc, l| acc.checked_add(l.data.amount()?))
    }

    pub fn is_fully_received(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|l| l.received.is_complete())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub source_request: Option<PurchaseRequestId>,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only while editable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub item_id: ItemId,
    pub quantity: i64,
    pub unit_price: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub quantity: Option<i64>,
    pub unit_price: Option<Money>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods (partial receipts allowed, bounded by outstanding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: AggregateId,
    /// Defaults to the order's warehouse.
    pub warehouse_id: Option<WarehouseId>,
    pub received_on: NaiveDate,
    pub received_by: UserId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    Workflow(WorkflowCommand),
    ReceiveGoods(ReceiveGoods),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub order_date: NaiveDate,
    pub expected_date: Option<NaiveDate>,
    pub source_request: Option<PurchaseRequestId>,
    pub lines: Vec<OrderLineData>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: OrderLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineUpdated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: OrderLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineRemoved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries item, warehouse and quantity so the stock-on-hand projection can
/// book the receipt without loading the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub receipt_id: AggregateId,
    pub supplier_id: PartyId,
    pub warehouse_id: WarehouseId,
    pub received_on: NaiveDate,
    pub received_by: UserId,
    pub lines: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLineAdded(PurchaseOrderLineAdded),
    PurchaseOrderLineUpdated(PurchaseOrderLineUpdated),
    PurchaseOrderLineRemoved(PurchaseOrderLineRemoved),
    Workflow(WorkflowEvent),
    GoodsReceived(GoodsReceived),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderLineUpdated(_) => "purchasing.order.line_updated",
            PurchaseOrderEvent::PurchaseOrderLineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::Workflow(_) => "purchasing.order.workflow",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::Workflow(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.supplier_id = Some(e.supplier_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.order_date = Some(e.order_date);
                self.expected_date = e.expected_date;
                self.source_request = e.source_request;
                self.lines = e
                    .lines
                    .iter()
                    .map(|d| PurchaseOrderLine {
                        data: d.clone(),
                        received: Fulfillment::new(d.quantity),
                    })
                    .collect();
                self.next_line_no = e.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => {
                self.lines.push(PurchaseOrderLine {
                    data: e.line.clone(),
                    received: Fulfillment::new(e.line.quantity),
                });
                self.next_line_no = self.next_line_no.max(e.line.line_no + 1);
            }
            PurchaseOrderEvent::PurchaseOrderLineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == e.line.line_no) {
                    line.received.set_ordered(e.line.quantity);
                    line.data = e.line.clone();
                }
            }
            PurchaseOrderEvent::PurchaseOrderLineRemoved(e) => {
                self.lines.retain(|l| l.data.line_no != e.line_no);
            }
            PurchaseOrderEvent::Workflow(e) => self.approval.apply(e),
            PurchaseOrderEvent::GoodsReceived(e) => {
                for r in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == r.line_no) {
                        line.received.allocate(e.receipt_id, r.quantity);
                    }
                }
                self.receipts.push(e.receipt_id);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            PurchaseOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::Workflow(cmd) => self.handle_workflow(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
        }
    }
}

impl WorkflowDocument for PurchaseOrder {
    const KIND: DocumentKind = DocumentKind::PurchaseOrder;

    fn empty(id: AggregateId) -> Self {
        PurchaseOrder::empty(PurchaseOrderId::new(id))
    }

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command {
        PurchaseOrderCommand::Workflow(cmd)
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
            PurchaseOrderEvent::Workflow(e) => Some(e),
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

impl PurchaseOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<(), DomainError> {
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

    fn existing_line(&self, line_no: u32) -> Result<&PurchaseOrderLine, DomainError> {
        self.line(line_no)
            .ok_or_else(|| DomainError::validation(format!("line {line_no} does not exist")))
    }

    fn handle_create(&self, cmd: &CreatePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        if let Some(expected) = cmd.expected_date {
            if expected < cmd.order_date {
                return Err(DomainError::validation("expected date cannot be before the order date"));
            }
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (i, line) in cmd.lines.iter().enumerate() {
            validate_line(line.quantity, line.unit_price)?;
            if let Some(src) = line.source {
                if Some(src.request_id) != cmd.source_request {
                    return Err(DomainError::validation(
                        "converted lines must reference the order's source request",
                    ));
                }
            }
            lines.push(OrderLineData {
                line_no: i as u32 + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                source: line.source,
            });
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            number: cmd.number.clone(),
            supplier_id: cmd.supplier_id,
            warehouse_id: cmd.warehouse_id,
            order_date: cmd.order_date,
            expected_date: cmd.expected_date,
            source_request: cmd.source_request,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        validate_line(cmd.quantity, cmd.unit_price)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineAdded(PurchaseOrderLineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line: OrderLineData {
                line_no: self.next_line_no,
                item_id: cmd.item_id,
                quantity: cmd.quantity,
                unit_price: cmd.unit_price,
                source: None,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        let line = self.existing_line(cmd.line_no)?;

        let quantity = cmd.quantity.unwrap_or(line.data.quantity);
        if line.data.source.is_some() && quantity != line.data.quantity {
            return Err(DomainError::invariant(
                "quantity of a line converted from a purchase request cannot be changed",
            ));
        }
        let unit_price = cmd.unit_price.unwrap_or(line.data.unit_price);
        validate_line(quantity, unit_price)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineUpdated(PurchaseOrderLineUpdated {
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

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;
        self.approval.ensure_editable()?;
        let line = self.existing_line(cmd.line_no)?;
        if line.data.source.is_some() {
            return Err(DomainError::invariant(
                "lines converted from a purchase request cannot be removed; cancel the order instead",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineRemoved(PurchaseOrderLineRemoved {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_workflow(&self, cmd: &WorkflowCommand) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, PurchaseOrderId::new(cmd.document_id))?;
        if matches!(cmd.action, WorkflowAction::Submit { .. }) && self.lines.is_empty() {
            return Err(DomainError::validation("cannot submit a purchase order without lines"));
        }
        let event = self.approval.handle(DocumentKind::PurchaseOrder, &self.number, cmd)?;
        Ok(vec![PurchaseOrderEvent::Workflow(event)])
    }

    fn handle_receive(&self, cmd: &ReceiveGoods) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        // Invariant: goods are only received against approved, open orders.
        self.approval.ensure_fulfillable().map_err(|e| match e {
            DomainError::InvariantViolation(msg) => {
                DomainError::invariant(format!("cannot receive goods: {msg}"))
            }
            other => other,
        })?;
        if self.receipts.contains(&cmd.receipt_id) {
            return Err(DomainError::conflict("receipt already recorded"));
        }
        validate_line_quantities(&cmd.lines)?;

        let supplier_id = self
            .supplier_id
            .ok_or_else(|| DomainError::invariant("supplier must be set"))?;
        let warehouse_id = cmd
            .warehouse_id
            .or(self.warehouse_id)
            .ok_or_else(|| DomainError::validation("warehouse is required"))?;

        let mut received = Vec::with_capacity(cmd.lines.len());
        for q in &cmd.lines {
            let line = self.existing_line(q.line_no)?;
            line.received.check_allocate(q.quantity).map_err(|e| match e {
                DomainError::InvariantViolation(msg) => {
                    DomainError::invariant(format!("line {}: {msg}", q.line_no))
                }
                other => other,
            })?;
            received.push(ReceivedLine {
                line_no: q.line_no,
                item_id: line.data.item_id,
                quantity: q.quantity,
            });
        }

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            receipt_id: cmd.receipt_id,
            supplier_id,
            warehouse_id,
            received_on: cmd.received_on,
            received_by: cmd.received_by,
            lines: received,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tradeflow_events::execute;
    use tradeflow_workflow::{Actor, ApprovalRoute, WorkflowStatus};

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    struct Fixture {
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        buyer: Actor,
        order: PurchaseOrder,
    }

    fn created(lines: Vec<NewOrderLine>) -> Fixture {
        let tenant_id = TenantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(order_id);
        execute(
            &mut order,
            &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: "PO-000001".into(),
                supplier_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                order_date: date(1),
                expected_date: Some(date(15)),
                source_request: None,
                lines,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        Fixture {
            tenant_id,
            order_id,
            buyer: Actor::new(UserId::new(), ["purchaser"]),
            order,
        }
    }

    fn line(quantity: i64, cents: u64) -> NewOrderLine {
        NewOrderLine {
            item_id: ItemId::new(AggregateId::new()),
            quantity,
            unit_price: Money::from_cents(cents),
            source: None,
        }
    }

    fn workflow(f: &mut Fixture, actor: &Actor, action: WorkflowAction) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        execute(
            &mut f.order,
            &PurchaseOrderCommand::Workflow(WorkflowCommand {
                tenant_id: f.tenant_id,
                document_id: f.order_id.0,
                actor: actor.clone(),
                action,
                occurred_at: test_time(),
            }),
        )
    }

    fn approve(f: &mut Fixture) {
        let buyer = f.buyer.clone();
        let manager = Actor::new(UserId::new(), ["manager"]);
        workflow(f, &buyer, WorkflowAction::Submit { route: ApprovalRoute::of_roles(["manager"]).unwrap() }).unwrap();
        workflow(f, &manager, WorkflowAction::Approve { comment: None }).unwrap();
        assert_eq!(f.order.approval().status(), WorkflowStatus::Approved);
    }

    fn receive(f: &mut Fixture, line_no: u32, quantity: i64) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        execute(
            &mut f.order,
            &PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                tenant_id: f.tenant_id,
                order_id: f.order_id,
                receipt_id: AggregateId::new(),
                warehouse_id: None,
                received_on: date(10),
                received_by: f.buyer.user_id,
                lines: vec![LineQuantity { line_no, quantity }],
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn total_sums_line_amounts() {
        let f = created(vec![line(10, 250), line(2, 1_000)]);
        assert_eq!(f.order.total().unwrap(), Money::from_cents(4_500));
    }

    #[test]
    fn expected_date_before_order_date_is_rejected() {
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let err = PurchaseOrder::empty(order_id)
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id: TenantId::new(),
                order_id,
                number: "PO-000002".into(),
                supplier_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                order_date: date(10),
                expected_date: Some(date(1)),
                source_request: None,
                lines: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cannot_receive_before_approval() {
        let mut f = created(vec![line(10, 100)]);
        match receive(&mut f, 1, 5).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("cannot receive goods") => {}
            other => panic!("Expected InvariantViolation for receiving before approval, got {other:?}"),
        }
    }

    #[test]
    fn partial_receipts_track_outstanding() {
        let mut f = created(vec![line(10, 100)]);
        approve(&mut f);

        let events = receive(&mut f, 1, 4).unwrap();
        match &events[0] {
            PurchaseOrderEvent::GoodsReceived(e) => {
                assert_eq!(e.lines[0].quantity, 4);
                assert_eq!(Some(e.warehouse_id), f.order.warehouse_id());
            }
            other => panic!("Expected GoodsReceived, got {other:?}"),
        }
        assert_eq!(f.order.line(1).unwrap().outstanding(), 6);
        assert!(!f.order.is_fully_received());

        assert!(receive(&mut f, 1, 7).is_err());
        receive(&mut f, 1, 6).unwrap();
        assert!(f.order.is_fully_received());
        assert_eq!(f.order.receipt_count(), 2);
    }

    #[test]
    fn closed_order_refuses_receipts() {
        let mut f = created(vec![line(10, 100)]);
        approve(&mut f);
        let buyer = f.buyer.clone();
        workflow(&mut f, &buyer, WorkflowAction::Close).unwrap();
        assert!(matches!(receive(&mut f, 1, 1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn rejected_order_can_be_edited_and_resubmitted() {
        let mut f = created(vec![line(10, 100)]);
        let buyer = f.buyer.clone();
        let manager = Actor::new(UserId::new(), ["manager"]);
        let route = ApprovalRoute::of_roles(["manager"]).unwrap();
        workflow(&mut f, &buyer, WorkflowAction::Submit { route: route.clone() }).unwrap();
        workflow(&mut f, &manager, WorkflowAction::Reject { reason: "price".into() }).unwrap();

        execute(
            &mut f.order,
            &PurchaseOrderCommand::UpdateLine(UpdateLine {
                tenant_id: f.tenant_id,
                order_id: f.order_id,
                line_no: 1,
                quantity: None,
                unit_price: Some(Money::from_cents(90)),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(f.order.line(1).unwrap().data.unit_price.cents(), 90);

        workflow(&mut f, &buyer, WorkflowAction::Submit { route }).unwrap();
        assert_eq!(f.order.approval().status(), WorkflowStatus::PendingApproval);
    }

    #[test]
    fn converted_lines_keep_their_quantity() {
        let request_id = PurchaseRequestId::new(AggregateId::new());
        let tenant_id = TenantId::new();
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(order_id);
        execute(
            &mut order,
            &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: "PO-000003".into(),
                supplier_id: PartyId::new(AggregateId::new()),
                warehouse_id: WarehouseId::new(AggregateId::new()),
                order_date: date(1),
                expected_date: None,
                source_request: Some(request_id),
                lines: vec![NewOrderLine {
                    source: Some(RequestLineRef { request_id, line_no: 1 }),
                    ..line(5, 100)
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = order
            .handle(&PurchaseOrderCommand::UpdateLine(UpdateLine {
                tenant_id,
                order_id,
                line_no: 1,
                quantity: Some(6),
                unit_price: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    proptest! {
        #[test]
        fn received_never_exceeds_ordered(ordered in 1i64..500, receipts in proptest::collection::vec(1i64..120, 1..12)) {
            let mut f = created(vec![line(ordered, 100)]);
            approve(&mut f);
            let mut accepted = 0;
            for q in receipts {
                if receive(&mut f, 1, q).is_ok() {
                    accepted += q;
                }
                let line = f.order.line(1).unwrap();
                prop_assert_eq!(line.received.fulfilled(), accepted);
                prop_assert!(line.outstanding() >= 0);
            }
            prop_assert_eq!(f.order.is_fully_received(), accepted == ordered);
        }
    }
}
