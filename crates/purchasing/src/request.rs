//! Purchase Requests: internal requisitions that must be approved before they
//! are converted into purchase orders.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_catalog::{ItemId, WarehouseId};
use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use tradeflow_events::Event;
use tradeflow_workflow::{
    ApprovalState, DocumentKind, Fulfillment, LineQuantity, WorkflowAction, WorkflowCommand,
    WorkflowDocument, WorkflowEvent, validate_line_quantities,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseRequestId(pub AggregateId);

impl PurchaseRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Line input as entered by the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequestLine {
    pub item_id: ItemId,
    pub quantity: i64,
    pub required_by: Option<NaiveDate>,
    pub warehouse_id: WarehouseId,
    pub remarks: Option<String>,
}

/// Line as recorded on the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineData {
    pub line_no: u32,
    pub item_id: ItemId,
    pub quantity: i64,
    pub required_by: Option<NaiveDate>,
    pub warehouse_id: WarehouseId,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub data: RequestLineData,
    /// Quantity already converted to purchase orders.
    pub ordered: Fulfillment,
}

impl RequestLine {
    pub fn outstanding(&self) -> i64 {
        self.ordered.outstanding()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    id: PurchaseRequestId,
    tenant_id: Option<TenantId>,
    number: String,
    requested_by: Option<UserId>,
    department: Option<String>,
    remarks: Option<String>,
    lines: Vec<RequestLine>,
    next_line_no: u32,
    approval: ApprovalState,
    version: u64,
    created: bool,
}

impl PurchaseRequest {
    pub fn empty(id: PurchaseRequestId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            requested_by: None,
            department: None,
            remarks: None,
            lines: Vec::new(),
            next_line_no: 1,
            approval: ApprovalState::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseRequestId {
        self.id
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&RequestLine> {
        self.lines.iter().find(|l| l.data.line_no == line_no)
    }
}

impl AggregateRoot for PurchaseRequest {
    type Id = PurchaseRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub number: String,
    pub requested_by: UserId,
    pub department: Option<String>,
    pub remarks: Option<String>,
    pub lines: Vec<NewRequestLine>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequestLine {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line: NewRequestLine,
    pub occurred_at: DateTime<Utc>,
}

/// Partial line edit; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequestLine {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line_no: u32,
    pub quantity: Option<i64>,
    pub required_by: Option<NaiveDate>,
    pub warehouse_id: Option<WarehouseId>,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequestLine {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Reserve request quantities for a purchase order being raised from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOrdered {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub purchase_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

/// Give back everything reserved by a purchase order (cancelled or failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOrdered {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub purchase_order_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseRequestCommand {
    CreatePurchaseRequest(CreatePurchaseRequest),
    AddLine(AddRequestLine),
    UpdateLine(UpdateRequestLine),
    RemoveLine(RemoveRequestLine),
    Workflow(WorkflowCommand),
    RecordOrdered(RecordOrdered),
    ReleaseOrdered(ReleaseOrdered),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestCreated {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub number: String,
    pub requested_by: UserId,
    pub department: Option<String>,
    pub remarks: Option<String>,
    pub lines: Vec<RequestLineData>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineAdded {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line: RequestLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineUpdated {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line: RequestLineData,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLineRemoved {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedQuantitiesRecorded {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub purchase_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedQuantitiesReleased {
    pub tenant_id: TenantId,
    pub request_id: PurchaseRequestId,
    pub purchase_order_id: AggregateId,
    pub lines: Vec<LineQuantity>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseRequestEvent {
    PurchaseRequestCreated(PurchaseRequestCreated),
    LineAdded(RequestLineAdded),
    LineUpdated(RequestLineUpdated),
    LineRemoved(RequestLineRemoved),
    Workflow(WorkflowEvent),
    OrderedQuantitiesRecorded(OrderedQuantitiesRecorded),
    OrderedQuantitiesReleased(OrderedQuantitiesReleased),
}

impl Event for PurchaseRequestEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseRequestEvent::PurchaseRequestCreated(_) => "purchasing.request.created",
            PurchaseRequestEvent::LineAdded(_) => "purchasing.request.line_added",
            PurchaseRequestEvent::LineUpdated(_) => "purchasing.request.line_updated",
            PurchaseRequestEvent::LineRemoved(_) => "purchasing.request.line_removed",
            PurchaseRequestEvent::Workflow(_) => "purchasing.request.workflow",
            PurchaseRequestEvent::OrderedQuantitiesRecorded(_) => "purchasing.request.ordered_recorded",
            PurchaseRequestEvent::OrderedQuantitiesReleased(_) => "purchasing.request.ordered_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseRequestEvent::PurchaseRequestCreated(e) => e.occurred_at,
            PurchaseRequestEvent::LineAdded(e) => e.occurred_at,
            PurchaseRequestEvent::LineUpdated(e) => e.occurred_at,
            PurchaseRequestEvent::LineRemoved(e) => e.occurred_at,
            PurchaseRequestEvent::Workflow(e) => e.occurred_at,
            PurchaseRequestEvent::OrderedQuantitiesRecorded(e) => e.occurred_at,
            PurchaseRequestEvent::OrderedQuantitiesReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseRequest {
    type Command = PurchaseRequestCommand;
    type Event = PurchaseRequestEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseRequestEvent::PurchaseRequestCreated(e) => {
                self.id = e.request_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.requested_by = Some(e.requested_by);
                self.department = e.department.clone();
                self.remarks = e.remarks.clone();
                self.lines = e
                    .lines
                    .iter()
                    .map(|d| RequestLine {
                        data: d.clone(),
                        ordered: Fulfillment::new(d.quantity),
                    })
                    .collect();
                self.next_line_no = e.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
                self.created = true;
            }
            PurchaseRequestEvent::LineAdded(e) => {
                self.lines.push(RequestLine {
                    data: e.line.clone(),
                    ordered: Fulfillment::new(e.line.quantity),
                });
                self.next_line_no = self.next_line_no.max(e.line.line_no + 1);
            }
            PurchaseRequestEvent::LineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == e.line.line_no) {
                    line.ordered.set_ordered(e.line.quantity);
                    line.data = e.line.clone();
                }
            }
            PurchaseRequestEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.data.line_no != e.line_no);
            }
            PurchaseRequestEvent::Workflow(e) => self.approval.apply(e),
            PurchaseRequestEvent::OrderedQuantitiesRecorded(e) => {
                for q in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.data.line_no == q.line_no) {
                        line.ordered.allocate(e.purchase_order_id, q.quantity);
                    }
                }
            }
            PurchaseRequestEvent::OrderedQuantitiesReleased(e) => {
                for line in &mut self.lines {
                    line.ordered.release(e.purchase_order_id);
                }
            }
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseRequestCommand::CreatePurchaseRequest(cmd) => self.handle_create(cmd),
            PurchaseRequestCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseRequestCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            PurchaseRequestCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseRequestCommand::Workflow(cmd) => self.handle_workflow(cmd),
            PurchaseRequestCommand::RecordOrdered(cmd) => self.handle_record_ordered(cmd),
            PurchaseRequestCommand::ReleaseOrdered(cmd) => self.handle_release_ordered(cmd),
        }
    }
}

impl WorkflowDocument for PurchaseRequest {
    const KIND: DocumentKind = DocumentKind::PurchaseRequest;

    fn empty(id: AggregateId) -> Self {
        PurchaseRequest::empty(PurchaseRequestId::new(id))
    }

    fn workflow_command(cmd: WorkflowCommand) -> Self::Command {
        PurchaseRequestCommand::Workflow(cmd)
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
            PurchaseRequestEvent::Workflow(e) => Some(e),
            _ => None,
        }
    }
}

fn validate_new_line(line: &NewRequestLine) -> Result<(), DomainError> {
    if line.quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl PurchaseRequest {
    fn ensure_existing(&self, tenant_id: TenantId, request_id: PurchaseRequestId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePurchaseRequest) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase request already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (i, line) in cmd.lines.iter().enumerate() {
            validate_new_line(line)?;
            lines.push(RequestLineData {
                line_no: i as u32 + 1,
                item_id: line.item_id,
                quantity: line.quantity,
                required_by: line.required_by,
                warehouse_id: line.warehouse_id,
                remarks: line.remarks.clone(),
            });
        }

        Ok(vec![PurchaseRequestEvent::PurchaseRequestCreated(PurchaseRequestCreated {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            number: cmd.number.clone(),
            requested_by: cmd.requested_by,
            department: cmd.department.clone(),
            remarks: cmd.remarks.clone(),
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddRequestLine) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
        self.approval.ensure_editable()?;
        validate_new_line(&cmd.line)?;

        Ok(vec![PurchaseRequestEvent::LineAdded(RequestLineAdded {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            line: RequestLineData {
                line_no: self.next_line_no,
                item_id: cmd.line.item_id,
                quantity: cmd.line.quantity,
                required_by: cmd.line.required_by,
                warehouse_id: cmd.line.warehouse_id,
                remarks: cmd.line.remarks.clone(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateRequestLine) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
        self.approval.ensure_editable()?;
        let line = self
            .line(cmd.line_no)
            .ok_or_else(|| DomainError::validation(format!("line {} does not exist", cmd.line_no)))?;

        let quantity = cmd.quantity.unwrap_or(line.data.quantity);
        line.ordered.check_reorder(quantity)?;

        Ok(vec![PurchaseRequestEvent::LineUpdated(RequestLineUpdated {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            line: RequestLineData {
                line_no: cmd.line_no,
                item_id: line.data.item_id,
                quantity,
                required_by: cmd.required_by.or(line.data.required_by),
                warehouse_id: cmd.warehouse_id.unwrap_or(line.data.warehouse_id),
                remarks: cmd.remarks.clone().or_else(|| line.data.remarks.clone()),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveRequestLine) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
        self.approval.ensure_editable()?;
        let line = self
            .line(cmd.line_no)
            .ok_or_else(|| DomainError::validation(format!("line {} does not exist", cmd.line_no)))?;
        if line.ordered.fulfilled() > 0 {
            return Err(DomainError::invariant("line already has ordered quantity"));
        }

        Ok(vec![PurchaseRequestEvent::LineRemoved(RequestLineRemoved {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_workflow(&self, cmd: &WorkflowCommand) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, PurchaseRequestId::new(cmd.document_id))?;
        if matches!(cmd.action, WorkflowAction::Submit { .. }) && self.lines.is_empty() {
            return Err(DomainError::validation("cannot submit a purchase request without lines"));
        }
        let event = self.approval.handle(DocumentKind::PurchaseRequest, &self.number, cmd)?;
        Ok(vec![PurchaseRequestEvent::Workflow(event)])
    }

    fn handle_record_ordered(&self, cmd: &RecordOrdered) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
        self.approval.ensure_fulfillable()?;
        validate_line_quantities(&cmd.lines)?;
        for q in &cmd.lines {
            let line = self
                .line(q.line_no)
                .ok_or_else(|| DomainError::validation(format!("line {} does not exist", q.line_no)))?;
            line.ordered
                .check_allocate(q.quantity)
                .map_err(|e| match e {
                    DomainError::InvariantViolation(msg) => {
                        DomainError::invariant(format!("line {}: {msg}", q.line_no))
                    }
                    other => other,
                })?;
        }

        Ok(vec![PurchaseRequestEvent::OrderedQuantitiesRecorded(OrderedQuantitiesRecorded {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            purchase_order_id: cmd.purchase_order_id,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release_ordered(&self, cmd: &ReleaseOrdered) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.request_id)?;
        let lines: Vec<LineQuantity> = self
            .lines
            .iter()
            .map(|l| LineQuantity {
                line_no: l.data.line_no,
                quantity: l.ordered.allocated_to(cmd.purchase_order_id),
            })
            .filter(|q| q.quantity > 0)
            .collect();
        // Nothing held by this order: releasing again is a no-op.
        if lines.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseRequestEvent::OrderedQuantitiesReleased(OrderedQuantitiesReleased {
            tenant_id: cmd.tenant_id,
            request_id: cmd.request_id,
            purchase_order_id: cmd.purchase_order_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;
    use tradeflow_workflow::{Actor, ApprovalRoute, WorkflowStatus};

    struct Fixture {
        tenant_id: TenantId,
        request_id: PurchaseRequestId,
        requester: Actor,
        pr: PurchaseRequest,
    }

    fn line(quantity: i64) -> NewRequestLine {
        NewRequestLine {
            item_id: ItemId::new(AggregateId::new()),
            quantity,
            required_by: NaiveDate::from_ymd_opt(2026, 11, 30),
            warehouse_id: WarehouseId::new(AggregateId::new()),
            remarks: None,
        }
    }

    fn created(lines: Vec<NewRequestLine>) -> Fixture {
        let tenant_id = TenantId::new();
        let request_id = PurchaseRequestId::new(AggregateId::new());
        let requester = Actor::new(UserId::new(), ["purchaser"]);
        let mut pr = PurchaseRequest::empty(request_id);
        execute(
            &mut pr,
            &PurchaseRequestCommand::CreatePurchaseRequest(CreatePurchaseRequest {
                tenant_id,
                request_id,
                number: "PR-000001".into(),
                requested_by: requester.user_id,
                department: Some("Maintenance".into()),
                remarks: None,
                lines,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        Fixture { tenant_id, request_id, requester, pr }
    }

    fn workflow(f: &mut Fixture, actor: &Actor, action: WorkflowAction) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        execute(
            &mut f.pr,
            &PurchaseRequestCommand::Workflow(WorkflowCommand {
                tenant_id: f.tenant_id,
                document_id: f.request_id.0,
                actor: actor.clone(),
                action,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn approved(quantity: i64) -> Fixture {
        let mut f = created(vec![line(quantity)]);
        let requester = f.requester.clone();
        workflow(&mut f, &requester, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap();
        assert_eq!(f.pr.approval().status(), WorkflowStatus::Approved);
        f
    }

    fn record(f: &mut Fixture, po: AggregateId, quantity: i64) -> Result<Vec<PurchaseRequestEvent>, DomainError> {
        execute(
            &mut f.pr,
            &PurchaseRequestCommand::RecordOrdered(RecordOrdered {
                tenant_id: f.tenant_id,
                request_id: f.request_id,
                purchase_order_id: po,
                lines: vec![LineQuantity { line_no: 1, quantity }],
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn create_numbers_lines_sequentially() {
        let f = created(vec![line(5), line(3)]);
        let nos: Vec<u32> = f.pr.lines().iter().map(|l| l.data.line_no).collect();
        assert_eq!(nos, vec![1, 2]);
        assert_eq!(f.pr.number(), "PR-000001");
    }

    #[test]
    fn cannot_submit_without_lines() {
        let mut f = created(vec![]);
        let requester = f.requester.clone();
        let err = workflow(&mut f, &requester, WorkflowAction::Submit { route: ApprovalRoute::default() }).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lines_locked_after_submit() {
        let mut f = created(vec![line(5)]);
        let requester = f.requester.clone();
        workflow(
            &mut f,
            &requester,
            WorkflowAction::Submit { route: ApprovalRoute::of_roles(["manager"]).unwrap() },
        )
        .unwrap();

        let err = execute(
            &mut f.pr,
            &PurchaseRequestCommand::AddLine(AddRequestLine {
                tenant_id: f.tenant_id,
                request_id: f.request_id,
                line: line(1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn line_numbers_are_not_reused_after_removal() {
        let mut f = created(vec![line(5), line(2)]);
        execute(
            &mut f.pr,
            &PurchaseRequestCommand::RemoveLine(RemoveRequestLine {
                tenant_id: f.tenant_id,
                request_id: f.request_id,
                line_no: 2,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let events = execute(
            &mut f.pr,
            &PurchaseRequestCommand::AddLine(AddRequestLine {
                tenant_id: f.tenant_id,
                request_id: f.request_id,
                line: line(1),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        match &events[0] {
            PurchaseRequestEvent::LineAdded(e) => assert_eq!(e.line.line_no, 3),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn ordering_requires_approval() {
        let mut f = created(vec![line(5)]);
        let err = record(&mut f, AggregateId::new(), 1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn partial_orders_are_gated_by_outstanding() {
        let mut f = approved(10);
        record(&mut f, AggregateId::new(), 6).unwrap();
        assert_eq!(f.pr.line(1).unwrap().outstanding(), 4);

        match record(&mut f, AggregateId::new(), 5).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("exceeds outstanding") => {}
            other => panic!("unexpected error {other:?}"),
        }
        record(&mut f, AggregateId::new(), 4).unwrap();
        assert_eq!(f.pr.line(1).unwrap().outstanding(), 0);
    }

    #[test]
    fn release_restores_outstanding_and_is_idempotent() {
        let mut f = approved(10);
        let po = AggregateId::new();
        record(&mut f, po, 7).unwrap();

        let release = PurchaseRequestCommand::ReleaseOrdered(ReleaseOrdered {
            tenant_id: f.tenant_id,
            request_id: f.request_id,
            purchase_order_id: po,
            occurred_at: Utc::now(),
        });
        assert_eq!(execute(&mut f.pr, &release).unwrap().len(), 1);
        assert_eq!(f.pr.line(1).unwrap().outstanding(), 10);
        assert!(execute(&mut f.pr, &release).unwrap().is_empty());
    }

    #[test]
    fn closed_request_cannot_be_ordered() {
        let mut f = approved(10);
        let requester = f.requester.clone();
        workflow(&mut f, &requester, WorkflowAction::Close).unwrap();
        match record(&mut f, AggregateId::new(), 1).unwrap_err() {
            DomainError::InvariantViolation(msg) if msg.contains("closed") => {}
            other => panic!("unexpected error {other:?}"),
        }
    }
}
