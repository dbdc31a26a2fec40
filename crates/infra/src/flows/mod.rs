//! Multi-document flows.
//!
//! Each flow touches two streams: it reserves quantity on the upstream
//! document first, then creates (or cancels) the downstream one. When the
//! second step fails the reservation is released again. Releases are
//! idempotent, so a half-finished cancellation can simply be retried.
//!
//! Reads inside a flow go through [`CommandDispatcher::load`] rather than the
//! read models: the outstanding quantities must be current.

pub mod fulfillment;
pub mod procurement;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

use tradeflow_catalog::{Item, ItemId, Warehouse, WarehouseId};
use tradeflow_core::{AggregateId, TenantId};
use tradeflow_events::{EventBus, EventEnvelope};
use tradeflow_parties::{Party, PartyId, PartyKind};
use tradeflow_workflow::{
    Actor, ApprovalRoute, WorkflowAction, WorkflowCommand, WorkflowDefinition, WorkflowDocument,
    WorkflowStatus,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, StoredEvent};
use crate::projections::Mirrored;

pub use fulfillment::{CreateDelivery, CreateInvoice, cancel_delivery, cancel_invoice, create_delivery, create_invoice};
pub use procurement::{ConvertLine, ConvertRequest, cancel_purchase_order, convert_request};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The second step failed and releasing the reservation failed too.
    #[error("{step} failed: {cause}; releasing the reservation also failed: {compensation}")]
    CompensationFailed {
        step: &'static str,
        cause: DispatchError,
        compensation: DispatchError,
    },
}

impl FlowError {
    /// The error the caller should act on.
    pub fn primary(&self) -> &DispatchError {
        match self {
            FlowError::Dispatch(e) => e,
            FlowError::CompensationFailed { cause, .. } => cause,
        }
    }
}

/// Run `step`; when it fails run `compensate` and report both outcomes.
pub(crate) fn with_compensation<T>(
    step_name: &'static str,
    step: impl FnOnce() -> Result<T, DispatchError>,
    compensate: impl FnOnce() -> Result<Vec<StoredEvent>, DispatchError>,
) -> Result<T, FlowError> {
    match step() {
        Ok(v) => Ok(v),
        Err(cause) => {
            warn!(step = step_name, error = %cause, "flow step failed, releasing reservation");
            match compensate() {
                Ok(_) => Err(FlowError::Dispatch(cause)),
                Err(compensation) => {
                    error!(step = step_name, error = %compensation, "compensation failed");
                    Err(FlowError::CompensationFailed {
                        step: step_name,
                        cause,
                        compensation,
                    })
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strongly consistent loads
// ─────────────────────────────────────────────────────────────────────────────

/// Load a document and fail with `NotFound` if its stream is empty.
pub fn load_document<D, S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: AggregateId,
) -> Result<D, DispatchError>
where
    D: WorkflowDocument,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let doc = dispatcher.load(tenant_id, id, |_, id| D::empty(id))?;
    if doc.is_created() { Ok(doc) } else { Err(DispatchError::NotFound) }
}

/// Dispatch a command to a document stream.
pub fn dispatch_document<D, S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: AggregateId,
    command: D::Command,
) -> Result<Vec<StoredEvent>, DispatchError>
where
    D: WorkflowDocument,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    dispatcher.dispatch(tenant_id, id, D::KIND.aggregate_type(), command, |_, id| D::empty(id))
}

/// Load a master record (party, item, warehouse ...) that must exist.
pub fn load_record<A, S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: AggregateId,
) -> Result<A, DispatchError>
where
    A: Mirrored,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let record: A = dispatcher.load(tenant_id, id, |_, id| A::unborn(id))?;
    if record.owner_tenant() == Some(tenant_id) { Ok(record) } else { Err(DispatchError::NotFound) }
}

pub(crate) fn ensure_party<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: PartyId,
    kind: PartyKind,
) -> Result<Party, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let party: Party = load_record(dispatcher, tenant_id, id.0)?;
    party.ensure_usable_as(kind)?;
    Ok(party)
}

pub(crate) fn ensure_warehouse<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: WarehouseId,
) -> Result<Warehouse, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let warehouse: Warehouse = load_record(dispatcher, tenant_id, id.0)?;
    warehouse.ensure_operational()?;
    Ok(warehouse)
}

pub(crate) fn ensure_item<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    id: ItemId,
) -> Result<Item, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let item: Item = load_record(dispatcher, tenant_id, id.0)?;
    item.ensure_orderable()?;
    Ok(item)
}

// ─────────────────────────────────────────────────────────────────────────────
// Workflow actions
// ─────────────────────────────────────────────────────────────────────────────

/// Active approval route of a document kind. No definition means an empty
/// route: documents of that kind approve on submit.
pub fn active_route<D, S, B>(dispatcher: &CommandDispatcher<S, B>, tenant_id: TenantId) -> Result<ApprovalRoute, DispatchError>
where
    D: WorkflowDocument,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let definition: WorkflowDefinition =
        dispatcher.load(tenant_id, D::KIND.definition_id(), |_, id| WorkflowDefinition::empty(id))?;
    Ok(definition.route().clone())
}

/// The user-facing workflow verbs. `Submit` resolves the route itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowRequest {
    Submit,
    Approve { comment: Option<String> },
    Reject { reason: String },
    Recall,
    Close,
    Cancel { reason: String },
}

/// Run a workflow action on any document kind.
pub fn run_workflow_action<D, S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    document_id: AggregateId,
    actor: Actor,
    request: WorkflowRequest,
    occurred_at: DateTime<Utc>,
) -> Result<D, DispatchError>
where
    D: WorkflowDocument,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    // Surface NotFound before resolving routes.
    load_document::<D, S, B>(dispatcher, tenant_id, document_id)?;

    let action = match request {
        WorkflowRequest::Submit => WorkflowAction::Submit {
            route: active_route::<D, S, B>(dispatcher, tenant_id)?,
        },
        WorkflowRequest::Approve { comment } => WorkflowAction::Approve { comment },
        WorkflowRequest::Reject { reason } => WorkflowAction::Reject { reason },
        WorkflowRequest::Recall => WorkflowAction::Recall,
        WorkflowRequest::Close => WorkflowAction::Close,
        WorkflowRequest::Cancel { reason } => WorkflowAction::Cancel { reason },
    };
    let command = D::workflow_command(WorkflowCommand {
        tenant_id,
        document_id,
        actor,
        action,
        occurred_at,
    });
    dispatch_document::<D, S, B>(dispatcher, tenant_id, document_id, command)?;
    load_document::<D, S, B>(dispatcher, tenant_id, document_id)
}

/// Cancel a document unless it already is; used by the cancel flows so that
/// a retry after a failed release goes straight to the release.
pub(crate) fn cancel_if_needed<D, S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    doc: &D,
    document_id: AggregateId,
    actor: &Actor,
    reason: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(), DispatchError>
where
    D: WorkflowDocument,
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    if doc.approval().status() == WorkflowStatus::Cancelled {
        return Ok(());
    }
    let command = D::workflow_command(WorkflowCommand {
        tenant_id,
        document_id,
        actor: actor.clone(),
        action: WorkflowAction::Cancel { reason: reason.to_string() },
        occurred_at,
    });
    dispatch_document::<D, S, B>(dispatcher, tenant_id, document_id, command)?;
    Ok(())
}
